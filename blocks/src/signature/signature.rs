// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Function types for the invoke, copy and dispose helpers of a block.

pub mod encoding;

use log::{debug, warn};

use crate::host::FunctionInfo;
use crate::types::{FunctionType, Type};

use self::encoding::TypeEncoding;

pub const INVOKE_SUFFIX: &str = "_block_invoke";
pub const COPY_SUFFIX: &str = "_block_copy";
pub const DISPOSE_SUFFIX: &str = "_block_dispose";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureChange {
    /// Sets the whole function type.
    Replace(FunctionType),
    /// Sets the return type and the first parameter, keeping the other
    /// parameters the host found.
    Patch { return_type: Type, first_param: Type },
}

#[derive(Debug)]
pub struct Projection {
    pub change: SignatureChange,
    /// Why the signature string could not be used, if there was one.
    pub failure: Option<encoding::Error>,
}

/// Projects the signature of an invoke function. `literal` is the block
/// literal structure, whose pointer is always the first parameter.
pub fn project_invoke<E>(
    signature: Option<&str>,
    translator: &E,
    callee: &FunctionInfo,
    literal: &Type,
) -> Projection
where
    E: TypeEncoding + ?Sized,
{
    let this = Type::pointer(literal.clone());
    let mut failure = None;
    if let Some(signature) = signature {
        match translator.translate(signature) {
            Ok(mut types) if !types.is_empty() => {
                let ret = types.remove(0);
                match types.first_mut() {
                    Some(first) => *first = this,
                    None => types.push(this),
                }
                let func = FunctionType {
                    ret,
                    params: types,
                    variadic: false,
                };
                debug!("{}: {signature:?} projected as {func}", callee.name);
                return Projection {
                    change: SignatureChange::Replace(func),
                    failure,
                };
            }
            Ok(_) => {}
            Err(e) => {
                warn!("{}: failed to translate {signature:?}: {e}", callee.name);
                failure = Some(e);
            }
        }
    }
    let change = if callee.param_count == 0 {
        SignatureChange::Replace(FunctionType {
            ret: Type::Void,
            params: vec![this],
            variadic: true,
        })
    } else {
        SignatureChange::Patch {
            return_type: Type::Void,
            first_param: this,
        }
    };
    Projection { change, failure }
}

/// `void (struct Block_literal_X *dst, struct Block_literal_X *src)`
pub fn project_copy(literal: &Type) -> FunctionType {
    let this = Type::pointer(literal.clone());
    FunctionType {
        ret: Type::Void,
        params: vec![this.clone(), this],
        variadic: false,
    }
}

/// `void (struct Block_literal_X *dst)`
pub fn project_dispose(literal: &Type) -> FunctionType {
    FunctionType {
        ret: Type::Void,
        params: vec![Type::pointer(literal.clone())],
        variadic: false,
    }
}

/// The new name of a helper still carrying the host's default name.
pub fn helper_name(callee: &FunctionInfo, suffix: &str) -> Option<String> {
    callee
        .has_default_name()
        .then(|| format!("{}{suffix}", callee.name))
}

#[cfg(test)]
#[path = "signature_test.rs"]
mod tests;
