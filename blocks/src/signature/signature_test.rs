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

use assert_matches::assert_matches;
use rstest::rstest;

use crate::host::FunctionInfo;
use crate::signature::encoding::{self, ObjcTypeEncoding, TypeEncoding};
use crate::signature::{
    COPY_SUFFIX, INVOKE_SUFFIX, SignatureChange, helper_name, project_copy, project_dispose,
    project_invoke,
};
use crate::types::{FunctionType, StructBuilder, Type, TypeRegistry};

fn literal() -> Type {
    let registry = TypeRegistry::new();
    registry.define("Block_literal_1000", &StructBuilder::packed())
}

fn callee(param_count: usize) -> FunctionInfo {
    FunctionInfo {
        start: 0x4000,
        name: "sub_4000".to_owned(),
        param_count,
    }
}

/// Returns the same types for every encoding.
struct Fixed(Vec<Type>);

impl TypeEncoding for Fixed {
    fn translate(&self, _: &str) -> encoding::Result<Vec<Type>> {
        Ok(self.0.clone())
    }
}

#[test]
fn test_invoke_from_signature() {
    let literal = literal();
    let projection = project_invoke(Some("q24@?0@8q16"), &ObjcTypeEncoding, &callee(3), &literal);
    assert!(projection.failure.is_none());
    let SignatureChange::Replace(func) = projection.change else {
        panic!("expected a replacement")
    };
    assert_eq!(
        func.to_string(),
        "int64_t (struct Block_literal_1000 *, id, int64_t)"
    );
}

#[test]
fn test_invoke_return_only() {
    let literal = literal();
    let projection = project_invoke(Some("v"), &ObjcTypeEncoding, &callee(0), &literal);
    assert_eq!(
        projection.change,
        SignatureChange::Replace(FunctionType {
            ret: Type::Void,
            params: vec![Type::pointer(literal)],
            variadic: false,
        })
    );
}

#[rstest]
#[case(None, false)]
#[case(Some("v24@?0{CGRect={CGPoint=dd}{CGSize=dd}}8"), true)]
#[case(Some("v8@?0~"), true)]
fn test_invoke_fallback(#[case] signature: Option<&str>, #[case] failed: bool) {
    let literal = literal();
    let this = Type::pointer(literal.clone());

    let projection = project_invoke(signature, &ObjcTypeEncoding, &callee(0), &literal);
    assert_eq!(projection.failure.is_some(), failed);
    assert_eq!(
        projection.change,
        SignatureChange::Replace(FunctionType {
            ret: Type::Void,
            params: vec![this.clone()],
            variadic: true,
        })
    );
    assert_matches!(
        &projection.change,
        SignatureChange::Replace(func)
            if func.to_string() == "void (struct Block_literal_1000 *, ...)"
    );

    let projection = project_invoke(signature, &ObjcTypeEncoding, &callee(2), &literal);
    assert_eq!(projection.failure.is_some(), failed);
    assert_eq!(
        projection.change,
        SignatureChange::Patch {
            return_type: Type::Void,
            first_param: this,
        }
    );
}

#[test]
fn test_invoke_failure_kind() {
    let literal = literal();
    let projection = project_invoke(Some("v16@?0[2i]8"), &ObjcTypeEncoding, &callee(1), &literal);
    assert_matches!(
        projection.failure,
        Some(encoding::Error::NotImplemented { what: "Array", .. })
    );
}

#[test]
fn test_invoke_empty_translation() {
    let literal = literal();
    let projection = project_invoke(Some("v8@?0"), &Fixed(vec![]), &callee(1), &literal);
    assert!(projection.failure.is_none());
    assert_matches!(projection.change, SignatureChange::Patch { .. });

    let fixed = Fixed(vec![Type::Bool, Type::Char, Type::Float]);
    let projection = project_invoke(Some("ignored"), &fixed, &callee(1), &literal);
    assert_matches!(
        projection.change,
        SignatureChange::Replace(FunctionType { ret: Type::Bool, params, variadic: false })
            if params == [Type::pointer(literal.clone()), Type::Float]
    );
}

#[test]
fn test_copy_dispose() {
    let literal = literal();
    assert_eq!(
        project_copy(&literal).to_string(),
        "void (struct Block_literal_1000 *, struct Block_literal_1000 *)"
    );
    assert_eq!(
        project_dispose(&literal).to_string(),
        "void (struct Block_literal_1000 *)"
    );
}

#[test]
fn test_helper_name() {
    assert_eq!(
        helper_name(&callee(0), INVOKE_SUFFIX).as_deref(),
        Some("sub_4000_block_invoke")
    );
    let named = FunctionInfo {
        name: "-[Foo bar]_block_invoke".to_owned(),
        ..callee(0)
    };
    assert_eq!(helper_name(&named, COPY_SUFFIX), None);
}
