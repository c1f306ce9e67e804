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

//! Recovers block literals and byref cells from the stores that build
//! them on the stack.
//!
//! Stores are matched by byte offset from the start of the variable, so
//! the result does not depend on how the host has typed the variable so
//! far. Stores may appear in any order.

use std::collections::HashMap;
use std::ops::ControlFlow;

use log::{debug, warn};
use snafu::Snafu;

use crate::abi::{
    BYREF_HEADER_SIZE, BlockFlags, BlockLiteralHeader, ByrefCopyDispose, ByrefFlags, ByrefHeader,
    ByrefLayout,
};
use crate::annotate::Diagnostic;
use crate::decode::{self, BlockKind, BlockLiteral, ByrefPayload, ByrefVariable};
use crate::errors::{DebugTrace, trace_error};
use crate::il::{Expr, Function, Insn, InsnKind, VarId, VarSource};

const LITERAL_ISA: u64 = BlockLiteralHeader::OFFSET_ISA as u64;
const LITERAL_FLAGS: u64 = BlockLiteralHeader::OFFSET_FLAGS as u64;
const LITERAL_RESERVED: u64 = BlockLiteralHeader::OFFSET_RESERVED as u64;
const LITERAL_INVOKE: u64 = BlockLiteralHeader::OFFSET_INVOKE as u64;
const LITERAL_DESCRIPTOR: u64 = BlockLiteralHeader::OFFSET_DESCRIPTOR as u64;

const BYREF_ISA: u64 = ByrefHeader::OFFSET_ISA as u64;
const BYREF_FORWARDING: u64 = ByrefHeader::OFFSET_FORWARDING as u64;
const BYREF_FLAGS: u64 = ByrefHeader::OFFSET_FLAGS as u64;
const BYREF_SIZE: u64 = ByrefHeader::OFFSET_SIZE as u64;
const BYREF_KEEP: u64 = BYREF_HEADER_SIZE + ByrefCopyDispose::OFFSET_KEEP as u64;
const BYREF_DESTROY: u64 = BYREF_HEADER_SIZE + ByrefCopyDispose::OFFSET_DESTROY as u64;

const CALLING_CONVENTION_HINT: &str = "; if it comes from d8-d15/v8-v15, the host likely treats \
    them as caller-saved when they are callee-saved";

#[trace_error]
#[derive(Snafu, DebugTrace)]
#[snafu(module, visibility(pub), context(suffix(false)))]
pub enum Error {
    #[snafu(display("Instruction at {address:#x} is neither a var init nor an assign"))]
    NotAStore { address: u64 },
    #[snafu(display("Assignment at {address:#x} to {dest} is not to a var or to a struct field"))]
    UnsupportedCandidate { address: u64, dest: String },
    #[snafu(display("Assignment at {address:#x} is not to a stack variable ({var})"))]
    NotStackVariable { address: u64, var: String },
    #[snafu(display("Right-hand side {src} at {address:#x} is not an import of {marker}"))]
    NotMarker {
        address: u64,
        src: String,
        marker: String,
    },
    #[snafu(display("{what} at {address:#x}: {field} is {src}, not a constant{hint}"))]
    NonConstantRequiredField {
        what: &'static str,
        address: u64,
        field: &'static str,
        src: String,
        hint: &'static str,
    },
    #[snafu(display("{what} at {address:#x}: failed to find {field} assignment"))]
    MissingField {
        what: &'static str,
        address: u64,
        field: &'static str,
    },
    #[snafu(display("Recovered fields are inconsistent"), context(false))]
    Decode { source: Box<decode::Error> },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A value together with the notes collected while recovering it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matched<T> {
    pub value: T,
    pub diagnostics: Vec<Diagnostic>,
}

/// The runtime class whose import identifies a block literal.
#[derive(Debug, Clone, Copy)]
pub struct Marker<'a> {
    pub name: &'a str,
    /// Resolved address of the import, if the host knows it.
    pub addr: Option<u64>,
}

impl Marker<'_> {
    /// The import address if `expr` loads this marker.
    pub fn resolve(&self, expr: &Expr) -> Option<u64> {
        let Expr::Import { addr, name } = expr else {
            return None;
        };
        let by_name = name.as_deref() == Some(self.name);
        (by_name || self.addr == Some(*addr)).then_some(*addr)
    }
}

/// A store to `offset` bytes into the scanned variable.
struct FieldStore<'a> {
    insn: &'a Insn,
    offset: u64,
    src: &'a Expr,
}

fn note(diagnostics: &mut Vec<Diagnostic>, diagnostic: Diagnostic) {
    warn!("{:#x}: {diagnostic}", diagnostic.address());
    diagnostics.push(diagnostic);
}

fn scan_stores<'a, B, F>(
    function: &'a Function,
    var: VarId,
    diagnostics: &mut Vec<Diagnostic>,
    mut visit: F,
) -> ControlFlow<B>
where
    F: FnMut(FieldStore<'a>) -> ControlFlow<B>,
{
    for insn in &function.insns {
        let Some((dest, src)) = insn.store() else {
            continue;
        };
        match dest.field_offset(var) {
            Some(offset) => visit(FieldStore { insn, offset, src })?,
            None if dest.mentions(var) => note(
                diagnostics,
                Diagnostic::UnsupportedAssignmentShape {
                    address: insn.addr,
                    dest: dest.to_string(),
                },
            ),
            None => {}
        }
    }
    ControlFlow::Continue(())
}

fn root_var(expr: &Expr) -> Option<VarId> {
    match expr {
        Expr::Var(var) => Some(*var),
        Expr::StructField { base, .. } => root_var(base),
        _ => None,
    }
}

fn var_name(function: &Function, var: VarId) -> String {
    match function.var(var) {
        Some(v) => v.name.clone(),
        None => Expr::Var(var).to_string(),
    }
}

fn require_constant(
    what: &'static str,
    address: u64,
    field: &'static str,
    src: &Expr,
) -> Result<u64> {
    if let Some(value) = src.constant() {
        return Ok(value);
    }
    let hint = match src {
        Expr::StructField { .. } if field == "flags" => CALLING_CONVENTION_HINT,
        _ => "",
    };
    error::NonConstantRequiredField {
        what,
        address,
        field,
        src: src.to_string(),
        hint,
    }
    .fail()
}

fn required<T>(
    value: Option<T>,
    what: &'static str,
    address: u64,
    field: &'static str,
) -> Result<T> {
    match value {
        Some(value) => Ok(value),
        None => error::MissingField {
            what,
            address,
            field,
        }
        .fail(),
    }
}

/// Resolves the variable a stack block is built in from the instruction
/// that stores the stack block class.
pub fn stack_candidate(function: &Function, insn: &Insn, marker: &Marker) -> Result<VarId> {
    let address = insn.addr;
    let (var, src) = match &insn.kind {
        InsnKind::VarInit { dest, src } => (*dest, src),
        InsnKind::Assign { dest, src } => match root_var(dest) {
            Some(var) => (var, src),
            None => {
                return error::UnsupportedCandidate {
                    address,
                    dest: dest.to_string(),
                }
                .fail();
            }
        },
        InsnKind::VarDeclare(_) | InsnKind::Other(_) => return error::NotAStore { address }.fail(),
    };
    match function.var(var) {
        Some(v) if v.source == VarSource::Stack => {}
        _ => {
            return error::NotStackVariable {
                address,
                var: var_name(function, var),
            }
            .fail();
        }
    }
    if marker.resolve(src).is_none() {
        return error::NotMarker {
            address,
            src: src.to_string(),
            marker: marker.name,
        }
        .fail();
    }
    Ok(var)
}

/// Recovers the header of the stack block literal built in `var`.
pub fn match_literal(
    function: &Function,
    var: VarId,
    address: u64,
    marker: &Marker,
) -> Result<Matched<BlockLiteral>> {
    const WHAT: &str = "stack block";
    let mut diagnostics = Vec::new();
    let mut isa = None;
    let mut flags = None;
    let mut reserved: Option<Option<u64>> = None;
    let mut invoke = None;
    let mut descriptor = None;

    let flow = scan_stores(function, var, &mut diagnostics, |store| {
        let result = match store.offset {
            LITERAL_ISA => {
                if let Some(addr) = marker.resolve(store.src) {
                    isa = Some(addr);
                }
                Ok(())
            }
            LITERAL_FLAGS => require_constant(WHAT, address, "flags", store.src).map(|v| {
                flags = Some(v);
            }),
            LITERAL_RESERVED => {
                reserved = Some(store.src.constant());
                Ok(())
            }
            LITERAL_INVOKE => require_constant(WHAT, address, "invoke", store.src).map(|v| {
                invoke = Some(v);
            }),
            LITERAL_DESCRIPTOR => {
                require_constant(WHAT, address, "descriptor", store.src).map(|v| {
                    descriptor = Some(v);
                })
            }
            // Captured variables need the layout and are linked later.
            _ => Ok(()),
        };
        if let Err(e) = result {
            return ControlFlow::Break(Err(e));
        }
        let complete = isa.is_some()
            && flags.is_some()
            && reserved.is_some()
            && invoke.is_some()
            && descriptor.is_some();
        if complete {
            return ControlFlow::Break(Ok(()));
        }
        ControlFlow::Continue(())
    });
    if let ControlFlow::Break(Err(e)) = flow {
        return Err(e);
    }

    let reserved = match reserved.flatten() {
        Some(reserved) => reserved,
        None => {
            note(&mut diagnostics, Diagnostic::ReservedUnresolved { address });
            0
        }
    };
    let literal = BlockLiteral::new(
        BlockKind::Stack,
        address,
        required(isa, WHAT, address, "isa")?,
        BlockFlags::from_bits_retain(required(flags, WHAT, address, "flags")? as u32),
        reserved as u32,
        required(invoke, WHAT, address, "invoke")?,
        required(descriptor, WHAT, address, "descriptor")?,
    )?;
    debug!("{literal}");
    Ok(Matched {
        value: literal,
        diagnostics,
    })
}

/// Recovers a byref cell declared as `var` at `address`.
///
/// The flags decide where the helpers and the payload live, so the stores
/// are scanned twice.
pub fn match_byref(
    function: &Function,
    var: VarId,
    address: u64,
) -> Result<Matched<ByrefVariable>> {
    const WHAT: &str = "byref";
    let mut diagnostics = Vec::new();
    let mut isa = None;
    let mut forwarding = None;
    let mut flags = None;
    let mut size = None;

    let flow = scan_stores(function, var, &mut diagnostics, |store| {
        let result = match store.offset {
            BYREF_ISA => {
                isa = store.src.constant();
                Ok(())
            }
            BYREF_FORWARDING => {
                forwarding = store.src.constant();
                Ok(())
            }
            BYREF_FLAGS => require_constant(WHAT, address, "flags", store.src).map(|v| {
                flags = Some(v);
            }),
            BYREF_SIZE => require_constant(WHAT, address, "size", store.src).map(|v| {
                size = Some(v);
            }),
            _ => Ok(()),
        };
        match result {
            Err(e) => ControlFlow::Break(Err(e)),
            Ok(()) if flags.is_some() && size.is_some() => ControlFlow::Break(Ok(())),
            Ok(()) => ControlFlow::Continue(()),
        }
    });
    if let ControlFlow::Break(Err(e)) = flow {
        return Err(e);
    }
    let flags = ByrefFlags::from(required(flags, WHAT, address, "flags")? as u32);
    let size = required(size, WHAT, address, "size")? as u32;
    ByrefPayload::from_flags(address, flags, 0)?;

    let extended = flags.layout_kind() == ByrefLayout::EXTENDED;
    let payload_offset = ByrefVariable::payload_offset(flags);
    let mut keep = None;
    let mut destroy = None;
    let mut layout = None;
    if flags.has_copy_dispose() || extended {
        // The first pass already reported unsupported destinations.
        let mut repeated = Vec::new();
        let flow = scan_stores(function, var, &mut repeated, |store| {
            match store.offset {
                BYREF_KEEP if flags.has_copy_dispose() => keep = store.src.constant(),
                BYREF_DESTROY if flags.has_copy_dispose() => destroy = store.src.constant(),
                offset if extended && offset == payload_offset => {
                    match require_constant(WHAT, address, "layout", store.src) {
                        Ok(v) => layout = Some(v),
                        Err(e) => return ControlFlow::Break(Err(e)),
                    }
                }
                _ => {}
            }
            let helpers_done = !flags.has_copy_dispose() || (keep.is_some() && destroy.is_some());
            let layout_done = !extended || layout.is_some();
            if helpers_done && layout_done {
                return ControlFlow::Break(Ok(()));
            }
            ControlFlow::Continue(())
        });
        if let ControlFlow::Break(Err(e)) = flow {
            return Err(e);
        }
    }
    let layout = if extended {
        required(layout, WHAT, address, "layout")?
    } else {
        0
    };

    let byref = ByrefVariable {
        address,
        isa: isa.unwrap_or(0),
        forwarding: forwarding.unwrap_or(0),
        flags,
        size,
        keep,
        destroy,
        payload: ByrefPayload::from_flags(address, flags, layout)?,
    };
    debug!("{byref}");
    Ok(Matched {
        value: byref,
        diagnostics,
    })
}

/// A byref pointer member of an assembled literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByrefMember {
    pub index: usize,
    pub offset: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ByrefSource {
    /// The literal stores `&var`, declared at `decl_address`.
    Local {
        member: usize,
        var: VarId,
        decl_address: u64,
    },
    NotLocallyResolvable { member: usize, reason: String },
}

/// The declared local behind a byref pointer store, or why there is none.
fn classify_source(
    function: &Function,
    src: &Expr,
) -> std::result::Result<(VarId, u64), String> {
    match src {
        Expr::AddressOf(inner) => {
            let Expr::Var(var) = inner.as_ref() else {
                return Err(format!("address of {inner} is not a variable"));
            };
            let var = *var;
            let decl = function.insns.iter().find(|i| i.declared_var() == Some(var));
            match decl {
                Some(decl) => Ok((var, decl.addr)),
                None => Err(format!(
                    "{} is not declared or initialized in {}",
                    var_name(function, var),
                    function.name
                )),
            }
        }
        Expr::Var(var) => match function.var(*var) {
            Some(v) if v.source == VarSource::Parameter => {
                Err(format!("passed in as parameter {}", v.name))
            }
            _ => Err(format!("holds {}, computed elsewhere", var_name(function, *var))),
        },
        Expr::StructField { .. } => Err(format!(
            "holds field read {src}, likely callee-saved vector registers treated as caller-saved"
        )),
        Expr::Unsupported(text) => Err(format!("unsupported expression {text}")),
        Expr::Const(_)
        | Expr::ConstPtr(_)
        | Expr::Import { .. }
        | Expr::Deref(_)
        | Expr::DerefField { .. }
        | Expr::Call { .. } => Err(format!("holds {src}, computed elsewhere")),
    }
}

/// Joins the byref pointer members of the literal in `var` with the local
/// variables whose addresses are stored into them.
pub fn byref_sources(
    function: &Function,
    var: VarId,
    members: &[ByrefMember],
) -> Matched<Vec<ByrefSource>> {
    let mut diagnostics = Vec::new();
    let wanted = members
        .iter()
        .map(|m| (m.offset, m))
        .collect::<HashMap<_, _>>();
    let mut stores = HashMap::new();
    let _ = scan_stores(function, var, &mut diagnostics, |store| {
        if let Some(member) = wanted.get(&store.offset) {
            stores.entry(member.index).or_insert(store);
        }
        ControlFlow::<()>::Continue(())
    });

    let mut sources = Vec::new();
    for member in members {
        let resolved = match stores.get(&member.index) {
            Some(store) => {
                classify_source(function, store.src).map_err(|reason| (store.insn.addr, reason))
            }
            None => Err((function.start, "no assignment found".to_owned())),
        };
        let source = match resolved {
            Ok((var, decl_address)) => ByrefSource::Local {
                member: member.index,
                var,
                decl_address,
            },
            Err((address, reason)) => {
                note(
                    &mut diagnostics,
                    Diagnostic::NotLocallyResolvable {
                        address,
                        member: member.name.clone(),
                        reason: reason.clone(),
                    },
                );
                ByrefSource::NotLocallyResolvable {
                    member: member.index,
                    reason,
                }
            }
        };
        sources.push(source);
    }
    Matched {
        value: sources,
        diagnostics,
    }
}

#[cfg(test)]
#[path = "matcher_test.rs"]
mod tests;
