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

use std::fmt::{self, Display};

/// A note for the user, attached to an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A store mentions the variable through a destination the matcher
    /// does not understand.
    UnsupportedAssignmentShape { address: u64, dest: String },
    /// The reserved field was not stored as a constant and is taken as 0.
    ReservedUnresolved { address: u64 },
    /// Bytecode decoding stopped early at `at`.
    UnknownLayoutOpcode { address: u64, at: u64, byte: u8 },
    /// The layout is not an extended layout and was left undecoded.
    LegacyLayout { address: u64, layout: u64 },
    /// The literal structure is narrower or wider than its nominal size.
    SizeMismatch {
        address: u64,
        name: String,
        declared: u64,
        width: u64,
    },
    TranslationUnavailable {
        address: u64,
        signature: String,
        reason: String,
    },
    NotLocallyResolvable {
        address: u64,
        member: String,
        reason: String,
    },
    ByrefFailed {
        address: u64,
        member: String,
        reason: String,
    },
    /// The stack variable already carries another block literal type.
    VarAlreadyTyped {
        address: u64,
        var: String,
        existing: String,
        defined: String,
    },
}

impl Diagnostic {
    pub fn address(&self) -> u64 {
        match self {
            Diagnostic::UnsupportedAssignmentShape { address, .. }
            | Diagnostic::ReservedUnresolved { address }
            | Diagnostic::UnknownLayoutOpcode { address, .. }
            | Diagnostic::LegacyLayout { address, .. }
            | Diagnostic::SizeMismatch { address, .. }
            | Diagnostic::TranslationUnavailable { address, .. }
            | Diagnostic::NotLocallyResolvable { address, .. }
            | Diagnostic::ByrefFailed { address, .. }
            | Diagnostic::VarAlreadyTyped { address, .. } => *address,
        }
    }
}

// Sizes are written as ###h so hosts do not turn them into address links.
impl Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnsupportedAssignmentShape { dest, .. } => {
                write!(f, "Skipping assignment to unsupported destination {dest}")
            }
            Diagnostic::ReservedUnresolved { .. } => {
                write!(f, "Reserved field is not a constant store, assuming 0")
            }
            Diagnostic::UnknownLayoutOpcode { at, byte, .. } => {
                write!(f, "Unknown extended layout op {byte:#04x} at {at:x}, layout is incomplete")
            }
            Diagnostic::LegacyLayout { layout, .. } => {
                write!(f, "Layout {layout:x} is not an extended layout, captured variables not typed")
            }
            Diagnostic::SizeMismatch {
                name,
                declared,
                width,
                ..
            } => {
                write!(f, "Block literal nominal size {declared:x}h.\n{name} has width {width:x}h.\n")?;
                if declared >= width {
                    let missing = declared - width;
                    write!(f, "{missing:x}h bytes missing, add to struct manually.")
                } else {
                    let excess = width - declared;
                    write!(f, "{excess:x}h bytes past nominal size, captured layout exceeds it.")
                }
            }
            Diagnostic::TranslationUnavailable {
                signature, reason, ..
            } => write!(f, "Failed to translate type encoding {signature:?}: {reason}"),
            Diagnostic::NotLocallyResolvable { member, reason, .. } => {
                write!(f, "Byref {member} is not locally resolvable: {reason}, annotate manually")
            }
            Diagnostic::ByrefFailed { member, reason, .. } => {
                write!(f, "Byref {member} not annotated: {reason}")
            }
            Diagnostic::VarAlreadyTyped {
                var,
                existing,
                defined,
                ..
            } => write!(
                f,
                "Stack var {var} already annotated with type {existing}.\nDefined {defined} but did not clobber var type.\nSplitting the stack var might help here."
            ),
        }
    }
}
