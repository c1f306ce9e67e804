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

//! Builds the C structures of block literals, descriptors and byref cells.

use std::cmp::Ordering;

use crate::decode::{BlockDescriptor, ByrefPayload, ByrefVariable};
use crate::layout::{COMPACT_LIMIT, LayoutSlot};
use crate::types::{Result, StructBuilder, Type, error};

/// `void (*)(void *, ...)`
pub fn block_invoke_function() -> Type {
    let func = Type::function(Type::Void, vec![Type::void_ptr()], true);
    Type::Typedef("BlockInvokeFunction", Box::new(Type::pointer(func)))
}

/// `void (*)(void *, const void *)`
pub fn block_copy_function() -> Type {
    let params = vec![Type::void_ptr(), Type::pointer(Type::konst(Type::Void))];
    let func = Type::function(Type::Void, params, false);
    Type::Typedef("BlockCopyFunction", Box::new(Type::pointer(func)))
}

/// `void (*)(const void *)`
pub fn block_dispose_function() -> Type {
    let params = vec![Type::pointer(Type::konst(Type::Void))];
    let func = Type::function(Type::Void, params, false);
    Type::Typedef("BlockDisposeFunction", Box::new(Type::pointer(func)))
}

pub fn byref_keep_function() -> Type {
    let byref = Type::pointer(Type::Opaque("Block_byref"));
    let func = Type::function(Type::Void, vec![byref.clone(), byref], false);
    Type::Typedef("BlockByrefKeepFunction", Box::new(Type::pointer(func)))
}

pub fn byref_destroy_function() -> Type {
    let byref = Type::pointer(Type::Opaque("Block_byref"));
    let func = Type::function(Type::Void, vec![byref], false);
    Type::Typedef("BlockByrefDestroyFunction", Box::new(Type::pointer(func)))
}

/// The fixed part of every block literal. The descriptor pointer is a
/// placeholder until the descriptor structure is committed.
pub fn literal_header() -> StructBuilder {
    let mut builder = StructBuilder::packed();
    builder.append(Type::class(), "isa");
    builder.append(Type::volatile(Type::uint(4)), "flags");
    builder.append(Type::uint(4), "reserved");
    builder.append(block_invoke_function(), "invoke");
    builder.append(
        Type::pointer(Type::Opaque("Block_descriptor_1")),
        "descriptor",
    );
    builder
}

/// Appends one member per slot, named after the offset it starts at, and
/// returns the indexes of the byref pointers.
pub fn append_slots(builder: &mut StructBuilder, slots: &[LayoutSlot]) -> Vec<usize> {
    let mut byrefs = Vec::new();
    for slot in slots {
        let width = builder.width();
        match slot {
            LayoutSlot::NonObjectBytes(n) => {
                builder.append(Type::array(Type::uint(1), *n as u64), format!("non_object_{width:x}"));
            }
            LayoutSlot::NonObjectWords(n) => {
                for _ in 0..*n {
                    let width = builder.width();
                    builder.append(Type::uint(8), format!("non_object_{width:x}"));
                }
            }
            LayoutSlot::Strong => {
                builder.append(Type::id(), format!("strong_ptr_{width:x}"));
            }
            LayoutSlot::Byref => {
                let index = builder.append(Type::id(), format!("byref_ptr_{width:x}"));
                byrefs.push(index);
            }
            LayoutSlot::Weak => {
                builder.append(Type::id(), format!("weak_ptr_{width:x}"));
            }
            LayoutSlot::Unretained => {
                builder.append(Type::id(), format!("unretained_ptr_{width:x}"));
            }
        }
    }
    byrefs
}

/// Type of a `layout` member holding `value`.
pub fn layout_member(value: u64, is_extended: bool) -> Type {
    match value {
        0 => Type::void_ptr(),
        _ if !is_extended => Type::void_ptr(),
        v if v < COMPACT_LIMIT => Type::uint(8),
        _ => Type::pointer(Type::konst(Type::uint(1))),
    }
}

pub fn descriptor_struct(descriptor: &BlockDescriptor) -> StructBuilder {
    let mut builder = StructBuilder::aligned();
    builder.append(Type::uint(8), "reserved");
    builder.append(Type::uint(8), "size");
    if descriptor.has_copy_dispose() {
        builder.append(block_copy_function(), "copy");
        builder.append(block_dispose_function(), "dispose");
    }
    if descriptor.has_signature() {
        builder.append(Type::pointer(Type::konst(Type::Char)), "signature");
        let layout = descriptor.layout.unwrap_or(0);
        builder.append(
            layout_member(layout, descriptor.has_extended_layout()),
            "layout",
        );
    }
    builder
}

/// The fixed part of every byref cell. `forwarding` is relinked to the
/// committed cell structure.
pub fn byref_header() -> StructBuilder {
    let mut builder = StructBuilder::packed();
    builder.append(Type::class(), "isa");
    builder.append(Type::void_ptr(), "forwarding");
    builder.append(Type::volatile(Type::int(4)), "flags");
    builder.append(Type::uint(4), "size");
    builder
}

/// The full byref cell. `nested` holds the slots of an extended payload.
pub fn byref_struct(byref: &ByrefVariable, nested: &[LayoutSlot]) -> StructBuilder {
    let mut builder = byref_header();
    if byref.flags.has_copy_dispose() {
        builder.append(byref_keep_function(), "byref_keep");
        builder.append(byref_destroy_function(), "byref_destroy");
    }
    match byref.payload {
        ByrefPayload::Extended { layout } => {
            builder.append(layout_member(layout, true), "layout");
            // Nested captures are never followed as byrefs.
            append_slots(&mut builder, nested);
        }
        ByrefPayload::NonObject => {
            builder.append(Type::uint(8), "non_object_0");
        }
        ByrefPayload::Strong => {
            builder.append(Type::id(), "strong_ptr_0");
        }
        ByrefPayload::Weak => {
            builder.append(Type::id(), "weak_ptr_0");
        }
        ByrefPayload::Unretained => {
            builder.append(Type::id(), "unretained_ptr_0");
        }
    }
    builder
}

/// A member addressed by name or by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRef<'a> {
    Name(&'a str),
    Index(usize),
}

impl<'a> From<&'a str> for MemberRef<'a> {
    fn from(name: &'a str) -> Self {
        MemberRef::Name(name)
    }
}

impl From<usize> for MemberRef<'_> {
    fn from(index: usize) -> Self {
        MemberRef::Index(index)
    }
}

/// Points a pointer member of `builder`, the structure called `name`, at
/// `pointee`.
pub fn link_member<'a>(
    builder: &mut StructBuilder,
    name: &str,
    member: impl Into<MemberRef<'a>>,
    pointee: Type,
) -> Result<()> {
    let member = member.into();
    let index = match member {
        MemberRef::Name(member_name) => builder.index_by_name(member_name),
        MemberRef::Index(index) => (index < builder.members().len()).then_some(index),
    };
    let Some(index) = index else {
        let member = match member {
            MemberRef::Name(member_name) => member_name.to_owned(),
            MemberRef::Index(index) => format!("#{index}"),
        };
        return error::NoSuchMember { name, member }.fail();
    };
    let current = &builder.members()[index];
    if !current.ty.is_pointer() {
        return error::NotAPointer {
            name,
            member: current.name.clone(),
        }
        .fail();
    }
    builder.replace(index, Type::pointer(pointee));
    Ok(())
}

/// Difference between a structure and the size it nominally has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeGap {
    /// Bytes of the nominal size not covered by any member.
    Missing(u64),
    /// Bytes the members extend past the nominal size.
    Excess(u64),
}

/// Compares the width of `builder` with a nominal `declared` size.
pub fn size_gap(builder: &StructBuilder, declared: u64) -> Option<SizeGap> {
    let width = builder.width();
    match declared.cmp(&width) {
        Ordering::Equal => None,
        Ordering::Greater => Some(SizeGap::Missing(declared - width)),
        Ordering::Less => Some(SizeGap::Excess(width - declared)),
    }
}

#[cfg(test)]
#[path = "assemble_test.rs"]
mod tests;
