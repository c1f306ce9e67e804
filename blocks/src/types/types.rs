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

//! C type descriptions and the shared registry of recovered structures.

mod registry;

use std::fmt::{self, Display, Write};
use std::sync::Arc;

use snafu::Snafu;

use crate::abi::POINTER_SIZE;
use crate::errors::{DebugTrace, trace_error};

pub use self::registry::{StructDef, TypeRegistry};

#[trace_error]
#[derive(Snafu, DebugTrace)]
#[snafu(module, visibility(pub), context(suffix(false)))]
pub enum Error {
    #[snafu(display("{name} has no member {member}"))]
    NoSuchMember { name: String, member: String },
    #[snafu(display("Member {member} of {name} is not a pointer"))]
    NotAPointer { name: String, member: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Void,
    Bool,
    Char,
    Int { bytes: u8, signed: bool },
    Float,
    Double,
    Pointer(Box<Type>),
    Array(Box<Type>, u64),
    Function(Box<FunctionType>),
    Const(Box<Type>),
    Volatile(Box<Type>),
    /// A well-known typedef such as `Class` or `BlockInvokeFunction`.
    Typedef(&'static str, Box<Type>),
    /// A structure committed to a [`TypeRegistry`].
    Named { id: TypeId, name: Arc<str> },
    /// A structure known only by name, e.g. `objc_class`.
    Opaque(&'static str),
}

impl Type {
    pub fn uint(bytes: u8) -> Self {
        Type::Int {
            bytes,
            signed: false,
        }
    }

    pub fn int(bytes: u8) -> Self {
        Type::Int {
            bytes,
            signed: true,
        }
    }

    pub fn pointer(pointee: Type) -> Self {
        Type::Pointer(Box::new(pointee))
    }

    pub fn array(element: Type, count: u64) -> Self {
        Type::Array(Box::new(element), count)
    }

    pub fn function(ret: Type, params: Vec<Type>, variadic: bool) -> Self {
        Type::Function(Box::new(FunctionType {
            ret,
            params,
            variadic,
        }))
    }

    pub fn konst(ty: Type) -> Self {
        Type::Const(Box::new(ty))
    }

    pub fn volatile(ty: Type) -> Self {
        Type::Volatile(Box::new(ty))
    }

    pub fn void_ptr() -> Self {
        Type::pointer(Type::Void)
    }

    /// `Class`, a pointer to the Objective-C class structure.
    pub fn class() -> Self {
        Type::Typedef("Class", Box::new(Type::pointer(Type::Opaque("objc_class"))))
    }

    /// `id`, a pointer to any Objective-C object.
    pub fn id() -> Self {
        Type::Typedef("id", Box::new(Type::pointer(Type::Opaque("objc_object"))))
    }

    pub fn sel() -> Self {
        Type::Typedef("SEL", Box::new(Type::pointer(Type::Opaque("objc_selector"))))
    }

    /// Storage size in bytes. Named and opaque structures only appear
    /// behind pointers and have no size here.
    pub fn size(&self) -> u64 {
        match self {
            Type::Void | Type::Function(_) | Type::Named { .. } | Type::Opaque(_) => 0,
            Type::Bool | Type::Char => 1,
            Type::Int { bytes, .. } => *bytes as u64,
            Type::Float => 4,
            Type::Double => 8,
            Type::Pointer(_) => POINTER_SIZE,
            Type::Array(element, count) => element.size() * count,
            Type::Const(ty) | Type::Volatile(ty) | Type::Typedef(_, ty) => ty.size(),
        }
    }

    pub fn align(&self) -> u64 {
        match self {
            Type::Array(element, _) => element.align(),
            Type::Const(ty) | Type::Volatile(ty) | Type::Typedef(_, ty) => ty.align(),
            ty => ty.size().max(1),
        }
    }

    pub fn is_pointer(&self) -> bool {
        match self {
            Type::Pointer(_) => true,
            Type::Const(ty) | Type::Volatile(ty) | Type::Typedef(_, ty) => ty.is_pointer(),
            _ => false,
        }
    }

    fn base_name(&self) -> Option<String> {
        let name = match self {
            Type::Void => "void".to_owned(),
            Type::Bool => "bool".to_owned(),
            Type::Char => "char".to_owned(),
            Type::Int { bytes, signed } => {
                let prefix = if *signed { "" } else { "u" };
                format!("{prefix}int{}_t", *bytes as u32 * 8)
            }
            Type::Float => "float".to_owned(),
            Type::Double => "double".to_owned(),
            Type::Typedef(name, _) => (*name).to_owned(),
            Type::Named { name, .. } => format!("struct {name}"),
            Type::Opaque(name) => format!("struct {name}"),
            Type::Const(ty) => format!("{} const", ty.base_name()?),
            Type::Volatile(ty) => format!("volatile {}", ty.base_name()?),
            Type::Pointer(_) | Type::Array(..) | Type::Function(_) => return None,
        };
        Some(name)
    }

    /// Renders a C declaration of `name` with this type. An empty name
    /// renders an abstract declarator.
    pub fn declare(&self, name: &str) -> String {
        if let Some(base) = self.base_name() {
            return if name.is_empty() {
                base
            } else {
                format!("{base} {name}")
            };
        }
        match self {
            Type::Pointer(pointee) => match **pointee {
                Type::Array(..) | Type::Function(_) => pointee.declare(&format!("(*{name})")),
                _ => pointee.declare(&format!("*{name}")),
            },
            Type::Array(element, count) => element.declare(&format!("{name}[{count}]")),
            Type::Function(func) => func.ret.declare(&format!("{name}({})", func.params_list())),
            Type::Const(ty) => ty.declare(&format!("const {name}")),
            Type::Volatile(ty) => ty.declare(&format!("volatile {name}")),
            _ => name.to_owned(),
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.declare(""))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionType {
    pub ret: Type,
    pub params: Vec<Type>,
    pub variadic: bool,
}

impl FunctionType {
    fn params_list(&self) -> String {
        let mut list = String::new();
        for (index, param) in self.params.iter().enumerate() {
            if index > 0 {
                list.push_str(", ");
            }
            let _ = write!(list, "{param}");
        }
        match (self.params.is_empty(), self.variadic) {
            (true, false) => list.push_str("void"),
            (true, true) => list.push_str("..."),
            (false, true) => list.push_str(", ..."),
            (false, false) => {}
        }
        list
    }
}

impl Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.ret, self.params_list())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub ty: Type,
    pub offset: u64,
}

/// A structure under construction, owned by one pipeline at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructBuilder {
    packed: bool,
    members: Vec<Member>,
    width: u64,
}

impl StructBuilder {
    /// A structure with no padding between members.
    pub fn packed() -> Self {
        StructBuilder {
            packed: true,
            members: Vec::new(),
            width: 0,
        }
    }

    /// A naturally aligned structure.
    pub fn aligned() -> Self {
        StructBuilder {
            packed: false,
            ..Self::packed()
        }
    }

    pub fn is_packed(&self) -> bool {
        self.packed
    }

    pub fn width(&self) -> u64 {
        self.width
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    fn place(&self, offset: u64, ty: &Type) -> u64 {
        if self.packed {
            offset
        } else {
            offset.next_multiple_of(ty.align())
        }
    }

    /// Appends a member and returns its index.
    pub fn append(&mut self, ty: Type, name: impl Into<String>) -> usize {
        let offset = self.place(self.width, &ty);
        self.width = offset + ty.size();
        self.members.push(Member {
            name: name.into(),
            ty,
            offset,
        });
        self.members.len() - 1
    }

    pub fn index_by_name(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }

    /// Index of the member starting at `offset`.
    pub fn index_at_offset(&self, offset: u64) -> Option<usize> {
        self.members.iter().position(|m| m.offset == offset)
    }

    pub fn member_offset(&self, index: usize) -> Option<u64> {
        self.members.get(index).map(|m| m.offset)
    }

    /// Retypes a member, keeping its name, and lays out the rest again.
    pub fn replace(&mut self, index: usize, ty: Type) -> Option<Type> {
        let member = self.members.get_mut(index)?;
        let old = std::mem::replace(&mut member.ty, ty);
        let mut width = 0;
        for index in 0..self.members.len() {
            let offset = self.place(width, &self.members[index].ty);
            let member = &mut self.members[index];
            member.offset = offset;
            width = offset + member.ty.size();
        }
        self.width = width;
        Some(old)
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
