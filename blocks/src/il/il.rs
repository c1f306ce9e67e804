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

//! Decompiled IR as supplied by the host.
//!
//! Only the expression shapes that appear in block and byref construction
//! are modeled; everything else is carried as [`Expr::Unsupported`].

use std::fmt::{self, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarSource {
    Stack,
    Register,
    Parameter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub id: VarId,
    pub name: String,
    pub source: VarSource,
    /// Type name as the host currently shows it.
    pub declared_type: Option<String>,
}

impl Variable {
    pub fn new(id: u32, name: impl Into<String>, source: VarSource) -> Self {
        Variable {
            id: VarId(id),
            name: name.into(),
            source,
            declared_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Const(u64),
    ConstPtr(u64),
    /// A load through an import slot, e.g. `__NSConcreteStackBlock`.
    Import {
        addr: u64,
        name: Option<String>,
    },
    Var(VarId),
    /// Field of an aggregate, `offset` bytes from the aggregate start.
    StructField {
        base: Box<Expr>,
        offset: u64,
    },
    AddressOf(Box<Expr>),
    Deref(Box<Expr>),
    DerefField {
        base: Box<Expr>,
        offset: u64,
    },
    Call {
        target: Box<Expr>,
        args: Vec<Expr>,
    },
    Unsupported(String),
}

impl Expr {
    pub fn field(base: Expr, offset: u64) -> Expr {
        Expr::StructField {
            base: Box::new(base),
            offset,
        }
    }

    pub fn address_of(expr: Expr) -> Expr {
        Expr::AddressOf(Box::new(expr))
    }

    pub fn import(addr: u64, name: &str) -> Expr {
        Expr::Import {
            addr,
            name: Some(name.to_owned()),
        }
    }

    /// The value of a compile-time constant.
    pub fn constant(&self) -> Option<u64> {
        match self {
            Expr::Const(v) | Expr::ConstPtr(v) => Some(*v),
            _ => None,
        }
    }

    pub fn mentions(&self, var: VarId) -> bool {
        match self {
            Expr::Var(v) => *v == var,
            Expr::StructField { base, .. } | Expr::DerefField { base, .. } => base.mentions(var),
            Expr::AddressOf(e) | Expr::Deref(e) => e.mentions(var),
            Expr::Call { target, args } => {
                target.mentions(var) || args.iter().any(|a| a.mentions(var))
            }
            Expr::Const(_) | Expr::ConstPtr(_) | Expr::Import { .. } | Expr::Unsupported(_) => {
                false
            }
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(v) => write!(f, "{v:#x}"),
            Expr::ConstPtr(v) => write!(f, "&data_{v:x}"),
            Expr::Import { name: Some(name), .. } => f.write_str(name),
            Expr::Import { addr, name: None } => write!(f, "*import_{addr:x}"),
            Expr::Var(VarId(id)) => write!(f, "var_{id}"),
            Expr::StructField { base, offset } => write!(f, "{base}.field_{offset:x}"),
            Expr::AddressOf(e) => write!(f, "&{e}"),
            Expr::Deref(e) => write!(f, "*{e}"),
            Expr::DerefField { base, offset } => write!(f, "{base}->field_{offset:x}"),
            Expr::Call { target, args } => {
                write!(f, "{target}(")?;
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Expr::Unsupported(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsnKind {
    VarDeclare(VarId),
    VarInit { dest: VarId, src: Expr },
    Assign { dest: Expr, src: Expr },
    Other(String),
}

/// Left-hand side of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dest<'a> {
    Var(VarId),
    Expr(&'a Expr),
}

impl Dest<'_> {
    /// Byte offset of the stored field from the start of `var`, for the
    /// variable itself or a field chain rooted at it.
    pub fn field_offset(&self, var: VarId) -> Option<u64> {
        fn walk(expr: &Expr, var: VarId) -> Option<u64> {
            match expr {
                Expr::Var(v) if *v == var => Some(0),
                Expr::StructField { base, offset } => walk(base, var)?.checked_add(*offset),
                _ => None,
            }
        }
        match self {
            Dest::Var(v) => (*v == var).then_some(0),
            Dest::Expr(expr) => walk(expr, var),
        }
    }

    pub fn mentions(&self, var: VarId) -> bool {
        match self {
            Dest::Var(v) => *v == var,
            Dest::Expr(expr) => expr.mentions(var),
        }
    }
}

impl Display for Dest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dest::Var(v) => Display::fmt(&Expr::Var(*v), f),
            Dest::Expr(expr) => Display::fmt(expr, f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insn {
    pub addr: u64,
    pub kind: InsnKind,
}

impl Insn {
    pub fn declare(addr: u64, var: u32) -> Self {
        Insn {
            addr,
            kind: InsnKind::VarDeclare(VarId(var)),
        }
    }

    pub fn init(addr: u64, var: u32, src: Expr) -> Self {
        Insn {
            addr,
            kind: InsnKind::VarInit {
                dest: VarId(var),
                src,
            },
        }
    }

    pub fn assign(addr: u64, dest: Expr, src: Expr) -> Self {
        Insn {
            addr,
            kind: InsnKind::Assign { dest, src },
        }
    }

    /// Destination and source of a store, if this is one.
    pub fn store(&self) -> Option<(Dest<'_>, &Expr)> {
        match &self.kind {
            InsnKind::VarInit { dest, src } => Some((Dest::Var(*dest), src)),
            InsnKind::Assign { dest, src } => Some((Dest::Expr(dest), src)),
            InsnKind::VarDeclare(_) | InsnKind::Other(_) => None,
        }
    }

    /// The variable this instruction declares or initializes.
    pub fn declared_var(&self) -> Option<VarId> {
        match &self.kind {
            InsnKind::VarDeclare(var) | InsnKind::VarInit { dest: var, .. } => Some(*var),
            InsnKind::Assign { .. } | InsnKind::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Function {
    pub start: u64,
    pub name: String,
    pub vars: Vec<Variable>,
    pub insns: Vec<Insn>,
}

impl Function {
    pub fn var(&self, id: VarId) -> Option<&Variable> {
        self.vars.iter().find(|v| v.id == id)
    }

    pub fn insn_at(&self, addr: u64) -> Option<&Insn> {
        self.insns.iter().find(|insn| insn.addr == addr)
    }
}

#[cfg(test)]
#[path = "il_test.rs"]
mod tests;
