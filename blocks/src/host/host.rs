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

//! The disassembler or decompiler the analysis runs inside of.

use std::fmt::{self, Display};

use crate::il::Function;
use crate::mem::{self, Memory, MemoryImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    Aarch64,
    X86_64,
    Other,
}

impl Arch {
    pub fn is_supported(self) -> bool {
        matches!(self, Arch::Aarch64 | Arch::X86_64)
    }
}

impl Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Arch::Aarch64 => "aarch64",
            Arch::X86_64 => "x86_64",
            Arch::Other => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    /// Defined outside the binary, e.g. `__NSConcreteGlobalBlock`.
    External,
    ImportedData,
    ImportAddress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub addr: u64,
    pub kind: SymbolKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub start: u64,
    pub name: String,
    pub param_count: usize,
}

impl FunctionInfo {
    /// Whether the host still shows its auto-generated name.
    pub fn has_default_name(&self) -> bool {
        self.name == format!("sub_{:x}", self.start)
    }
}

pub trait Host: Memory {
    fn arch(&self) -> Arch;

    fn symbol(&self, name: &str, kind: SymbolKind) -> Option<Symbol>;

    /// Data addresses holding a pointer to `addr`.
    fn data_refs(&self, addr: u64) -> Vec<u64>;

    fn function_at(&self, addr: u64) -> Option<FunctionInfo>;

    fn il_functions(&self) -> &[Function];
}

/// A host backed entirely by in-process tables.
#[derive(Debug)]
pub struct StaticHost {
    arch: Arch,
    image: MemoryImage,
    symbols: Vec<Symbol>,
    functions: Vec<FunctionInfo>,
    il: Vec<Function>,
}

impl StaticHost {
    pub fn new(arch: Arch, image: MemoryImage) -> Self {
        StaticHost {
            arch,
            image,
            symbols: Vec::new(),
            functions: Vec::new(),
            il: Vec::new(),
        }
    }

    pub fn add_symbol(&mut self, name: impl Into<String>, addr: u64, kind: SymbolKind) {
        self.symbols.push(Symbol {
            name: name.into(),
            addr,
            kind,
        });
    }

    pub fn add_function(&mut self, info: FunctionInfo) {
        self.functions.push(info);
    }

    pub fn add_il_function(&mut self, function: Function) {
        self.il.push(function);
    }
}

impl Memory for StaticHost {
    fn read(&self, addr: u64, buf: &mut [u8]) -> mem::Result<()> {
        self.image.read(addr, buf)
    }
}

impl Host for StaticHost {
    fn arch(&self) -> Arch {
        self.arch
    }

    fn symbol(&self, name: &str, kind: SymbolKind) -> Option<Symbol> {
        self.symbols
            .iter()
            .find(|s| s.kind == kind && s.name == name)
            .cloned()
    }

    fn data_refs(&self, addr: u64) -> Vec<u64> {
        self.image.scan_pointers(addr)
    }

    fn function_at(&self, addr: u64) -> Option<FunctionInfo> {
        self.functions.iter().find(|f| f.start == addr).cloned()
    }

    fn il_functions(&self) -> &[Function] {
        &self.il
    }
}

#[cfg(test)]
#[path = "host_test.rs"]
mod tests;
