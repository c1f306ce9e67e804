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

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;

use log::trace;
use parking_lot::RwLock;

use crate::types::{Member, StructBuilder, Type, TypeId};

/// A committed structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDef {
    pub id: TypeId,
    pub name: Arc<str>,
    pub packed: bool,
    pub width: u64,
    pub members: Vec<Member>,
}

impl StructDef {
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }

    /// The C definition of the structure.
    pub fn declaration(&self) -> String {
        let attr = if self.packed {
            " __attribute__((packed))"
        } else {
            ""
        };
        let mut text = format!("struct{attr} {}\n{{\n", self.name);
        for member in &self.members {
            let _ = writeln!(text, "    {};", member.ty.declare(&member.name));
        }
        text.push_str("};\n");
        text
    }
}

#[derive(Debug, Default)]
struct Table {
    defs: Vec<Arc<StructDef>>,
    by_name: HashMap<Arc<str>, TypeId>,
}

/// Structures recovered during one analysis session.
///
/// Writers serialize on the lock. Defining a name again replaces the
/// previous definition but keeps its id, so references taken before a
/// relink stay valid.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    table: RwLock<Table>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&self, name: &str, builder: &StructBuilder) -> Type {
        let mut table = self.table.write();
        let existing = table
            .by_name
            .get_key_value(name)
            .map(|(name, id)| (*id, name.clone()));
        let (id, name) = match existing {
            Some(existing) => existing,
            None => {
                let id = TypeId(table.defs.len() as u32);
                let name: Arc<str> = Arc::from(name);
                table.by_name.insert(name.clone(), id);
                (id, name)
            }
        };
        let def = Arc::new(StructDef {
            id,
            name: name.clone(),
            packed: builder.is_packed(),
            width: builder.width(),
            members: builder.members().to_vec(),
        });
        match table.defs.get_mut(id.0 as usize) {
            Some(slot) => *slot = def,
            None => table.defs.push(def),
        }
        trace!("defined struct {name} as {id:?}");
        Type::Named { id, name }
    }

    pub fn lookup(&self, name: &str) -> Option<Type> {
        let table = self.table.read();
        let (name, id) = table.by_name.get_key_value(name)?;
        Some(Type::Named {
            id: *id,
            name: name.clone(),
        })
    }

    pub fn get(&self, id: TypeId) -> Option<Arc<StructDef>> {
        self.table.read().defs.get(id.0 as usize).cloned()
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<StructDef>> {
        let table = self.table.read();
        let id = table.by_name.get(name)?;
        table.defs.get(id.0 as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.table.read().defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// C definitions of every committed structure in definition order.
    pub fn render(&self) -> String {
        let table = self.table.read();
        let decls = table.defs.iter().map(|def| def.declaration());
        decls.collect::<Vec<_>>().join("\n")
    }
}
