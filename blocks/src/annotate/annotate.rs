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

//! Runs the recovery pipeline for one block instance.

mod diag;

use std::sync::Arc;

use log::{info, warn};
use snafu::Snafu;

use crate::assemble::{
    append_slots, byref_struct, descriptor_struct, link_member, literal_header, size_gap,
};
use crate::config::AnalysisConfig;
use crate::decode::{
    self, BlockDescriptor, BlockKind, BlockLiteral, ByrefPayload, ByrefVariable,
};
use crate::errors::{BoxTrace, DebugTrace, trace_error, trace_string};
use crate::host::{Arch, FunctionInfo, Host, SymbolKind};
use crate::il::{Function, Insn, VarId};
use crate::layout::{self, LayoutDecode, LayoutForm, LayoutSlot};
use crate::matcher::{self, ByrefMember, ByrefSource, Marker};
use crate::signature::encoding::{ObjcTypeEncoding, TypeEncoding};
use crate::signature::{
    COPY_SUFFIX, DISPOSE_SUFFIX, INVOKE_SUFFIX, SignatureChange, helper_name, project_copy,
    project_dispose, project_invoke,
};
use crate::types::{FunctionType, StructBuilder, Type, TypeRegistry};

pub use self::diag::Diagnostic;

type BoxedTrace = Box<dyn DebugTrace + Send + Sync + 'static>;

#[trace_error]
#[derive(Snafu, DebugTrace)]
#[snafu(module, visibility(pub), context(suffix(false)))]
pub enum Error {
    #[snafu(display("Architecture {arch} is not supported"))]
    UnsupportedArch { arch: Arch },
    #[snafu(display("{name} not found, target does not appear to contain {kind} blocks"))]
    MissingClass { name: String, kind: BlockKind },
    #[snafu(display("Data at {address:#x} holds {value:#x} instead of {class:#x} {name}"))]
    NotBlockClass {
        address: u64,
        value: u64,
        class: u64,
        name: String,
    },
    #[snafu(display("No function has an instruction at {address:#x}"))]
    NoInstruction { address: u64 },
    #[snafu(display("{kind} block {address:x}: cannot {what}"))]
    Instance {
        kind: BlockKind,
        address: u64,
        what: &'static str,
        source: BoxedTrace,
    },
    #[snafu(display("Byref {address:x}: cannot {what}"))]
    Byref {
        address: u64,
        what: &'static str,
        source: BoxedTrace,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A data variable to define in the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataVar {
    pub address: u64,
    pub name: String,
    pub ty: Type,
}

/// A new name and type for a local variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarUpdate {
    /// Start of the function owning the variable.
    pub function: u64,
    pub var: VarId,
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionUpdate {
    pub address: u64,
    /// Set when the function still has its default name.
    pub rename: Option<String>,
    pub change: SignatureChange,
    pub param_names: Vec<&'static str>,
}

/// Updates the host applies together before analyzing again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionBatch {
    pub updates: Vec<FunctionUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByrefAnnotation {
    pub byref: ByrefVariable,
    /// Captures of an extended payload.
    pub nested: Vec<LayoutSlot>,
    /// The committed `Block_byref_<addr>` structure.
    pub ty: Type,
    /// Index of the literal member pointing at this cell.
    pub member: Option<usize>,
    pub var: Option<VarId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockAnnotation {
    pub literal: BlockLiteral,
    pub descriptor: BlockDescriptor,
    pub layout: LayoutDecode,
    pub literal_type: Type,
    pub descriptor_type: Type,
    pub byrefs: Vec<ByrefAnnotation>,
    pub data_vars: Vec<DataVar>,
    pub var_updates: Vec<VarUpdate>,
    pub function_batches: Vec<FunctionBatch>,
    pub diagnostics: Vec<Diagnostic>,
}

/// A byref cell decoded from a data section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataByref {
    pub annotation: ByrefAnnotation,
    pub data_var: DataVar,
    pub diagnostics: Vec<Diagnostic>,
}

/// The variable a stack block is built in.
#[derive(Clone, Copy)]
struct StackSite<'f> {
    function: &'f Function,
    var: VarId,
}

/// The literal structure while it is still being linked.
struct LiteralStruct {
    name: String,
    builder: StructBuilder,
    ty: Type,
}

impl LiteralStruct {
    fn commit(&mut self, registry: &TypeRegistry) {
        self.ty = registry.define(&self.name, &self.builder);
    }
}

fn helper_update(
    callee: &FunctionInfo,
    suffix: &str,
    func: FunctionType,
    param_names: &[&'static str],
) -> FunctionUpdate {
    FunctionUpdate {
        address: callee.start,
        rename: helper_name(callee, suffix),
        change: SignatureChange::Replace(func),
        param_names: param_names.to_vec(),
    }
}

fn note(diagnostics: &mut Vec<Diagnostic>, diagnostic: Diagnostic) {
    warn!("{:#x}: {diagnostic}", diagnostic.address());
    diagnostics.push(diagnostic);
}

pub struct Annotator<'h, H> {
    host: &'h H,
    registry: &'h TypeRegistry,
    config: &'h AnalysisConfig,
    translator: Arc<dyn TypeEncoding + Send + Sync>,
}

impl<'h, H> Annotator<'h, H>
where
    H: Host,
{
    pub fn new(host: &'h H, registry: &'h TypeRegistry, config: &'h AnalysisConfig) -> Self {
        Annotator {
            host,
            registry,
            config,
            translator: Arc::new(ObjcTypeEncoding),
        }
    }

    /// Replaces the built-in type-encoding translator.
    pub fn with_translator(mut self, translator: Arc<dyn TypeEncoding + Send + Sync>) -> Self {
        self.translator = translator;
        self
    }

    pub fn host(&self) -> &'h H {
        self.host
    }

    pub fn config(&self) -> &'h AnalysisConfig {
        self.config
    }

    fn check_arch(&self) -> Result<()> {
        let arch = self.host.arch();
        if arch.is_supported() {
            Ok(())
        } else {
            error::UnsupportedArch { arch }.fail()
        }
    }

    /// The marker of stack literals, resolved through the imports.
    pub fn stack_marker(&self) -> Marker<'h> {
        let name = self.config.stack_class.as_str();
        let symbol = self
            .host
            .symbol(name, SymbolKind::ImportedData)
            .or_else(|| self.host.symbol(name, SymbolKind::ImportAddress));
        Marker {
            name,
            addr: symbol.map(|s| s.addr),
        }
    }

    /// `Class` data variables for the block classes defined as external
    /// symbols, which hosts do not always type on their own.
    pub fn class_imports(&self) -> Vec<DataVar> {
        let names = [&self.config.global_class, &self.config.stack_class];
        names
            .into_iter()
            .filter_map(|name| self.host.symbol(name, SymbolKind::External))
            .map(|symbol| DataVar {
                address: symbol.addr,
                name: symbol.name,
                ty: Type::class(),
            })
            .collect()
    }

    /// Annotates the global block whose literal is at `address`.
    pub fn annotate_global(&self, address: u64) -> Result<BlockAnnotation> {
        self.check_arch()?;
        info!("Annotating global block {address:x}");
        let name = &self.config.global_class;
        let Some(class) = self.host.symbol(name, SymbolKind::External) else {
            return error::MissingClass {
                name,
                kind: BlockKind::Global,
            }
            .fail();
        };
        let ctx = |what| error::Instance {
            kind: BlockKind::Global,
            address,
            what,
        };
        let value = self.host.read_u64(address).box_trace(ctx("read the class pointer"))?;
        if value != class.addr {
            return error::NotBlockClass {
                address,
                value,
                class: class.addr,
                name,
            }
            .fail();
        }
        let literal = decode::decode_literal(self.host, address, BlockKind::Global)
            .box_trace(ctx("decode the literal"))?;
        self.annotate_literal(literal, None, Vec::new())
    }

    /// Annotates the stack block whose class is stored by `insn`.
    pub fn annotate_stack(&self, function: &Function, insn: &Insn) -> Result<BlockAnnotation> {
        self.check_arch()?;
        let address = insn.addr;
        info!("Annotating stack block {address:x}");
        let ctx = |what| error::Instance {
            kind: BlockKind::Stack,
            address,
            what,
        };
        let marker = self.stack_marker();
        let var = matcher::stack_candidate(function, insn, &marker)
            .box_trace(ctx("find the literal variable"))?;
        let matched = matcher::match_literal(function, var, address, &marker)
            .box_trace(ctx("match the literal stores"))?;
        let site = StackSite { function, var };
        self.annotate_literal(matched.value, Some(site), matched.diagnostics)
    }

    /// Annotates the stack block identified by the instruction at `address`.
    pub fn annotate_stack_at(&self, address: u64) -> Result<BlockAnnotation> {
        let functions = self.host.il_functions();
        let found = functions
            .iter()
            .find_map(|f| f.insn_at(address).map(|insn| (f, insn)));
        let Some((function, insn)) = found else {
            return error::NoInstruction { address }.fail();
        };
        self.annotate_stack(function, insn)
    }

    /// Annotates a byref cell living in a data section.
    pub fn annotate_byref(&self, address: u64) -> Result<DataByref> {
        self.check_arch()?;
        info!("Annotating byref {address:x}");
        let ctx = |what| error::Byref { address, what };
        let byref = decode::decode_byref(self.host, address).box_trace(ctx("decode the cell"))?;
        let mut diagnostics = Vec::new();
        let (ty, nested) = self.commit_byref(&byref, &mut diagnostics)?;
        let data_var = DataVar {
            address,
            name: format!("block_byref_{address:x}"),
            ty: ty.clone(),
        };
        let annotation = ByrefAnnotation {
            byref,
            nested,
            ty,
            member: None,
            var: None,
        };
        Ok(DataByref {
            annotation,
            data_var,
            diagnostics,
        })
    }

    fn annotate_literal(
        &self,
        literal: BlockLiteral,
        stack: Option<StackSite>,
        mut diagnostics: Vec<Diagnostic>,
    ) -> Result<BlockAnnotation> {
        let address = literal.address;
        let ctx = |what| error::Instance {
            kind: literal.kind,
            address,
            what,
        };
        info!("{literal}");
        let mut descriptor =
            decode::decode_descriptor(self.host, literal.descriptor, literal.flags)
                .box_trace(ctx("decode the descriptor"))?;
        info!("{descriptor}");

        let layout_value = descriptor.layout.unwrap_or(0);
        let layout = layout::decode(self.host, layout_value, descriptor.has_extended_layout())
            .box_trace(ctx("decode the layout"))?;
        descriptor.layout_end = layout.end;
        if let Some(anomaly) = layout.anomaly {
            let diagnostic = Diagnostic::UnknownLayoutOpcode {
                address: layout_value,
                at: anomaly.address,
                byte: anomaly.byte,
            };
            note(&mut diagnostics, diagnostic);
        }
        if layout.form == LayoutForm::Legacy {
            let diagnostic = Diagnostic::LegacyLayout {
                address,
                layout: layout_value,
            };
            note(&mut diagnostics, diagnostic);
        }

        let mut builder = literal_header();
        let byref_indexes = if descriptor.imported_variables_size() > 0 {
            append_slots(&mut builder, &layout.slots)
        } else {
            Vec::new()
        };
        let name = format!("Block_literal_{address:x}");
        let ty = self.registry.define(&name, &builder);
        let mut lit = LiteralStruct { name, builder, ty };

        if size_gap(&lit.builder, descriptor.size).is_some() {
            let diagnostic = Diagnostic::SizeMismatch {
                address,
                name: format!("struct {}", lit.name),
                declared: descriptor.size,
                width: lit.builder.width(),
            };
            note(&mut diagnostics, diagnostic);
        }

        let descriptor_name = format!("Block_descriptor_{:x}", descriptor.address);
        let descriptor_type = self
            .registry
            .define(&descriptor_name, &descriptor_struct(&descriptor));
        link_member(&mut lit.builder, &lit.name, "descriptor", descriptor_type.clone())
            .box_trace(ctx("link the descriptor"))?;
        lit.commit(self.registry);

        let mut data_vars = Vec::new();
        if literal.kind == BlockKind::Global {
            data_vars.push(DataVar {
                address,
                name: format!("global_block_{address:x}"),
                ty: lit.ty.clone(),
            });
        }
        data_vars.push(DataVar {
            address: descriptor.address,
            name: format!("block_descriptor_{:x}", descriptor.address),
            ty: descriptor_type.clone(),
        });
        if let (LayoutForm::Bytecode, Some(end)) = (layout.form, layout.end) {
            data_vars.push(DataVar {
                address: layout_value,
                name: format!("block_layout_{layout_value:x}"),
                ty: Type::array(Type::uint(1), end - layout_value),
            });
        }

        let mut var_updates = Vec::new();
        if let Some(site) = stack {
            self.update_stack_var(site, &lit, address, &mut var_updates, &mut diagnostics);
        }

        let mut function_batches = Vec::new();
        if self.config.functions {
            self.project_functions(
                &literal,
                &descriptor,
                &mut lit,
                &mut function_batches,
                &mut diagnostics,
            )
            .box_trace(ctx("link the invoke function"))?;
        }

        let byrefs = match stack {
            Some(site) if self.config.byrefs && !byref_indexes.is_empty() => self.resolve_byrefs(
                site,
                &byref_indexes,
                &mut lit,
                &mut var_updates,
                &mut diagnostics,
            ),
            _ => Vec::new(),
        };

        Ok(BlockAnnotation {
            literal,
            descriptor,
            layout,
            literal_type: lit.ty,
            descriptor_type,
            byrefs,
            data_vars,
            var_updates,
            function_batches,
            diagnostics,
        })
    }

    fn update_stack_var(
        &self,
        site: StackSite,
        lit: &LiteralStruct,
        address: u64,
        var_updates: &mut Vec<VarUpdate>,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        let Some(var) = site.function.var(site.var) else {
            return;
        };
        let defined = format!("struct {}", lit.name);
        let conflicting = var
            .declared_type
            .as_ref()
            .filter(|ty| ty.starts_with("struct Block_literal_") && **ty != defined);
        if let Some(existing) = conflicting {
            let diagnostic = Diagnostic::VarAlreadyTyped {
                address,
                var: var.name.clone(),
                existing: existing.clone(),
                defined,
            };
            note(diagnostics, diagnostic);
            return;
        }
        let name = if var.name.starts_with("stack_block_") {
            var.name.clone()
        } else {
            format!("stack_block_{}", var.name)
        };
        var_updates.push(VarUpdate {
            function: site.function.start,
            var: site.var,
            name,
            ty: lit.ty.clone(),
        });
    }

    fn project_functions(
        &self,
        literal: &BlockLiteral,
        descriptor: &BlockDescriptor,
        lit: &mut LiteralStruct,
        batches: &mut Vec<FunctionBatch>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> crate::types::Result<()> {
        if let Some(invoke) = self.host.function_at(literal.invoke) {
            let signature = descriptor.signature_raw.as_deref();
            let projection =
                project_invoke(signature, self.translator.as_ref(), &invoke, &lit.ty);
            if let Some(failure) = projection.failure {
                let diagnostic = Diagnostic::TranslationUnavailable {
                    address: literal.address,
                    signature: signature.unwrap_or_default().to_owned(),
                    reason: failure.to_string(),
                };
                note(diagnostics, diagnostic);
            }
            if let SignatureChange::Replace(func) = &projection.change {
                let pointee = Type::Function(Box::new(func.clone()));
                link_member(&mut lit.builder, &lit.name, "invoke", pointee)?;
                lit.commit(self.registry);
            }
            let update = FunctionUpdate {
                address: invoke.start,
                rename: helper_name(&invoke, INVOKE_SUFFIX),
                change: projection.change,
                param_names: vec!["block"],
            };
            batches.push(FunctionBatch {
                updates: vec![update],
            });
        }

        if !descriptor.has_copy_dispose() {
            return Ok(());
        }
        let helper = |addr: Option<u64>| addr.and_then(|a| self.host.function_at(a));
        let mut updates = Vec::new();
        if let Some(copy) = helper(descriptor.copy) {
            let func = project_copy(&lit.ty);
            updates.push(helper_update(&copy, COPY_SUFFIX, func, &["dst", "src"]));
        }
        if let Some(dispose) = helper(descriptor.dispose) {
            let func = project_dispose(&lit.ty);
            updates.push(helper_update(&dispose, DISPOSE_SUFFIX, func, &["dst"]));
        }
        if !updates.is_empty() {
            batches.push(FunctionBatch { updates });
        }
        Ok(())
    }

    fn resolve_byrefs(
        &self,
        site: StackSite,
        byref_indexes: &[usize],
        lit: &mut LiteralStruct,
        var_updates: &mut Vec<VarUpdate>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<ByrefAnnotation> {
        let members = byref_indexes
            .iter()
            .filter_map(|index| {
                let member = lit.builder.members().get(*index)?;
                Some(ByrefMember {
                    index: *index,
                    offset: member.offset,
                    name: member.name.clone(),
                })
            })
            .collect::<Vec<_>>();
        let sources = matcher::byref_sources(site.function, site.var, &members);
        diagnostics.extend(sources.diagnostics);

        let mut byrefs = Vec::new();
        for source in sources.value {
            let ByrefSource::Local {
                member,
                var,
                decl_address,
            } = source
            else {
                continue;
            };
            let member_name = lit.builder.members()[member].name.clone();
            let resolved =
                self.resolve_byref(site.function, var, decl_address, member, lit, diagnostics);
            match resolved {
                Ok(annotation) => {
                    if let Some(v) = site.function.var(var) {
                        let name = if v.name.starts_with("block_byref_") {
                            v.name.clone()
                        } else {
                            format!("block_byref_{}", v.name)
                        };
                        var_updates.push(VarUpdate {
                            function: site.function.start,
                            var,
                            name,
                            ty: annotation.ty.clone(),
                        });
                    }
                    byrefs.push(annotation);
                }
                Err(e) => {
                    let diagnostic = Diagnostic::ByrefFailed {
                        address: decl_address,
                        member: member_name,
                        reason: trace_string(&e).trim_end().to_owned(),
                    };
                    note(diagnostics, diagnostic);
                }
            }
        }
        byrefs
    }

    fn resolve_byref(
        &self,
        function: &Function,
        var: VarId,
        address: u64,
        member: usize,
        lit: &mut LiteralStruct,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<ByrefAnnotation> {
        let ctx = |what| error::Byref { address, what };
        let matched =
            matcher::match_byref(function, var, address).box_trace(ctx("match the cell stores"))?;
        diagnostics.extend(matched.diagnostics);
        let byref = matched.value;
        let (ty, nested) = self.commit_byref(&byref, diagnostics)?;
        link_member(&mut lit.builder, &lit.name, member, ty.clone())
            .box_trace(ctx("link the literal member"))?;
        lit.commit(self.registry);
        Ok(ByrefAnnotation {
            byref,
            nested,
            ty,
            member: Some(member),
            var: Some(var),
        })
    }

    /// Commits the cell structure and points its forwarding member at it.
    fn commit_byref(
        &self,
        byref: &ByrefVariable,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<(Type, Vec<LayoutSlot>)> {
        let address = byref.address;
        let ctx = |what| error::Byref { address, what };
        let nested = match byref.payload {
            ByrefPayload::Extended { layout } => {
                let decoded = layout::decode(self.host, layout, true)
                    .box_trace(ctx("decode the nested layout"))?;
                if let Some(anomaly) = decoded.anomaly {
                    let diagnostic = Diagnostic::UnknownLayoutOpcode {
                        address: layout,
                        at: anomaly.address,
                        byte: anomaly.byte,
                    };
                    note(diagnostics, diagnostic);
                }
                decoded.slots
            }
            _ => Vec::new(),
        };
        let name = format!("Block_byref_{address:x}");
        let mut builder = byref_struct(byref, &nested);
        let ty = self.registry.define(&name, &builder);
        link_member(&mut builder, &name, "forwarding", ty.clone())
            .box_trace(ctx("link the forwarding pointer"))?;
        let ty = self.registry.define(&name, &builder);
        Ok((ty, nested))
    }
}

#[cfg(test)]
#[path = "annotate_test.rs"]
mod tests;
