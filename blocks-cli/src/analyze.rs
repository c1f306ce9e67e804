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

use std::fs;
use std::path::PathBuf;

use blocks::annotate::{Annotator, BlockAnnotation, DataByref, FunctionBatch};
use blocks::config::AnalysisConfig;
use blocks::errors::{DebugTrace, trace_error};
use blocks::host::{Arch, StaticHost, SymbolKind};
use blocks::mem::MemoryImage;
use blocks::signature::SignatureChange;
use blocks::sweep::{self, Cancel};
use blocks::types::TypeRegistry;
use clap::Args;
use serde::Deserialize;
use serde_aco::{Help, help_text};
use snafu::{ResultExt, Snafu};

#[trace_error]
#[derive(Snafu, DebugTrace)]
#[snafu(module, context(suffix(false)))]
pub enum Error {
    #[snafu(display("Failed to parse {arg}"))]
    ParseArg {
        arg: String,
        error: serde_aco::Error,
    },
    #[snafu(display("Failed to read {}", path.display()))]
    ReadImage {
        path: PathBuf,
        error: std::io::Error,
    },
    #[snafu(display("Failed to map {}", path.display()))]
    MapImage {
        path: PathBuf,
        source: Box<blocks::mem::Error>,
    },
    #[snafu(display("Failed to sweep the images"))]
    Sweep { source: Box<sweep::Error> },
    #[snafu(display("{count} of {total} instances could not be annotated"))]
    Incomplete { count: usize, total: usize },
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Help)]
pub enum ArchParam {
    /// 64-bit ARM.
    #[default]
    #[serde(alias = "aarch64", alias = "arm64")]
    Aarch64,
    /// x86-64.
    #[serde(alias = "x86_64", alias = "x86-64")]
    X86_64,
}

impl From<ArchParam> for Arch {
    fn from(param: ArchParam) -> Self {
        match param {
            ArchParam::Aarch64 => Arch::Aarch64,
            ArchParam::X86_64 => Arch::X86_64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Help)]
pub struct ImageParam {
    /// Path to a raw memory dump.
    pub path: PathBuf,
    /// Address of the first byte. [default: 0]
    #[serde(default)]
    pub base: u64,
    /// Segment name in log messages. [default: the path]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Help)]
pub enum SymbolKindParam {
    /// Defined outside the images.
    #[default]
    #[serde(alias = "external")]
    External,
    /// Imported data pointer.
    #[serde(alias = "data")]
    ImportedData,
    /// Import slot address.
    #[serde(alias = "import")]
    ImportAddress,
}

impl From<SymbolKindParam> for SymbolKind {
    fn from(param: SymbolKindParam) -> Self {
        match param {
            SymbolKindParam::External => SymbolKind::External,
            SymbolKindParam::ImportedData => SymbolKind::ImportedData,
            SymbolKindParam::ImportAddress => SymbolKind::ImportAddress,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Help)]
pub struct SymbolParam {
    /// Symbol name, e.g. __NSConcreteGlobalBlock.
    pub name: String,
    /// Address the symbol resolves to.
    pub addr: u64,
    /// Kind of the symbol. [default: external]
    #[serde(default)]
    pub kind: SymbolKindParam,
}

#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    #[arg(short, long("image"), required = true, value_name = "IMAGE", help(
        help_text::<ImageParam>("Map a raw memory image.")
    ))]
    images: Vec<String>,

    #[arg(short, long("symbol"), value_name = "SYMBOL", help(
        help_text::<SymbolParam>("Declare a symbol of the target.")
    ))]
    symbols: Vec<String>,

    #[arg(long, default_value = "aarch64", help(
        help_text::<ArchParam>("Architecture of the target.")
    ))]
    arch: String,

    #[arg(short, long, help(
        help_text::<AnalysisConfig>("Configure the analysis.")
    ))]
    config: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct AnnotateArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Addresses of global block literals.
    #[arg(value_name = "ADDR")]
    globals: Vec<String>,

    /// Address of a byref cell in a data section.
    #[arg(long("byref"), value_name = "ADDR")]
    byrefs: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SweepArgs {
    #[command(flatten)]
    target: TargetArgs,
}

fn parse<'a, T>(arg: &'a str) -> Result<T>
where
    T: Deserialize<'a>,
{
    serde_aco::from_arg(arg).context(error::ParseArg { arg })
}

fn load_target(args: &TargetArgs) -> Result<(StaticHost, AnalysisConfig)> {
    let arch: ArchParam = parse(&args.arch)?;
    let mut image = MemoryImage::new();
    for arg in &args.images {
        let param: ImageParam = parse(arg)?;
        let data = fs::read(&param.path).context(error::ReadImage {
            path: param.path.clone(),
        })?;
        let name = match param.name {
            Some(name) => name,
            None => param.path.display().to_string(),
        };
        image
            .add(param.base, name, data)
            .context(error::MapImage { path: param.path })?;
    }
    let mut host = StaticHost::new(arch.into(), image);
    for arg in &args.symbols {
        let param: SymbolParam = parse(arg)?;
        host.add_symbol(param.name, param.addr, param.kind.into());
    }
    let config = match &args.config {
        Some(arg) => parse(arg)?,
        None => AnalysisConfig::default(),
    };
    Ok((host, config))
}

fn print_batch(batch: &FunctionBatch) {
    for update in &batch.updates {
        let name = update.rename.as_deref().unwrap_or("-");
        let params = update.param_names.join(", ");
        match &update.change {
            SignatureChange::Replace(func) => {
                println!("  function {:#x} {name} ({params}): {func}", update.address)
            }
            SignatureChange::Patch {
                return_type,
                first_param,
            } => println!(
                "  function {:#x} {name} ({params}): returns {return_type}, first parameter {first_param}",
                update.address
            ),
        }
    }
}

fn print_annotation(annotation: &BlockAnnotation) {
    println!("{}", annotation.literal);
    for var in &annotation.data_vars {
        println!("  data {:#x} {}: {}", var.address, var.name, var.ty);
    }
    for byref in &annotation.byrefs {
        println!("  byref {:#x}: {}", byref.byref.address, byref.ty);
    }
    for batch in &annotation.function_batches {
        print_batch(batch);
    }
    for diagnostic in &annotation.diagnostics {
        println!("  note {:#x}: {diagnostic}", diagnostic.address());
    }
}

fn print_class_imports(annotator: &Annotator<'_, StaticHost>) {
    for var in annotator.class_imports() {
        println!("data {:#x} {}: {}", var.address, var.name, var.ty);
    }
}

fn print_byref(data: &DataByref) {
    println!("{}", data.annotation.byref);
    let var = &data.data_var;
    println!("  data {:#x} {}: {}", var.address, var.name, var.ty);
    for diagnostic in &data.diagnostics {
        println!("  note {:#x}: {diagnostic}", diagnostic.address());
    }
}

pub fn annotate(args: AnnotateArgs) -> Result<()> {
    let (host, config) = load_target(&args.target)?;
    let registry = TypeRegistry::new();
    let annotator = Annotator::new(&host, &registry, &config);
    print_class_imports(&annotator);

    let total = args.globals.len() + args.byrefs.len();
    let mut count = 0usize;
    for arg in &args.globals {
        let address: u64 = parse(arg)?;
        match annotator.annotate_global(address) {
            Ok(annotation) => print_annotation(&annotation),
            Err(e) => {
                log::error!("global block {address:x}: {e:?}");
                count += 1;
            }
        }
    }
    for arg in &args.byrefs {
        let address: u64 = parse(arg)?;
        match annotator.annotate_byref(address) {
            Ok(data) => print_byref(&data),
            Err(e) => {
                log::error!("byref {address:x}: {e:?}");
                count += 1;
            }
        }
    }
    println!("{}", registry.render());
    if count > 0 {
        return error::Incomplete { count, total }.fail();
    }
    Ok(())
}

pub fn sweep(args: SweepArgs) -> Result<()> {
    let (host, config) = load_target(&args.target)?;
    let registry = TypeRegistry::new();
    let annotator = Annotator::new(&host, &registry, &config);
    print_class_imports(&annotator);

    let candidates = sweep::global_candidates(&annotator).context(error::Sweep)?;
    let outcomes = sweep::run(&annotator, &candidates, &Cancel::new()).context(error::Sweep)?;
    let mut count = 0usize;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(annotation) => print_annotation(annotation),
            Err(_) => count += 1,
        }
    }
    println!("{}", registry.render());
    if count > 0 {
        return error::Incomplete {
            count,
            total: outcomes.len(),
        }
        .fail();
    }
    Ok(())
}

#[cfg(test)]
#[path = "analyze_test.rs"]
mod tests;
