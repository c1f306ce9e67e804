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
use std::path::Path;

use assert_matches::assert_matches;
use blocks::host::{Arch, Host, SymbolKind};
use blocks::mem::Memory;
use pretty_assertions::assert_eq;
use rstest::rstest;
use tempfile::TempDir;

use crate::analyze::{
    AnnotateArgs, ArchParam, Error, ImageParam, SweepArgs, SymbolKindParam, SymbolParam,
    TargetArgs, annotate, load_target, parse, sweep,
};

#[rstest]
#[case("path=a.bin", ImageParam { path: "a.bin".into(), base: 0, name: None })]
#[case(
    "path=/tmp/dump,base=0x10000,name=__const",
    ImageParam { path: "/tmp/dump".into(), base: 0x10000, name: Some("__const".to_owned()) }
)]
fn test_parse_image(#[case] arg: &str, #[case] expected: ImageParam) {
    assert_eq!(parse::<ImageParam>(arg).unwrap(), expected);
}

#[rstest]
#[case("name=__NSConcreteGlobalBlock,addr=0x7000", SymbolKindParam::External)]
#[case("name=__NSConcreteStackBlock,addr=0x7000,kind=data", SymbolKindParam::ImportedData)]
#[case("name=__NSConcreteStackBlock,addr=0x7000,kind=import", SymbolKindParam::ImportAddress)]
fn test_parse_symbol(#[case] arg: &str, #[case] kind: SymbolKindParam) {
    let param: SymbolParam = parse(arg).unwrap();
    assert_eq!(param.addr, 0x7000);
    assert_eq!(param.kind, kind);
}

#[rstest]
#[case("aarch64", ArchParam::Aarch64)]
#[case("arm64", ArchParam::Aarch64)]
#[case("x86_64", ArchParam::X86_64)]
fn test_parse_arch(#[case] arg: &str, #[case] arch: ArchParam) {
    assert_eq!(parse::<ArchParam>(arg).unwrap(), arch);
}

#[test]
fn test_parse_invalid() {
    assert_matches!(parse::<ArchParam>("mips"), Err(Error::ParseArg { arg, .. }) if arg == "mips");
    assert_matches!(parse::<SymbolParam>("name=x"), Err(Error::ParseArg { .. }));
}

fn target(images: Vec<String>, config: Option<&str>) -> TargetArgs {
    TargetArgs {
        images,
        symbols: vec!["name=__NSConcreteGlobalBlock,addr=0x7000".to_owned()],
        arch: "x86_64".to_owned(),
        config: config.map(str::to_owned),
    }
}

#[test]
fn test_load_target() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("const.bin");
    fs::write(&path, [1, 2, 3, 4]).unwrap();

    let image = format!("path={},base=0x100", path.display());
    let (host, config) = load_target(&target(vec![image], Some("jobs=4,byrefs=off"))).unwrap();
    assert_eq!(host.arch(), Arch::X86_64);
    assert_eq!(host.read_u8(0x102).unwrap(), 3);
    assert_matches!(host.symbol("__NSConcreteGlobalBlock", SymbolKind::External), Some(s) if s.addr == 0x7000);
    assert_eq!(config.jobs, 4);
    assert!(!config.byrefs);
    assert!(config.functions);
}

#[test]
fn test_load_target_errors() {
    let missing = Path::new("/nonexistent/blocks/image.bin");
    let image = format!("path={}", missing.display());
    assert_matches!(
        load_target(&target(vec![image], None)),
        Err(Error::ReadImage { path, .. }) if path == missing
    );

    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("const.bin");
    fs::write(&path, [0; 16]).unwrap();
    let images = vec![
        format!("path={},base=0x100", path.display()),
        format!("path={},base=0x108", path.display()),
    ];
    assert_matches!(load_target(&target(images, None)), Err(Error::MapImage { .. }));

    let image = format!("path={}", path.display());
    assert_matches!(
        load_target(&target(vec![image], Some("jobs=many"))),
        Err(Error::ParseArg { .. })
    );
}

#[test]
fn test_annotate_counts_failures() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("const.bin");
    fs::write(&path, [0; 16]).unwrap();
    let image = format!("path={},base=0x100", path.display());

    let args = AnnotateArgs {
        target: target(vec![image.clone()], None),
        globals: vec!["0x100".to_owned(), "0x200".to_owned()],
        byrefs: vec!["0x108".to_owned()],
    };
    assert_matches!(annotate(args), Err(Error::Incomplete { count: 3, total: 3, .. }));

    let args = SweepArgs {
        target: target(vec![image], None),
    };
    assert_matches!(sweep(args), Ok(()));
}
