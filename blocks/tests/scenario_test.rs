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

use assert_matches::assert_matches;

use blocks::annotate::{Annotator, Diagnostic};
use blocks::config::AnalysisConfig;
use blocks::decode::{self, BlockKind};
use blocks::host::{Arch, StaticHost, SymbolKind};
use blocks::il::{Expr, Function, Insn, VarId, VarSource, Variable};
use blocks::layout::LayoutForm;
use blocks::matcher::{self, Marker};
use blocks::mem::MemoryImage;
use blocks::types::TypeRegistry;

fn words(values: &[u64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

#[test]
fn global_literal_with_unaccounted_bytes() {
    let mut literal = 0x1000u64.to_le_bytes().to_vec();
    literal.extend(0x1000_0000u32.to_le_bytes());
    literal.extend(0u32.to_le_bytes());
    literal.extend(words(&[0x2000, 0x3000]));

    let mut image = MemoryImage::new();
    image.add(0x100, "__const", literal).unwrap();
    image.add(0x3000, "__const", words(&[0, 0x28])).unwrap();

    let literal = decode::decode_literal(&image, 0x100, BlockKind::Global).unwrap();
    let descriptor = decode::decode_descriptor(&image, literal.descriptor, literal.flags).unwrap();
    assert_eq!(descriptor.imported_variables_size(), 8);
    assert_eq!(descriptor.signature, None);
    assert_eq!(descriptor.layout, None);

    let mut host = StaticHost::new(Arch::X86_64, image);
    host.add_symbol("__NSConcreteGlobalBlock", 0x1000, SymbolKind::External);
    let registry = TypeRegistry::new();
    let config = AnalysisConfig::default();
    let annotator = Annotator::new(&host, &registry, &config);

    let annotation = annotator.annotate_global(0x100).unwrap();
    assert_eq!(annotation.layout.form, LayoutForm::Empty);
    assert!(annotation.layout.slots.is_empty());
    assert_eq!(
        annotation.diagnostics,
        [Diagnostic::SizeMismatch {
            address: 0x100,
            name: "struct Block_literal_100".to_owned(),
            declared: 0x28,
            width: 0x20,
        }]
    );
    assert_eq!(
        annotation.diagnostics[0].to_string(),
        "Block literal nominal size 28h.\n\
         struct Block_literal_100 has width 20h.\n\
         8h bytes missing, add to struct manually."
    );
    let literal = registry.get_by_name("Block_literal_100").unwrap();
    assert_eq!(literal.members.len(), 5);
    assert_eq!(literal.width, 0x20);
}

#[test]
fn stack_literal_out_of_order() {
    const BLOCK: VarId = VarId(1);
    let field = |offset| Expr::field(Expr::Var(BLOCK), offset);
    let function = Function {
        start: 0x1000,
        name: "sub_1000".to_owned(),
        vars: vec![Variable::new(1, "var_30", VarSource::Stack)],
        insns: vec![
            Insn::assign(0x1000, field(16), Expr::ConstPtr(0x4000)),
            Insn::assign(0x1004, field(8), Expr::Const(0x0200_0000)),
            Insn::assign(0x1008, field(24), Expr::ConstPtr(0x5000)),
            Insn::init(0x100c, 1, Expr::import(0x9000, "__NSConcreteStackBlock")),
        ],
    };

    let marker = Marker {
        name: "__NSConcreteStackBlock",
        addr: Some(0x9000),
    };
    let matched = matcher::match_literal(&function, BLOCK, 0x100c, &marker).unwrap();
    let literal = &matched.value;
    assert_eq!(literal.kind, BlockKind::Stack);
    assert_eq!((literal.isa, literal.invoke, literal.descriptor), (0x9000, 0x4000, 0x5000));
    assert_eq!(literal.flags.bits(), 0x0200_0000);
    assert_matches!(
        &matched.diagnostics[..],
        [Diagnostic::ReservedUnresolved { address: 0x100c }]
    );

    let mut image = MemoryImage::new();
    image.add(0x5000, "__const", words(&[0, 0x20, 0x6000, 0x6100])).unwrap();
    let mut host = StaticHost::new(Arch::Aarch64, image);
    host.add_symbol("__NSConcreteStackBlock", 0x9000, SymbolKind::ImportAddress);
    host.add_il_function(function);
    let registry = TypeRegistry::new();
    let config = AnalysisConfig::default();
    let annotator = Annotator::new(&host, &registry, &config);

    let annotation = annotator.annotate_stack_at(0x100c).unwrap();
    assert_eq!(annotation.literal, matched.value);
    assert_eq!(annotation.descriptor.copy, Some(0x6000));
    assert_eq!(annotation.descriptor.dispose, Some(0x6100));
    assert_eq!(annotation.var_updates[0].name, "stack_block_var_30");
    assert!(registry.render().contains("struct Block_descriptor_5000 *descriptor;"));
}
