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
use rstest::rstest;

use crate::abi::{BlockFlags, ByrefFlags};
use crate::assemble::{
    append_slots, byref_struct, descriptor_struct, layout_member, link_member, literal_header,
    SizeGap, size_gap,
};
use crate::decode::{BlockDescriptor, ByrefPayload, ByrefVariable};
use crate::layout::LayoutSlot;
use crate::types::{Error, StructBuilder, Type, TypeRegistry};

fn names(builder: &StructBuilder) -> Vec<(&str, u64)> {
    let members = builder.members().iter();
    members.map(|m| (m.name.as_str(), m.offset)).collect()
}

fn declarations(builder: &StructBuilder) -> Vec<String> {
    let members = builder.members().iter();
    members.map(|m| m.ty.declare(&m.name)).collect()
}

#[test]
fn test_literal_header() {
    let builder = literal_header();
    assert!(builder.is_packed());
    assert_eq!(builder.width(), 32);
    assert_eq!(
        declarations(&builder),
        [
            "Class isa",
            "volatile uint32_t flags",
            "uint32_t reserved",
            "BlockInvokeFunction invoke",
            "struct Block_descriptor_1 *descriptor",
        ]
    );
}

#[test]
fn test_append_slots() {
    let mut builder = literal_header();
    let slots = [
        LayoutSlot::Strong,
        LayoutSlot::NonObjectBytes(4),
        LayoutSlot::NonObjectWords(2),
        LayoutSlot::Byref,
        LayoutSlot::Weak,
        LayoutSlot::Byref,
        LayoutSlot::Unretained,
    ];
    let byrefs = append_slots(&mut builder, &slots);
    assert_eq!(byrefs, [9, 11]);
    assert_eq!(
        names(&builder)[5..],
        [
            ("strong_ptr_20", 0x20),
            ("non_object_28", 0x28),
            ("non_object_2c", 0x2c),
            ("non_object_34", 0x34),
            ("byref_ptr_3c", 0x3c),
            ("weak_ptr_44", 0x44),
            ("byref_ptr_4c", 0x4c),
            ("unretained_ptr_54", 0x54),
        ]
    );
    assert_eq!(builder.members()[6].ty.declare("x"), "uint8_t x[4]");
    assert_eq!(builder.width(), 0x5c);
}

#[test]
fn test_append_empty_runs() {
    let mut builder = literal_header();
    let byrefs = append_slots(&mut builder, &[LayoutSlot::NonObjectWords(0)]);
    assert!(byrefs.is_empty());
    assert_eq!(builder.members().len(), 5);
}

#[rstest]
#[case(0, true, "void *layout")]
#[case(0x100, false, "void *layout")]
#[case(0x111, true, "uint64_t layout")]
#[case(0xfff, true, "uint64_t layout")]
#[case(0x1000, true, "uint8_t const *layout")]
fn test_layout_member(#[case] value: u64, #[case] extended: bool, #[case] decl: &str) {
    assert_eq!(layout_member(value, extended).declare("layout"), decl);
}

fn descriptor(flags: BlockFlags, layout: Option<u64>) -> BlockDescriptor {
    let has_signature = flags.contains(BlockFlags::HAS_SIGNATURE);
    let has_copy_dispose = flags.contains(BlockFlags::HAS_COPY_DISPOSE);
    BlockDescriptor {
        address: 0x3000,
        block_flags: flags,
        reserved: 0,
        size: 0x28,
        copy: has_copy_dispose.then_some(0x4100),
        dispose: has_copy_dispose.then_some(0x4200),
        signature: has_signature.then_some(0x5000),
        layout,
        signature_raw: None,
        layout_end: None,
    }
}

#[test]
fn test_descriptor_struct_minimal() {
    let builder = descriptor_struct(&descriptor(BlockFlags::IS_GLOBAL, None));
    assert!(!builder.is_packed());
    assert_eq!(names(&builder), [("reserved", 0), ("size", 8)]);
}

#[test]
fn test_descriptor_struct_full() {
    let flags = BlockFlags::HAS_COPY_DISPOSE
        | BlockFlags::HAS_SIGNATURE
        | BlockFlags::HAS_EXTENDED_LAYOUT;
    let builder = descriptor_struct(&descriptor(flags, Some(0x2000)));
    assert_eq!(
        declarations(&builder),
        [
            "uint64_t reserved",
            "uint64_t size",
            "BlockCopyFunction copy",
            "BlockDisposeFunction dispose",
            "char const *signature",
            "uint8_t const *layout",
        ]
    );
    assert_eq!(builder.width(), 48);
}

#[test]
fn test_descriptor_struct_legacy_layout() {
    let builder = descriptor_struct(&descriptor(BlockFlags::HAS_SIGNATURE, Some(0x2000)));
    assert_eq!(declarations(&builder)[3], "void *layout");
}

fn byref(flags: u32, payload: ByrefPayload) -> ByrefVariable {
    ByrefVariable {
        address: 0x2000,
        isa: 0,
        forwarding: 0,
        flags: ByrefFlags::from(flags),
        size: 0x30,
        keep: None,
        destroy: None,
        payload,
    }
}

#[rstest]
#[case(0x2000_0000, ByrefPayload::NonObject, "uint64_t non_object_0")]
#[case(0x3000_0000, ByrefPayload::Strong, "id strong_ptr_0")]
#[case(0x4000_0000, ByrefPayload::Weak, "id weak_ptr_0")]
#[case(0x5000_0000, ByrefPayload::Unretained, "id unretained_ptr_0")]
fn test_byref_struct(
    #[case] flags: u32,
    #[case] payload: ByrefPayload,
    #[case] decl: &str,
    #[values(false, true)] copy_dispose: bool,
) {
    let flags = if copy_dispose { flags | 1 << 25 } else { flags };
    let builder = byref_struct(&byref(flags, payload), &[]);
    assert!(builder.is_packed());
    let decls = declarations(&builder);
    assert_eq!(
        decls[..4],
        [
            "Class isa",
            "void *forwarding",
            "volatile int32_t flags",
            "uint32_t size",
        ]
    );
    if copy_dispose {
        assert_eq!(
            decls[4..6],
            ["BlockByrefKeepFunction byref_keep", "BlockByrefDestroyFunction byref_destroy"]
        );
    }
    assert_eq!(decls.last().map(String::as_str), Some(decl));
    let payload_offset = if copy_dispose { 40 } else { 24 };
    assert_eq!(builder.members().last().map(|m| m.offset), Some(payload_offset));
}

#[test]
fn test_byref_struct_extended() {
    let payload = ByrefPayload::Extended { layout: 0x110 };
    let nested = [LayoutSlot::Strong, LayoutSlot::Byref];
    let builder = byref_struct(&byref(0x1000_0000, payload), &nested);
    assert_eq!(
        names(&builder)[4..],
        [("layout", 24), ("strong_ptr_20", 32), ("byref_ptr_28", 40)]
    );
    assert_eq!(declarations(&builder)[4], "uint64_t layout");
}

#[test]
fn test_link_member() {
    let registry = TypeRegistry::new();
    let mut literal = literal_header();
    let mut desc = StructBuilder::aligned();
    desc.append(Type::uint(8), "reserved");
    let desc_ty = registry.define("Block_descriptor_3000", &desc);

    link_member(&mut literal, "Block_literal_1000", "descriptor", desc_ty).unwrap();
    assert_eq!(
        literal.members()[4].ty.declare("descriptor"),
        "struct Block_descriptor_3000 *descriptor"
    );
    assert_eq!(literal.width(), 32);

    let invoke = Type::function(Type::Void, vec![Type::void_ptr()], false);
    link_member(&mut literal, "Block_literal_1000", 3usize, invoke).unwrap();
    assert_eq!(
        literal.members()[3].ty.declare("invoke"),
        "void (*invoke)(void *)"
    );

    assert_matches!(
        link_member(&mut literal, "Block_literal_1000", "flags", Type::Void),
        Err(Error::NotAPointer { member, .. }) if member == "flags"
    );
    assert_matches!(
        link_member(&mut literal, "Block_literal_1000", "missing", Type::Void),
        Err(Error::NoSuchMember { member, .. }) if member == "missing"
    );
    assert_matches!(
        link_member(&mut literal, "Block_literal_1000", 9usize, Type::Void),
        Err(Error::NoSuchMember { member, .. }) if member == "#9"
    );
}

#[rstest]
#[case(0x20, None)]
#[case(0x21, Some(SizeGap::Missing(1)))]
#[case(0x28, Some(SizeGap::Missing(8)))]
#[case(0x1f, Some(SizeGap::Excess(1)))]
fn test_size_gap(#[case] declared: u64, #[case] gap: Option<SizeGap>) {
    assert_eq!(size_gap(&literal_header(), declared), gap);
}
