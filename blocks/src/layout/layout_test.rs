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

use crate::layout::{
    LayoutForm, LayoutSlot, UnknownOpcode, decode, encode_compact, slots_width,
};
use crate::mem::{Error, MemoryImage};

use LayoutSlot::*;

fn image_with(addr: u64, bytes: &[u8]) -> MemoryImage {
    let mut image = MemoryImage::new();
    image.add(addr, "__const", bytes.to_vec()).unwrap();
    image
}

#[rstest]
#[case(0x001, vec![Weak])]
#[case(0x100, vec![Strong])]
#[case(0x210, vec![Strong, Strong, Byref])]
#[case(0x123, vec![Strong, Byref, Byref, Weak, Weak, Weak])]
fn test_compact(#[case] value: u64, #[case] slots: Vec<LayoutSlot>) {
    let image = MemoryImage::new();
    let decoded = decode(&image, value, true).unwrap();
    assert_eq!(decoded.form, LayoutForm::Compact);
    assert_eq!(decoded.slots, slots);
    assert_eq!(decoded.end, None);
    assert_eq!(decoded.anomaly, None);
}

#[test]
fn test_compact_slot_count() {
    let image = MemoryImage::new();
    for value in [0x1u64, 0xf, 0x10, 0xff, 0x100, 0x5a3, 0xfff] {
        let decoded = decode(&image, value, true).unwrap();
        let expected = ((value >> 8) & 0xf) + ((value >> 4) & 0xf) + (value & 0xf);
        assert_eq!(decoded.slots.len() as u64, expected);
        assert!(decoded.slots.is_sorted_by_key(|s| match s {
            Strong => 0,
            Byref => 1,
            _ => 2,
        }));
    }
}

#[test]
fn test_empty_and_legacy() {
    let image = MemoryImage::new();
    let empty = decode(&image, 0, true).unwrap();
    assert_eq!(empty.form, LayoutForm::Empty);
    assert!(empty.slots.is_empty());

    let legacy = decode(&image, 0x1234_5678, false).unwrap();
    assert_eq!(legacy.form, LayoutForm::Legacy);
    assert!(legacy.slots.is_empty());
    assert_eq!(legacy.end, None);
}

#[test]
fn test_bytecode() {
    let image = image_with(0x4000, &[0x31, 0x12, 0x22, 0x41, 0x60, 0x10, 0x51, 0x00, 0xff]);
    let decoded = decode(&image, 0x4000, true).unwrap();
    assert_eq!(decoded.form, LayoutForm::Bytecode);
    assert_eq!(
        decoded.slots,
        [Strong, NonObjectBytes(2), NonObjectWords(2), Byref, Weak]
    );
    assert_eq!(decoded.end, Some(0x4008));
    assert_eq!(decoded.anomaly, None);
    assert_eq!(decoded.width(), 8 + 2 + 16 + 8 + 8);
}

#[test]
fn test_bytecode_escape_operand() {
    // Only the high nibble selects ESCAPE.
    let image = image_with(0x4000, &[0x32, 0x0f, 0x31]);
    let decoded = decode(&image, 0x4000, true).unwrap();
    assert_eq!(decoded.slots, [Strong, Strong]);
    assert_eq!(decoded.end, Some(0x4002));
}

#[test]
fn test_bytecode_unknown_opcode() {
    let image = image_with(0x4000, &[0x31, 0x41, 0x72, 0x31, 0x00]);
    let decoded = decode(&image, 0x4000, true).unwrap();
    assert_eq!(decoded.slots, [Strong, Byref]);
    assert_eq!(decoded.end, Some(0x4003));
    assert_eq!(
        decoded.anomaly,
        Some(UnknownOpcode {
            address: 0x4002,
            byte: 0x72
        })
    );
}

#[test]
fn test_bytecode_unterminated() {
    let image = image_with(0x4000, &[0x31, 0x31]);
    assert_matches!(
        decode(&image, 0x4000, true),
        Err(Error::NotMapped { addr: 0x4002, .. })
    );
}

#[rstest]
#[case(vec![])]
#[case(vec![Byref])]
#[case(vec![Strong, Strong, Weak])]
#[case(vec![Strong, Byref, Byref, Byref, Weak])]
#[case([vec![Strong; 15], vec![Byref; 15], vec![Weak; 15]].concat())]
fn test_compact_round_trip(#[case] slots: Vec<LayoutSlot>) {
    let value = encode_compact(&slots).unwrap();
    assert!(value < 0x1000);
    let decoded = decode(&MemoryImage::new(), value, true).unwrap();
    assert_eq!(decoded.slots, slots);
}

#[rstest]
#[case(vec![Weak, Strong])]
#[case(vec![Unretained])]
#[case(vec![NonObjectWords(1)])]
#[case(vec![Strong; 16])]
fn test_encode_compact_invalid(#[case] slots: Vec<LayoutSlot>) {
    assert_eq!(encode_compact(&slots), None);
}

#[test]
fn test_slots_width() {
    assert_eq!(slots_width(&[]), 0);
    assert_eq!(slots_width(&[NonObjectBytes(3), NonObjectWords(3), Unretained]), 3 + 24 + 8);
}
