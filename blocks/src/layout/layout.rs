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

//! Captured variable layouts.
//!
//! A layout value of 0 means no layout. Values below 0x1000 pack three
//! counts, `(strong << 8) | (byref << 4) | weak`. Anything else is the
//! address of a bytecode stream: each byte holds an opcode in the high
//! nibble and an operand in the low nibble, terminated by `ESCAPE`.

use log::{trace, warn};

use crate::abi::{LayoutOpcode, POINTER_SIZE};
use crate::mem::{Memory, Result};
use crate::utils::{hi_nibble, lo_nibble};

/// Layout values below this are compact encodings.
pub const COMPACT_LIMIT: u64 = 0x1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutSlot {
    /// An opaque run of `n` bytes.
    NonObjectBytes(u8),
    /// `n` opaque pointer-sized words.
    NonObjectWords(u8),
    Strong,
    Byref,
    Weak,
    Unretained,
}

impl LayoutSlot {
    pub fn width(&self) -> u64 {
        match self {
            LayoutSlot::NonObjectBytes(n) => *n as u64,
            LayoutSlot::NonObjectWords(n) => *n as u64 * POINTER_SIZE,
            LayoutSlot::Strong | LayoutSlot::Byref | LayoutSlot::Weak | LayoutSlot::Unretained => {
                POINTER_SIZE
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutForm {
    Empty,
    /// A layout without `HAS_EXTENDED_LAYOUT`. Not decoded.
    Legacy,
    Compact,
    Bytecode,
}

/// A bytecode byte whose opcode is not defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownOpcode {
    pub address: u64,
    pub byte: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutDecode {
    pub form: LayoutForm,
    pub slots: Vec<LayoutSlot>,
    /// Address after the last byte consumed from a bytecode stream.
    pub end: Option<u64>,
    pub anomaly: Option<UnknownOpcode>,
}

impl LayoutDecode {
    fn without_slots(form: LayoutForm) -> Self {
        LayoutDecode {
            form,
            slots: Vec::new(),
            end: None,
            anomaly: None,
        }
    }

    pub fn width(&self) -> u64 {
        slots_width(&self.slots)
    }
}

fn push_n(slots: &mut Vec<LayoutSlot>, slot: LayoutSlot, n: u8) {
    slots.extend(std::iter::repeat_n(slot, n as usize));
}

fn decode_compact(value: u64) -> Vec<LayoutSlot> {
    let mut slots = Vec::new();
    push_n(&mut slots, LayoutSlot::Strong, ((value >> 8) & 0xf) as u8);
    push_n(&mut slots, LayoutSlot::Byref, ((value >> 4) & 0xf) as u8);
    push_n(&mut slots, LayoutSlot::Weak, (value & 0xf) as u8);
    slots
}

fn decode_bytecode<M>(memory: &M, start: u64) -> Result<LayoutDecode>
where
    M: Memory,
{
    let mut slots = Vec::new();
    let mut addr = start;
    loop {
        let byte = memory.read_u8(addr)?;
        addr += 1;
        let n = lo_nibble(byte);
        let op = LayoutOpcode::from(hi_nibble(byte));
        trace!("layout {start:#x}: {op:?} {n}");
        match op {
            LayoutOpcode::ESCAPE => break,
            LayoutOpcode::NON_OBJECT_BYTES if n > 0 => slots.push(LayoutSlot::NonObjectBytes(n)),
            LayoutOpcode::NON_OBJECT_WORDS if n > 0 => slots.push(LayoutSlot::NonObjectWords(n)),
            LayoutOpcode::NON_OBJECT_BYTES | LayoutOpcode::NON_OBJECT_WORDS => {}
            LayoutOpcode::STRONG => push_n(&mut slots, LayoutSlot::Strong, n),
            LayoutOpcode::BYREF => push_n(&mut slots, LayoutSlot::Byref, n),
            LayoutOpcode::WEAK => push_n(&mut slots, LayoutSlot::Weak, n),
            LayoutOpcode::UNRETAINED => push_n(&mut slots, LayoutSlot::Unretained, n),
            _ => {
                warn!("layout {start:#x}: unknown extended layout op {byte:#04x} at {:#x}", addr - 1);
                return Ok(LayoutDecode {
                    form: LayoutForm::Bytecode,
                    slots,
                    end: Some(addr),
                    anomaly: Some(UnknownOpcode {
                        address: addr - 1,
                        byte,
                    }),
                });
            }
        }
    }
    Ok(LayoutDecode {
        form: LayoutForm::Bytecode,
        slots,
        end: Some(addr),
        anomaly: None,
    })
}

/// Expands a layout value into the slots it describes.
pub fn decode<M>(memory: &M, layout_value: u64, is_extended: bool) -> Result<LayoutDecode>
where
    M: Memory,
{
    if layout_value == 0 {
        return Ok(LayoutDecode::without_slots(LayoutForm::Empty));
    }
    if !is_extended {
        return Ok(LayoutDecode::without_slots(LayoutForm::Legacy));
    }
    if layout_value < COMPACT_LIMIT {
        return Ok(LayoutDecode {
            form: LayoutForm::Compact,
            slots: decode_compact(layout_value),
            end: None,
            anomaly: None,
        });
    }
    decode_bytecode(memory, layout_value)
}

/// Packs `Strong* Byref* Weak*` with at most 15 of each into a compact value.
pub fn encode_compact(slots: &[LayoutSlot]) -> Option<u64> {
    let mut counts = [0u64; 3];
    let mut kind = 0;
    for slot in slots {
        let index = match slot {
            LayoutSlot::Strong => 0,
            LayoutSlot::Byref => 1,
            LayoutSlot::Weak => 2,
            _ => return None,
        };
        if index < kind {
            return None;
        }
        kind = index;
        counts[index] += 1;
    }
    if counts.iter().any(|c| *c > 0xf) {
        return None;
    }
    Some((counts[0] << 8) | (counts[1] << 4) | counts[2])
}

pub fn slots_width(slots: &[LayoutSlot]) -> u64 {
    slots.iter().map(LayoutSlot::width).sum()
}

#[cfg(test)]
#[path = "layout_test.rs"]
mod tests;
