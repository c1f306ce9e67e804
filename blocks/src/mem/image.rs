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

use log::trace;

use crate::mem::addressable::{Addressable, SlotBackend};
use crate::mem::{Memory, Result, error};

/// Bytes loaded at a fixed virtual address, e.g. one Mach-O section.
#[derive(Debug)]
pub struct Segment {
    pub name: String,
    pub data: Vec<u8>,
}

impl SlotBackend for Segment {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// A sparse address space assembled from segments.
#[derive(Debug, Default)]
pub struct MemoryImage {
    segments: Addressable<Segment>,
}

impl MemoryImage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, addr: u64, name: impl Into<String>, data: Vec<u8>) -> Result<()> {
        let name = name.into();
        trace!("{name}: mapped {:#x} bytes at {addr:#x}", data.len());
        self.segments.add(addr, Segment { name, data })?;
        Ok(())
    }

    pub fn segments(&self) -> impl DoubleEndedIterator<Item = (u64, &Segment)> {
        self.segments.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Addresses of 8-byte aligned little-endian words equal to `value`.
    pub fn scan_pointers(&self, value: u64) -> Vec<u64> {
        let needle = value.to_le_bytes();
        let mut found = Vec::new();
        for (start, segment) in self.segments.iter() {
            let skip = (8 - start % 8) % 8;
            let Some(data) = segment.data.get(skip as usize..) else {
                continue;
            };
            for (index, word) in data.chunks_exact(8).enumerate() {
                if word == needle {
                    found.push(start + skip + index as u64 * 8);
                }
            }
        }
        found
    }
}

impl Memory for MemoryImage {
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let mut done = 0;
        while done < buf.len() {
            let Some(pos) = addr.checked_add(done as u64) else {
                return error::ExceedsLimit {
                    addr,
                    size: buf.len() as u64,
                }
                .fail();
            };
            let Some((start, segment)) = self.segments.search(pos) else {
                return error::NotMapped { addr: pos }.fail();
            };
            let offset = (pos - start) as usize;
            let count = std::cmp::min(segment.data.len() - offset, buf.len() - done);
            buf[done..done + count].copy_from_slice(&segment.data[offset..offset + count]);
            done += count;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "image_test.rs"]
mod tests;
