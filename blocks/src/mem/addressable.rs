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

use snafu::ensure;

use crate::mem::{Result, error};

pub trait SlotBackend {
    fn size(&self) -> u64;
}

#[derive(Debug)]
struct Slot<B>
where
    B: SlotBackend,
{
    addr: u64,
    backend: B,
}

impl<B> Slot<B>
where
    B: SlotBackend,
{
    fn new(addr: u64, backend: B) -> Result<Self> {
        let size = backend.size();
        ensure!(size != 0, error::ZeroSizedSlot);
        ensure!(
            (size - 1).checked_add(addr).is_some(),
            error::ExceedsLimit { addr, size }
        );
        Ok(Self { addr, backend })
    }

    fn max_addr(&self) -> u64 {
        (self.backend.size() - 1) + self.addr
    }
}

/// Non-overlapping address ranges kept sorted by start address.
#[derive(Debug)]
pub struct Addressable<B>
where
    B: SlotBackend,
{
    slots: Vec<Slot<B>>,
}

impl<B> Default for Addressable<B>
where
    B: SlotBackend,
{
    fn default() -> Self {
        Addressable { slots: Vec::new() }
    }
}

impl<B> Addressable<B>
where
    B: SlotBackend,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (u64, &B)> {
        self.slots.iter().map(|slot| (slot.addr, &slot.backend))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn add(&mut self, addr: u64, backend: B) -> Result<&mut B> {
        let slot = Slot::new(addr, backend)?;
        let index = match self.slots.binary_search_by_key(&addr, |s| s.addr) {
            Ok(index) => Err(index),
            Err(index) if index < self.slots.len() && self.slots[index].addr <= slot.max_addr() => {
                Err(index)
            }
            Err(index) if index > 0 && slot.addr <= self.slots[index - 1].max_addr() => {
                Err(index - 1)
            }
            Err(index) => Ok(index),
        };
        match index {
            Err(exist) => {
                let exist = &self.slots[exist];
                error::Overlap {
                    new_item: [slot.addr, slot.max_addr()],
                    exist_item: [exist.addr, exist.max_addr()],
                }
                .fail()
            }
            Ok(index) => {
                self.slots.insert(index, slot);
                Ok(&mut self.slots[index].backend)
            }
        }
    }

    /// Finds the range containing `addr`.
    pub fn search(&self, addr: u64) -> Option<(u64, &B)> {
        let index = match self.slots.binary_search_by_key(&addr, |s| s.addr) {
            Ok(index) => index,
            Err(0) => return None,
            Err(index) => index - 1,
        };
        let slot = &self.slots[index];
        (addr <= slot.max_addr()).then_some((slot.addr, &slot.backend))
    }
}

#[cfg(test)]
#[path = "addressable_test.rs"]
mod tests;
