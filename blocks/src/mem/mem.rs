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

pub mod addressable;
pub mod image;

use snafu::Snafu;
use zerocopy::{FromBytes, IntoBytes};

use crate::errors::{DebugTrace, trace_error};

pub use self::image::MemoryImage;

/// Longest C string read from an image, terminator included.
pub const C_STR_LIMIT: usize = 4096;

#[trace_error]
#[derive(Snafu, DebugTrace)]
#[snafu(module, visibility(pub), context(suffix(false)))]
pub enum Error {
    #[snafu(display("Cannot add a zero-sized segment"))]
    ZeroSizedSlot,
    #[snafu(display("(addr={addr:#x}, size={size:#x}) exceeds the address limit"))]
    ExceedsLimit { addr: u64, size: u64 },
    #[snafu(display("{new_item:#x?} overlaps with {exist_item:#x?}"))]
    Overlap {
        new_item: [u64; 2],
        exist_item: [u64; 2],
    },
    #[snafu(display("{addr:#x} is not mapped"))]
    NotMapped { addr: u64 },
    #[snafu(display("String at {addr:#x} is not terminated within {limit} bytes"))]
    Unterminated { addr: u64, limit: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Random-access reads of a binary's virtual address space.
pub trait Memory {
    /// Fills `buf` with the bytes at `addr`. Partial reads are errors.
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()>;

    fn read_obj<T>(&self, addr: u64) -> Result<T>
    where
        T: FromBytes + IntoBytes,
    {
        let mut val = T::new_zeroed();
        self.read(addr, val.as_mut_bytes())?;
        Ok(val)
    }

    fn read_u8(&self, addr: u64) -> Result<u8> {
        self.read_obj(addr)
    }

    fn read_u64(&self, addr: u64) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read(addr, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads a NUL-terminated string of at most `limit` bytes. Invalid
    /// UTF-8 is replaced.
    fn read_c_str(&self, addr: u64, limit: usize) -> Result<String> {
        let mut bytes = Vec::new();
        for offset in 0..limit as u64 {
            let Some(pos) = addr.checked_add(offset) else {
                return error::ExceedsLimit { addr, size: offset }.fail();
            };
            match self.read_u8(pos)? {
                0 => return Ok(String::from_utf8_lossy(&bytes).into_owned()),
                b => bytes.push(b),
            }
        }
        error::Unterminated { addr, limit }.fail()
    }
}

impl<M> Memory for &M
where
    M: Memory + ?Sized,
{
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        M::read(self, addr, buf)
    }
}

#[cfg(test)]
#[path = "mem_test.rs"]
mod tests;
