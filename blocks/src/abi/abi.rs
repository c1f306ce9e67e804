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

//! Records and flags of the libclosure runtime ABI.

use bitfield::bitfield;
use bitflags::bitflags;
use macros::Layout;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::c_enum;
use crate::utils::endian::{Lu32, Lu64};

/// Size of a pointer on every supported architecture.
pub const POINTER_SIZE: u64 = 8;

bitflags! {
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BlockFlags: u32 {
        const DEALLOCATING = 0x1;
        /// Runtime reference count.
        const REFCOUNT_MASK = 0xfffe;
        const INLINE_LAYOUT_STRING = 1 << 21;
        const SMALL_DESCRIPTOR = 1 << 22;
        const IS_NOESCAPE = 1 << 23;
        const NEEDS_FREE = 1 << 24;
        /// The descriptor carries copy and dispose helpers.
        const HAS_COPY_DISPOSE = 1 << 25;
        const HAS_CTOR = 1 << 26;
        const IS_GC = 1 << 27;
        const IS_GLOBAL = 1 << 28;
        const USE_STRET = 1 << 29;
        /// The descriptor carries a signature and a layout.
        const HAS_SIGNATURE = 1 << 30;
        /// The layout is compact or bytecode rather than a GC layout.
        const HAS_EXTENDED_LAYOUT = 1 << 31;

        const _ = !0;
    }
}

c_enum! {
    /// Byref payload selector, bits 28..30 of the byref flags.
    pub struct ByrefLayout(u8);
    {
        EXTENDED = 1;
        NON_OBJECT = 2;
        STRONG = 3;
        WEAK = 4;
        UNRETAINED = 5;
    }
}

bitfield! {
    #[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct ByrefFlags(u32);
    impl Debug;
    pub u16, refcount, _: 15, 1;
    pub needs_free, _: 24;
    pub has_copy_dispose, _: 25;
    pub is_gc, _: 27;
    pub u8, from into ByrefLayout, layout_kind, _: 30, 28;
}

impl ByrefFlags {
    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl From<u32> for ByrefFlags {
    fn from(value: u32) -> Self {
        ByrefFlags(value)
    }
}

c_enum! {
    /// High nibble of a layout bytecode byte.
    pub struct LayoutOpcode(u8);
    {
        ESCAPE = 0;
        NON_OBJECT_BYTES = 1;
        NON_OBJECT_WORDS = 2;
        STRONG = 3;
        BYREF = 4;
        WEAK = 5;
        UNRETAINED = 6;
    }
}

/// Leading fields of every block literal.
#[repr(C)]
#[derive(Debug, Clone, Default, FromBytes, IntoBytes, Immutable, KnownLayout, Layout)]
pub struct BlockLiteralHeader {
    pub isa: Lu64,
    pub flags: Lu32,
    pub reserved: Lu32,
    pub invoke: Lu64,
    pub descriptor: Lu64,
}

#[repr(C)]
#[derive(Debug, Clone, Default, FromBytes, IntoBytes, Immutable, KnownLayout, Layout)]
pub struct DescriptorHeader {
    pub reserved: Lu64,
    pub size: Lu64,
}

/// Present iff the literal has [`BlockFlags::HAS_COPY_DISPOSE`].
#[repr(C)]
#[derive(Debug, Clone, Default, FromBytes, IntoBytes, Immutable, KnownLayout, Layout)]
pub struct DescriptorCopyDispose {
    pub copy: Lu64,
    pub dispose: Lu64,
}

/// Present iff the literal has [`BlockFlags::HAS_SIGNATURE`].
#[repr(C)]
#[derive(Debug, Clone, Default, FromBytes, IntoBytes, Immutable, KnownLayout, Layout)]
pub struct DescriptorSignature {
    pub signature: Lu64,
    pub layout: Lu64,
}

/// Leading fields of a `__block` variable cell.
#[repr(C)]
#[derive(Debug, Clone, Default, FromBytes, IntoBytes, Immutable, KnownLayout, Layout)]
pub struct ByrefHeader {
    pub isa: Lu64,
    pub forwarding: Lu64,
    pub flags: Lu32,
    pub size: Lu32,
}

/// Present iff the byref flags have `has_copy_dispose`.
#[repr(C)]
#[derive(Debug, Clone, Default, FromBytes, IntoBytes, Immutable, KnownLayout, Layout)]
pub struct ByrefCopyDispose {
    pub keep: Lu64,
    pub destroy: Lu64,
}

pub const LITERAL_HEADER_SIZE: u64 = size_of::<BlockLiteralHeader>() as u64;
pub const BYREF_HEADER_SIZE: u64 = size_of::<ByrefHeader>() as u64;

#[cfg(test)]
#[path = "abi_test.rs"]
mod tests;
