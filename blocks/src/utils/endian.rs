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

//! Little-endian integers for on-disk records.
//!
//! Both supported architectures are little-endian, but images may be
//! inspected on any host, so record fields never use native integers.

macro_rules! le_type {
    ($ne_type:ident, $le_type:ident) => {
        #[repr(transparent)]
        #[derive(
            ::zerocopy::Immutable,
            ::zerocopy::IntoBytes,
            ::zerocopy::FromBytes,
            ::zerocopy::KnownLayout,
            Copy,
            Clone,
            Default,
            PartialEq,
            Eq,
        )]
        pub struct $le_type {
            v: $ne_type,
        }

        impl $le_type {
            pub const fn get(self) -> $ne_type {
                $ne_type::from_le(self.v)
            }
        }

        impl From<$ne_type> for $le_type {
            fn from(value: $ne_type) -> Self {
                Self { v: value.to_le() }
            }
        }

        impl From<$le_type> for $ne_type {
            fn from(value: $le_type) -> Self {
                value.get()
            }
        }

        impl From<[u8; ::core::mem::size_of::<$ne_type>()]> for $le_type {
            fn from(value: [u8; ::core::mem::size_of::<$ne_type>()]) -> Self {
                Self {
                    v: $ne_type::from_ne_bytes(value),
                }
            }
        }

        impl ::core::fmt::Debug for $le_type {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, concat!(stringify!($le_type), "({:#x})"), self.get())
            }
        }

        impl ::core::fmt::LowerHex for $le_type {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                ::core::fmt::LowerHex::fmt(&self.get(), f)
            }
        }
    };
}

le_type!(u32, Lu32);
le_type!(u64, Lu64);

#[cfg(test)]
#[path = "endian_test.rs"]
mod tests;
