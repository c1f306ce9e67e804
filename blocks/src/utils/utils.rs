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

pub mod endian;

/// Declares a transparent newtype over an integer with named constants,
/// for ABI values where unknown encodings must survive decoding.
#[macro_export]
macro_rules! c_enum {
    (
        $(#[$attr:meta])*
        $vs:vis struct $EnumName:ident($TyName:ty);
        {
            $( $(#[$vattr:meta])* $VARIANT:ident = $value:expr;)*
        }
    ) => {
        #[repr(transparent)]
        #[derive(PartialEq, Eq, Copy, Clone, Hash)]
        $(#[$attr])*
        $vs struct $EnumName($TyName);

        impl $EnumName {
            $($(#[$vattr])* pub const $VARIANT: $EnumName = $EnumName($value);)*

            #[allow(dead_code)]
            pub const fn raw(self) -> $TyName {
                self.0
            }

            /// Whether the value is one of the named constants.
            #[allow(dead_code)]
            pub fn is_known(self) -> bool {
                matches!(self, $($EnumName::$VARIANT)|*)
            }
        }

        impl ::core::fmt::Debug for $EnumName {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(stringify!($EnumName))?;
                match *self {
                    $($EnumName::$VARIANT => {
                        f.write_str("::")?;
                        f.write_str(stringify!($VARIANT))
                    })*
                    _ => {
                        ::core::fmt::Write::write_char(f, '(')?;
                        ::core::fmt::Debug::fmt(&self.0, f)?;
                        ::core::fmt::Write::write_char(f, ')')
                    }
                }
            }
        }

        impl From<$EnumName> for $TyName {
            fn from(value: $EnumName) -> Self {
                value.0
            }
        }

        impl From<$TyName> for $EnumName {
            fn from(value: $TyName) -> Self {
                $EnumName(value)
            }
        }
    }
}

/// Low nibble of a byte.
pub const fn lo_nibble(byte: u8) -> u8 {
    byte & 0xf
}

/// High nibble of a byte.
pub const fn hi_nibble(byte: u8) -> u8 {
    byte >> 4
}

#[cfg(test)]
#[path = "utils_test.rs"]
mod tests;
