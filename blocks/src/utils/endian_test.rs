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

use zerocopy::IntoBytes;

use crate::utils::endian::{Lu32, Lu64};

#[test]
fn test_lu32() {
    let val = Lu32::from(0x12345678u32);
    assert_eq!(val.get(), 0x12345678);
    assert_eq!(u32::from(val), 0x12345678);
    assert_eq!(val.as_bytes(), [0x78, 0x56, 0x34, 0x12]);
    assert_eq!(format!("{val:?}"), "Lu32(0x12345678)");
    assert_eq!(format!("{val:x}"), "12345678");
}

#[test]
fn test_lu64_from_bytes() {
    let bytes = [0xef, 0xcd, 0xab, 0x90, 0x78, 0x56, 0x34, 0x12];
    let val = Lu64::from(bytes);
    assert_eq!(val.get(), 0x1234567890abcdef);
    assert_eq!(val.as_bytes(), bytes);
    assert_eq!(Lu64::default().get(), 0);
}
