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

use crate::mem::{Error, Memory, MemoryImage};

fn fixture() -> MemoryImage {
    let mut image = MemoryImage::new();
    image.add(0x1000, "__const", vec![0xaa; 0x10]).unwrap();
    image.add(0x1010, "__data", (0..0x10).collect()).unwrap();
    image.add(0x2004, "__cstring", b"v8@?0\0ab".to_vec()).unwrap();
    image
}

#[test]
fn test_read_across_segments() {
    let image = fixture();
    let mut buf = [0u8; 4];
    image.read(0x100e, &mut buf).unwrap();
    assert_eq!(buf, [0xaa, 0xaa, 0x00, 0x01]);
    assert_matches!(
        image.read(0x101e, &mut buf),
        Err(Error::NotMapped { addr: 0x1020, .. })
    );
}

#[test]
fn test_read_u64() {
    let image = fixture();
    assert_eq!(image.read_u64(0x1010).unwrap(), 0x0706050403020100);
    assert_eq!(image.read_u8(0x1015).unwrap(), 5);
}

#[test]
fn test_read_c_str() {
    let image = fixture();
    assert_eq!(image.read_c_str(0x2004, 16).unwrap(), "v8@?0");
    assert_matches!(
        image.read_c_str(0x2004, 3),
        Err(Error::Unterminated { addr: 0x2004, limit: 3, .. })
    );
    assert_matches!(
        image.read_c_str(0x200a, 16),
        Err(Error::NotMapped { addr: 0x200c, .. })
    );
}

#[test]
fn test_overlapping_segments() {
    let mut image = fixture();
    assert_matches!(
        image.add(0x1008, "overlap", vec![0; 8]),
        Err(Error::Overlap { .. })
    );
    assert_matches!(image.add(0x3000, "empty", vec![]), Err(Error::ZeroSizedSlot { .. }));
}
