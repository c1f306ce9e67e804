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

#[path = "abi/abi.rs"]
pub mod abi;
#[path = "annotate/annotate.rs"]
pub mod annotate;
#[path = "assemble/assemble.rs"]
pub mod assemble;
pub mod config;
#[path = "decode/decode.rs"]
pub mod decode;
pub mod errors;
#[path = "host/host.rs"]
pub mod host;
#[path = "il/il.rs"]
pub mod il;
#[path = "layout/layout.rs"]
pub mod layout;
#[path = "matcher/matcher.rs"]
pub mod matcher;
#[path = "mem/mem.rs"]
pub mod mem;
#[path = "signature/signature.rs"]
pub mod signature;
#[path = "sweep/sweep.rs"]
pub mod sweep;
#[path = "types/types.rs"]
pub mod types;
#[path = "utils/utils.rs"]
pub mod utils;
