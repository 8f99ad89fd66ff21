// Copyright 2025 attic Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::hash::Hasher;

use twox_hash::XxHash32;

use crate::code::AttrKey;

/// Deterministic 32-bit hash of an attribute key.
///
/// Both the backing store's bucket layout and the bulk-load staging bucket
/// selection are keyed by this value, so it must be stable across processes
/// and hosts: it is XxHash32 with seed 0 over the key's fixed-width encoding.
pub fn attr_hash(key: &AttrKey) -> u32 {
    let mut buf = [0u8; AttrKey::ENCODED_LEN];
    key.write(&mut buf.as_mut_slice());
    let mut hasher = XxHash32::with_seed(0);
    hasher.write(&buf);
    hasher.finish() as u32
}
