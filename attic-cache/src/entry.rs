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

use attic_common::{code::AttrKey, slab::Token};

/// One cached attribute value, exclusively owned by the cache.
///
/// The entry sits in two views at once: the hash index (by key) and the LRU
/// list (by recency, through the embedded links). Every mutation keeps the
/// two views agreeing on membership.
pub(crate) struct CacheEntry {
    pub key: AttrKey,
    pub hash: u32,
    pub value: Box<[u8]>,
    pub prev: Option<Token>,
    pub next: Option<Token>,
}

impl CacheEntry {
    pub fn new(key: AttrKey, hash: u32, value: Vec<u8>) -> Self {
        Self {
            key,
            hash,
            value: value.into_boxed_slice(),
            prev: None,
            next: None,
        }
    }

    /// Byte cost charged against the cache budget: the payload plus the
    /// per-entry overhead.
    pub fn cost(&self) -> usize {
        std::mem::size_of::<Self>() + self.value.len()
    }
}
