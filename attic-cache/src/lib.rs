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

//! The attribute cache of the attic storage layer.
//!
//! [`AttrCache`] is an LRU-ordered, hash-indexed, byte-budgeted cache of
//! attribute values keyed by (object, attribute), in front of a persistent
//! [`BackingStore`]. Writes go to the store before the cache, so the cache
//! holds no unflushed state; a bulk-load mode defers writes into hash-bucketed
//! staging files and replays them afterwards.

mod cache;
mod entry;
mod error;
mod lru;
mod staging;
mod store;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use cache::{AttrCache, AttrCacheBuilder, CacheConfig, CacheStats};
pub use error::{Error, Result};
pub use store::{BackingStore, StoreError, StoreResult};
