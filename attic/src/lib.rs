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

//! attic - attribute cache and pool allocation for persistent virtual worlds.
//!
//! The storage layer behind a multi-user virtual-world server: a size-class
//! pool allocator with self-checking block headers, and an LRU, byte-budgeted,
//! write-back attribute cache in front of a slower keyed record store.
//!
//! # Example
//!
//! ```
//! use attic::prelude::*;
//! use attic_cache::test_utils::MemStore;
//!
//! let cache = AttrCache::<MemStore>::builder()
//!     .with_capacity(64 * 1024)
//!     .build(MemStore::default());
//!
//! let key = AttrKey::new(4201, 7);
//! cache.put(&key, b"A dusty attic full of old boxes.")?;
//! assert_eq!(
//!     cache.get(&key)?.as_deref(),
//!     Some(b"A dusty attic full of old boxes.".as_slice())
//! );
//! # Ok::<(), attic_cache::Error>(())
//! ```

pub use attic_cache::{
    AttrCache, AttrCacheBuilder, BackingStore, CacheConfig, CacheStats, Error as CacheError,
    StoreError, StoreResult,
};
pub use attic_common::{
    code::{AttrKey, MAX_VALUE_LEN},
    hash::attr_hash,
};
pub use attic_pool::{
    BlockToken, Error as PoolError, Pool, PoolClass, PoolRegistry, PoolStats,
};

/// The commonly used types, re-exported.
pub mod prelude {
    pub use crate::{
        attr_hash, AttrCache, AttrCacheBuilder, AttrKey, BackingStore, BlockToken, CacheConfig,
        CacheStats, Pool, PoolClass, PoolRegistry, PoolStats, MAX_VALUE_LEN,
    };
}
