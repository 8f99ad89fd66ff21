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

//! Test utilities.

use std::sync::Arc;

use attic_common::{
    code::{decode_record, encode_record, AttrKey},
    hash::attr_hash,
};
use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::store::{BackingStore, StoreResult};

/// Hash-bucketed in-memory [`BackingStore`].
///
/// Clones share the same underlying buckets, so a test can hand one clone to
/// the cache and keep another to inspect the stored records. Like the real
/// store, key uniqueness is not enforced.
#[derive(Clone, Default)]
pub struct MemStore {
    inner: Arc<Mutex<MemStoreInner>>,
}

#[derive(Default)]
struct MemStoreInner {
    buckets: HashMap<u32, Vec<Vec<u8>>>,
    syncs: u64,
}

/// Position of one record within a [`MemStore`] bucket.
#[derive(Debug, Clone, Copy)]
pub struct MemCursor {
    hash: u32,
    index: usize,
}

impl BackingStore for MemStore {
    type Cursor = MemCursor;

    fn find_first(&mut self, hash: u32) -> StoreResult<Option<MemCursor>> {
        let inner = self.inner.lock();
        Ok(inner
            .buckets
            .get(&hash)
            .filter(|bucket| !bucket.is_empty())
            .map(|_| MemCursor { hash, index: 0 }))
    }

    fn find_next(&mut self, cursor: &MemCursor, hash: u32) -> StoreResult<Option<MemCursor>> {
        let inner = self.inner.lock();
        let len = inner.buckets.get(&hash).map(|b| b.len()).unwrap_or(0);
        let index = cursor.index + 1;
        Ok((index < len).then_some(MemCursor { hash, index }))
    }

    fn copy(&mut self, cursor: &MemCursor) -> StoreResult<Vec<u8>> {
        self.inner
            .lock()
            .buckets
            .get(&cursor.hash)
            .and_then(|bucket| bucket.get(cursor.index))
            .cloned()
            .ok_or_else(|| "cursor out of range".into())
    }

    fn insert(&mut self, hash: u32, record: &[u8]) -> StoreResult<()> {
        self.inner
            .lock()
            .buckets
            .entry(hash)
            .or_default()
            .push(record.to_vec());
        Ok(())
    }

    fn remove(&mut self, cursor: MemCursor) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let bucket = inner
            .buckets
            .get_mut(&cursor.hash)
            .ok_or("no such bucket")?;
        if cursor.index >= bucket.len() {
            return Err("cursor out of range".into());
        }
        bucket.remove(cursor.index);
        Ok(())
    }

    fn sync(&mut self) -> StoreResult<()> {
        self.inner.lock().syncs += 1;
        Ok(())
    }
}

impl MemStore {
    /// Insert a record for `key` in its own hash bucket, bypassing the cache.
    pub fn seed(&self, key: &AttrKey, value: &[u8]) {
        self.seed_at(attr_hash(key), key, value);
    }

    /// Insert a record for `key` into an arbitrary bucket, simulating a hash
    /// collision.
    pub fn seed_at(&self, hash: u32, key: &AttrKey, value: &[u8]) {
        self.inner
            .lock()
            .buckets
            .entry(hash)
            .or_default()
            .push(encode_record(key, value));
    }

    /// Decoded values of every record for `key`, across all buckets.
    pub fn values_for_key(&self, key: &AttrKey) -> Vec<Vec<u8>> {
        let inner = self.inner.lock();
        inner
            .buckets
            .values()
            .flatten()
            .filter_map(|record| decode_record(record))
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v)
            .collect()
    }

    /// Decoded values of every record for `key` within one bucket.
    pub fn values_at(&self, hash: u32, key: &AttrKey) -> Vec<Vec<u8>> {
        let inner = self.inner.lock();
        inner
            .buckets
            .get(&hash)
            .into_iter()
            .flatten()
            .filter_map(|record| decode_record(record))
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v)
            .collect()
    }

    /// Number of durability requests received.
    pub fn sync_count(&self) -> u64 {
        self.inner.lock().syncs
    }
}
