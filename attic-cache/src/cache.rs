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

use std::path::Path;

use attic_common::{
    code::{decode_record, encode_record, AttrKey, MAX_VALUE_LEN},
    hash::attr_hash,
    slab::{Slab, Token},
};
use hashbrown::hash_table::{Entry as HashTableEntry, HashTable};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    entry::CacheEntry,
    error::{Error, Result},
    lru::LruList,
    staging::Staging,
    store::BackingStore,
};

/// Attribute cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Total byte budget across all cached entries, payload plus per-entry
    /// overhead.
    pub capacity: usize,
    /// Values longer than this are silently truncated before storage. Capped
    /// by [`MAX_VALUE_LEN`].
    pub max_value_len: usize,
    /// Number of bulk-load staging buckets; rounded up to a power of two.
    pub staging_buckets: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 256 * 1024,
            max_value_len: MAX_VALUE_LEN,
            staging_buckets: 16,
        }
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    /// Lookups that were answered from the cache.
    pub hits: u64,
    /// Lookups that went to the backing store.
    pub misses: u64,
    /// Completed `put` operations (staged or stored).
    pub writes: u64,
    /// Completed `delete` operations.
    pub deletes: u64,
    /// Entries removed to stay within the byte budget.
    pub evictions: u64,
    /// Durability requests forwarded to the backing store.
    pub syncs: u64,
    /// Entries currently cached.
    pub entries: usize,
    /// Aggregate byte cost of all cached entries.
    pub size: usize,
    /// Configured byte budget.
    pub capacity: usize,
}

/// Builder for [`AttrCache`].
#[derive(Debug, Default)]
pub struct AttrCacheBuilder {
    config: CacheConfig,
}

impl AttrCacheBuilder {
    /// Builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the byte budget.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Set the per-value length cap.
    pub fn with_max_value_len(mut self, max_value_len: usize) -> Self {
        self.config.max_value_len = max_value_len.min(MAX_VALUE_LEN);
        self
    }

    /// Set the bulk-load staging bucket count.
    pub fn with_staging_buckets(mut self, staging_buckets: usize) -> Self {
        self.config.staging_buckets = staging_buckets;
        self
    }

    /// Build the cache in front of `store`.
    pub fn build<S>(self, store: S) -> AttrCache<S>
    where
        S: BackingStore,
    {
        AttrCache::new(store, self.config)
    }
}

enum Mode {
    Normal,
    BulkLoad(Staging),
}

struct CacheCore<S> {
    store: S,
    config: CacheConfig,
    entries: Slab<CacheEntry>,
    index: HashTable<Token>,
    lru: LruList,
    size: usize,
    mode: Mode,
    hits: u64,
    misses: u64,
    writes: u64,
    deletes: u64,
    evictions: u64,
    syncs: u64,
}

/// LRU-ordered, hash-indexed, byte-budgeted cache of attribute values in
/// front of a [`BackingStore`].
///
/// Every `put` and `delete` is applied to the store synchronously before the
/// cache is updated, so the cache never holds unflushed state. One mutex
/// guards the index, the recency list, the aggregate size, and the bulk-load
/// mode together; each logical operation holds it end to end.
pub struct AttrCache<S>
where
    S: BackingStore,
{
    inner: Mutex<CacheCore<S>>,
}

impl<S> AttrCache<S>
where
    S: BackingStore,
{
    /// Create a cache over `store` with `config`.
    pub fn new(store: S, config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(CacheCore {
                store,
                config,
                entries: Slab::new(),
                index: HashTable::new(),
                lru: LruList::default(),
                size: 0,
                mode: Mode::Normal,
                hits: 0,
                misses: 0,
                writes: 0,
                deletes: 0,
                evictions: 0,
                syncs: 0,
            }),
        }
    }

    /// Builder with default configuration.
    pub fn builder() -> AttrCacheBuilder {
        AttrCacheBuilder::new()
    }

    /// Look up the value for `key`.
    ///
    /// A hit promotes the entry to most recently used. A miss consults the
    /// backing store and, outside bulk-load mode, caches the result, evicting
    /// least recently used entries until the byte budget holds. The store's
    /// value is returned whether or not it was cached.
    pub fn get(&self, key: &AttrKey) -> Result<Option<Vec<u8>>> {
        self.inner.lock().get(key)
    }

    /// Write the value for `key`.
    ///
    /// In bulk-load mode the record is buffered into a staging bucket and the
    /// store and cache are untouched. Otherwise every stale store record for
    /// `key` is removed, the fresh record inserted, and the cache entry
    /// replaced.
    pub fn put(&self, key: &AttrKey, value: &[u8]) -> Result<()> {
        self.inner.lock().put(key, value)
    }

    /// Remove `key` from the backing store and the cache.
    pub fn delete(&self, key: &AttrKey) -> Result<()> {
        self.inner.lock().delete(key)
    }

    /// Forward a durability request to the backing store.
    pub fn sync(&self) -> Result<()> {
        self.inner.lock().sync()
    }

    /// Switch `put` into bulk-load buffering, staging writes under `dir`.
    ///
    /// Errors with [`Error::BulkLoadActive`] if a bulk load is already in
    /// progress.
    pub fn enter_bulk_load(&self, dir: impl AsRef<Path>) -> Result<()> {
        let mut core = self.inner.lock();
        if matches!(core.mode, Mode::BulkLoad(_)) {
            return Err(Error::BulkLoadActive);
        }
        let staging = Staging::create(dir.as_ref(), core.config.staging_buckets)?;
        tracing::info!(
            dir = %staging.dir().display(),
            "[cache]: entering bulk load"
        );
        core.mode = Mode::BulkLoad(staging);
        Ok(())
    }

    /// Replay every staged record through the normal `put` path and return to
    /// normal mode.
    ///
    /// Buckets are consumed and deleted one at a time, in append order, so
    /// the last staged write for a key wins — the same outcome the records
    /// would have had through non-buffered `put`s. Errors with
    /// [`Error::NotBulkLoading`] if no bulk load is in progress; a store
    /// failure aborts the replay and leaves the unconsumed buckets on disk.
    pub fn replay_bulk_load(&self) -> Result<()> {
        let mut core = self.inner.lock();
        let staging = match std::mem::replace(&mut core.mode, Mode::Normal) {
            Mode::BulkLoad(staging) => staging,
            Mode::Normal => return Err(Error::NotBulkLoading),
        };
        for bucket in staging.into_buckets()? {
            for record in bucket.records()? {
                let record = record?;
                match decode_record(&record) {
                    Some((key, value)) => core.put(&key, &value)?,
                    None => {
                        tracing::warn!(
                            path = %bucket.path().display(),
                            "[cache]: undecodable staged record skipped"
                        );
                    }
                }
            }
            bucket.delete()?;
        }
        tracing::info!("[cache]: bulk load replayed");
        Ok(())
    }

    /// Drop every cached entry. The backing store is untouched.
    pub fn clear(&self) {
        let mut core = self.inner.lock();
        core.index.clear();
        core.lru.clear();
        core.entries.drain().for_each(drop);
        core.size = 0;
    }

    /// Current cache counters.
    pub fn stats(&self) -> CacheStats {
        let core = self.inner.lock();
        CacheStats {
            hits: core.hits,
            misses: core.misses,
            writes: core.writes,
            deletes: core.deletes,
            evictions: core.evictions,
            syncs: core.syncs,
            entries: core.lru.len(),
            size: core.size,
            capacity: core.config.capacity,
        }
    }
}

#[cfg(any(test, feature = "test_utils"))]
impl<S> AttrCache<S>
where
    S: BackingStore,
{
    /// Whether `key` currently has a cache entry, without touching recency or
    /// the backing store.
    pub fn contains_cached(&self, key: &AttrKey) -> bool {
        let core = self.inner.lock();
        core.find_token(attr_hash(key), key).is_some()
    }

    /// Recompute the aggregate size from the entries, for invariant checks.
    pub fn recomputed_size(&self) -> usize {
        let core = self.inner.lock();
        core.entries.iter().map(|(_, e)| e.cost()).sum()
    }
}

impl<S> CacheCore<S>
where
    S: BackingStore,
{
    fn get(&mut self, key: &AttrKey) -> Result<Option<Vec<u8>>> {
        let hash = attr_hash(key);
        if let Some(token) = self.find_token(hash, key) {
            self.hits += 1;
            self.lru.touch(&mut self.entries, token);
            let value = self.entries.get(token).map(|e| e.value.to_vec());
            return Ok(value);
        }
        self.misses += 1;

        let found = self.lookup_store(hash, key)?;
        if let Some(value) = &found {
            if matches!(self.mode, Mode::Normal) {
                self.fill(key, hash, value.clone());
            }
        }
        Ok(found)
    }

    fn put(&mut self, key: &AttrKey, value: &[u8]) -> Result<()> {
        let hash = attr_hash(key);
        let cap = self.config.max_value_len.min(MAX_VALUE_LEN);
        let value = &value[..value.len().min(cap)];
        self.writes += 1;

        if let Mode::BulkLoad(staging) = &mut self.mode {
            let record = encode_record(key, value);
            staging.append(hash, &record)?;
            return Ok(());
        }

        // The store does not enforce key uniqueness: sweep every stale
        // record for this key before inserting the fresh one.
        self.remove_store_records(hash, key)?;
        let record = encode_record(key, value);
        self.store.insert(hash, &record).map_err(Error::store)?;
        self.fill(key, hash, value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &AttrKey) -> Result<()> {
        let hash = attr_hash(key);
        self.deletes += 1;
        self.remove_store_records(hash, key)?;
        if let Some(token) = self.find_token(hash, key) {
            self.invalidate(token);
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.syncs += 1;
        self.store.sync().map_err(Error::store)
    }

    /// Scan the bucket of `hash` for the record whose key is exactly `key`.
    fn lookup_store(&mut self, hash: u32, key: &AttrKey) -> Result<Option<Vec<u8>>> {
        let mut cursor = self.store.find_first(hash).map_err(Error::store)?;
        while let Some(cur) = cursor {
            let record = self.store.copy(&cur).map_err(Error::store)?;
            if let Some((k, value)) = decode_record(&record) {
                if k == *key {
                    return Ok(Some(value));
                }
            }
            cursor = self.store.find_next(&cur, hash).map_err(Error::store)?;
        }
        Ok(None)
    }

    /// Remove every store record whose key is exactly `key`. Removal
    /// invalidates cursors, so the scan restarts after each hit.
    fn remove_store_records(&mut self, hash: u32, key: &AttrKey) -> Result<usize> {
        let mut removed = 0;
        'restart: loop {
            let mut cursor = self.store.find_first(hash).map_err(Error::store)?;
            while let Some(cur) = cursor {
                let record = self.store.copy(&cur).map_err(Error::store)?;
                let matches = decode_record(&record).is_some_and(|(k, _)| k == *key);
                if matches {
                    self.store.remove(cur).map_err(Error::store)?;
                    removed += 1;
                    continue 'restart;
                }
                cursor = self.store.find_next(&cur, hash).map_err(Error::store)?;
            }
            return Ok(removed);
        }
    }

    /// Insert a fresh entry for `key`, replacing any existing one, then evict
    /// from the LRU end until the budget holds.
    fn fill(&mut self, key: &AttrKey, hash: u32, value: Vec<u8>) {
        if let Some(token) = self.find_token(hash, key) {
            self.invalidate(token);
        }
        let entry = CacheEntry::new(*key, hash, value);
        let cost = entry.cost();
        let token = self.entries.insert(entry);
        self.index_insert(hash, token);
        self.lru.push_mru(&mut self.entries, token);
        self.size += cost;
        self.evict_to_budget();
    }

    fn evict_to_budget(&mut self) {
        while self.size > self.config.capacity {
            let Some(token) = self.lru.pop_lru(&mut self.entries) else {
                break;
            };
            let Some((hash, key)) = self.entries.get(token).map(|e| (e.hash, e.key)) else {
                continue;
            };
            self.index_remove(hash, &key);
            if let Some(entry) = self.entries.remove(token) {
                self.size -= entry.cost();
                self.evictions += 1;
                tracing::trace!(
                    object = entry.key.object,
                    attr = entry.key.attr,
                    cost = entry.cost(),
                    "[cache]: evicted"
                );
            }
        }
    }

    /// Remove one entry from both views and the arena.
    fn invalidate(&mut self, token: Token) {
        let Some((hash, key)) = self.entries.get(token).map(|e| (e.hash, e.key)) else {
            return;
        };
        self.index_remove(hash, &key);
        self.lru.unlink(&mut self.entries, token);
        if let Some(entry) = self.entries.remove(token) {
            self.size -= entry.cost();
        }
    }

    fn find_token(&self, hash: u32, key: &AttrKey) -> Option<Token> {
        self.index
            .find(hash as u64, |t| {
                self.entries.get(*t).is_some_and(|e| e.key == *key)
            })
            .copied()
    }

    fn index_insert(&mut self, hash: u32, token: Token) {
        let CacheCore { index, entries, .. } = self;
        index.insert_unique(hash as u64, token, |t| {
            entries.get(*t).map(|e| e.hash as u64).unwrap_or(0)
        });
    }

    fn index_remove(&mut self, hash: u32, key: &AttrKey) -> Option<Token> {
        let CacheCore { index, entries, .. } = self;
        match index.entry(
            hash as u64,
            |t| entries.get(*t).is_some_and(|e| e.key == *key),
            |t| entries.get(*t).map(|e| e.hash as u64).unwrap_or(0),
        ) {
            HashTableEntry::Occupied(o) => {
                let (token, _) = o.remove();
                Some(token)
            }
            HashTableEntry::Vacant(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MemStore;

    fn key(i: u32) -> AttrKey {
        AttrKey::new(i, 1)
    }

    fn entry_cost(value_len: usize) -> usize {
        std::mem::size_of::<CacheEntry>() + value_len
    }

    fn cache_with_budget(entries: usize, value_len: usize) -> (AttrCache<MemStore>, MemStore) {
        let store = MemStore::default();
        let cache = AttrCache::<MemStore>::builder()
            .with_capacity(entries * entry_cost(value_len))
            .build(store.clone());
        (cache, store)
    }

    #[test]
    fn test_put_get_coherence() {
        let (cache, store) = cache_with_budget(16, 8);
        let k = key(1);

        cache.put(&k, b"aaaaaaaa").unwrap();
        assert_eq!(cache.get(&k).unwrap(), Some(b"aaaaaaaa".to_vec()));

        // Overwrite: the store must end up with exactly one record for the
        // key, no stale duplicate left behind.
        cache.put(&k, b"bbbbbbbb").unwrap();
        assert_eq!(cache.get(&k).unwrap(), Some(b"bbbbbbbb".to_vec()));
        assert_eq!(store.values_for_key(&k).len(), 1);
    }

    #[test]
    fn test_get_miss_fills_cache() {
        let (cache, store) = cache_with_budget(16, 8);
        let k = key(7);
        store.seed(&k, b"seeded!!");

        assert!(!cache.contains_cached(&k));
        assert_eq!(cache.get(&k).unwrap(), Some(b"seeded!!".to_vec()));
        assert!(cache.contains_cached(&k));
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);

        assert_eq!(cache.get(&k).unwrap(), Some(b"seeded!!".to_vec()));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_get_absent_key() {
        let (cache, _store) = cache_with_budget(4, 8);
        assert_eq!(cache.get(&key(99)).unwrap(), None);
        assert!(!cache.contains_cached(&key(99)));
    }

    #[test]
    fn test_lru_promotion_protects_recently_read() {
        // Budget fits only two entries.
        let (cache, _store) = cache_with_budget(2, 8);
        let (a, b, c, d) = (key(1), key(2), key(3), key(4));

        cache.put(&a, b"aaaaaaaa").unwrap();
        cache.put(&b, b"bbbbbbbb").unwrap();
        cache.put(&c, b"cccccccc").unwrap(); // evicts a
        assert!(!cache.contains_cached(&a));

        // Re-reading a refills it from the store, evicting b.
        assert_eq!(cache.get(&a).unwrap(), Some(b"aaaaaaaa".to_vec()));
        assert!(!cache.contains_cached(&b));

        // Inserting d evicts c, not the recently touched a.
        cache.put(&d, b"dddddddd").unwrap();
        assert!(cache.contains_cached(&a));
        assert!(cache.contains_cached(&d));
        assert!(!cache.contains_cached(&c));
    }

    #[test]
    fn test_budget_never_exceeded() {
        let (cache, _store) = cache_with_budget(3, 16);
        let budget = cache.stats().capacity;
        for i in 0..32 {
            let len = (i % 17) as usize;
            cache.put(&key(i), &vec![b'x'; len]).unwrap();
            let stats = cache.stats();
            assert!(stats.size <= budget);
            assert_eq!(stats.size, cache.recomputed_size());
        }
        assert!(cache.stats().evictions > 0);
    }

    #[test]
    fn test_one_oversized_put_evicts_many() {
        let (cache, _store) = cache_with_budget(8, 4);
        for i in 0..8 {
            cache.put(&key(i), b"pppp").unwrap();
        }
        assert_eq!(cache.stats().entries, 8);

        // A single large value forces many small entries out.
        let big = vec![b'y'; 6 * entry_cost(4)];
        cache.put(&key(100), &big).unwrap();
        let stats = cache.stats();
        assert!(stats.size <= stats.capacity);
        assert!(stats.entries < 8);
        assert!(cache.contains_cached(&key(100)));
    }

    #[test]
    fn test_delete_removes_both_views() {
        let (cache, store) = cache_with_budget(8, 8);
        let k = key(5);
        cache.put(&k, b"value!!!").unwrap();
        cache.delete(&k).unwrap();

        assert!(!cache.contains_cached(&k));
        assert!(store.values_for_key(&k).is_empty());
        assert_eq!(cache.get(&k).unwrap(), None);
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn test_put_sweeps_stale_duplicates() {
        let (cache, store) = cache_with_budget(8, 8);
        let k = key(6);
        // Seed duplicate records for the same key, as a buggy older writer
        // could have left behind.
        store.seed(&k, b"stale-1");
        store.seed(&k, b"stale-2");

        cache.put(&k, b"fresh!!!").unwrap();
        assert_eq!(store.values_for_key(&k).len(), 1);
        assert_eq!(cache.get(&k).unwrap(), Some(b"fresh!!!".to_vec()));
    }

    #[test]
    fn test_value_truncated_at_cap() {
        let store = MemStore::default();
        let cache = AttrCache::<MemStore>::builder()
            .with_capacity(1024)
            .with_max_value_len(8)
            .build(store);
        let k = key(8);
        cache.put(&k, b"0123456789abcdef").unwrap();
        assert_eq!(cache.get(&k).unwrap(), Some(b"01234567".to_vec()));
    }

    #[test]
    fn test_sync_forwards_to_store() {
        let (cache, store) = cache_with_budget(4, 8);
        cache.sync().unwrap();
        cache.sync().unwrap();
        assert_eq!(store.sync_count(), 2);
        assert_eq!(cache.stats().syncs, 2);
    }

    #[test_log::test]
    fn test_bulk_load_defers_store_writes() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, store) = cache_with_budget(8, 8);
        let k = key(10);

        cache.enter_bulk_load(dir.path()).unwrap();
        cache.put(&k, b"staged!!").unwrap();
        // Nothing hits the store or the cache while staging.
        assert!(store.values_for_key(&k).is_empty());
        assert!(!cache.contains_cached(&k));

        cache.replay_bulk_load().unwrap();
        assert_eq!(store.values_for_key(&k).len(), 1);
        assert_eq!(cache.get(&k).unwrap(), Some(b"staged!!".to_vec()));
    }

    #[test_log::test]
    fn test_bulk_load_replay_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, store) = cache_with_budget(8, 8);
        let k = key(11);

        cache.enter_bulk_load(dir.path()).unwrap();
        cache.put(&k, b"one").unwrap();
        cache.put(&k, b"two").unwrap();
        cache.put(&k, b"three").unwrap();
        cache.replay_bulk_load().unwrap();

        assert_eq!(store.values_for_key(&k).len(), 1);
        assert_eq!(cache.get(&k).unwrap(), Some(b"three".to_vec()));
    }

    #[test]
    fn test_bulk_load_mode_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _store) = cache_with_budget(8, 8);

        assert!(matches!(
            cache.replay_bulk_load().unwrap_err(),
            Error::NotBulkLoading
        ));
        cache.enter_bulk_load(dir.path()).unwrap();
        assert!(matches!(
            cache.enter_bulk_load(dir.path()).unwrap_err(),
            Error::BulkLoadActive
        ));
        cache.replay_bulk_load().unwrap();
        // A fresh bulk load can start after replay.
        cache.enter_bulk_load(dir.path()).unwrap();
        cache.replay_bulk_load().unwrap();
    }

    #[test]
    fn test_get_during_bulk_load_does_not_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, store) = cache_with_budget(8, 8);
        let k = key(12);
        store.seed(&k, b"on-disk!");

        cache.enter_bulk_load(dir.path()).unwrap();
        // The store is still consulted and the value returned, but no entry
        // is inserted while staging is active.
        assert_eq!(cache.get(&k).unwrap(), Some(b"on-disk!".to_vec()));
        assert!(!cache.contains_cached(&k));
        cache.replay_bulk_load().unwrap();
    }

    #[test]
    fn test_clear_drops_entries_not_store() {
        let (cache, store) = cache_with_budget(8, 8);
        let k = key(13);
        cache.put(&k, b"persist!").unwrap();
        cache.clear();
        assert!(!cache.contains_cached(&k));
        assert_eq!(cache.stats().size, 0);
        assert_eq!(store.values_for_key(&k).len(), 1);
        assert_eq!(cache.get(&k).unwrap(), Some(b"persist!".to_vec()));
    }

    #[test]
    fn test_hash_collisions_resolved_by_full_key() {
        let (cache, store) = cache_with_budget(8, 8);
        let (k1, k2) = (key(20), key(21));
        // Force both keys into one store bucket regardless of their hashes.
        store.seed_at(attr_hash(&k1), &k2, b"other!!!");

        cache.put(&k1, b"mine!!!!").unwrap();
        assert_eq!(cache.get(&k1).unwrap(), Some(b"mine!!!!".to_vec()));
        // The colliding record for the other key is untouched.
        assert_eq!(
            store.values_at(attr_hash(&k1), &k2),
            vec![b"other!!!".to_vec()]
        );
    }
}
