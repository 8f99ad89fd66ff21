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

//! End-to-end exercise of the public facade: pools and cache together, the
//! way the surrounding server drives them.

use attic::prelude::*;
use attic_cache::test_utils::MemStore;

#[test_log::test]
fn test_server_startup_shape() {
    // The server context owns one registry and one cache.
    let mut pools = PoolRegistry::new();
    let store = MemStore::default();
    let cache = AttrCache::<MemStore>::builder()
        .with_capacity(32 * 1024)
        .build(store.clone());

    // Scratch buffers come from the pools while attributes flow through the
    // cache.
    let buf = pools.alloc(PoolClass::OutputBuf, "startup").unwrap();
    let key = AttrKey::new(1, 40);
    cache.put(&key, b"Welcome to the attic.").unwrap();
    assert_eq!(
        cache.get(&key).unwrap().as_deref(),
        Some(b"Welcome to the attic.".as_slice())
    );
    pools.free(PoolClass::OutputBuf, buf).unwrap();

    assert_eq!(pools.stats().iter().map(|s| s.in_use).sum::<u64>(), 0);
    assert_eq!(cache.stats().hits, 1);
    cache.sync().unwrap();
    assert_eq!(store.sync_count(), 1);
}

#[test_log::test]
fn test_offline_import_flow() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemStore::default();
    let cache = AttrCache::<MemStore>::builder()
        .with_capacity(32 * 1024)
        .with_staging_buckets(8)
        .build(store.clone());

    cache.enter_bulk_load(dir.path()).unwrap();
    for object in 0..100 {
        let key = AttrKey::new(object, 1);
        cache.put(&key, format!("attribute {object}").as_bytes()).unwrap();
    }
    // Rewrites during the import are resolved by replay order.
    cache.put(&AttrKey::new(7, 1), b"rewritten").unwrap();
    cache.replay_bulk_load().unwrap();

    assert_eq!(
        cache.get(&AttrKey::new(7, 1)).unwrap().as_deref(),
        Some(b"rewritten".as_slice())
    );
    assert_eq!(
        cache.get(&AttrKey::new(42, 1)).unwrap().as_deref(),
        Some(b"attribute 42".as_slice())
    );
    for object in 0..100 {
        assert_eq!(store.values_for_key(&AttrKey::new(object, 1)).len(), 1);
    }
}
