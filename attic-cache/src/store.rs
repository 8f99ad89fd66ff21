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

/// Opaque failure raised by a [`BackingStore`] implementation.
pub type StoreError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias for [`BackingStore`] operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The persistent keyed record store the cache sits in front of.
///
/// The store is hash-bucketed: every operation addresses the bucket of a
/// 32-bit key hash, and a bucket may legally hold records for several distinct
/// keys whose hashes collide, as well as stale duplicates for one key — the
/// store does not enforce key uniqueness; the cache layer does.
///
/// Scans walk one bucket through [`BackingStore::Cursor`] values. A cursor is
/// invalidated by [`BackingStore::remove`]; after a removal the caller
/// restarts the scan from [`BackingStore::find_first`].
pub trait BackingStore {
    /// Position of one record within a hash bucket.
    type Cursor;

    /// Position of the first record in the bucket of `hash`, if any.
    fn find_first(&mut self, hash: u32) -> StoreResult<Option<Self::Cursor>>;

    /// Position of the record following `cursor` within the bucket of
    /// `hash`, if any.
    fn find_next(&mut self, cursor: &Self::Cursor, hash: u32) -> StoreResult<Option<Self::Cursor>>;

    /// Copy out the record at `cursor`.
    fn copy(&mut self, cursor: &Self::Cursor) -> StoreResult<Vec<u8>>;

    /// Append a record to the bucket of `hash`.
    fn insert(&mut self, hash: u32, record: &[u8]) -> StoreResult<()>;

    /// Remove the record at `cursor`, consuming it. Any other outstanding
    /// cursor into the same bucket is invalidated.
    fn remove(&mut self, cursor: Self::Cursor) -> StoreResult<()>;

    /// Make every completed insert and remove durable.
    fn sync(&mut self) -> StoreResult<()>;
}
