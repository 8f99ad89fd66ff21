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

use crate::{
    class::PoolClass,
    error::Result,
    pool::{BlockToken, Pool, PoolStats},
};

/// The server's pools, one per size class.
///
/// The registry is a plain owned value: the top-level server context owns one
/// and hands it to the components that allocate. There is no process-wide
/// pool table.
pub struct PoolRegistry {
    pools: Vec<Pool>,
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolRegistry {
    /// Create a registry holding every size class in [`PoolClass::ALL`].
    pub fn new() -> Self {
        Self {
            pools: PoolClass::ALL.iter().map(|class| Pool::new(*class)).collect(),
        }
    }

    /// The pool serving `class`.
    pub fn pool(&self, class: PoolClass) -> &Pool {
        &self.pools[class.index() as usize]
    }

    /// The pool serving `class`, for allocation and free.
    pub fn pool_mut(&mut self, class: PoolClass) -> &mut Pool {
        &mut self.pools[class.index() as usize]
    }

    /// Allocate a block of `class`.
    pub fn alloc(&mut self, class: PoolClass, tag: &'static str) -> Result<BlockToken> {
        self.pool_mut(class).alloc(tag)
    }

    /// Free a block back into its `class` pool.
    pub fn free(&mut self, class: PoolClass, block: BlockToken) -> Result<()> {
        self.pool_mut(class).free(block)
    }

    /// Counters for every pool, in pool-index order.
    pub fn stats(&self) -> Vec<PoolStats> {
        self.pools.iter().map(|pool| pool.stats()).collect()
    }

    /// Run [`Pool::verify`] on every pool. Returns the total number of blocks
    /// verified across all chains.
    pub fn verify_all(&mut self, tag: &'static str) -> usize {
        self.pools.iter_mut().map(|pool| pool.verify(tag)).sum()
    }

    /// Run [`Pool::reset`] on every pool.
    pub fn reset_all(&mut self) {
        for pool in &mut self.pools {
            pool.reset();
        }
    }
}
