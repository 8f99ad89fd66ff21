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

/// Pool allocator error.
///
/// Corruption events are logged where they are detected and reported through
/// these variants; none of them leaves the pool in an inconsistent state.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The block header's magic does not match the owning pool. The block's
    /// accounting is written off and the block is treated as gone.
    #[error("corrupted block header in pool {pool} (tag {tag})")]
    CorruptedHeader {
        /// Pool name.
        pool: &'static str,
        /// Tag stamped on the block at allocation, if readable.
        tag: &'static str,
    },
    /// The block footer's magic does not match the owning pool. Self-healing:
    /// the footer is repaired in place and the operation continues.
    #[error("corrupted block footer in pool {pool} (tag {tag})")]
    CorruptedFooter {
        /// Pool name.
        pool: &'static str,
        /// Tag stamped on the block at allocation.
        tag: &'static str,
    },
    /// The block was freed into a pool of a different size class. The free is
    /// refused and the block leaks, still chained to its owning pool.
    #[error("freeing block of size {size} into pool {pool} (payload size {expected})")]
    SizeMismatch {
        /// Pool name.
        pool: &'static str,
        /// Declared payload size of the block being freed.
        size: usize,
        /// Payload size served by the pool.
        expected: usize,
    },
    /// The block is already on the free list. The pool is left untouched.
    #[error("double free of block in pool {pool} (tag {tag})")]
    DoubleFree {
        /// Pool name.
        pool: &'static str,
        /// Tag stamped on the block at allocation.
        tag: &'static str,
    },
    /// The system allocator refused the request. Surfaced as a typed error so
    /// the caller decides; never aborts the process.
    #[error("out of memory growing pool {pool} by {bytes} bytes")]
    OutOfMemory {
        /// Pool name.
        pool: &'static str,
        /// Size of the refused request.
        bytes: usize,
    },
}

/// Pool allocator result.
pub type Result<T> = std::result::Result<T, Error>;
