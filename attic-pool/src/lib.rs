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

//! Size-class pool allocation for the attic storage layer.
//!
//! A [`Pool`] serves fixed-size buffers for one size class, bracketing every
//! block with a magic-checked header and footer and stamping freed payloads
//! with a tombstone word. Corruption is detected, logged, and contained; it is
//! never allowed to unwind into the caller's logic. The [`PoolRegistry`] owns
//! one pool per server size class and reports aggregate statistics.

mod class;
mod error;
mod pool;
mod registry;

pub use class::PoolClass;
pub use error::{Error, Result};
pub use pool::{BlockToken, Pool, PoolStats};
pub use registry::PoolRegistry;
