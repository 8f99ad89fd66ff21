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

use crate::store::StoreError;

/// Attribute cache error.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Failure propagated opaquely from the backing store.
    #[error("backing store error: {0}")]
    Store(StoreError),
    /// I/O failure on a bulk-load staging file.
    #[error("staging i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// `enter_bulk_load` was called while a bulk load is already active.
    #[error("bulk load already active")]
    BulkLoadActive,
    /// `replay_bulk_load` was called with no bulk load in progress.
    #[error("no bulk load in progress")]
    NotBulkLoading,
    /// Other error.
    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Wrap a backing store failure.
    pub fn store(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// Attribute cache result.
pub type Result<T> = std::result::Result<T, Error>;
