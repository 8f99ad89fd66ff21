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

use serde::{Deserialize, Serialize};

/// The server's fixed buffer size classes, one pool each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolClass {
    /// Command output and large text assembly buffers.
    OutputBuf,
    /// Player-to-player message buffers.
    MessageBuf,
    /// Object and attribute name buffers.
    NameBuf,
    /// Connection descriptor state buffers.
    DescBuf,
}

impl PoolClass {
    /// Every size class, in pool-index order.
    pub const ALL: [PoolClass; 4] = [
        PoolClass::OutputBuf,
        PoolClass::MessageBuf,
        PoolClass::NameBuf,
        PoolClass::DescBuf,
    ];

    /// Stable pool index, used to derive the pool magic.
    pub fn index(&self) -> u32 {
        match self {
            PoolClass::OutputBuf => 0,
            PoolClass::MessageBuf => 1,
            PoolClass::NameBuf => 2,
            PoolClass::DescBuf => 3,
        }
    }

    /// Pool name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            PoolClass::OutputBuf => "output",
            PoolClass::MessageBuf => "message",
            PoolClass::NameBuf => "name",
            PoolClass::DescBuf => "desc",
        }
    }

    /// Client payload size of the class in bytes.
    pub fn payload_size(&self) -> usize {
        match self {
            PoolClass::OutputBuf => 8192,
            PoolClass::MessageBuf => 512,
            PoolClass::NameBuf => 64,
            PoolClass::DescBuf => 1024,
        }
    }
}
