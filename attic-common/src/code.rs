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

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

/// Maximum length of a stored attribute value in bytes.
///
/// Values longer than the cap are silently truncated before they are encoded
/// into a record. The cap bounds both the on-disk record size and the cost of
/// a single cache entry.
pub const MAX_VALUE_LEN: usize = 8192;

/// Composite key of one attribute value: the owning object and the attribute
/// number on that object.
///
/// The encoded form is fixed-width (8 bytes, little-endian) so that records
/// and staging files are byte-identical across hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttrKey {
    /// Object id.
    pub object: u32,
    /// Attribute id on the object.
    pub attr: u32,
}

impl AttrKey {
    /// Encoded width of a key in a record.
    pub const ENCODED_LEN: usize = 8;

    /// Create a key from its two fields.
    pub fn new(object: u32, attr: u32) -> Self {
        Self { object, attr }
    }

    /// Append the fixed-width encoding of the key to `buf`.
    pub fn write(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.object);
        buf.put_u32_le(self.attr);
    }

    /// Decode a key from the front of `buf`, advancing it.
    pub fn read(buf: &mut impl Buf) -> Self {
        let object = buf.get_u32_le();
        let attr = buf.get_u32_le();
        Self { object, attr }
    }
}

/// Encode a backing-store record: the fixed-width key, the value bytes
/// (truncated at [`MAX_VALUE_LEN`]), and a terminating NUL.
pub fn encode_record(key: &AttrKey, value: &[u8]) -> Vec<u8> {
    let value = &value[..value.len().min(MAX_VALUE_LEN)];
    let mut buf = Vec::with_capacity(AttrKey::ENCODED_LEN + value.len() + 1);
    key.write(&mut buf);
    buf.put_slice(value);
    buf.put_u8(0);
    buf
}

/// Decode a backing-store record into its key and value.
///
/// Returns `None` if the record is shorter than an encoded key. A trailing
/// NUL terminator is stripped when present; records written without one are
/// accepted and the value runs to the end of the record.
pub fn decode_record(record: &[u8]) -> Option<(AttrKey, Vec<u8>)> {
    if record.len() < AttrKey::ENCODED_LEN {
        return None;
    }
    let mut buf = record;
    let key = AttrKey::read(&mut buf);
    let value = match buf.last() {
        Some(0) => &buf[..buf.len() - 1],
        _ => buf,
    };
    Some((key, value.to_vec()))
}
