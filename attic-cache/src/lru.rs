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

use attic_common::slab::{Slab, Token};

use crate::entry::CacheEntry;

/// Doubly linked recency list over arena tokens.
///
/// `head` is the least recently used end, `tail` the most recently used end.
/// The links live inside the entries themselves, so promote and evict are
/// O(1) with no pointer surgery.
#[derive(Default)]
pub(crate) struct LruList {
    head: Option<Token>,
    tail: Option<Token>,
    len: usize,
}

impl LruList {
    pub fn len(&self) -> usize {
        self.len
    }

    /// Link an unlinked entry at the most recently used end.
    pub fn push_mru(&mut self, entries: &mut Slab<CacheEntry>, token: Token) {
        if let Some(entry) = entries.get_mut(token) {
            debug_assert!(entry.prev.is_none() && entry.next.is_none());
            entry.prev = self.tail;
            entry.next = None;
        }
        match self.tail {
            Some(tail) => {
                if let Some(entry) = entries.get_mut(tail) {
                    entry.next = Some(token);
                }
            }
            None => self.head = Some(token),
        }
        self.tail = Some(token);
        self.len += 1;
    }

    /// Unlink an entry from wherever it sits in the list.
    pub fn unlink(&mut self, entries: &mut Slab<CacheEntry>, token: Token) {
        let (prev, next) = match entries.get_mut(token) {
            Some(entry) => (entry.prev.take(), entry.next.take()),
            None => return,
        };
        match prev {
            Some(prev) => {
                if let Some(entry) = entries.get_mut(prev) {
                    entry.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(next) => {
                if let Some(entry) = entries.get_mut(next) {
                    entry.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        self.len -= 1;
    }

    /// Move an entry to the most recently used end.
    pub fn touch(&mut self, entries: &mut Slab<CacheEntry>, token: Token) {
        self.unlink(entries, token);
        self.push_mru(entries, token);
    }

    /// Unlink and return the least recently used entry.
    pub fn pop_lru(&mut self, entries: &mut Slab<CacheEntry>) -> Option<Token> {
        let token = self.head?;
        self.unlink(entries, token);
        Some(token)
    }

    /// Forget every link. The entries themselves are the caller's to drop.
    pub fn clear(&mut self) {
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    /// List contents from LRU to MRU end.
    #[cfg(test)]
    pub fn dump(&self, entries: &Slab<CacheEntry>) -> Vec<Token> {
        let mut out = Vec::with_capacity(self.len);
        let mut cur = self.head;
        while let Some(token) = cur {
            out.push(token);
            cur = entries.get(token).and_then(|e| e.next);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use attic_common::code::AttrKey;
    use attic_common::hash::attr_hash;
    use itertools::Itertools;

    use super::*;

    fn entry(i: u32) -> CacheEntry {
        let key = AttrKey::new(i, 0);
        CacheEntry::new(key, attr_hash(&key), vec![0u8; 8])
    }

    #[test]
    fn test_push_touch_pop() {
        let mut entries = Slab::new();
        let mut lru = LruList::default();

        let tokens = (0..4)
            .map(|i| {
                let token = entries.insert(entry(i));
                lru.push_mru(&mut entries, token);
                token
            })
            .collect_vec();
        assert_eq!(lru.dump(&entries), tokens);

        // Touching the LRU entry moves it to the MRU end.
        lru.touch(&mut entries, tokens[0]);
        assert_eq!(
            lru.dump(&entries),
            vec![tokens[1], tokens[2], tokens[3], tokens[0]]
        );

        assert_eq!(lru.pop_lru(&mut entries), Some(tokens[1]));
        assert_eq!(lru.len(), 3);
        assert_eq!(
            lru.dump(&entries),
            vec![tokens[2], tokens[3], tokens[0]]
        );
    }

    #[test]
    fn test_unlink_middle_and_ends() {
        let mut entries = Slab::new();
        let mut lru = LruList::default();
        let tokens = (0..3)
            .map(|i| {
                let token = entries.insert(entry(i));
                lru.push_mru(&mut entries, token);
                token
            })
            .collect_vec();

        lru.unlink(&mut entries, tokens[1]);
        assert_eq!(lru.dump(&entries), vec![tokens[0], tokens[2]]);
        lru.unlink(&mut entries, tokens[0]);
        assert_eq!(lru.dump(&entries), vec![tokens[2]]);
        lru.unlink(&mut entries, tokens[2]);
        assert!(lru.dump(&entries).is_empty());
        assert_eq!(lru.len(), 0);
        assert_eq!(lru.pop_lru(&mut entries), None);
    }
}
