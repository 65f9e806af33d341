// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Bidirectional cursor over a B-tree bucket
//!
//! The cursor remembers the key it is positioned at rather than an index, so
//! writes to the bucket between moves are seen by the next move.

use super::BucketData;
use crate::bucket::{BucketCursor, Entry};
use std::ops::Bound;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Position {
    /// No move yet
    Unpositioned,
    /// Stepped back past the first key
    BeforeFirst,
    At(String),
    /// Stepped forward past the last key
    AfterLast,
    Released,
}

pub struct KVBTreeCursor {
    data: Arc<BucketData>,
    position: Position,
}

impl KVBTreeCursor {
    pub(crate) fn new(data: Arc<BucketData>) -> Self {
        Self {
            data,
            position: Position::Unpositioned,
        }
    }

    /// Key the cursor is positioned at, if any.
    pub fn key(&self) -> Option<&str> {
        match &self.position {
            Position::At(key) => Some(key),
            _ => None,
        }
    }

    fn land(&mut self, found: Option<Entry>, miss: Position) -> Option<Entry> {
        match found {
            Some((key, value)) => {
                self.position = Position::At(key.clone());
                Some((key, value))
            }
            None => {
                self.position = miss;
                None
            }
        }
    }

    fn range_first(&self, from: Bound<&str>) -> Option<Entry> {
        self.data
            .kv
            .read()
            .range::<str, _>((from, Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    fn range_last(&self, to: Bound<&str>) -> Option<Entry> {
        self.data
            .kv
            .read()
            .range::<str, _>((Bound::Unbounded, to))
            .next_back()
            .map(|(k, v)| (k.clone(), v.clone()))
    }
}

impl BucketCursor for KVBTreeCursor {
    fn bucket_id(&self) -> &str {
        &self.data.id
    }

    fn first(&mut self) -> Option<Entry> {
        if self.position == Position::Released {
            return None;
        }
        let found = self.range_first(Bound::Unbounded);
        self.land(found, Position::BeforeFirst)
    }

    fn last(&mut self) -> Option<Entry> {
        if self.position == Position::Released {
            return None;
        }
        let found = self.range_last(Bound::Unbounded);
        self.land(found, Position::AfterLast)
    }

    fn next(&mut self) -> Option<Entry> {
        let found = match &self.position {
            Position::Unpositioned | Position::BeforeFirst => self.range_first(Bound::Unbounded),
            Position::At(key) => self.range_first(Bound::Excluded(key.as_str())),
            Position::AfterLast | Position::Released => return None,
        };
        self.land(found, Position::AfterLast)
    }

    fn prev(&mut self) -> Option<Entry> {
        let found = match &self.position {
            Position::Unpositioned | Position::AfterLast => self.range_last(Bound::Unbounded),
            Position::At(key) => self.range_last(Bound::Excluded(key.as_str())),
            Position::BeforeFirst | Position::Released => return None,
        };
        self.land(found, Position::BeforeFirst)
    }

    fn seek(&mut self, key: &str) -> Option<Entry> {
        if self.position == Position::Released {
            return None;
        }
        let found = self.range_first(Bound::Included(key));
        self.land(found, Position::AfterLast)
    }

    fn release(&mut self) {
        self.position = Position::Released;
    }
}

#[cfg(test)]
mod tests {
    use crate::bucket::{Bucket, BucketStore};
    use crate::kvbtree::KVBTreeStore;

    fn filled(store: &KVBTreeStore, keys: &[&str]) -> Box<dyn Bucket> {
        let bucket = store.bucket("cursor-test").unwrap();
        for key in keys {
            bucket.set(key, key.as_bytes()).unwrap();
        }
        bucket
    }

    fn key_of(entry: Option<(String, Vec<u8>)>) -> Option<String> {
        entry.map(|(k, _)| k)
    }

    #[test]
    fn test_iterate_both_directions() {
        let store = KVBTreeStore::in_memory();
        let bucket = filled(&store, &["b", "a", "c"]);
        let mut cursor = bucket.cursor().unwrap();

        assert_eq!(key_of(cursor.next()).as_deref(), Some("a"));
        assert_eq!(key_of(cursor.next()).as_deref(), Some("b"));
        assert_eq!(key_of(cursor.next()).as_deref(), Some("c"));
        assert_eq!(cursor.next(), None);
        assert_eq!(key_of(cursor.prev()).as_deref(), Some("c"));
        assert_eq!(key_of(cursor.prev()).as_deref(), Some("b"));
    }

    #[test]
    fn test_prev_past_first_then_next() {
        let store = KVBTreeStore::in_memory();
        let bucket = filled(&store, &["a", "b"]);
        let mut cursor = bucket.cursor().unwrap();

        assert_eq!(key_of(cursor.first()).as_deref(), Some("a"));
        assert_eq!(cursor.prev(), None);
        assert_eq!(cursor.prev(), None);
        assert_eq!(key_of(cursor.next()).as_deref(), Some("a"));
    }

    #[test]
    fn test_unpositioned_prev_goes_to_last() {
        let store = KVBTreeStore::in_memory();
        let bucket = filled(&store, &["a", "b"]);
        let mut cursor = bucket.cursor().unwrap();
        assert_eq!(key_of(cursor.prev()).as_deref(), Some("b"));
    }

    #[test]
    fn test_seek() {
        let store = KVBTreeStore::in_memory();
        let bucket = filled(&store, &["10", "20", "30"]);
        let mut cursor = bucket.cursor().unwrap();

        assert_eq!(key_of(cursor.seek("20")).as_deref(), Some("20"));
        assert_eq!(key_of(cursor.seek("15")).as_deref(), Some("20"));
        assert_eq!(key_of(cursor.seek("00")).as_deref(), Some("10"));
        assert_eq!(cursor.seek("99"), None);
        assert_eq!(key_of(cursor.prev()).as_deref(), Some("30"));
    }

    #[test]
    fn test_empty_bucket() {
        let store = KVBTreeStore::in_memory();
        let bucket = store.bucket("empty").unwrap();
        let mut cursor = bucket.cursor().unwrap();
        assert_eq!(cursor.first(), None);
        assert_eq!(cursor.last(), None);
        assert_eq!(cursor.next(), None);
        assert_eq!(cursor.seek("a"), None);
    }

    #[test]
    fn test_sees_writes_between_moves() {
        let store = KVBTreeStore::in_memory();
        let bucket = filled(&store, &["a", "c"]);
        let mut cursor = bucket.cursor().unwrap();
        assert_eq!(key_of(cursor.first()).as_deref(), Some("a"));
        bucket.set("b", b"b").unwrap();
        assert_eq!(key_of(cursor.next()).as_deref(), Some("b"));
    }

    #[test]
    fn test_released_cursor_returns_nothing() {
        let store = KVBTreeStore::in_memory();
        let bucket = filled(&store, &["a"]);
        let mut cursor = bucket.cursor().unwrap();
        cursor.release();
        assert_eq!(cursor.first(), None);
        assert_eq!(cursor.next(), None);
        assert_eq!(cursor.prev(), None);
    }
}
