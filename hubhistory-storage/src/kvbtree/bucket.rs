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

//! Bucket handle of the B-tree store

use super::cursor::KVBTreeCursor;
use super::{BucketData, StoreInner};
use crate::bucket::{Bucket, BucketCursor, BucketInfo};
use hubhistory_core::{HistoryError, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Open handle to a bucket. Dropping the handle closes it.
pub struct KVBTreeBucket {
    data: Arc<BucketData>,
    store: Arc<StoreInner>,
    closed: bool,
}

impl KVBTreeBucket {
    pub(crate) fn new(data: Arc<BucketData>, store: Arc<StoreInner>) -> Self {
        data.refcount.fetch_add(1, Ordering::AcqRel);
        Self {
            data,
            store,
            closed: false,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(HistoryError::BucketClosed(self.data.id.clone()));
        }
        Ok(())
    }
}

impl Bucket for KVBTreeBucket {
    fn id(&self) -> &str {
        &self.data.id
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_open()?;
        Ok(self.data.kv.read().get(key).cloned())
    }

    fn get_multiple(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        self.check_open()?;
        let kv = self.data.kv.read();
        Ok(keys
            .iter()
            .filter_map(|key| kv.get(key).map(|value| (key.clone(), value.clone())))
            .collect())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.check_open()?;
        self.data.kv.write().insert(key.to_string(), value.to_vec());
        self.store.mark_updated(1);
        Ok(())
    }

    fn set_multiple(&self, docs: BTreeMap<String, Vec<u8>>) -> Result<()> {
        self.check_open()?;
        let count = docs.len() as u64;
        if count == 0 {
            return Ok(());
        }
        self.data.kv.write().extend(docs);
        self.store.mark_updated(count);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.check_open()?;
        if self.data.kv.write().remove(key).is_some() {
            self.store.mark_updated(1);
        }
        Ok(())
    }

    fn cursor(&self) -> Result<Box<dyn BucketCursor>> {
        self.check_open()?;
        Ok(Box::new(KVBTreeCursor::new(self.data.clone())))
    }

    fn info(&self) -> BucketInfo {
        BucketInfo {
            id: self.data.id.clone(),
            backend: self.store.backend(),
            records: Some(self.data.kv.read().len() as u64),
            open_handles: self.data.refcount.load(Ordering::Acquire),
        }
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.data.refcount.fetch_sub(1, Ordering::AcqRel);
        }
        Ok(())
    }
}

impl Drop for KVBTreeBucket {
    fn drop(&mut self) {
        let _ = Bucket::close(self);
    }
}

#[cfg(test)]
mod tests {
    use crate::bucket::BucketStore;
    use crate::kvbtree::KVBTreeStore;
    use hubhistory_core::HistoryError;
    use std::collections::BTreeMap;

    #[test]
    fn test_set_get_delete() {
        let store = KVBTreeStore::in_memory();
        let bucket = store.bucket("agent1/thing1").unwrap();

        assert_eq!(bucket.get("missing").unwrap(), None);
        bucket.set("k1", b"v1").unwrap();
        bucket.set("k1", b"v2").unwrap();
        assert_eq!(bucket.get("k1").unwrap(), Some(b"v2".to_vec()));

        bucket.delete("k1").unwrap();
        bucket.delete("k1").unwrap();
        assert_eq!(bucket.get("k1").unwrap(), None);
    }

    #[test]
    fn test_get_multiple_skips_missing() {
        let store = KVBTreeStore::in_memory();
        let bucket = store.bucket("b").unwrap();
        let mut docs = BTreeMap::new();
        docs.insert("a".to_string(), b"1".to_vec());
        docs.insert("b".to_string(), b"2".to_vec());
        bucket.set_multiple(docs).unwrap();

        let found = bucket
            .get_multiple(&["a".to_string(), "x".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["a"], b"1".to_vec());
        assert!(!found.contains_key("x"));
    }

    #[test]
    fn test_handles_are_refcounted() {
        let store = KVBTreeStore::in_memory();
        let mut first = store.bucket("shared").unwrap();
        let second = store.bucket("shared").unwrap();
        assert_eq!(second.info().open_handles, 2);

        first.set("k", b"v").unwrap();
        assert_eq!(second.get("k").unwrap(), Some(b"v".to_vec()));

        first.close().unwrap();
        first.close().unwrap();
        assert_eq!(second.info().open_handles, 1);
        assert_eq!(second.info().records, Some(1));
        assert!(matches!(first.get("k"), Err(HistoryError::BucketClosed(_))));
    }
}
