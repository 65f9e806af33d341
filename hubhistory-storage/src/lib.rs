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

//! Hub History Storage Layer
//!
//! Ordered key-value bucket store used by the history service.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 BucketStore                  │
//! │   bucket("agent/thing")   bucket("properties")│
//! │        │                        │            │
//! │   ┌────▼─────┐            ┌─────▼────┐       │
//! │   │  Bucket  │ ─cursor()─▶│  Cursor  │       │
//! │   └──────────┘            └──────────┘       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Buckets are named, ordered key-value namespaces. Keys order byte-wise;
//! cursors iterate them in both directions. Backends implement the traits in
//! [`bucket`] and are selected by name through [`open_store`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hubhistory_storage::{open_store, BucketStore};
//!
//! let store = open_store(&config.storage)?;
//! let mut bucket = store.bucket("device1/thing-0")?;
//! bucket.set("00000001700000000000/temperature/e", b"12.5")?;
//! bucket.close()?;
//! ```

pub mod bucket;
pub mod kvbtree;

pub use bucket::{Bucket, BucketCursor, BucketInfo, BucketStore, Entry};
pub use kvbtree::{KVBTreeBucket, KVBTreeCursor, KVBTreeStore};

use hubhistory_core::{HistoryError, Result, StorageConfig, BACKEND_KVBTREE, BACKEND_MEMORY};
use std::sync::Arc;

/// Open the bucket store selected by `config.backend`.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn BucketStore>> {
    match config.backend.as_str() {
        BACKEND_KVBTREE => Ok(Arc::new(KVBTreeStore::open(
            Some(config.store_path()),
            config.autosave_interval(),
        )?)),
        BACKEND_MEMORY => Ok(Arc::new(KVBTreeStore::in_memory())),
        other => Err(HistoryError::UnsupportedBackend(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory_store() {
        let config = StorageConfig {
            backend: BACKEND_MEMORY.to_string(),
            ..StorageConfig::default()
        };
        let store = open_store(&config).unwrap();
        assert_eq!(store.backend(), BACKEND_MEMORY);
        store.close().unwrap();
    }

    #[test]
    fn test_open_kvbtree_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            data_dir: dir.path().to_path_buf(),
            ..StorageConfig::default()
        };
        let store = open_store(&config).unwrap();
        assert_eq!(store.backend(), BACKEND_KVBTREE);
        store.close().unwrap();
    }

    #[test]
    fn test_unknown_backend() {
        let config = StorageConfig {
            backend: "pebble".to_string(),
            ..StorageConfig::default()
        };
        assert!(matches!(
            open_store(&config),
            Err(HistoryError::UnsupportedBackend(name)) if name == "pebble"
        ));
    }
}
