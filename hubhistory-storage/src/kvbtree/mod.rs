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

//! In-memory B-tree bucket store
//!
//! Every bucket is a `BTreeMap` guarded by a read-write lock. A file backed
//! store loads its snapshot on open, writes it back from a background thread
//! when there are changes, and writes it a last time on close. Without a file
//! the same store serves as the `memory` backend.

mod bucket;
mod cursor;
mod persist;

pub use bucket::KVBTreeBucket;
pub use cursor::KVBTreeCursor;

use crate::bucket::{Bucket, BucketStore};
use hubhistory_core::{HistoryError, Result, BACKEND_KVBTREE, BACKEND_MEMORY};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Keys and values of one bucket.
pub(crate) type BucketMap = BTreeMap<String, Vec<u8>>;

/// Shared state of one bucket. Handles and cursors keep it alive.
pub(crate) struct BucketData {
    pub(crate) id: String,
    pub(crate) kv: RwLock<BucketMap>,
    pub(crate) refcount: AtomicU64,
}

impl BucketData {
    fn new(id: &str, kv: BucketMap) -> Self {
        Self {
            id: id.to_string(),
            kv: RwLock::new(kv),
            refcount: AtomicU64::new(0),
        }
    }
}

pub(crate) struct StoreInner {
    path: Option<PathBuf>,
    buckets: RwLock<HashMap<String, Arc<BucketData>>>,
    /// Changes since the last successful save
    update_count: AtomicU64,
    closed: AtomicBool,
}

impl StoreInner {
    pub(crate) fn backend(&self) -> &'static str {
        if self.path.is_some() {
            BACKEND_KVBTREE
        } else {
            BACKEND_MEMORY
        }
    }

    pub(crate) fn mark_updated(&self, count: u64) {
        self.update_count.fetch_add(count, Ordering::Relaxed);
    }

    /// Write the snapshot to file if anything changed since the last save.
    fn save_if_changed(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let changes = self.update_count.swap(0, Ordering::AcqRel);
        if changes == 0 {
            return Ok(());
        }
        let snapshot = self.snapshot();
        if let Err(e) = persist::save(path, &snapshot) {
            // keep the changes pending for the next attempt
            self.update_count.fetch_add(changes, Ordering::AcqRel);
            return Err(e);
        }
        debug!(path = ?path, changes, buckets = snapshot.len(), "Saved bucket store");
        Ok(())
    }

    fn snapshot(&self) -> BTreeMap<String, BucketMap> {
        self.buckets
            .read()
            .iter()
            .map(|(id, data)| (id.clone(), data.kv.read().clone()))
            .collect()
    }
}

struct Autosave {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// B-tree bucket store, optionally backed by a file.
pub struct KVBTreeStore {
    inner: Arc<StoreInner>,
    autosave: Mutex<Option<Autosave>>,
}

impl KVBTreeStore {
    /// Open a store. With a path the existing snapshot is loaded and changes
    /// are saved every `autosave_interval`.
    pub fn open(path: Option<PathBuf>, autosave_interval: Duration) -> Result<Self> {
        let buckets = match &path {
            Some(p) if p.exists() => persist::load(p)?,
            _ => BTreeMap::new(),
        };
        let records: usize = buckets.values().map(|kv| kv.len()).sum();
        let buckets = buckets
            .into_iter()
            .map(|(id, kv)| {
                let data = Arc::new(BucketData::new(&id, kv));
                (id, data)
            })
            .collect::<HashMap<_, _>>();

        info!(
            path = ?path,
            buckets = buckets.len(),
            records,
            "Opened kvbtree store"
        );

        let inner = Arc::new(StoreInner {
            path,
            buckets: RwLock::new(buckets),
            update_count: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });
        let autosave = match &inner.path {
            Some(_) => Some(Self::start_autosave(inner.clone(), autosave_interval)?),
            None => None,
        };

        Ok(Self {
            inner,
            autosave: Mutex::new(autosave),
        })
    }

    /// Store without persistence.
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                path: None,
                buckets: RwLock::new(HashMap::new()),
                update_count: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
            autosave: Mutex::new(None),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Number of buckets in the store.
    pub fn bucket_count(&self) -> usize {
        self.inner.buckets.read().len()
    }

    /// Write pending changes now instead of waiting for the autosave.
    pub fn flush(&self) -> Result<()> {
        self.inner.save_if_changed()
    }

    fn start_autosave(inner: Arc<StoreInner>, interval: Duration) -> Result<Autosave> {
        let (stop, stop_rx) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("kvbtree-autosave".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if let Err(e) = inner.save_if_changed() {
                            error!(error = %e, "Autosave of bucket store failed");
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;
        Ok(Autosave { stop, handle })
    }
}

impl BucketStore for KVBTreeStore {
    fn bucket(&self, bucket_id: &str) -> Result<Box<dyn Bucket>> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(HistoryError::BucketClosed(bucket_id.to_string()));
        }
        let existing = self.inner.buckets.read().get(bucket_id).cloned();
        let data = match existing {
            Some(data) => data,
            None => self
                .inner
                .buckets
                .write()
                .entry(bucket_id.to_string())
                .or_insert_with(|| Arc::new(BucketData::new(bucket_id, BTreeMap::new())))
                .clone(),
        };
        Ok(Box::new(KVBTreeBucket::new(data, self.inner.clone())))
    }

    fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(autosave) = self.autosave.lock().take() {
            let _ = autosave.stop.send(());
            if autosave.handle.join().is_err() {
                warn!("Autosave thread panicked");
            }
        }
        let open_handles: u64 = self
            .inner
            .buckets
            .read()
            .values()
            .map(|b| b.refcount.load(Ordering::Relaxed))
            .sum();
        if open_handles > 0 {
            warn!(open_handles, "Closing bucket store with open bucket handles");
        }
        self.inner.save_if_changed()?;
        info!(path = ?self.inner.path, "Closed kvbtree store");
        Ok(())
    }
}

impl Drop for KVBTreeStore {
    fn drop(&mut self) {
        if let Err(e) = BucketStore::close(self) {
            error!(error = %e, "Failed to close bucket store");
        }
    }
}
