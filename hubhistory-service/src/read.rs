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

//! Registry of remotely driven history cursors
//!
//! Callers get an opaque handle for each cursor they open. A cursor that is
//! not used for the configured lifespan expires: it is released, its bucket
//! closed and its handle becomes unknown.

use crate::cursor::HistoryCursor;
use hubhistory_core::{thing_address, HistoryError, Result};
use hubhistory_storage::BucketStore;
use moka::notification::RemovalCause;
use moka::sync::Cache;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

type SharedCursor = Arc<Mutex<HistoryCursor>>;

pub struct CursorRegistry {
    store: Arc<dyn BucketStore>,
    cursors: Cache<String, SharedCursor>,
}

impl CursorRegistry {
    pub fn new(store: Arc<dyn BucketStore>, lifespan: Duration, max_cursors: u64) -> Self {
        let cursors = Cache::builder()
            .max_capacity(max_cursors)
            .time_to_idle(lifespan)
            .eviction_listener(|handle: Arc<String>, cursor: SharedCursor, cause| {
                match cause {
                    RemovalCause::Expired => warn!(handle = %handle, "Cursor expired"),
                    RemovalCause::Size => warn!(handle = %handle, "Cursor evicted, too many open cursors"),
                    _ => debug!(handle = %handle, "Cursor removed"),
                }
                cursor.lock().release();
            })
            .build();
        Self { store, cursors }
    }

    /// Open a cursor over the history of a Thing, optionally limited to
    /// values named `name`. Returns the cursor handle.
    pub fn open(&self, agent_id: &str, thing_id: &str, name: Option<&str>) -> Result<String> {
        let address = thing_address(agent_id, thing_id);
        let bucket = self.store.bucket(&address)?;
        let cursor = HistoryCursor::new(bucket, name.map(str::to_string))?;

        let handle = Uuid::new_v4().to_string();
        self.cursors
            .insert(handle.clone(), Arc::new(Mutex::new(cursor)));
        debug!(handle = %handle, address = %address, filter = ?name, "Opened cursor");
        Ok(handle)
    }

    /// Run `f` on the cursor of `handle`. Each use restarts its lifespan.
    pub fn with_cursor<R>(&self, handle: &str, f: impl FnOnce(&mut HistoryCursor) -> R) -> Result<R> {
        let cursor = self
            .cursors
            .get(handle)
            .ok_or_else(|| HistoryError::CursorNotFound(handle.to_string()))?;
        let mut cursor = cursor.lock();
        Ok(f(&mut cursor))
    }

    /// Release the cursor of `handle` and forget the handle.
    pub fn release(&self, handle: &str) -> Result<()> {
        let cursor = self
            .cursors
            .remove(handle)
            .ok_or_else(|| HistoryError::CursorNotFound(handle.to_string()))?;
        cursor.lock().release();
        Ok(())
    }

    /// Release cursors whose lifespan ran out.
    pub fn release_expired(&self) {
        self.cursors.run_pending_tasks();
    }

    /// Release all cursors.
    pub fn release_all(&self) {
        self.cursors.invalidate_all();
        self.cursors.run_pending_tasks();
    }

    /// Number of registered cursors, after expired ones are released.
    pub fn len(&self) -> u64 {
        self.cursors.run_pending_tasks();
        self.cursors.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
