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

//! History service
//!
//! Ties the store, retention rules, ingestion, latest-values cache and
//! cursor registry together behind the caller facing API.
//!
//! ```text
//!  add_event ──▶ AddHistory ──▶ bucket "agent/thing"
//!                    │
//!                    └─ on_added ──▶ LatestValues ──flush──▶ bucket "properties"
//!
//!  get_cursor ──▶ CursorRegistry ──▶ HistoryCursor ──▶ bucket cursor
//! ```
//!
//! [`HistoryService::start`] runs a background worker that flushes changed
//! latest values and releases expired cursors. [`HistoryService::stop`] ends
//! it, writes a final flush and closes the store.

use crate::add::{AddHistory, ValueAddedHook};
use crate::latest::LatestValues;
use crate::read::CursorRegistry;
use crate::retention::RetentionRules;
use hubhistory_core::{HistoryConfig, HistoryError, Result, RetentionRule, StoredValue};
use hubhistory_storage::{open_store, BucketStore};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info, warn};

struct Worker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct HistoryService {
    config: HistoryConfig,
    store: Arc<dyn BucketStore>,
    retention: Arc<RetentionRules>,
    latest: Arc<LatestValues>,
    add_history: AddHistory,
    cursors: Arc<CursorRegistry>,
    worker: Mutex<Option<Worker>>,
    stopped: AtomicBool,
}

impl HistoryService {
    /// Open the configured store and build the service on it.
    pub fn new(config: HistoryConfig) -> Result<Self> {
        config.validate()?;
        let store = open_store(&config.storage)?;
        Ok(Self::with_store(config, store))
    }

    /// Build the service on an already opened store.
    pub fn with_store(config: HistoryConfig, store: Arc<dyn BucketStore>) -> Self {
        let retention = Arc::new(RetentionRules::new(config.retention.clone()));
        let latest = Arc::new(LatestValues::new(store.clone()));
        let cursors = Arc::new(CursorRegistry::new(
            store.clone(),
            config.cursor.lifespan(),
            config.cursor.max_cursors,
        ));

        let cache = latest.clone();
        let on_added: ValueAddedHook = Arc::new(move |value: &StoredValue| {
            if let Err(e) = cache.update(value) {
                error!(
                    address = %value.address(),
                    name = %value.name,
                    error = %e,
                    "Failed to update latest values"
                );
            }
        });
        let add_history = AddHistory::new(store.clone(), retention.clone(), Some(on_added));

        Self {
            config,
            store,
            retention,
            latest,
            add_history,
            cursors,
            worker: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Start the background flush and cursor expiry worker.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }
        if self.stopped.load(Ordering::Acquire) {
            return Err(HistoryError::BucketClosed(self.config.storage.store_name.clone()));
        }

        let interval = self.config.cache.flush_interval();
        let latest = self.latest.clone();
        let cursors = self.cursors.clone();
        let (stop, stop_rx) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("hubhistory-worker".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if let Err(e) = latest.flush() {
                            error!(error = %e, "Background flush of latest values failed");
                        }
                        cursors.release_expired();
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;
        *worker = Some(Worker { stop, handle });

        info!(
            backend = self.store.backend(),
            flush_interval_ms = interval.as_millis() as u64,
            cursor_lifespan_secs = self.config.cursor.lifespan_secs,
            rules = self.retention.len(),
            "History service started"
        );
        Ok(())
    }

    /// Stop the worker, release all cursors, flush the latest values and
    /// close the store. Stopping twice is a no-op.
    pub fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.stop.send(());
            if worker.handle.join().is_err() {
                warn!("History worker panicked");
            }
        }
        self.cursors.release_all();
        let flushed = self.latest.flush();
        let closed = self.store.close();
        flushed?;
        closed?;
        info!("History service stopped");
        Ok(())
    }

    /// Writer that records values regardless of the retention rules, for
    /// trusted capture services.
    pub fn capture_history(&self) -> AddHistory {
        self.add_history.clone().without_retention()
    }

    // --- ingestion ---

    pub fn add_event(&self, value: StoredValue) -> Result<()> {
        self.add_history.add_event(value)
    }

    pub fn add_action(&self, value: StoredValue) -> Result<()> {
        self.add_history.add_action(value)
    }

    pub fn add_events(&self, values: Vec<StoredValue>) -> Result<()> {
        self.add_history.add_events(values)
    }

    // --- reading ---

    /// Open a cursor over the history of a Thing. An empty or missing name
    /// iterates all values.
    pub fn get_cursor(&self, agent_id: &str, thing_id: &str, name: Option<&str>) -> Result<String> {
        self.cursors.open(agent_id, thing_id, name)
    }

    pub fn cursor_first(&self, handle: &str) -> Result<Option<StoredValue>> {
        self.cursors.with_cursor(handle, |c| c.first())
    }

    pub fn cursor_last(&self, handle: &str) -> Result<Option<StoredValue>> {
        self.cursors.with_cursor(handle, |c| c.last())
    }

    pub fn cursor_next(&self, handle: &str) -> Result<Option<StoredValue>> {
        self.cursors.with_cursor(handle, |c| c.next())
    }

    pub fn cursor_prev(&self, handle: &str) -> Result<Option<StoredValue>> {
        self.cursors.with_cursor(handle, |c| c.prev())
    }

    pub fn cursor_next_n(&self, handle: &str, limit: usize) -> Result<(Vec<StoredValue>, bool)> {
        self.cursors.with_cursor(handle, |c| c.next_n(limit))
    }

    pub fn cursor_prev_n(&self, handle: &str, limit: usize) -> Result<(Vec<StoredValue>, bool)> {
        self.cursors.with_cursor(handle, |c| c.prev_n(limit))
    }

    pub fn cursor_seek(&self, handle: &str, timestamp: &str) -> Result<Option<StoredValue>> {
        self.cursors.with_cursor(handle, |c| c.seek(timestamp))
    }

    pub fn cursor_seek_msec(&self, handle: &str, created_msec: i64) -> Result<Option<StoredValue>> {
        self.cursors.with_cursor(handle, |c| c.seek_msec(created_msec))
    }

    pub fn cursor_release(&self, handle: &str) -> Result<()> {
        self.cursors.release(handle)
    }

    /// Number of open cursors.
    pub fn cursor_count(&self) -> u64 {
        self.cursors.len()
    }

    /// Latest value of each requested name, all names when `names` is empty.
    pub fn get_latest_values(
        &self,
        agent_id: &str,
        thing_id: &str,
        names: &[String],
    ) -> Result<BTreeMap<String, StoredValue>> {
        self.latest.read(agent_id, thing_id, names)
    }

    /// Write changed latest values now.
    pub fn flush(&self) -> Result<usize> {
        self.latest.flush()
    }

    // --- retention ---

    pub fn get_rule(&self, name: &str) -> Option<RetentionRule> {
        self.retention.get_rule(name)
    }

    pub fn get_rules(&self) -> Vec<RetentionRule> {
        self.retention.get_rules()
    }

    pub fn set_rule(&self, rule: RetentionRule) {
        self.retention.set_rule(rule)
    }

    pub fn remove_rule(&self, name: &str) {
        self.retention.remove_rule(name)
    }

    /// Whether `value` would be recorded by `add_event`.
    pub fn test_value(&self, value: &StoredValue) -> bool {
        self.retention.test_value(value)
    }
}

impl Drop for HistoryService {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!(error = %e, "Failed to stop history service");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn service() -> HistoryService {
        HistoryService::new(HistoryConfig::in_memory()).unwrap()
    }

    #[test]
    fn test_start_stop() {
        let svc = service();
        svc.start().unwrap();
        svc.start().unwrap();
        svc.stop().unwrap();
        svc.stop().unwrap();
        assert!(svc.start().is_err());
    }

    #[test]
    fn test_stop_flushes_latest_values() {
        let svc = service();
        svc.add_event(StoredValue::event("a", "t", "temperature", "20").with_created(1))
            .unwrap();
        assert_eq!(svc.latest.dirty_count(), 1);
        svc.stop().unwrap();
        assert_eq!(svc.latest.dirty_count(), 0);
    }

    #[test]
    fn test_worker_flushes_in_background() {
        let mut config = HistoryConfig::in_memory();
        config.cache.flush_interval_ms = 10;
        let svc = HistoryService::new(config).unwrap();
        svc.start().unwrap();
        svc.add_event(StoredValue::event("a", "t", "temperature", "20"))
            .unwrap();

        let mut flushed = false;
        for _ in 0..100 {
            std::thread::sleep(Duration::from_millis(10));
            if svc.latest.dirty_count() == 0 {
                flushed = true;
                break;
            }
        }
        assert!(flushed);
        svc.stop().unwrap();
    }

    #[test]
    fn test_actions_not_in_latest_values() {
        let svc = service();
        svc.add_action(StoredValue::action("a", "t", "switch", "on"))
            .unwrap();
        assert!(svc.get_latest_values("a", "t", &[]).unwrap().is_empty());
    }
}
