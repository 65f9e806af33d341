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

//! Latest value per name of each Thing
//!
//! Snapshots live in the shared `properties` bucket, one JSON document per
//! Thing keyed by its address. A Thing's map is loaded on first use, updated
//! from every added event and written back by [`LatestValues::flush`].
//!
//! Lock domains: the per-Thing maps sit in a sharded `DashMap`, the set of
//! changed Things behind its own mutex. Neither is held across storage I/O.

use dashmap::DashMap;
use hubhistory_core::{thing_address, Result, StoredValue, ValueKind, EVENT_NAME_PROPERTIES};
use hubhistory_storage::{Bucket, BucketStore};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Bucket holding the latest-value snapshots.
pub const PROPERTIES_BUCKET: &str = "properties";

type ThingValues = HashMap<String, StoredValue>;

pub struct LatestValues {
    store: Arc<dyn BucketStore>,
    things: DashMap<String, ThingValues>,
    dirty: Mutex<HashSet<String>>,
}

impl LatestValues {
    pub fn new(store: Arc<dyn BucketStore>) -> Self {
        Self {
            store,
            things: DashMap::new(),
            dirty: Mutex::new(HashSet::new()),
        }
    }

    /// Make sure the map of `address` is in memory.
    ///
    /// A missing or unreadable snapshot starts an empty map. If another
    /// thread loaded the map in the meantime, its map is kept.
    pub fn load(&self, address: &str) -> Result<()> {
        if self.things.contains_key(address) {
            return Ok(());
        }

        let mut bucket = self.store.bucket(PROPERTIES_BUCKET)?;
        let raw = bucket.get(address);
        bucket.close()?;
        let values = match raw? {
            None => ThingValues::new(),
            Some(doc) => serde_json::from_slice(&doc).unwrap_or_else(|e| {
                warn!(address, error = %e, "Discarding unreadable latest-value snapshot");
                ThingValues::new()
            }),
        };

        debug!(address, names = values.len(), "Loaded latest values");
        self.things.entry(address.to_string()).or_insert(values);
        Ok(())
    }

    /// Apply an added value. Actions are ignored. A `properties` event
    /// updates each property in its JSON map payload.
    pub fn update(&self, value: &StoredValue) -> Result<()> {
        if value.is_action() {
            return Ok(());
        }
        let address = value.address();
        self.load(&address)?;

        let updates = if value.name == EVENT_NAME_PROPERTIES {
            match split_properties(value) {
                Some(updates) => updates,
                None => {
                    warn!(address = %address, "Properties event payload is not a JSON map");
                    return Ok(());
                }
            }
        } else {
            vec![value.clone()]
        };

        let changed = {
            let mut values = self.things.entry(address.clone()).or_default();
            updates
                .into_iter()
                .fold(false, |changed, update| apply_newer(&mut values, update) || changed)
        };
        if changed {
            self.dirty.lock().insert(address);
        }
        Ok(())
    }

    /// Latest values of a Thing by name for `names`, or all of them when
    /// `names` is empty. Names without a value are left out.
    pub fn read(
        &self,
        agent_id: &str,
        thing_id: &str,
        names: &[String],
    ) -> Result<BTreeMap<String, StoredValue>> {
        let address = thing_address(agent_id, thing_id);
        self.load(&address)?;

        let found = match self.things.get(&address) {
            Some(values) if names.is_empty() => values
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            Some(values) => names
                .iter()
                .filter_map(|name| values.get(name).map(|value| (name.clone(), value.clone())))
                .collect(),
            None => BTreeMap::new(),
        };
        Ok(found)
    }

    /// Write the snapshots of all changed Things. Returns the number written.
    ///
    /// Every changed Thing is attempted; a failed write stays marked as
    /// changed and the last error is returned.
    pub fn flush(&self) -> Result<usize> {
        let dirty: Vec<String> = self.dirty.lock().drain().collect();
        if dirty.is_empty() {
            return Ok(0);
        }

        let mut bucket = match self.store.bucket(PROPERTIES_BUCKET) {
            Ok(bucket) => bucket,
            Err(e) => {
                self.dirty.lock().extend(dirty);
                return Err(e);
            }
        };

        let mut written = 0;
        let mut last_error = None;
        for address in dirty {
            let doc = match self.things.get(&address) {
                Some(values) => serde_json::to_vec(values.value()),
                None => continue,
            };
            let result = doc
                .map_err(Into::into)
                .and_then(|doc| bucket.set(&address, &doc));
            match result {
                Ok(()) => written += 1,
                Err(e) => {
                    warn!(address = %address, error = %e, "Failed to write latest values");
                    self.dirty.lock().insert(address);
                    last_error = Some(e);
                }
            }
        }
        bucket.close()?;

        debug!(written, "Flushed latest values");
        match last_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    /// Number of Things with unwritten changes.
    pub fn dirty_count(&self) -> usize {
        self.dirty.lock().len()
    }

    /// Number of Things held in memory.
    pub fn thing_count(&self) -> usize {
        self.things.len()
    }
}

/// Store `value` unless an entry with the same name is at least as new.
fn apply_newer(values: &mut ThingValues, value: StoredValue) -> bool {
    match values.get(&value.name) {
        Some(existing) if existing.created_msec >= value.created_msec => false,
        _ => {
            values.insert(value.name.clone(), value);
            true
        }
    }
}

/// One value per entry of a `properties` event payload. String values keep
/// their text, other JSON values are stored as compact JSON.
fn split_properties(value: &StoredValue) -> Option<Vec<StoredValue>> {
    let props: serde_json::Map<String, serde_json::Value> =
        serde_json::from_slice(&value.data).ok()?;
    Some(
        props
            .into_iter()
            .map(|(name, prop)| {
                let data = match prop {
                    serde_json::Value::String(text) => text.into_bytes(),
                    other => other.to_string().into_bytes(),
                };
                StoredValue {
                    agent_id: value.agent_id.clone(),
                    thing_id: value.thing_id.clone(),
                    name,
                    data,
                    created_msec: value.created_msec,
                    kind: ValueKind::Event,
                }
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubhistory_storage::KVBTreeStore;

    fn latest() -> (Arc<dyn BucketStore>, LatestValues) {
        let store: Arc<dyn BucketStore> = Arc::new(KVBTreeStore::in_memory());
        (store.clone(), LatestValues::new(store))
    }

    fn event(name: &str, data: &str, msec: i64) -> StoredValue {
        StoredValue::event("agent1", "thing1", name, data).with_created(msec)
    }

    #[test]
    fn test_last_write_wins_by_timestamp() {
        let (_, latest) = latest();
        latest.update(&event("temperature", "20", 2000)).unwrap();
        latest.update(&event("temperature", "10", 1000)).unwrap();
        latest.update(&event("temperature", "15", 2000)).unwrap();

        let values = latest.read("agent1", "thing1", &[]).unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values["temperature"].data, b"20".to_vec());

        latest.update(&event("temperature", "30", 3000)).unwrap();
        let values = latest.read("agent1", "thing1", &[]).unwrap();
        assert_eq!(values["temperature"].data, b"30".to_vec());
    }

    #[test]
    fn test_properties_event_is_split() {
        let (_, latest) = latest();
        latest
            .update(&event("properties", r#"{"mode":"auto","level":3,"on":true}"#, 1000))
            .unwrap();

        let values = latest.read("agent1", "thing1", &[]).unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values["mode"].data_lossy(), "auto");
        assert_eq!(values["level"].data_lossy(), "3");
        assert_eq!(values["on"].data_lossy(), "true");
        assert!(values.values().all(|v| v.created_msec == 1000));
    }

    #[test]
    fn test_actions_and_bad_properties_are_ignored() {
        let (_, latest) = latest();
        let action = StoredValue::action("agent1", "thing1", "switch", "on").with_created(1);
        latest.update(&action).unwrap();
        latest.update(&event("properties", "not json", 1)).unwrap();
        assert!(latest.read("agent1", "thing1", &[]).unwrap().is_empty());
        assert_eq!(latest.dirty_count(), 0);
    }

    #[test]
    fn test_read_selected_names() {
        let (_, latest) = latest();
        latest.update(&event("b", "2", 1)).unwrap();
        latest.update(&event("a", "1", 1)).unwrap();
        latest.update(&event("c", "3", 1)).unwrap();

        let values = latest
            .read("agent1", "thing1", &["c".to_string(), "a".to_string(), "x".to_string()])
            .unwrap();
        assert_eq!(values.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn test_flush_and_reload() {
        let (store, latest) = latest();
        latest.update(&event("temperature", "21", 1000)).unwrap();
        assert_eq!(latest.dirty_count(), 1);
        assert_eq!(latest.flush().unwrap(), 1);
        assert_eq!(latest.dirty_count(), 0);
        assert_eq!(latest.flush().unwrap(), 0);

        let reloaded = LatestValues::new(store);
        let values = reloaded.read("agent1", "thing1", &[]).unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values["temperature"].data, b"21".to_vec());
    }

    #[test]
    fn test_corrupt_snapshot_loads_empty() {
        let (store, latest) = latest();
        store
            .bucket(PROPERTIES_BUCKET)
            .unwrap()
            .set("agent1/thing1", b"{broken")
            .unwrap();
        assert!(latest.read("agent1", "thing1", &[]).unwrap().is_empty());
        assert_eq!(latest.thing_count(), 1);
    }
}
