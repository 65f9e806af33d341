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

//! Ingestion of events and actions into the Thing buckets

use crate::retention::RetentionRules;
use hubhistory_core::{now_msec, HistoryError, HistoryKey, Result, StoredValue, ValueKind};
use hubhistory_storage::{Bucket, BucketStore};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Called with every value after it was written.
pub type ValueAddedHook = Arc<dyn Fn(&StoredValue) + Send + Sync>;

/// Writes values into the bucket of their Thing.
#[derive(Clone)]
pub struct AddHistory {
    store: Arc<dyn BucketStore>,
    retention: Arc<RetentionRules>,
    on_added: Option<ValueAddedHook>,
    ignore_retention: bool,
}

impl AddHistory {
    pub fn new(
        store: Arc<dyn BucketStore>,
        retention: Arc<RetentionRules>,
        on_added: Option<ValueAddedHook>,
    ) -> Self {
        Self {
            store,
            retention,
            on_added,
            ignore_retention: false,
        }
    }

    /// Same writer, recording every value regardless of the retention rules.
    pub fn without_retention(mut self) -> Self {
        self.ignore_retention = true;
        self
    }

    /// Record an event value.
    pub fn add_event(&self, mut value: StoredValue) -> Result<()> {
        value.kind = ValueKind::Event;
        self.add_value(value)
    }

    /// Record an action value. Actions are not subject to retention rules.
    pub fn add_action(&self, mut value: StoredValue) -> Result<()> {
        value.kind = ValueKind::Action;
        self.add_value(value)
    }

    /// Record a batch of values.
    ///
    /// Values that fail validation or retention are dropped without failing
    /// the batch. The others are written with one call per Thing bucket.
    pub fn add_events(&self, values: Vec<StoredValue>) -> Result<()> {
        if values.len() <= 1 {
            return match values.into_iter().next() {
                Some(value) if value.is_action() => self.add_action(value),
                Some(value) => self.add_event(value),
                None => Ok(()),
            };
        }

        let total = values.len();
        let mut groups: BTreeMap<String, Vec<StoredValue>> = BTreeMap::new();
        for value in values {
            match self.prepare(value) {
                Ok(value) => groups.entry(value.address()).or_default().push(value),
                Err(e) => debug!(error = %e, "Dropped value from batch"),
            }
        }
        let accepted: usize = groups.values().map(Vec::len).sum();
        if accepted < total {
            warn!(total, dropped = total - accepted, "Batch values rejected");
        }

        for (address, group) in groups {
            let docs = group
                .iter()
                .map(HistoryKey::encode_value)
                .collect::<BTreeMap<_, _>>();
            let mut bucket = self.store.bucket(&address)?;
            let written = bucket.set_multiple(docs);
            let closed = bucket.close();
            written?;
            closed?;
            debug!(address = %address, count = group.len(), "Added values");
            self.notify(&group);
        }
        Ok(())
    }

    /// Validate, timestamp and retention-check a value.
    fn prepare(&self, mut value: StoredValue) -> Result<StoredValue> {
        if value.agent_id.is_empty() || value.thing_id.is_empty() {
            return Err(HistoryError::MissingAddress { name: value.name });
        }
        if value.name.is_empty() {
            return Err(HistoryError::MissingName {
                address: value.address(),
            });
        }
        if value.created_msec <= 0 {
            value.created_msec = now_msec();
        }
        if !value.is_action()
            && !self.ignore_retention
            && !self
                .retention
                .admit(&value.name, &value.agent_id, &value.thing_id)
        {
            return Err(HistoryError::NotRetained {
                address: value.address(),
                name: value.name,
            });
        }
        Ok(value)
    }

    fn add_value(&self, value: StoredValue) -> Result<()> {
        let value = self.prepare(value)?;
        let address = value.address();
        let (key, data) = HistoryKey::encode_value(&value);

        let mut bucket = self.store.bucket(&address)?;
        let written = bucket.set(&key, &data);
        let closed = bucket.close();
        written?;
        closed?;

        debug!(
            address = %address,
            key = %key,
            size = data.len(),
            "Added value"
        );
        self.notify(std::slice::from_ref(&value));
        Ok(())
    }

    fn notify(&self, values: &[StoredValue]) {
        if let Some(hook) = &self.on_added {
            for value in values {
                hook(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubhistory_core::RetentionRule;
    use hubhistory_storage::KVBTreeStore;
    use parking_lot::Mutex;

    fn setup(rules: Vec<RetentionRule>) -> (Arc<dyn BucketStore>, AddHistory, Arc<Mutex<Vec<StoredValue>>>) {
        let store: Arc<dyn BucketStore> = Arc::new(KVBTreeStore::in_memory());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let hook: ValueAddedHook = Arc::new(move |v: &StoredValue| sink.lock().push(v.clone()));
        let add = AddHistory::new(store.clone(), Arc::new(RetentionRules::new(rules)), Some(hook));
        (store, add, seen)
    }

    fn records(store: &Arc<dyn BucketStore>, address: &str) -> u64 {
        store.bucket(address).unwrap().info().records.unwrap_or(0)
    }

    #[test]
    fn test_add_event_defaults_timestamp() {
        let (store, add, seen) = setup(vec![]);
        let before = now_msec();
        add.add_event(StoredValue::event("agent1", "thing1", "temperature", "12.5"))
            .unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].created_msec >= before);
        assert_eq!(records(&store, "agent1/thing1"), 1);

        let key = HistoryKey::encode(seen[0].created_msec, "temperature", ValueKind::Event);
        let bucket = store.bucket("agent1/thing1").unwrap();
        assert_eq!(bucket.get(&key).unwrap(), Some(b"12.5".to_vec()));
    }

    #[test]
    fn test_validation() {
        let (store, add, seen) = setup(vec![]);
        assert!(matches!(
            add.add_event(StoredValue::event("", "thing1", "temperature", "1")),
            Err(HistoryError::MissingAddress { .. })
        ));
        assert!(matches!(
            add.add_event(StoredValue::event("agent1", "", "temperature", "1")),
            Err(HistoryError::MissingAddress { .. })
        ));
        assert!(matches!(
            add.add_event(StoredValue::event("agent1", "thing1", "", "1")),
            Err(HistoryError::MissingName { .. })
        ));
        assert!(seen.lock().is_empty());
        assert_eq!(records(&store, "agent1/thing1"), 0);
    }

    #[test]
    fn test_retention_applies_to_events_only() {
        let (store, add, _) = setup(vec![RetentionRule::retain("temperature")]);
        assert!(matches!(
            add.add_event(StoredValue::event("agent1", "thing1", "humidity", "50")),
            Err(HistoryError::NotRetained { .. })
        ));
        add.add_action(StoredValue::action("agent1", "thing1", "switch", "on"))
            .unwrap();
        assert_eq!(records(&store, "agent1/thing1"), 1);

        let trusted = add.clone().without_retention();
        trusted
            .add_event(StoredValue::event("agent1", "thing1", "humidity", "50"))
            .unwrap();
        assert_eq!(records(&store, "agent1/thing1"), 2);
    }

    #[test]
    fn test_batch_drops_rejected_values() {
        let (store, add, seen) = setup(vec![RetentionRule::retain("temperature")]);
        let batch = vec![
            StoredValue::event("agent1", "thing1", "temperature", "1").with_created(1000),
            StoredValue::event("agent1", "thing1", "humidity", "2").with_created(1001),
            StoredValue::event("agent1", "", "temperature", "3").with_created(1002),
            StoredValue::event("agent1", "thing2", "temperature", "4").with_created(1003),
        ];
        add.add_events(batch).unwrap();

        assert_eq!(seen.lock().len(), 2);
        assert_eq!(records(&store, "agent1/thing1"), 1);
        assert_eq!(records(&store, "agent1/thing2"), 1);
    }

    #[test]
    fn test_single_value_batch_reports_error() {
        let (_, add, _) = setup(vec![RetentionRule::retain("temperature")]);
        add.add_events(vec![]).unwrap();
        assert!(matches!(
            add.add_events(vec![StoredValue::event("a", "t", "humidity", "1")]),
            Err(HistoryError::NotRetained { .. })
        ));
    }
}
