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

//! History cursor over the bucket of one Thing
//!
//! Wraps a raw bucket cursor, decodes keys back into values and optionally
//! restricts iteration to a single value name.

use crate::search::{BoundedSearch, Direction, SearchState};
use hubhistory_core::{now_msec, parse_timestamp, HistoryKey, Result, StoredValue};
use hubhistory_storage::{Bucket, BucketCursor, Entry};
use tracing::{error, warn};

pub struct HistoryCursor {
    bucket: Option<Box<dyn Bucket>>,
    cursor: Option<Box<dyn BucketCursor>>,
    bucket_id: String,
    filter_name: Option<String>,
}

impl HistoryCursor {
    /// Cursor over `bucket`, taking ownership of the bucket handle. An empty
    /// filter name means no filter.
    pub fn new(bucket: Box<dyn Bucket>, filter_name: Option<String>) -> Result<Self> {
        let cursor = bucket.cursor()?;
        Ok(Self {
            bucket_id: bucket.id().to_string(),
            bucket: Some(bucket),
            cursor: Some(cursor),
            filter_name: filter_name.filter(|name| !name.is_empty()),
        })
    }

    pub fn bucket_id(&self) -> &str {
        &self.bucket_id
    }

    pub fn filter_name(&self) -> Option<&str> {
        self.filter_name.as_deref()
    }

    pub fn is_released(&self) -> bool {
        self.cursor.is_none()
    }

    /// Oldest value, or the oldest value with the filter name.
    pub fn first(&mut self) -> Option<StoredValue> {
        let entry = self.cursor.as_mut()?.first()?;
        self.after_landing(entry, Direction::Forward, now_msec())
    }

    /// Newest value, or the newest value with the filter name.
    pub fn last(&mut self) -> Option<StoredValue> {
        let entry = self.cursor.as_mut()?.last()?;
        self.after_landing(entry, Direction::Backward, 0)
    }

    pub fn next(&mut self) -> Option<StoredValue> {
        match self.filter_name.clone() {
            Some(name) => self.find(&BoundedSearch::new(&name, Direction::Forward, now_msec())),
            None => self.step_decodable(Direction::Forward),
        }
    }

    pub fn prev(&mut self) -> Option<StoredValue> {
        match self.filter_name.clone() {
            Some(name) => self.find(&BoundedSearch::new(&name, Direction::Backward, 0)),
            None => self.step_decodable(Direction::Backward),
        }
    }

    /// Up to `limit` values after the current position. The flag is true when
    /// at least one value was returned.
    pub fn next_n(&mut self, limit: usize) -> (Vec<StoredValue>, bool) {
        self.take_n(limit, Direction::Forward)
    }

    /// Up to `limit` values before the current position, newest first.
    pub fn prev_n(&mut self, limit: usize) -> (Vec<StoredValue>, bool) {
        self.take_n(limit, Direction::Backward)
    }

    /// Position at the first value at or after the given time. Accepts
    /// RFC 3339, RFC 2822, common date-time forms or epoch milliseconds.
    /// Text that isn't a timestamp returns `None` without moving the cursor.
    pub fn seek(&mut self, timestamp: &str) -> Option<StoredValue> {
        match parse_timestamp(timestamp) {
            Some(msec) => self.seek_msec(msec),
            None => {
                warn!(timestamp, bucket = %self.bucket_id, "Unrecognised seek timestamp");
                None
            }
        }
    }

    /// Position at the first value at or after `created_msec`.
    pub fn seek_msec(&mut self, created_msec: i64) -> Option<StoredValue> {
        let seek_key = HistoryKey::seek_key(created_msec);
        let entry = self.cursor.as_mut()?.seek(&seek_key)?;
        self.after_landing(entry, Direction::Forward, now_msec())
    }

    /// Release the raw cursor and close the bucket. Later calls return
    /// `None`. Releasing twice is a no-op.
    pub fn release(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.release();
        }
        if let Some(mut bucket) = self.bucket.take() {
            if let Err(e) = bucket.close() {
                error!(error = %e, bucket = %self.bucket_id, "Failed to close bucket");
            }
        }
    }

    /// Decide on the entry a positioning move landed on: accept it, or
    /// continue with a search for the filter name, or skip undecodable keys.
    fn after_landing(
        &mut self,
        (key, data): Entry,
        direction: Direction,
        bound_msec: i64,
    ) -> Option<StoredValue> {
        let value = self.decode(&key, data);
        let Some(name) = self.filter_name.clone() else {
            return match value {
                Some(value) => Some(value),
                None => self.step_decodable(direction),
            };
        };
        match value {
            Some(value) if value.name == name => Some(value),
            _ => self.find(&BoundedSearch::new(&name, direction, bound_msec)),
        }
    }

    fn decode(&self, key: &str, data: Vec<u8>) -> Option<StoredValue> {
        let value = HistoryKey::decode(key).and_then(|k| k.into_value(&self.bucket_id, data));
        if value.is_none() {
            warn!(key, bucket = %self.bucket_id, "Skipping undecodable history key");
        }
        value
    }

    fn raw_step(&mut self, direction: Direction) -> Option<Entry> {
        let cursor = self.cursor.as_mut()?;
        match direction {
            Direction::Forward => cursor.next(),
            Direction::Backward => cursor.prev(),
        }
    }

    /// Next decodable value in `direction`.
    fn step_decodable(&mut self, direction: Direction) -> Option<StoredValue> {
        loop {
            let (key, data) = self.raw_step(direction)?;
            if let Some(value) = self.decode(&key, data) {
                return Some(value);
            }
        }
    }

    fn find(&mut self, search: &BoundedSearch<'_>) -> Option<StoredValue> {
        loop {
            let entry = self.raw_step(search.direction());
            match search.advance(entry.as_ref().map(|(key, _)| key.as_str())) {
                SearchState::Scanning => continue,
                SearchState::Found => {
                    let (key, data) = entry?;
                    return self.decode(&key, data);
                }
                SearchState::BoundExceeded => {
                    self.raw_step(search.direction().reverse());
                    return None;
                }
                SearchState::Exhausted => return None,
            }
        }
    }

    fn take_n(&mut self, limit: usize, direction: Direction) -> (Vec<StoredValue>, bool) {
        let mut values = Vec::with_capacity(limit.min(1024));
        while values.len() < limit {
            let value = match direction {
                Direction::Forward => self.next(),
                Direction::Backward => self.prev(),
            };
            match value {
                Some(value) => values.push(value),
                None => break,
            }
        }
        let items_remaining = !values.is_empty();
        (values, items_remaining)
    }
}

impl Drop for HistoryCursor {
    fn drop(&mut self) {
        self.release();
    }
}
