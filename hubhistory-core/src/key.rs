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

//! Bucket key codec for history values
//!
//! # Key Encoding
//!
//! ```text
//! {created_msec:020}/{name}/{e|a}
//! ```
//!
//! The zero-padded timestamp makes byte-lexicographic key order equal to
//! numeric time order. A timestamp-only key (`{created_msec:020}`) sorts
//! before every value key of that millisecond and is used for seeking.
//!
//! Within one millisecond keys order by `{name}/`, not by name: a name with a
//! byte below `/` after a common prefix (`temp-1`, `temp.x`) sorts before the
//! shorter name (`temp`). Nothing relies on name order inside a millisecond.

use crate::value::{StoredValue, ValueKind};

/// Separator between key segments.
pub const KEY_SEPARATOR: char = '/';

/// Decoded bucket key of a history value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryKey {
    pub created_msec: i64,
    pub name: String,
    /// `None` for keys without a recognised kind tag.
    pub kind: Option<ValueKind>,
}

impl HistoryKey {
    /// Encode a key from its components.
    pub fn encode(created_msec: i64, name: &str, kind: ValueKind) -> String {
        format!("{}/{}/{}", Self::seek_key(created_msec), name, kind.tag())
    }

    /// Encode a value into its bucket key and stored bytes.
    pub fn encode_value(value: &StoredValue) -> (String, Vec<u8>) {
        (
            Self::encode(value.created_msec, &value.name, value.kind),
            value.data.clone(),
        )
    }

    /// Timestamp-only key used to position a cursor at or after a time.
    pub fn seek_key(created_msec: i64) -> String {
        format!("{:020}", created_msec.max(0))
    }

    /// Decode a key. Returns `None` for keys that have fewer than two
    /// segments or whose first segment is not a timestamp.
    ///
    /// The name is everything between the timestamp and the kind tag, so
    /// names containing the separator survive the round trip.
    pub fn decode(key: &str) -> Option<Self> {
        let (ts, rest) = key.split_once(KEY_SEPARATOR)?;
        let created_msec = ts.parse::<i64>().ok()?;
        if rest.is_empty() {
            return None;
        }
        let (name, kind) = match rest.rsplit_once(KEY_SEPARATOR) {
            Some((name, tag)) if !name.is_empty() => match ValueKind::from_tag(tag) {
                Some(kind) => (name, Some(kind)),
                None => (rest, None),
            },
            _ => (rest, None),
        };
        Some(Self {
            created_msec,
            name: name.to_string(),
            kind,
        })
    }

    /// True if the key carries all three segments.
    pub fn is_complete(&self) -> bool {
        self.kind.is_some()
    }

    /// Rebuild the stored value from this key, the bucket it was found in
    /// and the stored bytes.
    ///
    /// The bucket ID is the Thing address `{agent_id}/{thing_id}`; `None` is
    /// returned when it doesn't have that shape.
    pub fn into_value(self, bucket_id: &str, data: Vec<u8>) -> Option<StoredValue> {
        let (agent_id, thing_id) = bucket_id.split_once(KEY_SEPARATOR)?;
        Some(StoredValue {
            agent_id: agent_id.to_string(),
            thing_id: thing_id.to_string(),
            name: self.name,
            data,
            created_msec: self.created_msec,
            kind: self.kind.unwrap_or_default(),
        })
    }
}
