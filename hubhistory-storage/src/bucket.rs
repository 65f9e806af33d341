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

//! Bucket store contract
//!
//! The history core only depends on these traits. Backends must not be
//! assumed to provide transactions across buckets.

use hubhistory_core::Result;
use std::collections::{BTreeMap, HashMap};

/// A key and its stored value, as returned by cursor moves.
pub type Entry = (String, Vec<u8>);

/// Bucket or store information, when available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketInfo {
    /// Bucket ID
    pub id: String,
    /// Backend name, eg "kvbtree"
    pub backend: &'static str,
    /// Number of records, if known
    pub records: Option<u64>,
    /// Handles currently open on the bucket
    pub open_handles: u64,
}

/// Store of named buckets.
pub trait BucketStore: Send + Sync {
    /// Open a bucket, creating it if it doesn't exist.
    /// The returned handle must be closed after use.
    fn bucket(&self, bucket_id: &str) -> Result<Box<dyn Bucket>>;

    /// Name of the backend.
    fn backend(&self) -> &'static str;

    /// Persist outstanding changes and close the store. Buckets opened
    /// afterwards fail.
    fn close(&self) -> Result<()>;
}

/// Handle to one bucket.
pub trait Bucket: Send {
    fn id(&self) -> &str;

    /// Value for `key`, `None` if the key doesn't exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Values of the keys that exist. Missing keys are left out.
    fn get_multiple(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>>;

    /// Store a copy of `value` under `key`, replacing an existing value.
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Store a batch of key-values.
    fn set_multiple(&self, docs: BTreeMap<String, Vec<u8>>) -> Result<()>;

    /// Remove a key. Succeeds if the key doesn't exist.
    fn delete(&self, key: &str) -> Result<()>;

    /// New cursor over this bucket. The cursor starts unpositioned and must
    /// be released after use.
    fn cursor(&self) -> Result<Box<dyn BucketCursor>>;

    fn info(&self) -> BucketInfo;

    /// Close the handle. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Bidirectional cursor over the ordered keys of a bucket.
///
/// Moves return `None` when there is no entry in that direction. Stepping
/// past either end parks the cursor just outside the range, so a step back
/// in the other direction returns the boundary entry again.
pub trait BucketCursor: Send {
    fn bucket_id(&self) -> &str;

    /// Position at the first key.
    fn first(&mut self) -> Option<Entry>;

    /// Position at the last key.
    fn last(&mut self) -> Option<Entry>;

    /// Move to the next key. An unpositioned cursor moves to the first key.
    fn next(&mut self) -> Option<Entry>;

    /// Move to the previous key. An unpositioned cursor moves to the last key.
    fn prev(&mut self) -> Option<Entry>;

    /// Position at `key`, or the first key after it.
    fn seek(&mut self, key: &str) -> Option<Entry>;

    /// Release the cursor. Later moves return `None`.
    fn release(&mut self);
}
