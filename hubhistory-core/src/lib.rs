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

//! Hub History Core
//!
//! Fundamental data structures for the Thing history store: stored values,
//! the bucket key codec, retention rules, configuration and the shared
//! error type.

pub mod config;
pub mod error;
pub mod key;
pub mod retention;
pub mod time;
pub mod value;

pub use config::{
    CacheConfig, CursorConfig, HistoryConfig, StorageConfig, BACKEND_KVBTREE, BACKEND_MEMORY,
    SUPPORTED_BACKENDS,
};
pub use error::{HistoryError, Result};
pub use key::{HistoryKey, KEY_SEPARATOR};
pub use retention::RetentionRule;
pub use time::{now_msec, parse_timestamp};
pub use value::{thing_address, StoredValue, ValueKind, EVENT_NAME_PROPERTIES};
