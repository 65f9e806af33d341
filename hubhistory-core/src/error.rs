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

//! Error type shared by the history crates.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the history crates.
pub type Result<T> = std::result::Result<T, HistoryError>;

/// All errors surfaced by the history store.
///
/// Decoding problems with persisted keys or cached snapshots are recovered
/// locally and never show up here; only caller mistakes and storage failures
/// do.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The value has no agent or thing ID, so it has no bucket address.
    #[error("missing agent/thing address in value with name '{name}'")]
    MissingAddress { name: String },

    /// The value has no event or action name.
    #[error("missing name for event or action of thing '{address}'")]
    MissingName { address: String },

    /// The retention rules do not admit this value.
    #[error("no retention for value '{name}' of thing '{address}'")]
    NotRetained { name: String, address: String },

    /// The cursor handle is unknown, released or expired.
    #[error("cursor '{0}' not found or expired")]
    CursorNotFound(String),

    /// Operation on a bucket or store that was already closed.
    #[error("bucket '{0}' is closed")]
    BucketClosed(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// A persisted store file failed its integrity check.
    #[error("store file {path:?} is corrupt: {reason}")]
    CorruptStore { path: PathBuf, reason: String },

    #[error("unsupported storage backend '{0}'")]
    UnsupportedBackend(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HistoryError {
    /// True for errors caused by the value itself rather than by storage.
    ///
    /// Bulk ingestion drops such values instead of failing the batch.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            HistoryError::MissingAddress { .. }
                | HistoryError::MissingName { .. }
                | HistoryError::NotRetained { .. }
        )
    }
}
