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

//! Hub History Service
//!
//! Time-indexed history of Thing events and actions on top of a bucket
//! store:
//!
//! - [`AddHistory`]: validates, retention-filters and writes values
//! - [`HistoryCursor`]: bidirectional iteration over one Thing, optionally
//!   by value name
//! - [`LatestValues`]: most recent value per name of each Thing
//! - [`CursorRegistry`]: cursors behind opaque handles with an idle lifespan
//! - [`HistoryService`]: all of the above behind one facade
//!
//! ## Example
//!
//! ```rust,ignore
//! use hubhistory_core::{HistoryConfig, StoredValue};
//! use hubhistory_service::HistoryService;
//!
//! let service = HistoryService::new(HistoryConfig::in_memory())?;
//! service.add_event(StoredValue::event("device1", "thing-0", "temperature", "12.5"))?;
//!
//! let handle = service.get_cursor("device1", "thing-0", Some("temperature"))?;
//! let newest = service.cursor_last(&handle)?;
//! service.cursor_release(&handle)?;
//! ```

pub mod add;
pub mod cursor;
pub mod latest;
pub mod read;
pub mod retention;
pub mod search;
pub mod service;

pub use add::{AddHistory, ValueAddedHook};
pub use cursor::HistoryCursor;
pub use latest::{LatestValues, PROPERTIES_BUCKET};
pub use read::CursorRegistry;
pub use retention::RetentionRules;
pub use search::{BoundedSearch, Direction, SearchState};
pub use service::HistoryService;
