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

//! Bounded name search over a raw bucket cursor
//!
//! A filtered history cursor steps the raw cursor until it meets a key with
//! the wanted name. The walk stops at a time bound; the step that crossed the
//! bound is undone so the raw cursor stays on the last key inside it.
//!
//! ```text
//!            ┌──────────┐ undecodable / other name
//!   step ───▶│ Scanning │◀──────────────┐
//!            └────┬─────┘───────────────┘
//!     ┌───────────┼───────────────┐
//!     ▼           ▼               ▼
//!  Found    BoundExceeded     Exhausted
//!           (undo one step)
//! ```

use hubhistory_core::HistoryKey;

/// Direction of a cursor walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn reverse(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    /// Keep stepping.
    Scanning,
    /// The key is past the time bound; undo the step.
    BoundExceeded,
    /// The key carries the wanted name.
    Found,
    /// The raw cursor ran out of keys.
    Exhausted,
}

impl SearchState {
    pub fn is_done(self) -> bool {
        self != SearchState::Scanning
    }
}

/// Search for the next key named `name` in `direction`.
///
/// The bound is the latest timestamp accepted when searching forward and the
/// earliest when searching backward.
#[derive(Debug, Clone)]
pub struct BoundedSearch<'a> {
    name: &'a str,
    direction: Direction,
    bound_msec: i64,
}

impl<'a> BoundedSearch<'a> {
    pub fn new(name: &'a str, direction: Direction, bound_msec: i64) -> Self {
        Self {
            name,
            direction,
            bound_msec,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// State after the raw cursor stepped onto `key`, `None` when it had
    /// nothing left.
    pub fn advance(&self, key: Option<&str>) -> SearchState {
        let Some(key) = key else {
            return SearchState::Exhausted;
        };
        let decoded = match HistoryKey::decode(key) {
            Some(decoded) if decoded.is_complete() => decoded,
            _ => return SearchState::Scanning,
        };
        let beyond = match self.direction {
            Direction::Forward => decoded.created_msec > self.bound_msec,
            Direction::Backward => decoded.created_msec < self.bound_msec,
        };
        if beyond {
            SearchState::BoundExceeded
        } else if decoded.name == self.name {
            SearchState::Found
        } else {
            SearchState::Scanning
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubhistory_core::ValueKind;

    fn key(msec: i64, name: &str) -> String {
        HistoryKey::encode(msec, name, ValueKind::Event)
    }

    #[test]
    fn test_forward_transitions() {
        let search = BoundedSearch::new("temperature", Direction::Forward, 2000);
        assert_eq!(search.advance(None), SearchState::Exhausted);
        assert_eq!(
            search.advance(Some(&key(1000, "humidity"))),
            SearchState::Scanning
        );
        assert_eq!(
            search.advance(Some(&key(2000, "temperature"))),
            SearchState::Found
        );
        assert_eq!(
            search.advance(Some(&key(2001, "temperature"))),
            SearchState::BoundExceeded
        );
    }

    #[test]
    fn test_backward_transitions() {
        let search = BoundedSearch::new("temperature", Direction::Backward, 1000);
        assert_eq!(
            search.advance(Some(&key(1000, "temperature"))),
            SearchState::Found
        );
        assert_eq!(
            search.advance(Some(&key(999, "temperature"))),
            SearchState::BoundExceeded
        );
        assert_eq!(search.direction().reverse(), Direction::Forward);
    }

    #[test]
    fn test_incomplete_keys_are_skipped() {
        let search = BoundedSearch::new("temperature", Direction::Forward, 0);
        // two segments and a bad timestamp; neither is checked against the bound
        assert_eq!(
            search.advance(Some("00000000000000005000/temperature")),
            SearchState::Scanning
        );
        assert_eq!(search.advance(Some("garbage")), SearchState::Scanning);
        assert!(!SearchState::Scanning.is_done());
        assert!(SearchState::Found.is_done());
    }
}
