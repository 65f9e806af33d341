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

//! Thing event and action values as stored in the history.

use serde::{Deserialize, Serialize};

/// Name of the aggregate event whose payload is a JSON map of property
/// name to value.
pub const EVENT_NAME_PROPERTIES: &str = "properties";

/// Whether a value is an event or an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    #[default]
    Event,
    Action,
}

impl ValueKind {
    /// Suffix used in the bucket key.
    pub fn tag(self) -> &'static str {
        match self {
            ValueKind::Event => "e",
            ValueKind::Action => "a",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "e" => Some(ValueKind::Event),
            "a" => Some(ValueKind::Action),
            _ => None,
        }
    }
}

/// Bucket address of a Thing: `{agent_id}/{thing_id}`.
pub fn thing_address(agent_id: &str, thing_id: &str) -> String {
    format!("{}/{}", agent_id, thing_id)
}

/// One event, action or property observation of a Thing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredValue {
    /// Agent (publisher) of the Thing.
    pub agent_id: String,
    /// Thing ID as published by the agent.
    pub thing_id: String,
    /// Event, action or property name.
    pub name: String,
    /// Application defined payload.
    #[serde(default)]
    pub data: Vec<u8>,
    /// Time the value was created, in milliseconds since the Unix epoch.
    /// Zero means "not set"; ingestion replaces it with the current time.
    #[serde(default)]
    pub created_msec: i64,
    #[serde(default)]
    pub kind: ValueKind,
}

impl StoredValue {
    /// Create an event value without a timestamp.
    pub fn event(
        agent_id: impl Into<String>,
        thing_id: impl Into<String>,
        name: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            thing_id: thing_id.into(),
            name: name.into(),
            data: data.into(),
            created_msec: 0,
            kind: ValueKind::Event,
        }
    }

    /// Create an action value without a timestamp.
    pub fn action(
        agent_id: impl Into<String>,
        thing_id: impl Into<String>,
        name: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            kind: ValueKind::Action,
            ..Self::event(agent_id, thing_id, name, data)
        }
    }

    /// Set the creation time.
    pub fn with_created(mut self, created_msec: i64) -> Self {
        self.created_msec = created_msec;
        self
    }

    /// Bucket address of the Thing this value belongs to.
    pub fn address(&self) -> String {
        thing_address(&self.agent_id, &self.thing_id)
    }

    pub fn is_action(&self) -> bool {
        self.kind == ValueKind::Action
    }

    /// Payload as text, for logging and display.
    pub fn data_lossy(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        assert_eq!(ValueKind::Event.tag(), "e");
        assert_eq!(ValueKind::from_tag("a"), Some(ValueKind::Action));
        assert_eq!(ValueKind::from_tag("x"), None);
    }

    #[test]
    fn test_address() {
        let v = StoredValue::action("device1", "thing-0", "switch", "on");
        assert_eq!(v.address(), "device1/thing-0");
        assert!(v.is_action());
        assert_eq!(v.created_msec, 0);
    }

    #[test]
    fn test_json_defaults() {
        let v: StoredValue = serde_json::from_str(
            r#"{"agent_id":"a","thing_id":"t","name":"temperature"}"#,
        )
        .unwrap();
        assert_eq!(v.kind, ValueKind::Event);
        assert!(v.data.is_empty());
    }
}
