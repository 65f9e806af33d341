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

//! Retention rule definition
//!
//! A rule decides whether values with a given name are recorded in the
//! history. Rules are looked up by value name; the rule with the empty name
//! applies to names without a rule of their own.

use serde::{Deserialize, Serialize};

/// Admission rule for values with a given name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RetentionRule {
    /// Value name this rule applies to. Empty for the wildcard rule.
    #[serde(default)]
    pub name: String,

    /// Only accept values from these agents. Empty accepts any agent.
    #[serde(default)]
    pub agents: Vec<String>,

    /// Only accept values from these things. Empty accepts any thing.
    #[serde(default)]
    pub things: Vec<String>,

    /// Never accept values from these things. Entries are thing IDs or
    /// `{agent_id}/{thing_id}` addresses.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Whether matching values are recorded.
    #[serde(default = "default_retain")]
    pub retain: bool,
}

fn default_retain() -> bool {
    true
}

impl RetentionRule {
    /// Rule retaining the named value from any agent and thing.
    pub fn retain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            retain: true,
            ..Self::default()
        }
    }

    /// Rule dropping the named value from any agent and thing.
    pub fn discard(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            retain: false,
            ..Self::default()
        }
    }

    pub fn with_agents<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.agents = agents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_things<I, S>(mut self, things: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.things = things.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exclude<I, S>(mut self, exclude: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = exclude.into_iter().map(Into::into).collect();
        self
    }

    /// True if this is the wildcard rule.
    pub fn is_wildcard(&self) -> bool {
        self.name.is_empty()
    }

    /// Evaluate the rule for a value from the given agent and thing.
    pub fn admits(&self, agent_id: &str, thing_id: &str) -> bool {
        let agent_ok = self.agents.is_empty() || self.agents.iter().any(|a| a == agent_id);
        let thing_ok = self.things.is_empty() || self.things.iter().any(|t| t == thing_id);
        if !(agent_ok && thing_ok) {
            return false;
        }
        let excluded = self.exclude.iter().any(|x| match x.split_once('/') {
            Some((agent, thing)) => agent == agent_id && thing == thing_id,
            None => x == thing_id,
        });
        !excluded && self.retain
    }
}
