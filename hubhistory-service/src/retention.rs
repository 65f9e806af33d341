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

//! Retention rule registry
//!
//! Decides which event values are recorded. Rules are keyed by value name;
//! the rule with an empty name is the wildcard consulted for names without
//! a rule of their own. With no rules at all every value is recorded.

use hubhistory_core::{RetentionRule, StoredValue};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct RetentionRules {
    rules: RwLock<HashMap<String, RetentionRule>>,
}

impl RetentionRules {
    /// Registry holding the given rules. A later rule with the same name
    /// replaces an earlier one.
    pub fn new(rules: impl IntoIterator<Item = RetentionRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| (rule.name.clone(), rule))
            .collect::<HashMap<_, _>>();
        Self {
            rules: RwLock::new(rules),
        }
    }

    /// Whether a value named `name` of the given Thing is recorded.
    pub fn admit(&self, name: &str, agent_id: &str, thing_id: &str) -> bool {
        let rules = self.rules.read();
        if rules.is_empty() {
            return true;
        }
        match rules.get(name).or_else(|| rules.get("")) {
            Some(rule) => rule.admits(agent_id, thing_id),
            None => false,
        }
    }

    /// Whether `value` would be recorded.
    pub fn test_value(&self, value: &StoredValue) -> bool {
        let admitted = self.admit(&value.name, &value.agent_id, &value.thing_id);
        debug!(
            name = %value.name,
            address = %value.address(),
            admitted,
            "Tested value retention"
        );
        admitted
    }

    pub fn get_rule(&self, name: &str) -> Option<RetentionRule> {
        self.rules.read().get(name).cloned()
    }

    /// All rules, ordered by name.
    pub fn get_rules(&self) -> Vec<RetentionRule> {
        let mut rules: Vec<_> = self.rules.read().values().cloned().collect();
        rules.sort_by(|a, b| a.name.cmp(&b.name));
        rules
    }

    /// Add or replace the rule for `rule.name`.
    pub fn set_rule(&self, rule: RetentionRule) {
        info!(name = %rule.name, retain = rule.retain, "Set retention rule");
        self.rules.write().insert(rule.name.clone(), rule);
    }

    /// Remove the rule for `name`. Removing a missing rule is not an error.
    pub fn remove_rule(&self, name: &str) {
        if self.rules.write().remove(name).is_some() {
            info!(name, "Removed retention rule");
        }
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_rules_admits_everything() {
        let rules = RetentionRules::default();
        assert!(rules.admit("temperature", "agent1", "thing1"));
        assert!(rules.admit("anything", "", ""));
    }

    #[test]
    fn test_exact_rule() {
        let rules = RetentionRules::new(vec![
            RetentionRule::retain("temperature").with_agents(["agent1"]),
            RetentionRule::discard("noise"),
        ]);
        assert!(rules.admit("temperature", "agent1", "thing1"));
        assert!(!rules.admit("temperature", "agent2", "thing1"));
        assert!(!rules.admit("noise", "agent1", "thing1"));
        // no rule for the name and no wildcard
        assert!(!rules.admit("humidity", "agent1", "thing1"));
    }

    #[test]
    fn test_wildcard_only_without_exact_rule() {
        let rules = RetentionRules::new(vec![
            RetentionRule::retain(""),
            RetentionRule::retain("temperature").with_things(["thing1"]),
        ]);
        assert!(rules.admit("humidity", "agent1", "thing2"));
        assert!(rules.admit("temperature", "agent1", "thing1"));
        assert!(!rules.admit("temperature", "agent1", "thing2"));
    }

    #[test]
    fn test_exclude_by_thing_and_address() {
        let rules = RetentionRules::new(vec![
            RetentionRule::retain("temperature").with_exclude(["thing1", "agent2/thing2"])
        ]);
        assert!(!rules.admit("temperature", "agent1", "thing1"));
        assert!(!rules.admit("temperature", "agent2", "thing2"));
        assert!(rules.admit("temperature", "agent1", "thing2"));
    }

    #[test]
    fn test_administration() {
        let rules = RetentionRules::default();
        rules.set_rule(RetentionRule::retain("b"));
        rules.set_rule(RetentionRule::retain("a"));
        assert_eq!(rules.len(), 2);
        assert_eq!(
            rules.get_rules().iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        rules.set_rule(RetentionRule::discard("a"));
        assert!(!rules.get_rule("a").unwrap().retain);

        rules.remove_rule("a");
        rules.remove_rule("missing");
        assert!(rules.get_rule("a").is_none());
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn test_value() {
        let rules = RetentionRules::new(vec![RetentionRule::retain("temperature")]);
        assert!(rules.test_value(&StoredValue::event("a", "t", "temperature", "1")));
        assert!(!rules.test_value(&StoredValue::event("a", "t", "humidity", "1")));
    }
}
