use serde::{Deserialize, Serialize};

use super::action::Action;
use super::condition::ConditionNode;
use crate::actions::PreparedFormula;
use crate::conditions::Patterns;

/// A named pairing of match conditions and value-producing actions.
///
/// A rule without conditions always matches. Rules run in ascending
/// `evaluation_order`; ties keep their input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub conditions: Option<ConditionNode>,
    pub actions: Vec<Action>,
    pub is_active: bool,
    pub evaluation_order: i32,
}

impl Rule {
    /// An active rule with no conditions, no actions and order 0.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            conditions: None,
            actions: Vec::new(),
            is_active: true,
            evaluation_order: 0,
        }
    }

    /// Set the match conditions.
    #[must_use]
    pub fn when(mut self, conditions: impl Into<ConditionNode>) -> Self {
        self.conditions = Some(conditions.into());
        self
    }

    /// Append an action.
    #[must_use]
    pub fn then(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    #[must_use]
    pub fn active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    #[must_use]
    pub fn order(mut self, evaluation_order: i32) -> Self {
        self.evaluation_order = evaluation_order;
        self
    }
}

/// A rule with its formula actions parsed and its regex operands compiled
/// ahead of time.
///
/// `formulas` is parallel to `rule.actions`. `patterns` is not serialized
/// and is rebuilt when a cached ruleset is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct CompiledRule {
    pub(crate) rule: Rule,
    pub(crate) formulas: Vec<PreparedFormula>,
    #[serde(skip)]
    pub(crate) patterns: Patterns,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::field;

    #[test]
    fn builder_defaults() {
        let rule = Rule::new("1", "RAM bonus");
        assert!(rule.is_active);
        assert_eq!(rule.evaluation_order, 0);
        assert!(rule.conditions.is_none());
        assert!(rule.actions.is_empty());
    }

    #[test]
    fn builder_chain() {
        let rule = Rule::new("2", "used")
            .when(field("condition").eq("used"))
            .then(Action::fixed(-20.0))
            .then(Action::per_unit("per_gb", 2.0))
            .order(5)
            .active(false);
        assert_eq!(rule.actions.len(), 2);
        assert_eq!(rule.evaluation_order, 5);
        assert!(!rule.is_active);
        assert_eq!(
            rule.conditions.unwrap().to_string(),
            "(condition equals \"used\")"
        );
    }
}
