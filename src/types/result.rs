use std::fmt;

use serde::{Deserialize, Serialize};

use super::{ActionError, ActionKind};

/// A modifier pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierStage {
    Field,
    Condition,
    Age,
    Brand,
}

impl fmt::Display for ModifierStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModifierStage::Field => write!(f, "field"),
            ModifierStage::Condition => write!(f, "condition"),
            ModifierStage::Age => write!(f, "age"),
            ModifierStage::Brand => write!(f, "brand"),
        }
    }
}

/// One modifier stage that changed an action's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedModifier {
    pub stage: ModifierStage,
    /// The context value that selected the multiplier (e.g. `"used"`).
    pub key: String,
    pub multiplier: f64,
}

/// How an action's value was reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDetails {
    pub base_value: f64,
    pub modifiers: Vec<AppliedModifier>,
}

/// One breakdown entry: an action's value, or the error that zeroed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_type: ActionKind,
    pub metric: Option<String>,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ActionDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Result of running a list of actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub total: f64,
    pub breakdown: Vec<ActionResult>,
    /// Set when the action values do not sum to a finite total.
    #[serde(skip)]
    pub error: Option<ActionError>,
}

/// Outcome of one rule. Errored rules are unmatched with zero adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEvaluationResult {
    pub rule_id: String,
    pub rule_name: String,
    pub matched: bool,
    pub adjustment_value: f64,
    pub breakdown: Vec<ActionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RuleEvaluationResult {
    pub(crate) fn unmatched(rule_id: &str, rule_name: &str) -> Self {
        Self {
            rule_id: rule_id.to_owned(),
            rule_name: rule_name.to_owned(),
            matched: false,
            adjustment_value: 0.0,
            breakdown: Vec::new(),
            error: None,
        }
    }

    /// Whether this rule contributes to the total adjustment.
    #[must_use]
    pub fn contributes(&self) -> bool {
        self.matched && self.error.is_none()
    }
}

/// A contributing rule in an [`AdjustmentSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedRule {
    pub rule_id: String,
    pub rule_name: String,
    pub adjustment: f64,
    pub breakdown: Vec<ActionResult>,
}

/// Total adjustment over a ruleset evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[must_use]
pub struct AdjustmentSummary {
    pub total_adjustment: f64,
    pub matched_rules_count: usize,
    pub matched_rules: Vec<MatchedRule>,
    /// Set when the matched adjustments overflow; `total_adjustment` is then 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AdjustmentSummary {
    /// Serialize to the result JSON shape.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] only if serialization itself fails.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for AdjustmentSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total_adjustment: {}, matched: [",
            self.total_adjustment
        )?;
        for (i, rule) in self.matched_rules.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} = {}", rule.rule_name, rule.adjustment)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(value: f64) -> ActionResult {
        ActionResult {
            action_type: ActionKind::FixedValue,
            metric: None,
            value,
            details: Some(ActionDetails {
                base_value: value,
                modifiers: vec![],
            }),
            error: None,
        }
    }

    #[test]
    fn summary_json_shape() {
        let summary = AdjustmentSummary {
            total_adjustment: 25.0,
            matched_rules_count: 1,
            matched_rules: vec![MatchedRule {
                rule_id: "1".into(),
                rule_name: "RAM bonus".into(),
                adjustment: 25.0,
                breakdown: vec![entry(25.0)],
            }],
            error: None,
        };
        let json: serde_json::Value =
            serde_json::from_str(&summary.to_json_string().unwrap()).unwrap();
        assert_eq!(json["total_adjustment"], 25.0);
        assert_eq!(json["matched_rules_count"], 1);
        let breakdown = &json["matched_rules"][0]["breakdown"][0];
        assert_eq!(breakdown["action_type"], "fixed_value");
        assert_eq!(breakdown["value"], 25.0);
        assert!(breakdown.get("error").is_none());
        assert_eq!(breakdown["details"]["base_value"], 25.0);
    }

    #[test]
    fn error_entries_omit_details() {
        let failed = ActionResult {
            action_type: ActionKind::Formula,
            metric: None,
            value: 0.0,
            details: None,
            error: Some("undefined variable 'x'".into()),
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert!(json.get("details").is_none());
        assert_eq!(json["error"], "undefined variable 'x'");
        assert!(failed.is_error());
    }

    #[test]
    fn contributes_requires_match_without_error() {
        let mut result = RuleEvaluationResult::unmatched("1", "r");
        assert!(!result.contributes());
        result.matched = true;
        assert!(result.contributes());
        result.error = Some("boom".into());
        assert!(!result.contributes());
    }

    #[test]
    fn display() {
        let summary = AdjustmentSummary {
            total_adjustment: 10.0,
            matched_rules_count: 1,
            matched_rules: vec![MatchedRule {
                rule_id: "1".into(),
                rule_name: "bonus".into(),
                adjustment: 10.0,
                breakdown: vec![],
            }],
            error: None,
        };
        assert_eq!(summary.to_string(), "total_adjustment: 10, matched: [bonus = 10]");
    }
}
