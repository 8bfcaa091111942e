use thiserror::Error;

use crate::formula::FormulaError;

use super::ConditionOperator;

/// A condition whose operand does not suit its operator, or whose values
/// cannot be compared.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("operator '{operator}' on field '{field}' expects {expected}, got {found}")]
    InvalidOperand {
        field: String,
        operator: ConditionOperator,
        expected: &'static str,
        found: String,
    },

    #[error("operator '{operator}' cannot compare field '{field}' ({left}) with {right}")]
    Incomparable {
        field: String,
        operator: ConditionOperator,
        left: &'static str,
        right: &'static str,
    },

    #[error("invalid regex pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("NOT group has no condition to negate")]
    EmptyNotGroup,
}

/// Failure computing a single action's value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("{kind} action has no amount")]
    MissingAmount { kind: &'static str },

    #[error("{kind} action has no metric")]
    MissingMetric { kind: &'static str },

    #[error("formula action has no formula")]
    MissingFormula,

    #[error("formula action requires an interpreter")]
    NoInterpreter,

    #[error("invalid benchmark unit '{unit}'")]
    InvalidUnit { unit: String },

    #[error("action produced a non-finite value")]
    NonFinite,

    #[error("sum of action values is not finite")]
    NonFiniteTotal,

    #[error(transparent)]
    Formula(#[from] FormulaError),
}

/// Why a rule errored.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleFailure {
    #[error(transparent)]
    Condition(#[from] ConditionError),

    #[error(transparent)]
    Actions(#[from] ActionError),
}

/// A rule whose conditions could not be evaluated, or whose actions did not
/// add up to a finite adjustment.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("rule '{rule_id}' failed: {source}")]
pub struct RuleEvaluationError {
    pub rule_id: String,
    pub source: RuleFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("duplicate rule id '{id}'")]
    DuplicateRule { id: String },

    #[error("rule '{name}' has an empty id")]
    EmptyRuleId { name: String },

    #[error("rule '{rule_id}': {message}")]
    InvalidPattern { rule_id: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_operand_message() {
        let err = ConditionError::InvalidOperand {
            field: "ram_gb".into(),
            operator: ConditionOperator::Between,
            expected: "a [min, max] list",
            found: "16".into(),
        };
        assert_eq!(
            err.to_string(),
            "operator 'between' on field 'ram_gb' expects a [min, max] list, got 16"
        );
    }

    #[test]
    fn incomparable_message() {
        let err = ConditionError::Incomparable {
            field: "condition".into(),
            operator: ConditionOperator::GreaterThan,
            left: "string",
            right: "int",
        };
        assert_eq!(
            err.to_string(),
            "operator 'greater_than' cannot compare field 'condition' (string) with int"
        );
    }

    #[test]
    fn empty_not_group_message() {
        assert_eq!(
            ConditionError::EmptyNotGroup.to_string(),
            "NOT group has no condition to negate"
        );
    }

    #[test]
    fn rule_failure_messages() {
        let err = RuleEvaluationError {
            rule_id: "ram".into(),
            source: ActionError::NonFiniteTotal.into(),
        };
        assert_eq!(
            err.to_string(),
            "rule 'ram' failed: sum of action values is not finite"
        );
        let err = RuleEvaluationError {
            rule_id: "not".into(),
            source: ConditionError::EmptyNotGroup.into(),
        };
        assert_eq!(
            err.to_string(),
            "rule 'not' failed: NOT group has no condition to negate"
        );
    }

    #[test]
    fn action_errors() {
        assert_eq!(
            ActionError::MissingAmount { kind: "per_unit" }.to_string(),
            "per_unit action has no amount"
        );
        assert_eq!(
            ActionError::InvalidUnit {
                unit: "per_zero_points".into()
            }
            .to_string(),
            "invalid benchmark unit 'per_zero_points'"
        );
        let formula = ActionError::from(FormulaError::UndefinedVariable {
            name: "gpu_score".into(),
            available: vec![],
        });
        assert_eq!(formula.to_string(), "undefined variable 'gpu_score'");
    }

    #[test]
    fn rule_evaluation_error_message() {
        let err = RuleEvaluationError {
            rule_id: "42".into(),
            source: ConditionError::EmptyNotGroup.into(),
        };
        assert_eq!(
            err.to_string(),
            "rule '42' failed: NOT group has no condition to negate"
        );
    }

    #[test]
    fn duplicate_rule_message() {
        let err = CompileError::DuplicateRule { id: "7".into() };
        assert_eq!(err.to_string(), "duplicate rule id '7'");
    }
}
