//! Listing valuation rules: conditions over a listing's fields select rules,
//! and each matched rule's actions add up to a price adjustment.
//!
//! Formula actions run in a sandboxed expression language (see [`formula`])
//! that can only read context fields and call a fixed set of numeric
//! functions.

mod actions;
mod compile;
mod conditions;
mod config;
pub mod definition;
mod error;
mod evaluate;
pub mod formula;
#[cfg(feature = "binary-cache")]
pub mod serial;
mod types;

pub use actions::ActionEngine;
pub use config::{ConfigError, EngineConfig, MetricSource};
pub use definition::{DefinitionError, parse_rules};
pub use error::ValuatorError;
pub use evaluate::{RuleEvaluator, calculate_total_adjustment};
pub use formula::{FormulaError, FormulaLimits, Interpreter};
#[cfg(feature = "binary-cache")]
pub use serial::{DeserializeError, SerializeError};
pub use types::{
    Action, ActionDetails, ActionError, ActionKind, ActionOutcome, ActionResult,
    AdjustmentSummary, AgeDepreciation, AppliedModifier, BinaryOp, CompareOp, CompileError,
    Condition, ConditionError, ConditionGroup, ConditionNode, ConditionOperator, ContextError,
    EvaluationContext, Expr, FieldCondition, FieldMultiplier, FieldType, LogicalOp,
    LogicalOperator, MatchedRule, ModifierSet, ModifierStage, Rule, RuleEvaluationError,
    RuleEvaluationResult, RuleFailure, RuleSet, RuleSetBuilder, UnaryOp, UnknownName, Value, all,
    any, field,
};
