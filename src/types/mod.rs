mod action;
mod condition;
mod context;
mod error;
mod expr;
mod result;
mod rule;
mod ruleset;
mod value;

pub use action::{Action, ActionKind, AgeDepreciation, FieldMultiplier, ModifierSet};
pub(crate) use action::{lowercase_table, multiplier_for};
pub use condition::{
    Condition, ConditionGroup, ConditionNode, ConditionOperator, FieldCondition, FieldType,
    LogicalOperator, UnknownName, all, any, field,
};
pub use context::{ContextError, EvaluationContext};
pub use error::{ActionError, CompileError, ConditionError, RuleEvaluationError, RuleFailure};
pub use expr::{BinaryOp, CompareOp, Expr, LogicalOp, UnaryOp};
pub use result::{
    ActionDetails, ActionOutcome, ActionResult, AdjustmentSummary, AppliedModifier, MatchedRule,
    ModifierStage, RuleEvaluationResult,
};
pub(crate) use rule::CompiledRule;
pub use rule::Rule;
pub use ruleset::{RuleSet, RuleSetBuilder};
pub use value::Value;
