//! Evaluation of conditions and condition groups against a context.

use std::cmp::Ordering;
use std::collections::HashMap;

use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::types::{
    Condition, ConditionError, ConditionGroup, ConditionNode, ConditionOperator,
    EvaluationContext, FieldType, LogicalOperator, Value,
};

/// Regex operands of a condition tree, compiled once and keyed by pattern.
#[derive(Debug, Clone, Default)]
pub(crate) struct Patterns(HashMap<String, Regex>);

impl Patterns {
    /// Compile every regex operand under `node`.
    pub(crate) fn compile(node: &ConditionNode) -> Result<Self, ConditionError> {
        let mut patterns = Self::default();
        patterns.collect(node)?;
        Ok(patterns)
    }

    fn collect(&mut self, node: &ConditionNode) -> Result<(), ConditionError> {
        match node {
            ConditionNode::Condition(c) => {
                if c.operator == ConditionOperator::Regex
                    && let Value::String(pattern) = &c.value
                    && !self.0.contains_key(pattern)
                {
                    self.0.insert(pattern.clone(), build_regex(pattern)?);
                }
                Ok(())
            }
            ConditionNode::Group(g) => g.children.iter().try_for_each(|child| self.collect(child)),
        }
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

impl PartialEq for Patterns {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.keys().all(|k| other.0.contains_key(k))
    }
}

fn build_regex(pattern: &str) -> Result<Regex, ConditionError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| ConditionError::InvalidPattern {
            pattern: pattern.to_owned(),
            message: e.to_string(),
        })
}

impl Condition {
    /// Test this condition against `context`.
    ///
    /// A missing or null field fails every operator except `is_null`
    /// (true) and `is_not_null` (false).
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError`] when the operand does not suit the
    /// operator, an ordering compares unrelated types, or a regex pattern
    /// does not compile.
    pub fn evaluate(&self, context: &EvaluationContext) -> Result<bool, ConditionError> {
        self.evaluate_in(context, None)
    }

    fn evaluate_in(
        &self,
        context: &EvaluationContext,
        patterns: Option<&Patterns>,
    ) -> Result<bool, ConditionError> {
        let actual = context.lookup(&self.field_path).filter(|v| !v.is_null());

        match self.operator {
            ConditionOperator::IsNull => return Ok(actual.is_none()),
            ConditionOperator::IsNotNull => return Ok(actual.is_some()),
            _ => {}
        }
        let Some(actual) = actual else {
            return Ok(false);
        };

        match self.operator {
            ConditionOperator::Equals => Ok(self.equals(actual, &self.value)),
            ConditionOperator::NotEquals => Ok(!self.equals(actual, &self.value)),
            ConditionOperator::GreaterThan => {
                Ok(self.ordering(actual, &self.value)? == Ordering::Greater)
            }
            ConditionOperator::GreaterThanOrEqual => {
                Ok(self.ordering(actual, &self.value)? != Ordering::Less)
            }
            ConditionOperator::LessThan => Ok(self.ordering(actual, &self.value)? == Ordering::Less),
            ConditionOperator::LessThanOrEqual => {
                Ok(self.ordering(actual, &self.value)? != Ordering::Greater)
            }
            ConditionOperator::Between => self.between(actual),
            ConditionOperator::In => Ok(self.member_of(actual)?),
            ConditionOperator::NotIn => Ok(!self.member_of(actual)?),
            ConditionOperator::Contains => Ok(self.contains(actual)),
            ConditionOperator::StartsWith => {
                Ok(lower(actual).starts_with(&lower(&self.value)))
            }
            ConditionOperator::EndsWith => Ok(lower(actual).ends_with(&lower(&self.value))),
            ConditionOperator::Regex => self.regex(actual, patterns),
            ConditionOperator::IsNull | ConditionOperator::IsNotNull => Ok(false),
        }
    }

    fn invalid_operand(&self, expected: &'static str) -> ConditionError {
        ConditionError::InvalidOperand {
            field: self.field_path.clone(),
            operator: self.operator,
            expected,
            found: self.value.to_string(),
        }
    }

    /// Case-insensitive for strings, numeric when both sides are numbers,
    /// otherwise exact equality.
    fn equals(&self, actual: &Value, expected: &Value) -> bool {
        if self.data_type == FieldType::Boolean
            && let (Some(a), Some(b)) = (as_bool(actual), as_bool(expected))
        {
            return a == b;
        }
        match (actual, expected) {
            (Value::String(a), Value::String(b)) => a.to_lowercase() == b.to_lowercase(),
            (a, b) => match (a.coerce_f64(), b.coerce_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => a == b,
            },
        }
    }

    fn ordering(&self, actual: &Value, bound: &Value) -> Result<Ordering, ConditionError> {
        if let (Some(x), Some(y)) = (actual.coerce_f64(), bound.coerce_f64())
            && let Some(ordering) = x.partial_cmp(&y)
        {
            return Ok(ordering);
        }
        if let (Value::String(a), Value::String(b)) = (actual, bound) {
            return Ok(a.to_lowercase().cmp(&b.to_lowercase()));
        }
        Err(ConditionError::Incomparable {
            field: self.field_path.clone(),
            operator: self.operator,
            left: actual.type_name(),
            right: bound.type_name(),
        })
    }

    fn between(&self, actual: &Value) -> Result<bool, ConditionError> {
        let Value::List(range) = &self.value else {
            return Err(self.invalid_operand("a [min, max] list"));
        };
        let [min, max] = range.as_slice() else {
            return Err(self.invalid_operand("a [min, max] list"));
        };
        Ok(self.ordering(actual, min)? != Ordering::Less
            && self.ordering(actual, max)? != Ordering::Greater)
    }

    fn member_of(&self, actual: &Value) -> Result<bool, ConditionError> {
        let Value::List(items) = &self.value else {
            return Err(self.invalid_operand("a list of values"));
        };
        Ok(items.iter().any(|item| self.equals(actual, item)))
    }

    fn contains(&self, actual: &Value) -> bool {
        match actual {
            Value::List(items) => items.iter().any(|item| self.equals(item, &self.value)),
            other => lower(other).contains(&lower(&self.value)),
        }
    }

    fn regex(&self, actual: &Value, patterns: Option<&Patterns>) -> Result<bool, ConditionError> {
        let Value::String(pattern) = &self.value else {
            return Err(self.invalid_operand("a regex pattern string"));
        };
        let text = actual.to_plain_string();
        match patterns.and_then(|p| p.0.get(pattern)) {
            Some(re) => Ok(re.is_match(&text)),
            None => Ok(build_regex(pattern)?.is_match(&text)),
        }
    }
}

fn lower(value: &Value) -> String {
    value.to_plain_string().to_lowercase()
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Int(0) => Some(false),
        Value::Int(1) => Some(true),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" | "on" => Some(true),
            "false" | "no" | "n" | "0" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

impl ConditionGroup {
    /// Combine the children: `AND` needs all (an empty group is true), `OR`
    /// needs any, `NOT` negates its first child and ignores the rest.
    ///
    /// # Errors
    ///
    /// Propagates the first child error reached, and returns
    /// [`ConditionError::EmptyNotGroup`] for a `NOT` group with no children.
    pub fn evaluate(&self, context: &EvaluationContext) -> Result<bool, ConditionError> {
        self.evaluate_in(context, None)
    }

    fn evaluate_in(
        &self,
        context: &EvaluationContext,
        patterns: Option<&Patterns>,
    ) -> Result<bool, ConditionError> {
        match self.operator {
            LogicalOperator::And => {
                for child in &self.children {
                    if !child.evaluate_in(context, patterns)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            LogicalOperator::Or => {
                for child in &self.children {
                    if child.evaluate_in(context, patterns)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            LogicalOperator::Not => {
                let Some(first) = self.children.first() else {
                    return Err(ConditionError::EmptyNotGroup);
                };
                if self.children.len() > 1 {
                    warn!(
                        ignored = self.children.len() - 1,
                        "NOT group negates only its first condition; ignoring the rest"
                    );
                }
                Ok(!first.evaluate_in(context, patterns)?)
            }
        }
    }
}

impl ConditionNode {
    /// Evaluate a leaf condition or a nested group.
    ///
    /// # Errors
    ///
    /// See [`Condition::evaluate`] and [`ConditionGroup::evaluate`].
    pub fn evaluate(&self, context: &EvaluationContext) -> Result<bool, ConditionError> {
        self.evaluate_in(context, None)
    }

    /// Evaluate using regexes compiled ahead of time. Patterns missing from
    /// `patterns` are compiled on demand.
    pub(crate) fn evaluate_in(
        &self,
        context: &EvaluationContext,
        patterns: Option<&Patterns>,
    ) -> Result<bool, ConditionError> {
        match self {
            ConditionNode::Condition(c) => c.evaluate_in(context, patterns),
            ConditionNode::Group(g) => g.evaluate_in(context, patterns),
        }
    }
}
