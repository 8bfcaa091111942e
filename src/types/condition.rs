use std::fmt;
use std::ops::Not;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Value;

/// Declared type of the field a condition tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    String,
    Number,
    Boolean,
    Enum,
    List,
}

/// Condition operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Between,
    In,
    NotIn,
    Contains,
    StartsWith,
    EndsWith,
    Regex,
    IsNull,
    IsNotNull,
}

/// How a [`ConditionGroup`] combines its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    And,
    Or,
    Not,
}

/// Error returned when a name does not match any known enum variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownName(pub String);

impl fmt::Display for UnknownName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown name '{}'", self.0)
    }
}

impl std::error::Error for UnknownName {}

impl FromStr for FieldType {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "str" | "text" => Ok(FieldType::String),
            "number" | "numeric" | "int" | "integer" | "float" | "decimal" => Ok(FieldType::Number),
            "boolean" | "bool" => Ok(FieldType::Boolean),
            "enum" | "select" => Ok(FieldType::Enum),
            "list" | "array" | "multi_select" => Ok(FieldType::List),
            _ => Err(UnknownName(s.to_owned())),
        }
    }
}

impl FromStr for ConditionOperator {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s.trim().to_ascii_lowercase().as_str() {
            "equals" | "eq" | "==" => ConditionOperator::Equals,
            "not_equals" | "neq" | "!=" => ConditionOperator::NotEquals,
            "greater_than" | "gt" | ">" => ConditionOperator::GreaterThan,
            "greater_than_or_equal" | "gte" | ">=" => ConditionOperator::GreaterThanOrEqual,
            "less_than" | "lt" | "<" => ConditionOperator::LessThan,
            "less_than_or_equal" | "lte" | "<=" => ConditionOperator::LessThanOrEqual,
            "between" => ConditionOperator::Between,
            "in" => ConditionOperator::In,
            "not_in" => ConditionOperator::NotIn,
            "contains" => ConditionOperator::Contains,
            "starts_with" => ConditionOperator::StartsWith,
            "ends_with" => ConditionOperator::EndsWith,
            "regex" | "matches" => ConditionOperator::Regex,
            "is_null" => ConditionOperator::IsNull,
            "is_not_null" => ConditionOperator::IsNotNull,
            _ => return Err(UnknownName(s.to_owned())),
        };
        Ok(op)
    }
}

impl FromStr for LogicalOperator {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(LogicalOperator::And),
            "OR" => Ok(LogicalOperator::Or),
            "NOT" => Ok(LogicalOperator::Not),
            _ => Err(UnknownName(s.to_owned())),
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConditionOperator::Equals => "equals",
            ConditionOperator::NotEquals => "not_equals",
            ConditionOperator::GreaterThan => "greater_than",
            ConditionOperator::GreaterThanOrEqual => "greater_than_or_equal",
            ConditionOperator::LessThan => "less_than",
            ConditionOperator::LessThanOrEqual => "less_than_or_equal",
            ConditionOperator::Between => "between",
            ConditionOperator::In => "in",
            ConditionOperator::NotIn => "not_in",
            ConditionOperator::Contains => "contains",
            ConditionOperator::StartsWith => "starts_with",
            ConditionOperator::EndsWith => "ends_with",
            ConditionOperator::Regex => "regex",
            ConditionOperator::IsNull => "is_null",
            ConditionOperator::IsNotNull => "is_not_null",
        };
        f.write_str(name)
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOperator::And => write!(f, "AND"),
            LogicalOperator::Or => write!(f, "OR"),
            LogicalOperator::Not => write!(f, "NOT"),
        }
    }
}

/// A single field test, e.g. `ram_gb greater_than_or_equal 16`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field_path: String,
    pub data_type: FieldType,
    pub operator: ConditionOperator,
    pub value: Value,
}

/// A boolean combination of conditions and nested groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub operator: LogicalOperator,
    pub children: Vec<ConditionNode>,
}

/// Either a leaf condition or a nested group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConditionNode {
    Condition(Condition),
    Group(ConditionGroup),
}

impl Condition {
    #[must_use]
    pub fn new(field_path: &str, operator: ConditionOperator, value: impl Into<Value>) -> Self {
        Self {
            field_path: field_path.to_owned(),
            data_type: FieldType::default(),
            operator,
            value: value.into(),
        }
    }

    /// Set the declared field type.
    #[must_use]
    pub fn typed(mut self, data_type: FieldType) -> Self {
        self.data_type = data_type;
        self
    }
}

impl ConditionGroup {
    #[must_use]
    pub fn new(operator: LogicalOperator, children: Vec<ConditionNode>) -> Self {
        Self { operator, children }
    }
}

impl ConditionNode {
    #[must_use]
    pub fn and(self, other: ConditionNode) -> ConditionNode {
        combine(LogicalOperator::And, self, other)
    }

    #[must_use]
    pub fn or(self, other: ConditionNode) -> ConditionNode {
        combine(LogicalOperator::Or, self, other)
    }

    /// Set the declared field type of a leaf condition; groups are unchanged.
    #[must_use]
    pub fn typed(self, data_type: FieldType) -> ConditionNode {
        match self {
            ConditionNode::Condition(c) => ConditionNode::Condition(c.typed(data_type)),
            group @ ConditionNode::Group(_) => group,
        }
    }
}

/// Flatten `a AND (b AND c)` into a single group while building.
fn combine(operator: LogicalOperator, left: ConditionNode, right: ConditionNode) -> ConditionNode {
    let mut children = match left {
        ConditionNode::Group(g) if g.operator == operator => g.children,
        other => vec![other],
    };
    match right {
        ConditionNode::Group(g) if g.operator == operator => children.extend(g.children),
        other => children.push(other),
    }
    ConditionNode::Group(ConditionGroup { operator, children })
}

impl Not for ConditionNode {
    type Output = ConditionNode;

    fn not(self) -> ConditionNode {
        ConditionNode::Group(ConditionGroup {
            operator: LogicalOperator::Not,
            children: vec![self],
        })
    }
}

impl From<Condition> for ConditionNode {
    fn from(c: Condition) -> Self {
        ConditionNode::Condition(c)
    }
}

impl From<ConditionGroup> for ConditionNode {
    fn from(g: ConditionGroup) -> Self {
        ConditionNode::Group(g)
    }
}

/// A group of all the given nodes (`AND`).
#[must_use]
pub fn all(children: impl IntoIterator<Item = ConditionNode>) -> ConditionNode {
    ConditionNode::Group(ConditionGroup::new(
        LogicalOperator::And,
        children.into_iter().collect(),
    ))
}

/// A group of any of the given nodes (`OR`).
#[must_use]
pub fn any(children: impl IntoIterator<Item = ConditionNode>) -> ConditionNode {
    ConditionNode::Group(ConditionGroup::new(
        LogicalOperator::Or,
        children.into_iter().collect(),
    ))
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            ConditionOperator::IsNull | ConditionOperator::IsNotNull => {
                write!(f, "{} {}", self.field_path, self.operator)
            }
            op => write!(f, "{} {op} {}", self.field_path, self.value),
        }
    }
}

impl fmt::Display for ConditionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionNode::Condition(c) => write!(f, "({c})"),
            ConditionNode::Group(g) if g.operator == LogicalOperator::Not => {
                write!(f, "(NOT")?;
                for child in &g.children {
                    write!(f, " {child}")?;
                }
                write!(f, ")")
            }
            ConditionNode::Group(g) => {
                write!(f, "(")?;
                for (i, child) in g.children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", g.operator)?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Intermediate builder for conditions.
/// Created by [`field()`]; an operator method produces a [`ConditionNode`].
#[derive(Debug, Clone)]
pub struct FieldCondition {
    path: String,
}

impl FieldCondition {
    fn build(self, operator: ConditionOperator, value: Value) -> ConditionNode {
        ConditionNode::Condition(Condition {
            field_path: self.path,
            data_type: FieldType::default(),
            operator,
            value,
        })
    }

    #[must_use]
    pub fn eq(self, value: impl Into<Value>) -> ConditionNode {
        self.build(ConditionOperator::Equals, value.into())
    }

    #[must_use]
    pub fn neq(self, value: impl Into<Value>) -> ConditionNode {
        self.build(ConditionOperator::NotEquals, value.into())
    }

    #[must_use]
    pub fn gt(self, value: impl Into<Value>) -> ConditionNode {
        self.build(ConditionOperator::GreaterThan, value.into())
    }

    #[must_use]
    pub fn gte(self, value: impl Into<Value>) -> ConditionNode {
        self.build(ConditionOperator::GreaterThanOrEqual, value.into())
    }

    #[must_use]
    pub fn lt(self, value: impl Into<Value>) -> ConditionNode {
        self.build(ConditionOperator::LessThan, value.into())
    }

    #[must_use]
    pub fn lte(self, value: impl Into<Value>) -> ConditionNode {
        self.build(ConditionOperator::LessThanOrEqual, value.into())
    }

    /// Inclusive range test.
    #[must_use]
    pub fn between(self, min: impl Into<Value>, max: impl Into<Value>) -> ConditionNode {
        self.build(
            ConditionOperator::Between,
            Value::List(vec![min.into(), max.into()]),
        )
    }

    #[must_use]
    pub fn is_in<T: Into<Value>>(self, values: impl IntoIterator<Item = T>) -> ConditionNode {
        self.build(
            ConditionOperator::In,
            Value::List(values.into_iter().map(Into::into).collect()),
        )
    }

    #[must_use]
    pub fn not_in<T: Into<Value>>(self, values: impl IntoIterator<Item = T>) -> ConditionNode {
        self.build(
            ConditionOperator::NotIn,
            Value::List(values.into_iter().map(Into::into).collect()),
        )
    }

    #[must_use]
    pub fn contains(self, value: impl Into<Value>) -> ConditionNode {
        self.build(ConditionOperator::Contains, value.into())
    }

    #[must_use]
    pub fn starts_with(self, prefix: &str) -> ConditionNode {
        self.build(ConditionOperator::StartsWith, Value::from(prefix))
    }

    #[must_use]
    pub fn ends_with(self, suffix: &str) -> ConditionNode {
        self.build(ConditionOperator::EndsWith, Value::from(suffix))
    }

    /// Case-insensitive regular-expression search.
    #[must_use]
    pub fn matches(self, pattern: &str) -> ConditionNode {
        self.build(ConditionOperator::Regex, Value::from(pattern))
    }

    #[must_use]
    pub fn is_null(self) -> ConditionNode {
        self.build(ConditionOperator::IsNull, Value::Null)
    }

    #[must_use]
    pub fn is_not_null(self) -> ConditionNode {
        self.build(ConditionOperator::IsNotNull, Value::Null)
    }
}

#[must_use]
pub fn field(path: &str) -> FieldCondition {
    FieldCondition {
        path: path.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_builder() {
        let node = field("ram_gb").gte(16_i64);
        assert_eq!(
            node,
            ConditionNode::Condition(Condition {
                field_path: "ram_gb".to_owned(),
                data_type: FieldType::String,
                operator: ConditionOperator::GreaterThanOrEqual,
                value: Value::Int(16),
            })
        );
    }

    #[test]
    fn typed_sets_data_type() {
        let node = field("refurbished").eq("yes").typed(FieldType::Boolean);
        let ConditionNode::Condition(c) = node else {
            panic!("expected condition");
        };
        assert_eq!(c.data_type, FieldType::Boolean);
    }

    #[test]
    fn between_builds_range() {
        let ConditionNode::Condition(c) = field("cpu.cores").between(4_i64, 8_i64) else {
            panic!("expected condition");
        };
        assert_eq!(c.value, Value::List(vec![Value::Int(4), Value::Int(8)]));
    }

    #[test]
    fn and_chain_flattens() {
        let node = field("a")
            .eq(1_i64)
            .and(field("b").eq(2_i64))
            .and(field("c").eq(3_i64));
        let ConditionNode::Group(g) = node else {
            panic!("expected group");
        };
        assert_eq!(g.operator, LogicalOperator::And);
        assert_eq!(g.children.len(), 3);
    }

    #[test]
    fn not_wraps_single_child() {
        let ConditionNode::Group(g) = !field("a").is_null() else {
            panic!("expected group");
        };
        assert_eq!(g.operator, LogicalOperator::Not);
        assert_eq!(g.children.len(), 1);
    }

    #[test]
    fn operator_names_parse_case_insensitively() {
        assert_eq!(
            "GREATER_THAN".parse::<ConditionOperator>().unwrap(),
            ConditionOperator::GreaterThan
        );
        assert_eq!(
            ">=".parse::<ConditionOperator>().unwrap(),
            ConditionOperator::GreaterThanOrEqual
        );
        assert_eq!("and".parse::<LogicalOperator>().unwrap(), LogicalOperator::And);
        assert_eq!("Number".parse::<FieldType>().unwrap(), FieldType::Number);
        assert!("approximately".parse::<ConditionOperator>().is_err());
    }

    #[test]
    fn display() {
        let node = field("condition")
            .eq("used")
            .or(!field("ram_gb").lt(8_i64));
        assert_eq!(
            node.to_string(),
            "((condition equals \"used\") OR (NOT (ram_gb less_than 8)))"
        );
        assert_eq!(field("gpu").is_null().to_string(), "(gpu is_null)");
    }
}
