//! The JSON rule definition format.
//!
//! A rule file is either an array of rule objects or an object with a
//! `rules` array:
//!
//! ```json
//! [{
//!   "id": 1,
//!   "name": "RAM bonus",
//!   "evaluation_order": 10,
//!   "conditions": {"field_name": "ram_gb", "operator": "gte", "value": 16},
//!   "actions": [{"action_type": "per_unit", "metric": "per_gb", "value_usd": 2.5}]
//! }]
//! ```
//!
//! `conditions` may be a single condition, a group
//! `{"logical_operator": "OR", "conditions": [...]}`, or a plain list
//! (implicit AND).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{
    Action, ActionKind, AgeDepreciation, Condition, ConditionGroup, ConditionNode,
    ConditionOperator, FieldMultiplier, FieldType, LogicalOperator, ModifierSet, Rule, Value,
    lowercase_table,
};

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("invalid rule definition JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rule definitions must be an array or an object with a 'rules' array")]
    NotARuleList,

    #[error("rule '{rule}': unknown operator '{name}'")]
    UnknownOperator { rule: String, name: String },

    #[error("rule '{rule}': unknown action type '{name}'")]
    UnknownActionType { rule: String, name: String },

    #[error("rule '{rule}': unknown field type '{name}'")]
    UnknownFieldType { rule: String, name: String },

    #[error("rule '{rule}': unknown logical operator '{name}'")]
    UnknownLogicalOperator { rule: String, name: String },

    #[error("rule '{rule}': invalid {what}: {found}")]
    InvalidValue {
        rule: String,
        what: &'static str,
        found: String,
    },
}

/// Rule ids appear as integers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleId {
    Int(i64),
    Text(String),
}

impl From<RuleId> for String {
    fn from(id: RuleId) -> Self {
        match id {
            RuleId::Int(n) => n.to_string(),
            RuleId::Text(s) => s,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub id: RuleId,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub evaluation_order: i32,
    #[serde(default)]
    pub conditions: Option<ConditionDefinition>,
    #[serde(default)]
    pub actions: Vec<ActionDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionDefinition {
    List(Vec<ConditionDefinition>),
    Group {
        logical_operator: String,
        #[serde(default)]
        conditions: Vec<ConditionDefinition>,
    },
    Single {
        field_name: String,
        #[serde(default)]
        field_type: Option<String>,
        operator: String,
        #[serde(default)]
        value: serde_json::Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub action_type: String,
    #[serde(default)]
    pub metric: Option<String>,
    /// A number, or a numeric string.
    #[serde(default)]
    pub value_usd: Option<serde_json::Value>,
    #[serde(default)]
    pub unit_type: Option<String>,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub modifiers: Option<ModifiersDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModifiersDefinition {
    #[serde(default)]
    pub field_multipliers: Vec<FieldMultiplierDefinition>,
    #[serde(default)]
    pub condition_multipliers: BTreeMap<String, f64>,
    #[serde(default)]
    pub age_depreciation: Option<AgeDepreciationDefinition>,
    #[serde(default)]
    pub brand_multipliers: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMultiplierDefinition {
    #[serde(alias = "field_name")]
    pub field: String,
    pub multipliers: BTreeMap<String, f64>,
    #[serde(default)]
    pub default: Option<f64>,
}

fn default_max_depreciation() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgeDepreciationDefinition {
    pub rate_per_year: f64,
    #[serde(default = "default_max_depreciation")]
    pub max_depreciation: f64,
}

/// Parse a rule file into rules, in file order.
///
/// # Errors
///
/// Returns [`DefinitionError`] for malformed JSON, an unexpected document
/// shape, or an unknown operator, action type or field type.
pub fn parse_rules(input: &str) -> Result<Vec<Rule>, DefinitionError> {
    let document: serde_json::Value = serde_json::from_str(input)?;
    let list = match document {
        serde_json::Value::Array(_) => document,
        serde_json::Value::Object(mut map) => {
            map.remove("rules").ok_or(DefinitionError::NotARuleList)?
        }
        _ => return Err(DefinitionError::NotARuleList),
    };
    let definitions: Vec<RuleDefinition> = serde_json::from_value(list)?;
    definitions.into_iter().map(Rule::try_from).collect()
}

impl TryFrom<RuleDefinition> for Rule {
    type Error = DefinitionError;

    fn try_from(def: RuleDefinition) -> Result<Self, Self::Error> {
        let id = String::from(def.id);
        let conditions = def
            .conditions
            .map(|c| condition_node(&id, c))
            .transpose()?;
        let actions = def
            .actions
            .into_iter()
            .map(|a| action(&id, a))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Rule {
            id,
            name: def.name,
            conditions,
            actions,
            is_active: def.is_active,
            evaluation_order: def.evaluation_order,
        })
    }
}

fn condition_node(rule: &str, def: ConditionDefinition) -> Result<ConditionNode, DefinitionError> {
    match def {
        ConditionDefinition::List(items) => Ok(ConditionGroup::new(
            LogicalOperator::And,
            items
                .into_iter()
                .map(|c| condition_node(rule, c))
                .collect::<Result<_, _>>()?,
        )
        .into()),
        ConditionDefinition::Group {
            logical_operator,
            conditions,
        } => {
            let operator: LogicalOperator =
                logical_operator
                    .parse()
                    .map_err(|_| DefinitionError::UnknownLogicalOperator {
                        rule: rule.to_owned(),
                        name: logical_operator.clone(),
                    })?;
            let children = conditions
                .into_iter()
                .map(|c| condition_node(rule, c))
                .collect::<Result<_, _>>()?;
            Ok(ConditionGroup::new(operator, children).into())
        }
        ConditionDefinition::Single {
            field_name,
            field_type,
            operator,
            value,
        } => {
            let op: ConditionOperator =
                operator
                    .parse()
                    .map_err(|_| DefinitionError::UnknownOperator {
                        rule: rule.to_owned(),
                        name: operator.clone(),
                    })?;
            let data_type = match field_type {
                Some(name) => name
                    .parse::<FieldType>()
                    .map_err(|_| DefinitionError::UnknownFieldType {
                        rule: rule.to_owned(),
                        name,
                    })?,
                None => FieldType::default(),
            };
            let value = Value::from_json(&value).ok_or_else(|| DefinitionError::InvalidValue {
                rule: rule.to_owned(),
                what: "condition value",
                found: value.to_string(),
            })?;
            Ok(Condition::new(&field_name, op, value).typed(data_type).into())
        }
    }
}

fn action(rule: &str, def: ActionDefinition) -> Result<Action, DefinitionError> {
    let kind: ActionKind =
        def.action_type
            .parse()
            .map_err(|_| DefinitionError::UnknownActionType {
                rule: rule.to_owned(),
                name: def.action_type.clone(),
            })?;

    let amount = match def.value_usd {
        None | Some(serde_json::Value::Null) => None,
        Some(raw) => Some(
            Value::from_json(&raw)
                .and_then(|v| v.coerce_f64())
                .ok_or_else(|| DefinitionError::InvalidValue {
                    rule: rule.to_owned(),
                    what: "value_usd",
                    found: raw.to_string(),
                })?,
        ),
    };

    Ok(Action {
        kind,
        metric: def.metric,
        amount,
        unit: def.unit_type,
        formula: def.formula,
        modifiers: def.modifiers.map(modifier_set).unwrap_or_default(),
    })
}

fn modifier_set(def: ModifiersDefinition) -> ModifierSet {
    ModifierSet {
        field_multipliers: def
            .field_multipliers
            .into_iter()
            .map(|f| FieldMultiplier {
                field: f.field,
                table: lowercase_table(f.multipliers),
                default: f.default,
            })
            .collect(),
        condition_multipliers: lowercase_table(def.condition_multipliers),
        age_depreciation: def.age_depreciation.map(|a| AgeDepreciation {
            rate_per_year: a.rate_per_year,
            max_depreciation: a.max_depreciation,
        }),
        brand_multipliers: lowercase_table(def.brand_multipliers),
    }
}
