use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::condition::UnknownName;

/// How an action computes its base value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// The configured amount.
    FixedValue,
    /// Quantity of a metric times the amount.
    PerUnit,
    /// Benchmark score divided by the unit divisor, times the amount.
    BenchmarkBased,
    /// Current price times `amount / 100`.
    Multiplier,
    /// The configured amount, signed.
    Additive,
    /// The value of a formula.
    Formula,
}

impl ActionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::FixedValue => "fixed_value",
            ActionKind::PerUnit => "per_unit",
            ActionKind::BenchmarkBased => "benchmark_based",
            ActionKind::Multiplier => "multiplier",
            ActionKind::Additive => "additive",
            ActionKind::Formula => "formula",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed_value" | "fixed" => Ok(ActionKind::FixedValue),
            "per_unit" => Ok(ActionKind::PerUnit),
            "benchmark_based" | "benchmark" => Ok(ActionKind::BenchmarkBased),
            "multiplier" | "percentage" => Ok(ActionKind::Multiplier),
            "additive" => Ok(ActionKind::Additive),
            "formula" => Ok(ActionKind::Formula),
            _ => Err(UnknownName(s.to_owned())),
        }
    }
}

/// Multiplies by a table entry chosen by a context field's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMultiplier {
    pub field: String,
    /// Keys match case-insensitively.
    pub table: BTreeMap<String, f64>,
    /// Used when the field is present but its value is not in the table.
    pub default: Option<f64>,
}

impl FieldMultiplier {
    #[must_use]
    pub fn new<K: AsRef<str>>(field: &str, table: impl IntoIterator<Item = (K, f64)>) -> Self {
        Self {
            field: field.to_owned(),
            table: lowercase_table(table),
            default: None,
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: f64) -> Self {
        self.default = Some(default);
        self
    }
}

/// Depreciation of `rate_per_year` per year of age, capped at
/// `max_depreciation`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgeDepreciation {
    pub rate_per_year: f64,
    pub max_depreciation: f64,
}

impl AgeDepreciation {
    /// Multiplier for an item `age` years old: `1 - min(rate * age, cap)`,
    /// never below zero.
    #[must_use]
    pub fn factor(&self, age: f64) -> f64 {
        let age = age.max(0.0);
        (1.0 - (self.rate_per_year * age).min(self.max_depreciation)).max(0.0)
    }
}

/// The four optional modifier stages, applied in a fixed order:
/// field multipliers, condition, age depreciation, brand/model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModifierSet {
    pub field_multipliers: Vec<FieldMultiplier>,
    /// Keys match case-insensitively.
    pub condition_multipliers: BTreeMap<String, f64>,
    pub age_depreciation: Option<AgeDepreciation>,
    /// Keys match case-insensitively, against model, then brand.
    pub brand_multipliers: BTreeMap<String, f64>,
}

pub(crate) fn lowercase_table<K: AsRef<str>>(
    entries: impl IntoIterator<Item = (K, f64)>,
) -> BTreeMap<String, f64> {
    entries
        .into_iter()
        .map(|(k, v)| (k.as_ref().trim().to_lowercase(), v))
        .collect()
}

/// Entry for a lower-cased `key`. Tables built through the constructors are
/// already lower-cased; entries inserted directly may not be.
pub(crate) fn multiplier_for(table: &BTreeMap<String, f64>, key: &str) -> Option<f64> {
    table.get(key).copied().or_else(|| {
        table
            .iter()
            .find(|(k, _)| k.trim().to_lowercase() == key)
            .map(|(_, &v)| v)
    })
}

impl ModifierSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.field_multipliers.is_empty()
            && self.condition_multipliers.is_empty()
            && self.age_depreciation.is_none()
            && self.brand_multipliers.is_empty()
    }

    #[must_use]
    pub fn field(mut self, multiplier: FieldMultiplier) -> Self {
        self.field_multipliers.push(multiplier);
        self
    }

    #[must_use]
    pub fn condition<K: AsRef<str>>(mut self, table: impl IntoIterator<Item = (K, f64)>) -> Self {
        self.condition_multipliers = lowercase_table(table);
        self
    }

    #[must_use]
    pub fn age(mut self, rate_per_year: f64, max_depreciation: f64) -> Self {
        self.age_depreciation = Some(AgeDepreciation {
            rate_per_year,
            max_depreciation,
        });
        self
    }

    #[must_use]
    pub fn brand<K: AsRef<str>>(mut self, table: impl IntoIterator<Item = (K, f64)>) -> Self {
        self.brand_multipliers = lowercase_table(table);
        self
    }
}

/// A value-producing step of a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub metric: Option<String>,
    pub amount: Option<f64>,
    pub unit: Option<String>,
    pub formula: Option<String>,
    pub modifiers: ModifierSet,
}

impl Action {
    fn of(kind: ActionKind) -> Self {
        Self {
            kind,
            metric: None,
            amount: None,
            unit: None,
            formula: None,
            modifiers: ModifierSet::default(),
        }
    }

    #[must_use]
    pub fn fixed(amount: f64) -> Self {
        Self {
            amount: Some(amount),
            ..Self::of(ActionKind::FixedValue)
        }
    }

    #[must_use]
    pub fn per_unit(metric: &str, amount: f64) -> Self {
        Self {
            metric: Some(metric.to_owned()),
            amount: Some(amount),
            ..Self::of(ActionKind::PerUnit)
        }
    }

    /// `metric` names the benchmark score field; `unit` is e.g. `per_1000_points`.
    #[must_use]
    pub fn benchmark(metric: &str, unit: &str, amount: f64) -> Self {
        Self {
            metric: Some(metric.to_owned()),
            amount: Some(amount),
            unit: Some(unit.to_owned()),
            ..Self::of(ActionKind::BenchmarkBased)
        }
    }

    /// `percent` of the current price; `None` leaves the price unchanged.
    #[must_use]
    pub fn multiplier(percent: Option<f64>) -> Self {
        Self {
            amount: percent,
            ..Self::of(ActionKind::Multiplier)
        }
    }

    #[must_use]
    pub fn additive(amount: f64) -> Self {
        Self {
            amount: Some(amount),
            ..Self::of(ActionKind::Additive)
        }
    }

    #[must_use]
    pub fn formula(source: &str) -> Self {
        Self {
            formula: Some(source.to_owned()),
            ..Self::of(ActionKind::Formula)
        }
    }

    #[must_use]
    pub fn with_modifiers(mut self, modifiers: ModifierSet) -> Self {
        self.modifiers = modifiers;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for kind in [
            ActionKind::FixedValue,
            ActionKind::PerUnit,
            ActionKind::BenchmarkBased,
            ActionKind::Multiplier,
            ActionKind::Additive,
            ActionKind::Formula,
        ] {
            assert_eq!(kind.as_str().parse::<ActionKind>().unwrap(), kind);
        }
        assert_eq!("FORMULA".parse::<ActionKind>().unwrap(), ActionKind::Formula);
        assert!("discount".parse::<ActionKind>().is_err());
    }

    #[test]
    fn tables_are_lowercased() {
        let modifiers = ModifierSet::new()
            .condition([("Used", 0.6), ("NEW", 1.0)])
            .brand([("Dell ", 1.1)]);
        assert_eq!(modifiers.condition_multipliers.get("used"), Some(&0.6));
        assert_eq!(modifiers.condition_multipliers.get("new"), Some(&1.0));
        assert_eq!(modifiers.brand_multipliers.get("dell"), Some(&1.1));
    }

    #[test]
    fn age_factor_is_capped_and_floored() {
        let age = AgeDepreciation {
            rate_per_year: 0.1,
            max_depreciation: 0.5,
        };
        assert!((age.factor(2.0) - 0.8).abs() < 1e-12);
        assert!((age.factor(10.0) - 0.5).abs() < 1e-12);
        assert!((age.factor(-3.0) - 1.0).abs() < 1e-12);

        let steep = AgeDepreciation {
            rate_per_year: 0.5,
            max_depreciation: 2.0,
        };
        assert_eq!(steep.factor(5.0), 0.0);
    }

    #[test]
    fn constructors() {
        let action = Action::per_unit("per_gb", 2.5);
        assert_eq!(action.kind, ActionKind::PerUnit);
        assert_eq!(action.metric.as_deref(), Some("per_gb"));
        assert!(action.modifiers.is_empty());
        assert_eq!(Action::multiplier(None).amount, None);
    }
}
