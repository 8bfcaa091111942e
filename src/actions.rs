use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::config::EngineConfig;
use crate::formula::{FormulaError, Interpreter};
use crate::types::{
    Action, ActionDetails, ActionError, ActionKind, ActionOutcome, ActionResult, AppliedModifier,
    EvaluationContext, Expr, ModifierSet, ModifierStage, Value, multiplier_for,
};

static DEFAULT_CONFIG: LazyLock<EngineConfig> = LazyLock::new(EngineConfig::default);

/// A formula action's source, parsed ahead of evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum PreparedFormula {
    NotApplicable,
    Parsed(Expr),
    Invalid(FormulaError),
}

impl Action {
    /// Compute this action's final value: the base value for its kind, run
    /// through the modifier pipeline. Reads context fields named by the
    /// default [`EngineConfig`].
    ///
    /// # Errors
    ///
    /// Returns an [`ActionError`] for a missing amount, metric or formula, a
    /// formula action without an interpreter, a bad benchmark unit, a formula
    /// failure or a non-finite result.
    pub fn calculate(
        &self,
        context: &EvaluationContext,
        interpreter: Option<&Interpreter>,
    ) -> Result<f64, ActionError> {
        self.calculate_with(context, interpreter, &DEFAULT_CONFIG)
            .map(|(value, _)| value)
    }

    /// Like [`calculate`](Self::calculate), with explicit field settings, also
    /// returning how the value was reached.
    ///
    /// # Errors
    ///
    /// See [`calculate`](Self::calculate).
    pub fn calculate_with(
        &self,
        context: &EvaluationContext,
        interpreter: Option<&Interpreter>,
        config: &EngineConfig,
    ) -> Result<(f64, ActionDetails), ActionError> {
        self.compute(context, config, |source| {
            let interpreter = interpreter.ok_or(ActionError::NoInterpreter)?;
            Ok(interpreter.evaluate_source(source, context)?)
        })
    }

    fn compute(
        &self,
        context: &EvaluationContext,
        config: &EngineConfig,
        formula: impl FnOnce(&str) -> Result<f64, ActionError>,
    ) -> Result<(f64, ActionDetails), ActionError> {
        let base = self.base_value(context, config, formula)?;
        let (value, modifiers) = apply_modifiers(&self.modifiers, base, context, config);
        if !value.is_finite() {
            return Err(ActionError::NonFinite);
        }
        Ok((
            value,
            ActionDetails {
                base_value: base,
                modifiers,
            },
        ))
    }

    fn base_value(
        &self,
        context: &EvaluationContext,
        config: &EngineConfig,
        formula: impl FnOnce(&str) -> Result<f64, ActionError>,
    ) -> Result<f64, ActionError> {
        let kind = self.kind.as_str();
        let amount = || self.amount.ok_or(ActionError::MissingAmount { kind });
        let metric = || {
            self.metric
                .as_deref()
                .ok_or(ActionError::MissingMetric { kind })
        };

        match self.kind {
            ActionKind::FixedValue | ActionKind::Additive => amount(),
            ActionKind::PerUnit => {
                let amount = amount()?;
                let source = config.metric_source(metric()?);
                let quantity = number_at(context, &source.field).unwrap_or(0.0) / source.divisor;
                Ok(quantity * amount)
            }
            ActionKind::BenchmarkBased => {
                let amount = amount()?;
                let score = number_at(context, metric()?).unwrap_or(0.0);
                let divisor = unit_divisor(self.unit.as_deref())?;
                Ok(score / divisor * amount)
            }
            ActionKind::Multiplier => {
                let percent = self.amount.unwrap_or(100.0);
                let price = config
                    .price_fields
                    .iter()
                    .find_map(|field| number_at(context, field))
                    .unwrap_or(0.0);
                Ok(price * percent / 100.0)
            }
            ActionKind::Formula => {
                let source = self.formula.as_deref().ok_or(ActionError::MissingFormula)?;
                formula(source)
            }
        }
    }
}

fn number_at(context: &EvaluationContext, path: &str) -> Option<f64> {
    context.lookup(path).and_then(Value::coerce_f64)
}

/// Lower-cased text of a present, non-null field.
fn key_at(context: &EvaluationContext, path: &str) -> Option<String> {
    context
        .lookup(path)
        .filter(|v| !v.is_null())
        .map(|v| v.to_plain_string().trim().to_lowercase())
}

/// Divisor for a benchmark unit: `per_1000_points`, `per_5k_points`, or a
/// bare number. No unit divides by one.
fn unit_divisor(unit: Option<&str>) -> Result<f64, ActionError> {
    let Some(raw) = unit.map(str::trim).filter(|u| !u.is_empty()) else {
        return Ok(1.0);
    };
    let invalid = || ActionError::InvalidUnit {
        unit: raw.to_owned(),
    };

    let text = raw.to_lowercase();
    let inner = text
        .strip_prefix("per_")
        .map(|rest| {
            rest.strip_suffix("_points")
                .or_else(|| rest.strip_suffix("_point"))
                .unwrap_or(rest)
        })
        .unwrap_or(&text);

    let divisor = match inner {
        "point" | "points" => 1.0,
        _ => match inner.strip_suffix('k') {
            Some(thousands) => thousands.parse::<f64>().map_err(|_| invalid())? * 1000.0,
            None => inner.parse::<f64>().map_err(|_| invalid())?,
        },
    };

    if !divisor.is_finite() || divisor == 0.0 {
        return Err(invalid());
    }
    Ok(divisor)
}

/// Run `base` through the field, condition, age and brand stages in that
/// order. A stage whose key is missing from the context or its table is
/// skipped.
fn apply_modifiers(
    modifiers: &ModifierSet,
    base: f64,
    context: &EvaluationContext,
    config: &EngineConfig,
) -> (f64, Vec<AppliedModifier>) {
    let mut value = base;
    let mut applied = Vec::new();
    let mut apply = |stage: ModifierStage, key: String, multiplier: f64| {
        trace!(%stage, %key, multiplier, before = value, "modifier applied");
        value *= multiplier;
        applied.push(AppliedModifier {
            stage,
            key,
            multiplier,
        });
    };

    for field in &modifiers.field_multipliers {
        if let Some(key) = key_at(context, &field.field)
            && let Some(multiplier) = multiplier_for(&field.table, &key).or(field.default)
        {
            apply(ModifierStage::Field, key, multiplier);
        }
    }

    if !modifiers.condition_multipliers.is_empty()
        && let Some(key) = key_at(context, &config.condition_field)
        && let Some(multiplier) = multiplier_for(&modifiers.condition_multipliers, &key)
    {
        apply(ModifierStage::Condition, key, multiplier);
    }

    if let Some(age) = &modifiers.age_depreciation
        && let Some(years) = number_at(context, &config.age_field)
    {
        apply(ModifierStage::Age, years.to_string(), age.factor(years));
    }

    if !modifiers.brand_multipliers.is_empty() {
        let brand = config
            .model_field
            .iter()
            .chain(&config.brand_fields)
            .filter_map(|field| key_at(context, field))
            .find_map(|key| {
                let multiplier = multiplier_for(&modifiers.brand_multipliers, &key)?;
                Some((key, multiplier))
            });
        if let Some((key, multiplier)) = brand {
            apply(ModifierStage::Brand, key, multiplier);
        }
    }

    (value, applied)
}

/// Runs lists of actions, isolating each action's failure from its siblings.
#[derive(Debug, Clone, Default)]
pub struct ActionEngine {
    interpreter: Interpreter,
    config: EngineConfig,
}

impl ActionEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            interpreter: Interpreter::with_limits(config.limits()),
            config,
        }
    }

    #[must_use]
    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parse a formula action's source once, keeping a parse failure as the
    /// action's error.
    pub(crate) fn prepare(&self, action: &Action) -> PreparedFormula {
        match (action.kind, action.formula.as_deref()) {
            (ActionKind::Formula, Some(source)) => match self.interpreter.parse(source) {
                Ok(expr) => PreparedFormula::Parsed(expr),
                Err(err) => PreparedFormula::Invalid(err),
            },
            _ => PreparedFormula::NotApplicable,
        }
    }

    /// Sum the values of `actions`. A failing action contributes zero and
    /// records its error in the breakdown; the others still run. A sum that
    /// overflows is zeroed and reported in [`ActionOutcome::error`].
    pub fn execute_actions(&self, actions: &[Action], context: &EvaluationContext) -> ActionOutcome {
        self.run(actions, &[], context)
    }

    /// As [`execute_actions`](Self::execute_actions), using formulas parsed
    /// by [`prepare`](Self::prepare). `prepared` is parallel to `actions`.
    pub(crate) fn execute_prepared(
        &self,
        actions: &[Action],
        prepared: &[PreparedFormula],
        context: &EvaluationContext,
    ) -> ActionOutcome {
        self.run(actions, prepared, context)
    }

    fn run(
        &self,
        actions: &[Action],
        prepared: &[PreparedFormula],
        context: &EvaluationContext,
    ) -> ActionOutcome {
        let mut outcome = ActionOutcome::default();

        for (i, action) in actions.iter().enumerate() {
            let computed = action.compute(context, &self.config, |source| {
                match prepared.get(i) {
                    Some(PreparedFormula::Parsed(expr)) => {
                        Ok(self.interpreter.evaluate(expr, context)?)
                    }
                    Some(PreparedFormula::Invalid(err)) => Err(err.clone().into()),
                    _ => Ok(self.interpreter.evaluate_source(source, context)?),
                }
            });

            let entry = match computed {
                Ok((value, details)) => {
                    outcome.total += value;
                    ActionResult {
                        action_type: action.kind,
                        metric: action.metric.clone(),
                        value,
                        details: Some(details),
                        error: None,
                    }
                }
                Err(err) => {
                    warn!(action = %action.kind, error = %err, "action failed");
                    ActionResult {
                        action_type: action.kind,
                        metric: action.metric.clone(),
                        value: 0.0,
                        details: None,
                        error: Some(err.to_string()),
                    }
                }
            };
            outcome.breakdown.push(entry);
        }

        if !outcome.total.is_finite() {
            let err = ActionError::NonFiniteTotal;
            warn!(error = %err, "action total overflowed");
            outcome.total = 0.0;
            outcome.error = Some(err);
        }
        outcome
    }
}
