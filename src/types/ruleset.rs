use std::fmt;
use std::path::Path;

use crate::config::EngineConfig;
use crate::evaluate::{RuleEvaluator, calculate_total_adjustment};
use crate::formula::FormulaError;

use super::context::EvaluationContext;
use super::error::CompileError;
use super::result::{AdjustmentSummary, RuleEvaluationResult};
use super::rule::{CompiledRule, Rule};
use crate::actions::PreparedFormula;

/// Builder for constructing a [`RuleSet`].
///
/// # Example
///
/// ```
/// use valuator::{Action, EvaluationContext, RuleSetBuilder, field};
///
/// let ruleset = RuleSetBuilder::new()
///     .rule("1", "RAM bonus", |r| {
///         r.when(field("ram_gb").gte(16_i64))
///             .then(Action::per_unit("per_gb", 2.5))
///     })
///     .rule("2", "used", |r| {
///         r.when(field("condition").eq("used")).then(Action::fixed(-20.0))
///     })
///     .compile()
///     .unwrap();
///
/// let ctx = EvaluationContext::new()
///     .set("ram_gb", 16_i64)
///     .set("condition", "used");
/// assert_eq!(ruleset.evaluate_summary(&ctx).total_adjustment, 20.0);
/// ```
#[derive(Debug, Default)]
pub struct RuleSetBuilder {
    rules: Vec<Rule>,
    config: Option<EngineConfig>,
    stop_on_first_match: bool,
}

impl RuleSetBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a rule. The closure receives an active rule with no conditions
    /// and returns it configured.
    #[must_use]
    pub fn rule(mut self, id: &str, name: &str, f: impl FnOnce(Rule) -> Rule) -> Self {
        self.rules.push(f(Rule::new(id, name)));
        self
    }

    #[must_use]
    pub fn add_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    #[must_use]
    pub fn rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// End evaluation after the first matching rule.
    #[must_use]
    pub fn stop_on_first_match(mut self, stop: bool) -> Self {
        self.stop_on_first_match = stop;
        self
    }

    /// Compile the rules into an immutable `RuleSet`: rules are ordered by
    /// `evaluation_order` and formula actions are parsed once.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] for duplicate or empty rule ids.
    pub fn compile(self) -> Result<RuleSet, CompileError> {
        let evaluator = match self.config {
            Some(config) => RuleEvaluator::with_config(config),
            None => RuleEvaluator::new(),
        };
        crate::compile::compile(self.rules, evaluator, self.stop_on_first_match)
    }
}

/// A compiled, immutable ruleset. Thread-safe and designed to live behind `Arc`.
#[derive(Debug, Clone)]
pub struct RuleSet {
    /// In evaluation order.
    pub(crate) rules: Vec<CompiledRule>,
    pub(crate) evaluator: RuleEvaluator,
    pub(crate) stop_on_first_match: bool,
}

impl RuleSet {
    /// Evaluate the active rules against `ctx`. Never fails: errored rules
    /// are reported in their result.
    #[must_use]
    pub fn evaluate(&self, ctx: &EvaluationContext) -> Vec<RuleEvaluationResult> {
        self.evaluator.run(
            self.rules
                .iter()
                .map(|c| (&c.rule, c.formulas.as_slice(), Some(&c.patterns))),
            ctx,
            self.stop_on_first_match,
        )
    }

    /// Evaluate and total the adjustment.
    pub fn evaluate_summary(&self, ctx: &EvaluationContext) -> AdjustmentSummary {
        calculate_total_adjustment(&self.evaluate(ctx))
    }

    /// Parse rule definitions from JSON and compile them with the default
    /// config.
    ///
    /// # Errors
    ///
    /// Returns [`ValuatorError`](crate::ValuatorError) on definition or
    /// compile failure.
    pub fn from_json(input: &str) -> Result<Self, crate::ValuatorError> {
        Self::from_json_with_config(input, EngineConfig::default())
    }

    /// # Errors
    ///
    /// See [`from_json`](Self::from_json).
    pub fn from_json_with_config(
        input: &str,
        config: EngineConfig,
    ) -> Result<Self, crate::ValuatorError> {
        let rules = crate::definition::parse_rules(input)?;
        let ruleset = RuleSetBuilder::new().rules(rules).config(config).compile()?;
        Ok(ruleset)
    }

    /// Read a JSON rule file and compile it with the default config.
    ///
    /// # Errors
    ///
    /// Returns [`ValuatorError`](crate::ValuatorError) on I/O, definition, or
    /// compile failure.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, crate::ValuatorError> {
        let input = std::fs::read_to_string(path)?;
        Self::from_json(&input)
    }

    /// A copy of this ruleset with a different first-match setting.
    #[must_use]
    pub fn with_stop_on_first_match(mut self, stop: bool) -> Self {
        self.stop_on_first_match = stop;
        self
    }

    #[must_use]
    pub fn stop_on_first_match(&self) -> bool {
        self.stop_on_first_match
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        self.evaluator.engine().config()
    }

    /// Rule ids in evaluation order, inactive rules included.
    #[must_use]
    pub fn evaluation_order(&self) -> Vec<&str> {
        self.rules.iter().map(|c| c.rule.id.as_str()).collect()
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().map(|c| &c.rule)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules().find(|r| r.id == id)
    }

    /// Formula actions that failed to parse, as `(rule id, action index,
    /// error)`. They evaluate to an error entry in the breakdown.
    #[must_use]
    pub fn invalid_formulas(&self) -> Vec<(&str, usize, &FormulaError)> {
        self.rules
            .iter()
            .flat_map(|c| {
                c.formulas
                    .iter()
                    .enumerate()
                    .filter_map(move |(i, prepared)| match prepared {
                        PreparedFormula::Invalid(err) => Some((c.rule.id.as_str(), i, err)),
                        _ => None,
                    })
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(feature = "binary-cache")]
impl RuleSet {
    /// Serialize this compiled ruleset to a byte vector.
    ///
    /// The optional `source_text` is hashed (BLAKE3) and embedded in the
    /// payload metadata so callers can tell when the rule file changed.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError`](crate::serial::SerializeError) if encoding fails.
    pub fn to_bytes(
        &self,
        source_text: Option<&str>,
    ) -> Result<Vec<u8>, crate::serial::SerializeError> {
        crate::serial::encode(self, source_text)
    }

    /// Deserialize a compiled ruleset produced by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// Returns [`DeserializeError`](crate::serial::DeserializeError) on
    /// format, integrity, or validation failure.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, crate::serial::DeserializeError> {
        crate::serial::decode(bytes)
    }

    /// # Errors
    ///
    /// Returns [`SerializeError`](crate::serial::SerializeError) on
    /// encoding or I/O failure.
    pub fn to_binary_file(
        &self,
        path: impl AsRef<Path>,
        source_text: Option<&str>,
    ) -> Result<(), crate::serial::SerializeError> {
        let bytes = self.to_bytes(source_text)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`DeserializeError`](crate::serial::DeserializeError) on
    /// I/O, format, integrity, or validation failure.
    pub fn from_binary_file(path: impl AsRef<Path>) -> Result<Self, crate::serial::DeserializeError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let active = self.rules.iter().filter(|c| c.rule.is_active).count();
        let actions: usize = self.rules.iter().map(|c| c.rule.actions.len()).sum();
        write!(
            f,
            "RuleSet({} rules, {} active, {} actions)",
            self.rules.len(),
            active,
            actions,
        )
    }
}
