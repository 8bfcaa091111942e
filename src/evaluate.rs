use tracing::{debug, warn};

use crate::actions::{ActionEngine, PreparedFormula};
use crate::conditions::Patterns;
use crate::config::EngineConfig;
use crate::types::{
    AdjustmentSummary, EvaluationContext, MatchedRule, Rule, RuleEvaluationError,
    RuleEvaluationResult,
};

const NO_FORMULAS: &[PreparedFormula] = &[];

/// Evaluates rules against a context.
///
/// Condition and action failures never escape: an errored rule is reported
/// as unmatched with zero adjustment and the error message attached.
#[derive(Debug, Clone, Default)]
pub struct RuleEvaluator {
    engine: ActionEngine,
}

impl RuleEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            engine: ActionEngine::with_config(config),
        }
    }

    #[must_use]
    pub fn engine(&self) -> &ActionEngine {
        &self.engine
    }

    /// Evaluate one rule. Inactive rules are evaluated like any other; use
    /// [`evaluate_ruleset`](Self::evaluate_ruleset) to skip them.
    pub fn evaluate_rule(&self, rule: &Rule, context: &EvaluationContext) -> RuleEvaluationResult {
        self.evaluate_with(rule, NO_FORMULAS, None, context)
    }

    /// Evaluate the active rules in ascending `evaluation_order` (ties keep
    /// input order). With `stop_on_first_match`, evaluation ends after the
    /// first rule that matches.
    pub fn evaluate_ruleset(
        &self,
        rules: &[Rule],
        context: &EvaluationContext,
        stop_on_first_match: bool,
    ) -> Vec<RuleEvaluationResult> {
        let mut ordered: Vec<&Rule> = rules.iter().collect();
        ordered.sort_by_key(|r| r.evaluation_order);
        self.run(
            ordered.into_iter().map(|rule| (rule, NO_FORMULAS, None)),
            context,
            stop_on_first_match,
        )
    }

    /// Evaluate rules already in evaluation order, each with its parsed
    /// formulas and compiled regexes.
    pub(crate) fn run<'a>(
        &self,
        rules: impl IntoIterator<Item = (&'a Rule, &'a [PreparedFormula], Option<&'a Patterns>)>,
        context: &EvaluationContext,
        stop_on_first_match: bool,
    ) -> Vec<RuleEvaluationResult> {
        let mut results = Vec::new();
        for (rule, formulas, patterns) in rules {
            if !rule.is_active {
                debug!(rule_id = %rule.id, "rule inactive, skipped");
                continue;
            }
            let result = self.evaluate_with(rule, formulas, patterns, context);
            let stop = stop_on_first_match && result.matched;
            results.push(result);
            if stop {
                debug!(rule_id = %rule.id, "stopping after first match");
                break;
            }
        }
        results
    }

    pub(crate) fn evaluate_with(
        &self,
        rule: &Rule,
        formulas: &[PreparedFormula],
        patterns: Option<&Patterns>,
        context: &EvaluationContext,
    ) -> RuleEvaluationResult {
        let mut result = RuleEvaluationResult::unmatched(&rule.id, &rule.name);

        let matched = match &rule.conditions {
            None => Ok(true),
            Some(conditions) => conditions.evaluate_in(context, patterns),
        };
        match matched {
            Ok(false) => {
                debug!(rule_id = %rule.id, "rule did not match");
                return result;
            }
            Err(source) => {
                let err = RuleEvaluationError {
                    rule_id: rule.id.clone(),
                    source: source.into(),
                };
                warn!(rule_id = %rule.id, error = %err, "rule errored");
                result.error = Some(err.to_string());
                return result;
            }
            Ok(true) => {}
        }

        let outcome = self
            .engine
            .execute_prepared(&rule.actions, formulas, context);
        if let Some(source) = outcome.error {
            let err = RuleEvaluationError {
                rule_id: rule.id.clone(),
                source: source.into(),
            };
            warn!(rule_id = %rule.id, error = %err, "rule errored");
            result.error = Some(err.to_string());
            result.breakdown = outcome.breakdown;
            return result;
        }
        debug!(
            rule_id = %rule.id,
            adjustment = outcome.total,
            actions = outcome.breakdown.len(),
            "rule matched"
        );
        result.matched = true;
        result.adjustment_value = outcome.total;
        result.breakdown = outcome.breakdown;
        result
    }
}

/// Sum the adjustments of matched, error-free results.
pub fn calculate_total_adjustment(results: &[RuleEvaluationResult]) -> AdjustmentSummary {
    let matched_rules: Vec<MatchedRule> = results
        .iter()
        .filter(|r| r.contributes())
        .map(|r| MatchedRule {
            rule_id: r.rule_id.clone(),
            rule_name: r.rule_name.clone(),
            adjustment: r.adjustment_value,
            breakdown: r.breakdown.clone(),
        })
        .collect();

    let mut total_adjustment: f64 = matched_rules.iter().map(|r| r.adjustment).sum();
    let mut error = None;
    if !total_adjustment.is_finite() {
        warn!(total_adjustment, "total adjustment overflowed");
        error = Some("sum of matched rule adjustments is not finite".to_owned());
        total_adjustment = 0.0;
    }
    debug!(
        total_adjustment,
        matched = matched_rules.len(),
        evaluated = results.len(),
        "ruleset totals"
    );

    AdjustmentSummary {
        total_adjustment,
        matched_rules_count: matched_rules.len(),
        matched_rules,
        error,
    }
}
