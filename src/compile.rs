use std::collections::HashSet;

use tracing::debug;

use crate::conditions::Patterns;
use crate::evaluate::RuleEvaluator;
use crate::types::{CompileError, CompiledRule, Rule, RuleSet};

pub(crate) fn compile(
    mut rules: Vec<Rule>,
    evaluator: RuleEvaluator,
    stop_on_first_match: bool,
) -> Result<RuleSet, CompileError> {
    check_ids(&rules)?;

    // Stable: equal orders keep their input order.
    rules.sort_by_key(|r| r.evaluation_order);

    let engine = evaluator.engine();
    let compiled: Vec<CompiledRule> = rules
        .into_iter()
        .map(|rule| -> Result<CompiledRule, CompileError> {
            let patterns = compile_patterns(&rule)?;
            let formulas = rule.actions.iter().map(|a| engine.prepare(a)).collect();
            Ok(CompiledRule {
                rule,
                formulas,
                patterns,
            })
        })
        .collect::<Result<_, CompileError>>()?;

    let patterns: usize = compiled.iter().map(|c| c.patterns.len()).sum();
    debug!(
        rules = compiled.len(),
        patterns,
        stop_on_first_match,
        "ruleset compiled"
    );

    Ok(RuleSet {
        rules: compiled,
        evaluator,
        stop_on_first_match,
    })
}

/// Compile the regex operands of `rule`'s conditions.
pub(crate) fn compile_patterns(rule: &Rule) -> Result<Patterns, CompileError> {
    match &rule.conditions {
        Some(conditions) => {
            Patterns::compile(conditions).map_err(|err| CompileError::InvalidPattern {
                rule_id: rule.id.clone(),
                message: err.to_string(),
            })
        }
        None => Ok(Patterns::default()),
    }
}

fn check_ids(rules: &[Rule]) -> Result<(), CompileError> {
    let mut seen = HashSet::new();
    for rule in rules {
        if rule.id.trim().is_empty() {
            return Err(CompileError::EmptyRuleId {
                name: rule.name.clone(),
            });
        }
        if !seen.insert(rule.id.as_str()) {
            return Err(CompileError::DuplicateRule {
                id: rule.id.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, field};

    fn compile_rules(rules: Vec<Rule>) -> Result<RuleSet, CompileError> {
        compile(rules, RuleEvaluator::new(), false)
    }

    #[test]
    fn sorts_by_evaluation_order() {
        let ruleset = compile_rules(vec![
            Rule::new("c", "c").order(3),
            Rule::new("a", "a").order(1),
            Rule::new("b1", "b1").order(2),
            Rule::new("b2", "b2").order(2),
        ])
        .unwrap();
        assert_eq!(ruleset.evaluation_order(), vec!["a", "b1", "b2", "c"]);
    }

    #[test]
    fn duplicate_ids_rejected() {
        let err = compile_rules(vec![Rule::new("1", "a"), Rule::new("1", "b")]).unwrap_err();
        assert_eq!(err, CompileError::DuplicateRule { id: "1".into() });
    }

    #[test]
    fn empty_id_rejected() {
        let err = compile_rules(vec![Rule::new(" ", "nameless")]).unwrap_err();
        assert_eq!(
            err,
            CompileError::EmptyRuleId {
                name: "nameless".into()
            }
        );
    }

    #[test]
    fn regex_operands_compiled_once() {
        let ruleset = compile_rules(vec![
            Rule::new("1", "dell")
                .when(field("model").matches("^opti").or(field("brand").matches("dell"))),
            Rule::new("2", "plain").when(field("ram_gb").gte(8_i64)),
        ])
        .unwrap();
        assert_eq!(ruleset.rules[0].patterns.len(), 2);
        assert_eq!(ruleset.rules[1].patterns.len(), 0);
    }

    #[test]
    fn invalid_regex_rejected() {
        let err = compile_rules(vec![
            Rule::new("re", "bad").when(field("model").matches("(unclosed")),
        ])
        .unwrap_err();
        let CompileError::InvalidPattern { rule_id, message } = err else {
            panic!("expected an invalid pattern error");
        };
        assert_eq!(rule_id, "re");
        assert!(message.starts_with("invalid regex pattern '(unclosed'"));
    }

    #[test]
    fn formulas_prepared_once() {
        let ruleset = compile_rules(vec![
            Rule::new("1", "ok")
                .then(Action::fixed(1.0))
                .then(Action::formula("ram_gb * 2")),
            Rule::new("2", "bad").then(Action::formula("ram_gb ** ")),
        ])
        .unwrap();
        assert_eq!(ruleset.rules[0].formulas.len(), 2);
        let invalid = ruleset.invalid_formulas();
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].0, "2");
        assert_eq!(invalid[0].1, 0);
    }
}
