use valuator::{
    Action, ActionEngine, ActionError, CompileError, ConditionGroup, ConditionNode,
    EvaluationContext, Interpreter, LogicalOperator, Rule, RuleEvaluator, RuleSet, RuleSetBuilder,
    Value, field,
};

#[test]
fn empty_ruleset() {
    let ruleset = RuleSetBuilder::new().compile().unwrap();
    assert!(ruleset.is_empty());
    assert!(ruleset.evaluate(&EvaluationContext::new()).is_empty());

    let summary = ruleset.evaluate_summary(&EvaluationContext::new());
    assert_eq!(summary.total_adjustment, 0.0);
    assert_eq!(summary.matched_rules_count, 0);
}

#[test]
fn rule_without_conditions_or_actions() {
    let ruleset = RuleSetBuilder::new()
        .rule("noop", "does nothing", |r| r)
        .compile()
        .unwrap();
    let results = ruleset.evaluate(&EvaluationContext::new());
    assert!(results[0].matched);
    assert_eq!(results[0].adjustment_value, 0.0);
    assert!(results[0].breakdown.is_empty());
}

#[test]
fn empty_and_group_is_true() {
    let always: ConditionNode = ConditionGroup::new(LogicalOperator::And, vec![]).into();
    let never: ConditionNode = ConditionGroup::new(LogicalOperator::Or, vec![]).into();
    let ruleset = RuleSetBuilder::new()
        .rule("and", "empty and", |r| r.when(always).then(Action::fixed(1.0)))
        .rule("or", "empty or", |r| r.when(never).then(Action::fixed(2.0)))
        .compile()
        .unwrap();
    let summary = ruleset.evaluate_summary(&EvaluationContext::new());
    assert_eq!(summary.total_adjustment, 1.0);
}

#[test]
fn not_group_honors_only_its_first_child() {
    let group: ConditionNode = ConditionGroup::new(
        LogicalOperator::Not,
        vec![field("ram_gb").gt(64_i64), field("ram_gb").lt(64_i64)],
    )
    .into();
    let empty_not: ConditionNode = ConditionGroup::new(LogicalOperator::Not, vec![]).into();

    let ruleset = RuleSetBuilder::new()
        .rule("not", "not huge", |r| r.when(group).then(Action::fixed(3.0)))
        .rule("empty", "empty not", |r| r.when(empty_not).then(Action::fixed(4.0)))
        .compile()
        .unwrap();
    let ctx = EvaluationContext::new().set("ram_gb", 16_i64);
    let results = ruleset.evaluate(&ctx);

    assert!(results[0].matched);
    assert_eq!(results[0].adjustment_value, 3.0);
    assert!(!results[1].matched);
    assert!(results[1].error.as_ref().unwrap().contains("NOT group"));
}

#[test]
fn null_values_count_as_missing() {
    let ruleset = RuleSetBuilder::new()
        .rule("null", "gpu is null", |r| {
            r.when(field("gpu").is_null()).then(Action::fixed(1.0))
        })
        .rule("eq", "gpu equals null", |r| {
            r.when(field("gpu").eq(Value::Null)).then(Action::fixed(10.0))
        })
        .compile()
        .unwrap();
    let ctx = EvaluationContext::from_json_str(r#"{"gpu": null}"#).unwrap();
    assert_eq!(ruleset.evaluate_summary(&ctx).total_adjustment, 1.0);
}

#[test]
fn numeric_strings_compare_as_numbers() {
    let ruleset = RuleSetBuilder::new()
        .rule("1", "ram", |r| r.when(field("ram_gb").eq(16_i64)).then(Action::fixed(1.0)))
        .rule("2", "ram range", |r| {
            r.when(field("ram_gb").between(8_i64, 32_i64)).then(Action::fixed(2.0))
        })
        .compile()
        .unwrap();
    let ctx = EvaluationContext::new().set("ram_gb", "16");
    assert_eq!(ruleset.evaluate_summary(&ctx).total_adjustment, 3.0);
}

#[test]
fn invalid_regex_is_rejected_at_compile_time() {
    let err = RuleSetBuilder::new()
        .rule("re", "bad pattern", |r| {
            r.when(field("model").matches("(unclosed")).then(Action::fixed(1.0))
        })
        .compile()
        .unwrap_err();
    assert!(matches!(&err, CompileError::InvalidPattern { rule_id, .. } if rule_id == "re"));
    assert!(err.to_string().contains("invalid regex"));
}

#[test]
fn invalid_regex_degrades_an_uncompiled_rule() {
    let rule = Rule::new("re", "bad pattern")
        .when(field("model").matches("(unclosed"))
        .then(Action::fixed(1.0));
    let ctx = EvaluationContext::new().set("model", "OptiPlex");
    let result = RuleEvaluator::new().evaluate_rule(&rule, &ctx);
    assert!(!result.matched);
    assert!(result.error.as_ref().unwrap().contains("invalid regex"));
}

#[test]
fn in_operator_requires_a_list() {
    let ruleset = RuleSetBuilder::new()
        .rule("in", "bad in", |r| {
            r.when(ConditionNode::from(valuator::Condition::new(
                "brand",
                valuator::ConditionOperator::In,
                "dell",
            )))
            .then(Action::fixed(1.0))
        })
        .compile()
        .unwrap();
    let results = ruleset.evaluate(&EvaluationContext::new().set("brand", "dell"));
    assert!(results[0].error.as_ref().unwrap().contains("a list of values"));
}

#[test]
fn invalid_benchmark_unit_is_an_action_error() {
    let engine = ActionEngine::new();
    let ctx = EvaluationContext::new().set("cpu.cpu_mark", 10_000_i64);
    let outcome = engine.execute_actions(
        &[
            Action::benchmark("cpu.cpu_mark", "per_zero_points", 1.0),
            Action::benchmark("cpu.cpu_mark", "per_0_points", 1.0),
            Action::fixed(5.0),
        ],
        &ctx,
    );
    assert_eq!(outcome.total, 5.0);
    assert!(outcome.breakdown[0].is_error());
    assert!(outcome.breakdown[1].is_error());
    assert!(!outcome.breakdown[2].is_error());
}

#[test]
fn formula_without_interpreter() {
    let ctx = EvaluationContext::new().set("ram_gb", 16_i64);
    let action = Action::formula("ram_gb * 2");
    assert_eq!(action.calculate(&ctx, None), Err(ActionError::NoInterpreter));
    assert_eq!(action.calculate(&ctx, Some(&Interpreter::new())), Ok(32.0));
}

#[test]
fn missing_per_unit_quantity_is_zero() {
    let ctx = EvaluationContext::new();
    assert_eq!(Action::per_unit("per_gb", 2.5).calculate(&ctx, None), Ok(0.0));
}

#[test]
fn empty_rule_ids_are_rejected() {
    let err = RuleSetBuilder::new()
        .rule("  ", "blank", |r| r)
        .compile()
        .unwrap_err();
    assert!(matches!(err, CompileError::EmptyRuleId { .. }));
}

#[test]
fn deep_formula_is_rejected_at_compile_time() {
    let deep = format!("{}ram_gb{}", "(".repeat(100), ")".repeat(100));
    let ruleset = RuleSetBuilder::new()
        .rule("deep", "deep", |r| r.then(Action::formula(&deep)))
        .compile()
        .unwrap();
    assert_eq!(ruleset.invalid_formulas().len(), 1);

    let results = ruleset.evaluate(&EvaluationContext::new().set("ram_gb", 1_i64));
    assert!(results[0].breakdown[0].error.as_ref().unwrap().contains("maximum depth"));
}

#[test]
fn overlong_formula_is_rejected() {
    let long = vec!["1"; 6000].join("+");
    let ruleset = RuleSet::from_json(&format!(
        r#"[{{"id": 1, "actions": [{{"action_type": "formula", "formula": "{long}"}}]}}]"#
    ))
    .unwrap();
    assert_eq!(ruleset.invalid_formulas().len(), 1);
}

#[test]
fn non_finite_results_are_errors() {
    let ctx = EvaluationContext::new().set("x", 1e308_f64);
    let engine = ActionEngine::new();
    let outcome = engine.execute_actions(&[Action::formula("x * 10")], &ctx);
    assert!(outcome.breakdown[0].is_error());
    assert_eq!(outcome.total, 0.0);
}
