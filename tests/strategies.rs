#![allow(dead_code)]

use std::collections::BTreeSet;

use proptest::prelude::*;
use valuator::{Action, ConditionNode, EvaluationContext, ModifierSet, Rule, field};

// --- Fixed listing schema ---
// ram_gb          : i64 (1..=128)
// cpu.cores       : i64 (1..=64)
// cpu.cpu_mark    : i64 (1000..=60000)
// price_usd       : f64 (50..5000)
// age_years       : i64 (0..=12)
// condition       : one of CONDITIONS
// manufacturer    : one of BRANDS

pub const CONDITIONS: &[&str] = &["new", "used", "refurbished"];
pub const BRANDS: &[&str] = &["Dell", "HP", "Lenovo", "Apple"];

/// Numeric fields a formula may reference, by the name a formula uses.
pub const NUMERIC_FIELDS: &[&str] = &["ram_gb", "cpu.cores", "cpu_cores", "cpu.cpu_mark", "price_usd", "age_years"];

pub fn arb_context() -> impl Strategy<Value = EvaluationContext> {
    (
        1_i64..=128,
        1_i64..=64,
        1000_i64..=60_000,
        50.0_f64..5000.0,
        0_i64..=12,
        prop::sample::select(CONDITIONS),
        prop::sample::select(BRANDS),
    )
        .prop_map(|(ram, cores, mark, price, age, condition, brand)| {
            EvaluationContext::new()
                .set("ram_gb", ram)
                .set("cpu.cores", cores)
                .set("cpu.cpu_mark", mark)
                .set("price_usd", price)
                .set("age_years", age)
                .set("condition", condition)
                .set("manufacturer", brand)
        })
}

/// A formula's source and the field names it references.
#[derive(Debug, Clone)]
pub struct GenFormula {
    pub source: String,
    pub fields: BTreeSet<String>,
}

fn arb_leaf() -> impl Strategy<Value = GenFormula> {
    prop_oneof![
        prop::sample::select(NUMERIC_FIELDS).prop_map(|name| GenFormula {
            source: name.to_owned(),
            fields: BTreeSet::from([name.to_owned()]),
        }),
        (1_i64..=100).prop_map(|n| GenFormula {
            source: n.to_string(),
            fields: BTreeSet::new(),
        }),
        (1_u32..=999).prop_map(|n| GenFormula {
            source: format!("{}.{:02}", n / 100, n % 100),
            fields: BTreeSet::new(),
        }),
    ]
}

fn combine(op: &str, a: GenFormula, b: GenFormula) -> GenFormula {
    GenFormula {
        source: format!("({} {op} {})", a.source, b.source),
        fields: a.fields.union(&b.fields).cloned().collect(),
    }
}

fn call(name: &str, args: Vec<GenFormula>) -> GenFormula {
    let source = format!(
        "{name}({})",
        args.iter()
            .map(|a| a.source.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    let fields = args.into_iter().flat_map(|a| a.fields).collect();
    GenFormula { source, fields }
}

/// Arithmetic formulas over the schema's numeric fields, bounded depth.
pub fn arb_formula(max_depth: u32) -> impl Strategy<Value = GenFormula> {
    arb_leaf().prop_recursive(max_depth, 24, 3, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone(), prop::sample::select(&["+", "-", "*", "/"][..]))
                .prop_map(|(a, b, op)| combine(op, a, b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| call("max", vec![a, b])),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| call("min", vec![a, b])),
            inner.clone().prop_map(|a| call("abs", vec![a])),
            inner.clone().prop_map(|a| call("round", vec![a])),
            (inner.clone(), inner.clone(), inner).prop_map(|(a, b, c)| GenFormula {
                source: format!("({} if {} > 10 else {})", a.source, b.source, c.source),
                fields: a
                    .fields
                    .into_iter()
                    .chain(b.fields)
                    .chain(c.fields)
                    .collect(),
            }),
        ]
    })
}

/// A condition on one schema field.
pub fn arb_condition() -> impl Strategy<Value = ConditionNode> {
    prop_oneof![
        (1_i64..=128).prop_map(|n| field("ram_gb").gte(n)),
        (1_i64..=64).prop_map(|n| field("cpu.cores").lt(n)),
        prop::sample::select(CONDITIONS).prop_map(|c| field("condition").eq(c)),
        prop::sample::select(BRANDS).prop_map(|b| field("manufacturer").eq(b.to_uppercase())),
        (0_i64..=12, 0_i64..=12).prop_map(|(a, b)| field("age_years").between(a.min(b), a.max(b))),
    ]
}

pub fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        (-200.0_f64..200.0).prop_map(Action::fixed),
        (0.0_f64..10.0).prop_map(|a| Action::per_unit("per_gb", a)),
        (50.0_f64..150.0).prop_map(|p| Action::multiplier(Some(p))),
        (0.1_f64..1.0).prop_map(|m| {
            Action::fixed(100.0).with_modifiers(ModifierSet::new().condition([("used", m)]))
        }),
        Just(Action::formula("ram_gb * 2.5")),
        Just(Action::formula("missing_field + 1")),
    ]
}

/// 1..=8 rules with random orders, conditions and actions.
pub fn arb_rules() -> impl Strategy<Value = Vec<Rule>> {
    prop::collection::vec(
        (
            -5_i32..=5,
            prop::option::of(arb_condition()),
            prop::collection::vec(arb_action(), 1..=3),
            prop::bool::weighted(0.9),
        ),
        1..=8,
    )
    .prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (order, condition, actions, active))| {
                let mut rule = Rule::new(format!("r{i}"), format!("rule {i}"))
                    .order(order)
                    .active(active);
                if let Some(c) = condition {
                    rule = rule.when(c);
                }
                actions.into_iter().fold(rule, Rule::then)
            })
            .collect()
    })
}
