use criterion::{Criterion, black_box, criterion_group, criterion_main};
use valuator::{
    Action, EvaluationContext, Interpreter, ModifierSet, RuleSet, RuleSetBuilder, field, formula,
};

const FORMULAS: &[(&str, &str)] = &[
    ("simple", "ram_gb * 2.5"),
    ("dotted", "cpu.cores * 10 + cpu.threads * 2"),
    (
        "nested",
        "clamp(max(cpu.cpu_mark / 1000, ram_gb) * 1.5 if condition == 'used' else 0, 0, 200)",
    ),
];

fn listing() -> EvaluationContext {
    EvaluationContext::new()
        .set("ram_gb", 16_i64)
        .set("cpu.cores", 8_i64)
        .set("cpu.threads", 16_i64)
        .set("cpu.cpu_mark", 24_000_i64)
        .set("condition", "used")
        .set("manufacturer", "Dell")
        .set("age_years", 3_i64)
        .set("price_usd", 400.0_f64)
}

/// `n` rules cycling through the action kinds, half of them gated on a
/// condition that matches the benchmark listing.
fn build_ruleset(n: usize) -> RuleSet {
    let mut builder = RuleSetBuilder::new();
    for i in 0..n {
        let action = match i % 4 {
            0 => Action::per_unit("per_gb", 2.5),
            1 => Action::formula("cpu.cores * 3 + ram_gb / 4"),
            2 => Action::benchmark("cpu.cpu_mark", "per_1000_points", 1.2),
            _ => Action::fixed(-10.0).with_modifiers(
                ModifierSet::new()
                    .condition([("used", 0.6)])
                    .age(0.05, 0.3)
                    .brand([("dell", 1.1)]),
            ),
        };
        builder = builder.rule(&format!("r{i}"), &format!("rule {i}"), move |r| {
            let r = r.order(i as i32).then(action);
            if i % 2 == 0 {
                r.when(field("ram_gb").gte(8_i64).and(field("condition").eq("used")))
            } else {
                r
            }
        });
    }
    builder.compile().unwrap()
}

fn bench_formulas(c: &mut Criterion) {
    let mut group = c.benchmark_group("formula");
    let interpreter = Interpreter::new();
    let ctx = listing();

    for &(name, source) in FORMULAS {
        group.bench_function(format!("{name}_parse"), |b| {
            b.iter(|| formula::parse(black_box(source)).unwrap());
        });

        let expr = interpreter.parse(source).unwrap();
        group.bench_function(format!("{name}_eval"), |b| {
            b.iter(|| interpreter.evaluate(black_box(&expr), black_box(&ctx)));
        });
    }

    group.finish();
}

fn bench_ruleset(c: &mut Criterion) {
    let mut group = c.benchmark_group("ruleset");
    let ctx = listing();

    for &n in &[5, 20, 50] {
        let ruleset = build_ruleset(n);
        group.bench_function(format!("{n}_rules_evaluate"), |b| {
            b.iter(|| ruleset.evaluate_summary(black_box(&ctx)));
        });
    }

    group.finish();
}

fn bench_compilation(c: &mut Criterion) {
    let mut group = c.benchmark_group("compilation");

    for &n in &[5, 20, 50] {
        group.bench_function(format!("{n}_rules"), |b| {
            b.iter(|| black_box(build_ruleset(n)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_formulas, bench_ruleset, bench_compilation);
criterion_main!(benches);
