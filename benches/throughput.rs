use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use criterion::{Criterion, criterion_group, criterion_main};
use valuator::{Action, EvaluationContext, ModifierSet, RuleSet, RuleSetBuilder, field};

fn build_shared_ruleset() -> (Arc<RuleSet>, EvaluationContext) {
    let mut builder = RuleSetBuilder::new();
    let n = 20;

    for i in 0..n {
        let threshold = (i % 8) as i64 * 4;
        builder = builder.rule(&format!("r{i}"), &format!("rule {i}"), move |r| {
            r.when(field("ram_gb").gte(threshold))
                .then(Action::formula("ram_gb * 2.5 + cpu.cores"))
                .then(
                    Action::fixed(-5.0)
                        .with_modifiers(ModifierSet::new().condition([("used", 0.6)])),
                )
        });
    }

    let ruleset = Arc::new(builder.compile().unwrap());
    let ctx = EvaluationContext::new()
        .set("ram_gb", 16_i64)
        .set("cpu.cores", 8_i64)
        .set("condition", "used");

    (ruleset, ctx)
}

fn bench_throughput(c: &mut Criterion) {
    let thread_counts = [1, 2, 4, 8];

    let mut group = c.benchmark_group("throughput");
    group.measurement_time(Duration::from_secs(5));

    for &threads in &thread_counts {
        let (ruleset, ctx) = build_shared_ruleset();

        group.bench_function(format!("{threads}_threads"), |b| {
            b.iter_custom(|iters| {
                let per_thread = iters / threads as u64;
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let rs = Arc::clone(&ruleset);
                        let c = ctx.clone();
                        thread::spawn(move || {
                            let start = Instant::now();
                            for _ in 0..per_thread {
                                let _ = rs.evaluate_summary(&c);
                            }
                            start.elapsed()
                        })
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|h| h.join().unwrap())
                    .max()
                    .unwrap_or(Duration::ZERO)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_throughput);
criterion_main!(benches);
