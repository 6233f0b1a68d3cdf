use criterion::{black_box, criterion_group, criterion_main, Criterion};

use faulttree_core::cancel::CancellationToken;
use faulttree_core::config::AnalysisConfig;
use faulttree_core::expr::ExprKind;
use faulttree_core::model::{FaultTree, GateKind};

/// A k-of-n vote over `width` basic events feeding a two-level OR/AND
/// fan-in, large enough to exercise the superset worklist and the
/// inclusion-exclusion term budget.
fn wide_tree(width: usize) -> FaultTree {
    let mut tree = FaultTree::new("bench");
    let mut leaves = Vec::with_capacity(width);
    for i in 0..width {
        let p = tree.expressions.add(ExprKind::Const(0.01 + (i as f64) * 1e-4));
        let name = format!("e{i}");
        tree.add_basic_event(&name, Some(p)).unwrap();
        leaves.push(name);
    }
    let half = width / 2;
    let left: Vec<&str> = leaves[..half].iter().map(String::as_str).collect();
    let right: Vec<&str> = leaves[half..].iter().map(String::as_str).collect();
    tree.add_gate("left", GateKind::Or, &left).unwrap();
    tree.add_gate("right", GateKind::Or, &right).unwrap();
    tree.add_gate("top", GateKind::And, &["left", "right"]).unwrap();
    tree.declare_top_event("top").unwrap();
    tree
}

fn bench_full_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze");
    for width in [8usize, 16, 32] {
        group.bench_function(format!("width_{width}"), |b| {
            b.iter_batched(
                || wide_tree(width),
                |mut tree| {
                    let config = AnalysisConfig::default();
                    let result =
                        faulttree_core::analyze(&mut tree, &config, &CancellationToken::new())
                            .unwrap();
                    black_box(result.probability.top_probability);
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_monte_carlo(c: &mut Criterion) {
    c.bench_function("monte_carlo_width16_10k", |b| {
        b.iter_batched(
            || wide_tree(16),
            |mut tree| {
                let mut config = AnalysisConfig::default();
                config.n_simulations = 10_000;
                let result =
                    faulttree_core::analyze(&mut tree, &config, &CancellationToken::new())
                        .unwrap();
                black_box(result.monte_carlo.unwrap().mean);
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_full_pipeline, bench_monte_carlo);
criterion_main!(benches);
