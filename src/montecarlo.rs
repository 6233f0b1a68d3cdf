//! Monte Carlo driver (component C6, spec section 4.6).
//!
//! Each iteration publishes its own sample epoch: every basic event's
//! expression is sampled once under that epoch, and C5's inclusion-
//! exclusion expansion is then run against the freshly sampled
//! probabilities instead of their means (spec section 4.5's "Monte-Carlo
//! variant"). Rather than one signed accumulator, the alternating sum is
//! tracked as two running totals — `pos_terms` for odd subset order,
//! `neg_terms` for even — and the draw's value is `pos_terms - neg_terms`.
//! Repeating this `n_simulations` times yields a sample of the top event
//! probability; `run` reports its mean, standard deviation, and 5/50/95
//! percentiles rather than a single point estimate.
//!
//! `rare_event` has no effect here (it only changes how C5 combines exact
//! cut-set probabilities); if set, `run` reports it as ignored rather than
//! silently doing nothing with it.

use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::cancel::CancellationToken;
use crate::config::AnalysisConfig;
use crate::expr::ExprId;
use crate::mcs::{combinations, union, BasicEventIndex, CutSet};
use crate::model::{FaultTree, Node};
use crate::probability::ProbabilityError;

const CHUNK_SIZE: u64 = 10_000;

/// 5th, 50th, and 95th percentiles of the sampled distribution (spec
/// section 4.5's default quantile set).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantiles {
    pub p05: f64,
    pub p50: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonteCarloResult {
    pub mean: f64,
    pub std_dev: f64,
    pub quantiles: Quantiles,
    pub iterations: u64,
    pub warnings: Vec<String>,
}

fn expression_ids(tree: &FaultTree, index: &BasicEventIndex) -> Result<Vec<ExprId>, ProbabilityError> {
    let mut ids = Vec::with_capacity(index.len());
    for i in 1..=index.len() as u32 {
        let Node::Basic(b) = tree.node(index.node_of(i)) else {
            unreachable!("BasicEventIndex only ever indexes basic events");
        };
        let expr = b
            .expression
            .ok_or_else(|| ProbabilityError::MissingExpression { id: b.original_id.clone() })?;
        ids.push(expr);
    }
    Ok(ids)
}

/// Deterministic per-iteration seed, independent of how work is chunked
/// across threads (spec property P1: same seed, same tree, same result).
fn iteration_rng(master_seed: u64, iteration: u64) -> rand::rngs::StdRng {
    const MIX: u64 = 0x9E37_79B9_7F4A_7C15;
    let derived = master_seed ^ iteration.wrapping_mul(MIX).rotate_left(31);
    rand::rngs::StdRng::seed_from_u64(derived)
}

/// One Monte Carlo draw: sample every basic event's expression once under
/// `epoch`, then expand the same alternating subset sum as C5's exact
/// kernel, but split into `pos_terms`/`neg_terms` and evaluated against
/// this draw's sampled probabilities rather than their means.
fn draw(
    tree: &FaultTree,
    expr_ids: &[ExprId],
    cut_sets: &[CutSet],
    rng: &mut impl Rng,
    epoch: u64,
    n_sums: u64,
) -> f64 {
    let probs: Vec<f64> = expr_ids
        .iter()
        .map(|&expr| {
            tree.expressions
                .sample(expr, rng, epoch)
                .expect("sampled expr id came from this tree's own graph")
                .clamp(0.0, 1.0)
        })
        .collect();

    if cut_sets.is_empty() {
        return 0.0;
    }

    let refs: Vec<&CutSet> = cut_sets.iter().collect();
    let n = refs.len();
    let mut pos_terms = 0.0;
    let mut neg_terms = 0.0;
    let mut terms = 0u64;

    'levels: for k in 1..=n {
        let combos = combinations(&(0..n).collect::<Vec<_>>(), k);
        for combo in combos {
            if terms >= n_sums {
                break 'levels;
            }
            let chosen: Vec<&CutSet> = combo.iter().map(|&i| refs[i]).collect();
            let merged = union(&chosen);
            let p: f64 = merged.iter().map(|&i| probs[(i - 1) as usize]).product();
            if k % 2 == 1 {
                pos_terms += p;
            } else {
                neg_terms += p;
            }
            terms += 1;
        }
    }

    (pos_terms - neg_terms).clamp(0.0, 1.0)
}

/// Nearest-rank percentile of an already-sorted sample.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((q * (sorted.len() as f64 - 1.0)).round() as usize).min(sorted.len() - 1);
    sorted[idx]
}

pub fn run(
    tree: &FaultTree,
    config: &AnalysisConfig,
    cut_sets: &[CutSet],
    index: &BasicEventIndex,
    cancel: &CancellationToken,
) -> Result<MonteCarloResult, ProbabilityError> {
    let mut warnings = Vec::new();
    if config.rare_event {
        warnings.push("rare_event has no effect on Monte Carlo sampling; ignored".to_string());
    }

    if config.n_simulations == 0 || cut_sets.is_empty() {
        return Ok(MonteCarloResult {
            mean: 0.0,
            std_dev: 0.0,
            quantiles: Quantiles { p05: 0.0, p50: 0.0, p95: 0.0 },
            iterations: 0,
            warnings,
        });
    }

    let expr_ids = expression_ids(tree, index)?;

    let mut draws: Vec<f64> = Vec::with_capacity(config.n_simulations as usize);
    let mut done: u64 = 0;
    while done < config.n_simulations {
        if cancel.is_cancelled() {
            return Err(ProbabilityError::Cancelled);
        }
        let chunk = CHUNK_SIZE.min(config.n_simulations - done);
        let chunk_draws: Vec<f64> = (0..chunk)
            .into_par_iter()
            .map(|offset| {
                let iteration = done + offset;
                let mut rng = iteration_rng(config.seed, iteration);
                draw(tree, &expr_ids, cut_sets, &mut rng, iteration, config.n_sums)
            })
            .collect();
        draws.extend(chunk_draws);
        done += chunk;
    }

    let n = draws.len() as f64;
    let mean = draws.iter().sum::<f64>() / n;
    let variance = draws.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    let mut sorted = draws;
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let quantiles = Quantiles {
        p05: percentile(&sorted, 0.05),
        p50: percentile(&sorted, 0.50),
        p95: percentile(&sorted, 0.95),
    };

    Ok(MonteCarloResult { mean, std_dev, quantiles, iterations: config.n_simulations, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ExprKind;
    use crate::model::GateKind;
    use crate::validate::seal;

    fn single_basic_event_tree(p: f64) -> FaultTree {
        let mut tree = FaultTree::new("t");
        let expr = tree.expressions.add(ExprKind::Const(p));
        tree.add_basic_event("a", Some(expr)).unwrap();
        tree.add_gate("top", GateKind::Or, &["a"]).unwrap();
        tree.declare_top_event("top").unwrap();
        seal(&mut tree, true).unwrap();
        tree
    }

    #[test]
    fn converges_near_the_analytic_probability() {
        let tree = single_basic_event_tree(0.3);
        let index = BasicEventIndex::build(&tree);
        let mut cfg = AnalysisConfig::default();
        cfg.n_simulations = 50_000;
        cfg.seed = 11;
        let cut_sets =
            crate::mcs::generate(&tree, &cfg, &index, &CancellationToken::new()).unwrap();
        let result = run(&tree, &cfg, &cut_sets, &index, &CancellationToken::new()).unwrap();
        assert_eq!(result.iterations, 50_000);
        assert!((result.mean - 0.3).abs() < 0.02, "{}", result.mean);
        assert!(result.std_dev >= 0.0);
        assert!(result.quantiles.p05 <= result.quantiles.p50);
        assert!(result.quantiles.p50 <= result.quantiles.p95);
    }

    #[test]
    fn zero_simulations_is_a_no_op() {
        let tree = single_basic_event_tree(0.3);
        let index = BasicEventIndex::build(&tree);
        let cfg = AnalysisConfig::default();
        let cut_sets =
            crate::mcs::generate(&tree, &cfg, &index, &CancellationToken::new()).unwrap();
        let result = run(&tree, &cfg, &cut_sets, &index, &CancellationToken::new()).unwrap();
        assert_eq!(result.iterations, 0);
    }

    #[test]
    fn same_seed_is_reproducible() {
        let tree = single_basic_event_tree(0.3);
        let index = BasicEventIndex::build(&tree);
        let mut cfg = AnalysisConfig::default();
        cfg.n_simulations = 5_000;
        cfg.seed = 99;
        let cut_sets =
            crate::mcs::generate(&tree, &cfg, &index, &CancellationToken::new()).unwrap();
        let first = run(&tree, &cfg, &cut_sets, &index, &CancellationToken::new()).unwrap();
        let second = run(&tree, &cfg, &cut_sets, &index, &CancellationToken::new()).unwrap();
        assert_eq!(first.mean, second.mean);
        assert_eq!(first.quantiles, second.quantiles);
    }
}
