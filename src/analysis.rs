//! Top-level orchestration: seal, generate minimal cut sets, quantify, and
//! optionally sample — the sequence a CLI command or library caller drives
//! through one call (spec section 4, overview).

use tracing::{info, info_span};

use crate::cancel::CancellationToken;
use crate::config::AnalysisConfig;
use crate::error::FaultTreeError;
use crate::mcs::{self, BasicEventIndex, CutSet};
use crate::model::FaultTree;
use crate::montecarlo::{self, MonteCarloResult};
use crate::probability::{self, ProbabilityResult};
use crate::validate::{seal, SealReport};

/// Full result of analyzing one fault tree: the seal report (structural
/// warnings), the minimal cut sets with their probabilities, and an
/// optional Monte Carlo estimate when `config.n_simulations > 0`.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub seal_report: SealReport,
    pub cut_set_count_before_cutoff: usize,
    pub probability: ProbabilityResult,
    pub monte_carlo: Option<MonteCarloResult>,
}

/// Run the full pipeline against `tree`, mutating it in place via `seal`.
/// `tree` need not be pre-sealed; if it already is, re-sealing is a no-op
/// recomputation (spec property P5).
pub fn analyze(
    tree: &mut FaultTree,
    config: &AnalysisConfig,
    cancel: &CancellationToken,
) -> Result<AnalysisResult, FaultTreeError> {
    // Every downstream stage (cut-set probability, importance, Monte Carlo)
    // needs a probability expression per reachable basic event.
    let seal_report = {
        let _enter = info_span!("seal").entered();
        seal(tree, true)?
    };
    for warning in &seal_report.warnings {
        tracing::warn!("{warning}");
    }

    if cancel.is_cancelled() {
        return Err(FaultTreeError::Cancelled);
    }

    let index = BasicEventIndex::build(tree);
    info!(basic_events = index.len(), "indexed basic events");

    let cut_sets: Vec<CutSet> = {
        let _enter = info_span!("minimal_cut_sets").entered();
        mcs::generate(tree, config, &index, cancel)?
    };
    let cut_set_count_before_cutoff = cut_sets.len();
    info!(count = cut_set_count_before_cutoff, "generated minimal cut sets");

    if cancel.is_cancelled() {
        return Err(FaultTreeError::Cancelled);
    }

    let probability_result = {
        let _enter = info_span!("probability").entered();
        probability::analyze(tree, config, &cut_sets, &index)?
    };
    info!(top_probability = probability_result.top_probability, "computed top event probability");

    let monte_carlo = if config.n_simulations > 0 {
        let _enter = info_span!("monte_carlo").entered();
        let result = montecarlo::run(tree, config, &cut_sets, &index, cancel)?;
        info!(
            mean = result.mean,
            std_dev = result.std_dev,
            iterations = result.iterations,
            "monte carlo sampling complete"
        );
        Some(result)
    } else {
        None
    };

    Ok(AnalysisResult {
        seal_report,
        cut_set_count_before_cutoff,
        probability: probability_result,
        monte_carlo,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ExprKind;
    use crate::model::GateKind;

    #[test]
    fn end_to_end_on_a_small_tree() {
        let mut tree = FaultTree::new("demo");
        let p_a = tree.expressions.add(ExprKind::Const(0.01));
        let p_b = tree.expressions.add(ExprKind::Const(0.02));
        tree.add_basic_event("pump_a", Some(p_a)).unwrap();
        tree.add_basic_event("pump_b", Some(p_b)).unwrap();
        tree.add_gate("top", GateKind::And, &["pump_a", "pump_b"]).unwrap();
        tree.declare_top_event("top").unwrap();

        let config = AnalysisConfig::default();
        let result = analyze(&mut tree, &config, &CancellationToken::new()).unwrap();
        assert_eq!(result.cut_set_count_before_cutoff, 1);
        let expected = 0.01 * 0.02;
        assert!((result.probability.top_probability - expected).abs() < 1e-9);
        assert!(result.monte_carlo.is_none());
    }

    #[test]
    fn cancellation_before_generation_is_reported() {
        let mut tree = FaultTree::new("demo");
        let p_a = tree.expressions.add(ExprKind::Const(0.01));
        tree.add_basic_event("a", Some(p_a)).unwrap();
        tree.add_gate("top", GateKind::Or, &["a"]).unwrap();
        tree.declare_top_event("top").unwrap();

        let config = AnalysisConfig::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = analyze(&mut tree, &config, &cancel).unwrap_err();
        assert!(matches!(err, FaultTreeError::Cancelled));
    }
}
