//! Top-event probability and importance (component C5, spec section 4.5).
//!
//! Takes the minimal cut sets C4 already produced and the per-basic-event
//! probabilities from C1's expression graph, and combines them two ways:
//! an exact inclusion-exclusion sum truncated to `n_sums` terms, or (when
//! `rare_event` is set) the first-order sum alone. `cut_off` is applied
//! here, against each cut set's own probability, after minimization and
//! before the combination is summed — a small cut set that individually
//! falls below the threshold cannot contribute to a larger one (all
//! probabilities are in `[0, 1]`), so filtering first only ever shrinks the
//! combination work, never changes the result.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::expr::DomainError;
use crate::mcs::{combinations, union, BasicEventIndex, CutSet};
use crate::model::{FaultTree, Node};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProbabilityError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("basic event '{id}' has no probability expression")]
    MissingExpression { id: String },

    #[error("analysis cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CutSetProbability {
    /// Original (non-normalized) identifiers of the cut set's members,
    /// sorted for deterministic display.
    pub members: Vec<String>,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityResult {
    /// Cut sets surviving `cut_off`, sorted by descending probability then
    /// lexicographically by member list.
    pub cut_sets: Vec<CutSetProbability>,
    pub top_probability: f64,
    /// Fussell-Vesely importance per basic event's original identifier:
    /// the fraction of `top_probability` accounted for by cut sets that
    /// contain it.
    pub importance: BTreeMap<String, f64>,
    pub warnings: Vec<String>,
    pub rare_event_used: bool,
    pub terms_summed: u64,
}

/// Per-basic-event point probabilities, dense-indexed the same way as
/// [`BasicEventIndex`] (`probs[i - 1]` is the probability of basic event
/// `i`).
fn basic_event_probabilities(
    tree: &FaultTree,
    index: &BasicEventIndex,
) -> Result<Vec<f64>, ProbabilityError> {
    let mut probs = Vec::with_capacity(index.len());
    for i in 1..=index.len() as u32 {
        let node_id = index.node_of(i);
        let Node::Basic(b) = tree.node(node_id) else {
            unreachable!("BasicEventIndex only ever indexes basic events");
        };
        let expr = b
            .expression
            .ok_or_else(|| ProbabilityError::MissingExpression { id: b.original_id.clone() })?;
        probs.push(tree.expressions.mean(expr)?);
    }
    Ok(probs)
}

fn cut_set_probability(cut_set: &CutSet, probs: &[f64]) -> f64 {
    cut_set.iter().map(|&i| probs[(i - 1) as usize]).product()
}

/// Exact inclusion-exclusion, expanding one subset-size level at a time and
/// stopping once `n_sums` terms have been summed. `terms_summed` lets the
/// caller tell an exhausted budget from a naturally short sum (few enough
/// cut sets that the full expansion terminates on its own).
fn inclusion_exclusion(cut_sets: &[CutSet], probs: &[f64], n_sums: u64) -> (f64, u64, bool) {
    if cut_sets.is_empty() {
        return (0.0, 0, false);
    }
    let refs: Vec<&CutSet> = cut_sets.iter().collect();
    let n = refs.len();
    let mut sum = 0.0;
    let mut terms = 0u64;
    let mut truncated = false;

    'levels: for k in 1..=n {
        let combos = combinations(&(0..n).collect::<Vec<_>>(), k);
        for combo in combos {
            if terms >= n_sums {
                truncated = true;
                break 'levels;
            }
            let chosen: Vec<&CutSet> = combo.iter().map(|&i| refs[i]).collect();
            let merged = union(&chosen);
            let p = cut_set_probability(&merged, probs);
            let sign = if k % 2 == 1 { 1.0 } else { -1.0 };
            sum += sign * p;
            terms += 1;
        }
    }
    (sum.clamp(0.0, 1.0), terms, truncated)
}

fn rare_event_sum(cut_sets: &[CutSet], probs: &[f64]) -> (f64, Vec<String>) {
    let mut warnings = Vec::new();
    let mut sum = 0.0;
    for cs in cut_sets {
        let p = cut_set_probability(cs, probs);
        if p > 0.1 {
            warnings.push(format!(
                "rare-event approximation may be inaccurate: a cut set has probability {p:.4} (> 0.1)"
            ));
        }
        sum += p;
    }
    (sum.clamp(0.0, 1.0), warnings)
}

pub fn analyze(
    tree: &FaultTree,
    config: &crate::config::AnalysisConfig,
    cut_sets: &[CutSet],
    index: &BasicEventIndex,
) -> Result<ProbabilityResult, ProbabilityError> {
    let probs = basic_event_probabilities(tree, index)?;

    let filtered: Vec<CutSet> = if config.cut_off > 0.0 {
        cut_sets
            .iter()
            .filter(|cs| cut_set_probability(cs, &probs) >= config.cut_off)
            .cloned()
            .collect()
    } else {
        cut_sets.to_vec()
    };

    let mut warnings = Vec::new();
    let (top_probability, terms_summed, rare_event_used) = if config.rare_event {
        let (sum, rare_warnings) = rare_event_sum(&filtered, &probs);
        warnings.extend(rare_warnings);
        (sum, filtered.len() as u64, true)
    } else {
        let (sum, terms, truncated) = inclusion_exclusion(&filtered, &probs, config.n_sums);
        if truncated {
            warnings.push(format!(
                "inclusion-exclusion truncated after {} terms (n_sums budget); result is a lower bound",
                config.n_sums
            ));
        }
        (sum, terms, false)
    };

    let mut importance: BTreeMap<String, f64> = BTreeMap::new();
    if config.compute_importance && top_probability > 0.0 {
        for i in 1..=index.len() as u32 {
            let node_id = index.node_of(i);
            let Node::Basic(b) = tree.node(node_id) else { continue };
            let contribution: f64 = filtered
                .iter()
                .filter(|cs| cs.contains(&i))
                .map(|cs| cut_set_probability(cs, &probs))
                .sum();
            importance.insert(b.original_id.clone(), (contribution / top_probability).min(1.0));
        }
    }

    let mut cut_set_results: Vec<CutSetProbability> = filtered
        .iter()
        .map(|cs| {
            let mut members: Vec<String> = cs
                .iter()
                .map(|&i| tree.node(index.node_of(i)).original_id().to_string())
                .collect();
            members.sort();
            CutSetProbability { members, probability: cut_set_probability(cs, &probs) }
        })
        .collect();
    cut_set_results.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.members.cmp(&b.members))
    });

    Ok(ProbabilityResult {
        cut_sets: cut_set_results,
        top_probability,
        importance,
        warnings,
        rare_event_used,
        terms_summed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::expr::ExprKind;
    use crate::model::GateKind;
    use crate::validate::seal;

    fn two_independent_basic_events(p_a: f64, p_b: f64) -> FaultTree {
        let mut tree = FaultTree::new("t");
        let a_expr = tree.expressions.add(ExprKind::Const(p_a));
        let b_expr = tree.expressions.add(ExprKind::Const(p_b));
        tree.add_basic_event("a", Some(a_expr)).unwrap();
        tree.add_basic_event("b", Some(b_expr)).unwrap();
        tree.add_gate("top", GateKind::Or, &["a", "b"]).unwrap();
        tree.declare_top_event("top").unwrap();
        seal(&mut tree, true).unwrap();
        tree
    }

    #[test]
    fn or_of_independent_events_matches_inclusion_exclusion() {
        let tree = two_independent_basic_events(0.1, 0.2);
        let index = BasicEventIndex::build(&tree);
        let cut_sets = crate::mcs::generate(
            &tree,
            &AnalysisConfig::default(),
            &index,
            &crate::cancel::CancellationToken::new(),
        )
        .unwrap();
        let result = analyze(&tree, &AnalysisConfig::default(), &cut_sets, &index).unwrap();
        let expected = 0.1 + 0.2 - 0.1 * 0.2;
        assert!((result.top_probability - expected).abs() < 1e-9);
    }

    #[test]
    fn rare_event_flags_high_probability_cut_sets() {
        let tree = two_independent_basic_events(0.5, 0.01);
        let index = BasicEventIndex::build(&tree);
        let mut cfg = AnalysisConfig::default();
        cfg.rare_event = true;
        let cut_sets = crate::mcs::generate(&tree, &cfg, &index, &crate::cancel::CancellationToken::new()).unwrap();
        let result = analyze(&tree, &cfg, &cut_sets, &index).unwrap();
        assert!(result.rare_event_used);
        assert!(result.warnings.iter().any(|w| w.contains("0.5")));
    }

    #[test]
    fn cut_off_removes_low_probability_cut_sets() {
        let tree = two_independent_basic_events(0.5, 1e-9);
        let index = BasicEventIndex::build(&tree);
        let mut cfg = AnalysisConfig::default();
        cfg.cut_off = 1e-6;
        let cut_sets = crate::mcs::generate(&tree, &cfg, &index, &crate::cancel::CancellationToken::new()).unwrap();
        let result = analyze(&tree, &cfg, &cut_sets, &index).unwrap();
        assert_eq!(result.cut_sets.len(), 1);
        assert_eq!(result.cut_sets[0].members, vec!["a".to_string()]);
    }

    #[test]
    fn importance_sums_do_not_exceed_one() {
        let tree = two_independent_basic_events(0.3, 0.3);
        let index = BasicEventIndex::build(&tree);
        let cfg = AnalysisConfig::default();
        let cut_sets = crate::mcs::generate(&tree, &cfg, &index, &crate::cancel::CancellationToken::new()).unwrap();
        let result = analyze(&tree, &cfg, &cut_sets, &index).unwrap();
        for (_, v) in &result.importance {
            assert!(*v >= 0.0 && *v <= 1.0 + 1e-9);
        }
    }
}
