//! Fault-tree validator (component C3, spec section 4.3).
//!
//! Runs as a single DFS from the top gate that does double duty: cycle
//! detection (fatal, aborts immediately with the offending path) and
//! implicit-gate discovery (gates reached but not pre-registered). What
//! follows is completeness (every leaf resolves to a known primary event),
//! gate arity, a basic-event-probability sweep that is a warning unless
//! probability analysis was requested, and a domain check of every attached
//! expression (invariant I4: every basic event's expression validates).

use std::collections::{BTreeSet, HashSet};

use thiserror::Error;

use crate::model::{FaultTree, GateKind, Node, NodeId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("identifier already defined: {id}")]
    DuplicateDefinition { id: String },

    #[error("gate {gate} already has child {child}")]
    DuplicateChild { gate: String, child: String },

    #[error("undefined identifier '{id}' in fault tree '{tree}'")]
    UndefinedIdentifier { id: String, tree: String },

    #[error("'{id}' is not a gate")]
    NotAGate { id: String },

    #[error("top event '{id}' must be a gate")]
    TopEventNotAGate { id: String },

    #[error("fault tree has no top event declared")]
    NoTopEvent,

    #[error("cycle detected: {}", path.join("->"))]
    Cycle { path: Vec<String> },

    #[error(
        "fault tree '{tree}' is incomplete:\n{}",
        missing.iter().map(|(gate, child)| format!("  gate '{gate}' references undefined identifier '{child}'"))
            .collect::<Vec<_>>().join("\n")
    )]
    Incomplete { tree: String, missing: Vec<(String, String)> },

    #[error("gate arity violations:\n{}", violations.join("\n"))]
    ArityViolations { violations: Vec<String> },

    #[error("basic events missing a probability expression: {}", ids.join(", "))]
    MissingProbabilities { ids: Vec<String> },

    #[error("expression domain errors:\n{}", errors.join("\n"))]
    ExpressionDomain { errors: Vec<String> },
}

/// Non-fatal findings accumulated during a successful `seal()`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SealReport {
    pub warnings: Vec<String>,
}

/// Validate and seal `tree` (spec section 4.3). Idempotent: calling this
/// twice on the same, unchanged tree produces identical results (property
/// P5), since `inter_events`/`implicit_gates`/parent links are recomputed
/// from scratch each call rather than accumulated.
pub fn seal(tree: &mut FaultTree, require_probabilities: bool) -> Result<SealReport, ValidationError> {
    let top = tree.top().ok_or(ValidationError::NoTopEvent)?;

    // Reset derived state so re-sealing is a pure recomputation.
    tree.implicit_gates.clear();
    let pre_registered: BTreeSet<NodeId> = tree.inter_events.clone();
    tree.inter_events.clear();
    for node in tree.nodes_mut_parents_reset() {
        node.clear();
    }

    let mut missing: Vec<(String, String)> = Vec::new();
    dfs_cycle_and_discovery(tree, top, &pre_registered, &mut missing)?;

    if !missing.is_empty() {
        missing.sort();
        missing.dedup();
        return Err(ValidationError::Incomplete { tree: tree.name.clone(), missing });
    }

    let mut violations = Vec::new();
    let reachable: Vec<NodeId> = tree.inter_events.iter().copied().collect();
    for &gate_id in &reachable {
        if let Some(gate) = tree.gate(gate_id) {
            check_arity(tree, gate, &mut violations);
        }
    }
    if !violations.is_empty() {
        violations.sort();
        return Err(ValidationError::ArityViolations { violations });
    }

    let mut missing_probability = Vec::new();
    for node in tree.nodes() {
        if let Node::Basic(b) = node {
            if b.parents.is_empty() && node.id() != top {
                // unreachable basic events are simply unused, not an error
                continue;
            }
            if b.expression.is_none() {
                missing_probability.push(b.original_id.clone());
            }
        }
    }
    missing_probability.sort();

    if !missing_probability.is_empty() {
        if require_probabilities {
            return Err(ValidationError::MissingProbabilities { ids: missing_probability });
        }
    }

    let mut domain_errors = Vec::new();
    for node in tree.nodes() {
        if let Node::Basic(b) = node {
            if let Some(expr) = b.expression {
                if let Err(e) = tree.expressions.validate(expr) {
                    domain_errors.push(format!("basic event '{}': {e}", b.original_id));
                }
            }
        }
    }
    if !domain_errors.is_empty() {
        return Err(ValidationError::ExpressionDomain { errors: domain_errors });
    }

    tree.sealed = true;
    Ok(SealReport {
        warnings: missing_probability
            .into_iter()
            .map(|id| format!("basic event '{id}' has no probability expression"))
            .collect(),
    })
}

/// DFS from `start`, tracking the current path for cycle diagnostics.
/// Traversal visits children in sorted (normalized-identifier) order so
/// diagnostics are deterministic across runs (spec section 4.3 closing
/// note).
fn dfs_cycle_and_discovery(
    tree: &mut FaultTree,
    start: NodeId,
    pre_registered: &BTreeSet<NodeId>,
    missing: &mut Vec<(String, String)>,
) -> Result<(), ValidationError> {
    let mut path: Vec<NodeId> = Vec::new();
    let mut on_path: HashSet<NodeId> = HashSet::new();
    let mut done: HashSet<NodeId> = HashSet::new();
    visit(tree, start, pre_registered, &mut path, &mut on_path, &mut done, missing)
}

fn visit(
    tree: &mut FaultTree,
    node_id: NodeId,
    pre_registered: &BTreeSet<NodeId>,
    path: &mut Vec<NodeId>,
    on_path: &mut HashSet<NodeId>,
    done: &mut HashSet<NodeId>,
    missing: &mut Vec<(String, String)>,
) -> Result<(), ValidationError> {
    if done.contains(&node_id) {
        return Ok(());
    }
    if on_path.contains(&node_id) {
        let pos = path.iter().position(|id| *id == node_id).expect("on_path implies present");
        let mut cycle_path: Vec<String> = path[pos..]
            .iter()
            .map(|id| tree.node(*id).original_id().to_string())
            .collect();
        cycle_path.push(tree.node(node_id).original_id().to_string());
        return Err(ValidationError::Cycle { path: cycle_path });
    }

    if !tree.node(node_id).is_gate() {
        done.insert(node_id);
        return Ok(());
    }

    tree.inter_events.insert(node_id);
    if !pre_registered.contains(&node_id) {
        tree.mark_implicit(node_id);
    }

    path.push(node_id);
    on_path.insert(node_id);

    let mut children: Vec<String> = tree
        .gate(node_id)
        .expect("checked is_gate above")
        .children
        .clone();
    children.sort();

    let gate_original_id = tree.node(node_id).original_id().to_string();

    for child_normalized in children {
        match tree.resolve_child(&child_normalized) {
            Some(child_id) => {
                tree.record_parent(child_id, node_id);
                visit(tree, child_id, pre_registered, path, on_path, done, missing)?;
            }
            None => {
                missing.push((gate_original_id.clone(), child_normalized));
            }
        }
    }

    path.pop();
    on_path.remove(&node_id);
    done.insert(node_id);
    Ok(())
}

fn check_arity(
    tree: &FaultTree,
    gate: &crate::model::GateNode,
    violations: &mut Vec<String>,
) {
    let n = gate.children.len();
    if n < gate.kind.min_children() {
        violations.push(format!(
            "gate '{}' ({:?}) has {} child(ren), needs at least {}",
            gate.original_id,
            gate.kind,
            n,
            gate.kind.min_children()
        ));
    }
    if let Some(exact) = gate.kind.exact_children() {
        if n != exact {
            violations.push(format!(
                "gate '{}' ({:?}) has {} child(ren), needs exactly {}",
                gate.original_id, gate.kind, n, exact
            ));
        }
    }
    if let GateKind::KOfN { k } | GateKind::AtLeast { k } = gate.kind {
        if n < 2 {
            violations.push(format!(
                "gate '{}' is K-out-of-N but has only {} child(ren), needs N >= 2",
                gate.original_id, n
            ));
        }
        if k as usize > n {
            violations.push(format!(
                "gate '{}' has k={} but only {} children (k must be <= N)",
                gate.original_id, k, n
            ));
        }
        if k == 0 {
            violations.push(format!("gate '{}' has k=0, which is degenerate", gate.original_id));
        }
    }
    let _ = tree;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GateKind;

    #[test]
    fn cycle_is_reported_with_path() {
        let mut tree = FaultTree::new("t");
        tree.add_gate("g1", GateKind::Or, &["g2"]).unwrap();
        tree.add_gate("g2", GateKind::Or, &["g1"]).unwrap();
        tree.declare_top_event("g1").unwrap();
        let err = seal(&mut tree, false).unwrap_err();
        match err {
            ValidationError::Cycle { path } => assert_eq!(path, vec!["g1", "g2", "g1"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn dangling_identifier_is_reported() {
        let mut tree = FaultTree::new("t");
        tree.add_gate("g1", GateKind::Or, &["x"]).unwrap();
        tree.declare_top_event("g1").unwrap();
        let err = seal(&mut tree, false).unwrap_err();
        match err {
            ValidationError::Incomplete { missing, .. } => {
                assert_eq!(missing, vec![("g1".to_string(), "x".to_string())]);
            }
            other => panic!("expected Incomplete, got {other:?}"),
        }
    }

    #[test]
    fn implicit_gate_is_discovered() {
        let mut tree = FaultTree::new("t");
        tree.add_basic_event("a", None).unwrap();
        tree.add_gate_pending("inline", GateKind::Not, &["a"]).unwrap();
        tree.add_gate("top", GateKind::Or, &["inline"]).unwrap();
        tree.declare_top_event("top").unwrap();
        seal(&mut tree, false).unwrap();
        let inline_id = tree.find("inline").unwrap();
        assert!(tree.implicit_gates.contains(&inline_id));
        assert!(tree.inter_events.contains(&inline_id));
    }

    #[test]
    fn arity_violations_are_collected_together() {
        let mut tree = FaultTree::new("t");
        tree.add_basic_event("a", None).unwrap();
        tree.add_gate("not1", GateKind::Not, &[]).unwrap();
        tree.add_gate("vote", GateKind::KOfN { k: 5 }, &["a"]).unwrap();
        tree.add_gate("top", GateKind::Or, &["not1", "vote"]).unwrap();
        tree.declare_top_event("top").unwrap();
        let err = seal(&mut tree, false).unwrap_err();
        match err {
            ValidationError::ArityViolations { violations } => {
                assert!(violations.len() >= 2, "expected multiple collected violations: {violations:?}");
            }
            other => panic!("expected ArityViolations, got {other:?}"),
        }
    }

    #[test]
    fn missing_probability_is_warning_unless_required() {
        let mut tree = FaultTree::new("t");
        tree.add_basic_event("a", None).unwrap();
        tree.add_gate("top", GateKind::Or, &["a"]).unwrap();
        tree.declare_top_event("top").unwrap();
        let report = seal(&mut tree, false).unwrap();
        assert_eq!(report.warnings.len(), 1);

        let mut tree2 = FaultTree::new("t2");
        tree2.add_basic_event("a", None).unwrap();
        tree2.add_gate("top", GateKind::Or, &["a"]).unwrap();
        tree2.declare_top_event("top").unwrap();
        let err = seal(&mut tree2, true).unwrap_err();
        assert!(matches!(err, ValidationError::MissingProbabilities { .. }));
    }

    #[test]
    fn invalid_expression_domain_is_rejected() {
        let mut tree = FaultTree::new("t");
        let lambda = tree.expressions.add(crate::expr::ExprKind::Const(-1.0));
        let time = tree.expressions.add(crate::expr::ExprKind::Const(10.0));
        let expr = tree.expressions.add(crate::expr::ExprKind::Exponential { lambda, time });
        tree.add_basic_event("a", Some(expr)).unwrap();
        tree.add_gate("top", GateKind::Or, &["a"]).unwrap();
        tree.declare_top_event("top").unwrap();
        let err = seal(&mut tree, false).unwrap_err();
        match err {
            ValidationError::ExpressionDomain { errors } => {
                assert!(errors[0].contains("a"));
            }
            other => panic!("expected ExpressionDomain, got {other:?}"),
        }
    }

    #[test]
    fn seal_twice_is_idempotent() {
        let mut tree = FaultTree::new("t");
        let lambda = tree.expressions.add(crate::expr::ExprKind::Const(1e-3));
        let time = tree.expressions.add(crate::expr::ExprKind::Const(10.0));
        let expr = tree.expressions.add(crate::expr::ExprKind::Exponential { lambda, time });
        tree.add_basic_event("a", Some(expr)).unwrap();
        tree.add_gate("top", GateKind::Or, &["a"]).unwrap();
        tree.declare_top_event("top").unwrap();
        let first = seal(&mut tree, false).unwrap();
        let second = seal(&mut tree, false).unwrap();
        assert_eq!(first, second);
    }
}
