//! Minimal cut set generation (component C4, spec section 4.4).
//!
//! Expansion runs over a worklist of partial "supersets" (a set of positive
//! basic-event indices, a set of negative ones, and a stack of gates still
//! to be expanded) rather than recursion, so cancellation can be polled
//! between pops (spec section 5) and `limit_order` can prune a branch the
//! moment it grows past budget instead of after it bottoms out.
//!
//! Polarity (`negate`) is threaded through expansion rather than resolved
//! only at the leaves: a `NOT` over a compound gate is pushed down via De
//! Morgan (`NOT(AND(..)) = OR(NOT(..))`, `NOT(OR(..)) = AND(NOT(..))`,
//! `NOT(k-of-n) = (n-k+1)-of-n of the negated children`) so every gate kind
//! has a well-defined complement instead of only NOT's immediate child.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::cancel::CancellationToken;
use crate::config::AnalysisConfig;
use crate::model::{FaultTree, GateKind, Node, NodeId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum McsError {
    #[error("fault tree must be sealed before minimal cut sets can be generated")]
    NotSealed,

    #[error("analysis cancelled during minimal cut set generation")]
    Cancelled,
}

/// A minimal cut set: the dense indices (1-based, see [`BasicEventIndex`])
/// of the basic events whose simultaneous occurrence is sufficient for the
/// top event.
pub type CutSet = std::collections::BTreeSet<u32>;

/// Maps basic events reachable from the top event to a dense, deterministic
/// 1-based index, assigned in sorted-normalized-identifier order.
#[derive(Debug, Clone)]
pub struct BasicEventIndex {
    by_node: BTreeMap<NodeId, u32>,
    by_index: Vec<NodeId>,
}

impl BasicEventIndex {
    pub fn build(tree: &FaultTree) -> Self {
        let mut reachable: Vec<(String, NodeId)> = tree
            .nodes()
            .filter_map(|n| match n {
                Node::Basic(b) if !b.parents.is_empty() => {
                    Some((b.normalized_id.clone(), b.id))
                }
                _ => None,
            })
            .collect();
        reachable.sort();

        let mut by_node = BTreeMap::new();
        let mut by_index = Vec::with_capacity(reachable.len());
        for (position, (_, node_id)) in reachable.into_iter().enumerate() {
            by_node.insert(node_id, (position + 1) as u32);
            by_index.push(node_id);
        }
        Self { by_node, by_index }
    }

    pub fn index_of(&self, node_id: NodeId) -> Option<u32> {
        self.by_node.get(&node_id).copied()
    }

    pub fn node_of(&self, index: u32) -> NodeId {
        self.by_index[(index - 1) as usize]
    }

    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }
}

#[derive(Clone)]
struct PendingGate {
    node: NodeId,
    negate: bool,
}

struct Superset {
    positives: CutSet,
    negatives: CutSet,
    pending: Vec<PendingGate>,
}

impl Superset {
    fn root(top: NodeId) -> Self {
        Self {
            positives: CutSet::new(),
            negatives: CutSet::new(),
            pending: vec![PendingGate { node: top, negate: false }],
        }
    }
}

enum InsertOutcome {
    /// The term was absorbed (leaf resolved, or pushed as a pending gate);
    /// the superset may still be viable.
    Continue,
    /// The term makes this superset unsatisfiable; discard it.
    Dead,
}

fn insert_term(
    tree: &FaultTree,
    index: &BasicEventIndex,
    ss: &mut Superset,
    node_id: NodeId,
    negate: bool,
) -> InsertOutcome {
    match tree.node(node_id) {
        Node::House(h) => {
            let satisfied = h.state == !negate;
            if satisfied {
                InsertOutcome::Continue
            } else {
                InsertOutcome::Dead
            }
        }
        Node::Basic(_) => {
            let idx = index.index_of(node_id).expect("reachable basic event is indexed");
            if negate {
                if ss.positives.contains(&idx) {
                    InsertOutcome::Dead
                } else {
                    ss.negatives.insert(idx);
                    InsertOutcome::Continue
                }
            } else if ss.negatives.contains(&idx) {
                InsertOutcome::Dead
            } else {
                ss.positives.insert(idx);
                InsertOutcome::Continue
            }
        }
        Node::Gate(_) => {
            ss.pending.push(PendingGate { node: node_id, negate });
            InsertOutcome::Continue
        }
    }
}

/// What expanding one `(gate, negate)` pending entry produces: either a
/// single conjunction of further terms added to the same superset, or a
/// disjunction, each branch of which is its own conjunction of terms and
/// must fork the superset.
enum Expansion {
    And(Vec<(NodeId, bool)>),
    Or(Vec<Vec<(NodeId, bool)>>),
}

fn sorted_children(tree: &FaultTree, gate: &crate::model::GateNode) -> Vec<NodeId> {
    let mut children: Vec<NodeId> = gate
        .children
        .iter()
        .map(|c| tree.resolve_child(c).expect("sealed tree has no dangling children"))
        .collect();
    children.sort_by_key(|id| tree.node(*id).normalized_id().to_string());
    children
}

/// Union of several cut sets, used by both the exact and Monte Carlo
/// probability kernels to merge a subset-combination into one term.
pub(crate) fn union(sets: &[&CutSet]) -> CutSet {
    let mut out = CutSet::new();
    for s in sets {
        out.extend(s.iter().copied());
    }
    out
}

/// `n choose k` combinations of `items`, in lexicographic order over the
/// (already sorted) input.
pub(crate) fn combinations<T: Clone>(items: &[T], k: usize) -> Vec<Vec<T>> {
    if k == 0 || k > items.len() {
        return Vec::new();
    }
    let mut result = Vec::new();
    let mut combo = Vec::with_capacity(k);
    fn recurse<T: Clone>(items: &[T], k: usize, start: usize, combo: &mut Vec<T>, out: &mut Vec<Vec<T>>) {
        if combo.len() == k {
            out.push(combo.clone());
            return;
        }
        let remaining_needed = k - combo.len();
        if items.len() - start < remaining_needed {
            return;
        }
        for i in start..items.len() {
            combo.push(items[i].clone());
            recurse(items, k, i + 1, combo, out);
            combo.pop();
        }
    }
    recurse(items, k, 0, &mut combo, &mut result);
    result
}

fn expand_gate(tree: &FaultTree, gate: &crate::model::GateNode, negate: bool) -> Expansion {
    let children = sorted_children(tree, gate);
    match (gate.kind, negate) {
        (GateKind::Null, n) => Expansion::And(vec![(children[0], n)]),
        (GateKind::Not, n) => Expansion::And(vec![(children[0], !n)]),

        (GateKind::And, false) | (GateKind::Or, true) => {
            Expansion::And(children.into_iter().map(|c| (c, negate)).collect())
        }
        (GateKind::Or, false) | (GateKind::And, true) => {
            Expansion::Or(children.into_iter().map(|c| vec![(c, negate)]).collect())
        }

        // NAND(children) = NOT(AND(children)); complement of AND is the OR
        // branch, so NAND itself (negate=false) behaves like AND negated.
        (GateKind::Nand, false) => {
            Expansion::Or(children.into_iter().map(|c| vec![(c, true)]).collect())
        }
        (GateKind::Nand, true) => Expansion::And(children.into_iter().map(|c| (c, false)).collect()),

        // NOR(children) = NOT(OR(children)).
        (GateKind::Nor, false) => Expansion::And(children.into_iter().map(|c| (c, true)).collect()),
        (GateKind::Nor, true) => {
            Expansion::Or(children.into_iter().map(|c| vec![(c, false)]).collect())
        }

        (GateKind::Xor, false) => {
            let a = children[0];
            let b = children[1];
            Expansion::Or(vec![vec![(a, false), (b, true)], vec![(a, true), (b, false)]])
        }
        (GateKind::Xor, true) => {
            let a = children[0];
            let b = children[1];
            Expansion::Or(vec![vec![(a, false), (b, false)], vec![(a, true), (b, true)]])
        }

        (GateKind::KOfN { k }, false) | (GateKind::AtLeast { k }, false) => {
            let branches = combinations(&children, k as usize)
                .into_iter()
                .map(|combo| combo.into_iter().map(|c| (c, false)).collect())
                .collect();
            Expansion::Or(branches)
        }
        (GateKind::KOfN { k }, true) | (GateKind::AtLeast { k }, true) => {
            let n = children.len() as u32;
            let complement_k = n - k + 1;
            let branches = combinations(&children, complement_k as usize)
                .into_iter()
                .map(|combo| combo.into_iter().map(|c| (c, true)).collect())
                .collect();
            Expansion::Or(branches)
        }
    }
}

/// Generate the minimal cut sets of `tree`'s top event. `tree` must already
/// be sealed (`validate::seal` has run without error).
pub fn generate(
    tree: &FaultTree,
    config: &AnalysisConfig,
    index: &BasicEventIndex,
    cancel: &CancellationToken,
) -> Result<Vec<CutSet>, McsError> {
    if !tree.sealed {
        return Err(McsError::NotSealed);
    }
    let top = tree.top().expect("sealed tree has a top event");

    let mut worklist = vec![Superset::root(top)];
    let mut candidates: Vec<CutSet> = Vec::new();

    while let Some(mut ss) = worklist.pop() {
        if cancel.is_cancelled() {
            return Err(McsError::Cancelled);
        }

        if config.limit_order > 0 && ss.positives.len() > config.limit_order {
            continue;
        }

        let Some(next) = ss.pending.pop() else {
            // An unresolved negative term means some NOT-literal never got
            // cancelled by a contradicting positive: the branch is not an
            // all-positive cut set and must be dropped, not finalized. A
            // finalized `positives` here with leftover `negatives` would
            // (for the common case of both empty) produce the degenerate
            // `{}` candidate, which `minimize` treats as a subset of every
            // other cut set and so deletes all of them.
            if ss.negatives.is_empty() {
                candidates.push(ss.positives);
            }
            continue;
        };

        let gate = tree.gate(next.node).expect("pending entries are always gates");
        match expand_gate(tree, gate, next.negate) {
            Expansion::And(terms) => {
                let mut dead = false;
                for (child, neg) in terms {
                    if matches!(insert_term(tree, index, &mut ss, child, neg), InsertOutcome::Dead) {
                        dead = true;
                        break;
                    }
                }
                if !dead {
                    worklist.push(ss);
                }
            }
            Expansion::Or(branches) => {
                for branch in branches {
                    let mut clone = Superset {
                        positives: ss.positives.clone(),
                        negatives: ss.negatives.clone(),
                        pending: ss.pending.clone(),
                    };
                    let mut dead = false;
                    for (child, neg) in branch {
                        if matches!(insert_term(tree, index, &mut clone, child, neg), InsertOutcome::Dead) {
                            dead = true;
                            break;
                        }
                    }
                    if !dead {
                        worklist.push(clone);
                    }
                }
            }
        }
    }

    Ok(minimize(candidates))
}

/// Remove every cut set that is a strict superset of another (spec section
/// 4.4's minimization step). Candidates are grouped by size so a set can
/// only be dominated by one seen at an equal or smaller size.
fn minimize(mut candidates: Vec<CutSet>) -> Vec<CutSet> {
    candidates.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    candidates.dedup();

    let mut kept_by_len: BTreeMap<usize, Vec<CutSet>> = BTreeMap::new();
    let mut kept: Vec<CutSet> = Vec::new();

    'candidates: for candidate in candidates {
        for len in 0..=candidate.len() {
            if let Some(bucket) = kept_by_len.get(&len) {
                for existing in bucket {
                    if existing.is_subset(&candidate) {
                        continue 'candidates;
                    }
                }
            }
        }
        kept_by_len.entry(candidate.len()).or_default().push(candidate.clone());
        kept.push(candidate);
    }

    kept.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GateKind;
    use crate::validate::seal;

    fn sets_of(cut_sets: &[CutSet], index: &BasicEventIndex, tree: &FaultTree) -> Vec<Vec<String>> {
        let mut out: Vec<Vec<String>> = cut_sets
            .iter()
            .map(|cs| {
                let mut names: Vec<String> = cs
                    .iter()
                    .map(|&i| tree.node(index.node_of(i)).original_id().to_string())
                    .collect();
                names.sort();
                names
            })
            .collect();
        out.sort();
        out
    }

    #[test]
    fn or_of_two_basic_events_has_two_singleton_cut_sets() {
        let mut tree = FaultTree::new("t");
        tree.add_basic_event("a", None).unwrap();
        tree.add_basic_event("b", None).unwrap();
        tree.add_gate("top", GateKind::Or, &["a", "b"]).unwrap();
        tree.declare_top_event("top").unwrap();
        seal(&mut tree, false).unwrap();

        let index = BasicEventIndex::build(&tree);
        let cfg = AnalysisConfig::default();
        let sets = generate(&tree, &cfg, &index, &CancellationToken::new()).unwrap();
        assert_eq!(sets_of(&sets, &index, &tree), vec![vec!["a"], vec!["b"]]);
    }

    #[test]
    fn and_of_two_basic_events_has_one_cut_set() {
        let mut tree = FaultTree::new("t");
        tree.add_basic_event("a", None).unwrap();
        tree.add_basic_event("b", None).unwrap();
        tree.add_gate("top", GateKind::And, &["a", "b"]).unwrap();
        tree.declare_top_event("top").unwrap();
        seal(&mut tree, false).unwrap();

        let index = BasicEventIndex::build(&tree);
        let cfg = AnalysisConfig::default();
        let sets = generate(&tree, &cfg, &index, &CancellationToken::new()).unwrap();
        assert_eq!(sets_of(&sets, &index, &tree), vec![vec!["a", "b"]]);
    }

    #[test]
    fn two_of_three_vote_produces_three_pairs() {
        let mut tree = FaultTree::new("t");
        tree.add_basic_event("a", None).unwrap();
        tree.add_basic_event("b", None).unwrap();
        tree.add_basic_event("c", None).unwrap();
        tree.add_gate("top", GateKind::KOfN { k: 2 }, &["a", "b", "c"]).unwrap();
        tree.declare_top_event("top").unwrap();
        seal(&mut tree, false).unwrap();

        let index = BasicEventIndex::build(&tree);
        let cfg = AnalysisConfig::default();
        let sets = generate(&tree, &cfg, &index, &CancellationToken::new()).unwrap();
        assert_eq!(
            sets_of(&sets, &index, &tree),
            vec![vec!["a", "b"], vec!["a", "c"], vec!["b", "c"]]
        );
    }

    #[test]
    fn non_minimal_supersets_are_removed() {
        // top = OR(a, AND(a, b)): AND(a,b) is dominated by the singleton {a}.
        let mut tree = FaultTree::new("t");
        tree.add_basic_event("a", None).unwrap();
        tree.add_basic_event("b", None).unwrap();
        tree.add_gate("inner", GateKind::And, &["a", "b"]).unwrap();
        tree.add_gate("top", GateKind::Or, &["a", "inner"]).unwrap();
        tree.declare_top_event("top").unwrap();
        seal(&mut tree, false).unwrap();

        let index = BasicEventIndex::build(&tree);
        let cfg = AnalysisConfig::default();
        let sets = generate(&tree, &cfg, &index, &CancellationToken::new()).unwrap();
        assert_eq!(sets_of(&sets, &index, &tree), vec![vec!["a"]]);
    }

    #[test]
    fn house_event_true_drops_its_term() {
        let mut tree = FaultTree::new("t");
        tree.add_basic_event("a", None).unwrap();
        tree.add_house_event("always_on", true).unwrap();
        tree.add_gate("top", GateKind::And, &["a", "always_on"]).unwrap();
        tree.declare_top_event("top").unwrap();
        seal(&mut tree, false).unwrap();

        let index = BasicEventIndex::build(&tree);
        let cfg = AnalysisConfig::default();
        let sets = generate(&tree, &cfg, &index, &CancellationToken::new()).unwrap();
        assert_eq!(sets_of(&sets, &index, &tree), vec![vec!["a"]]);
    }

    #[test]
    fn house_event_false_kills_the_whole_branch() {
        let mut tree = FaultTree::new("t");
        tree.add_basic_event("a", None).unwrap();
        tree.add_house_event("never_on", false).unwrap();
        tree.add_gate("top", GateKind::And, &["a", "never_on"]).unwrap();
        tree.declare_top_event("top").unwrap();
        seal(&mut tree, false).unwrap();

        let index = BasicEventIndex::build(&tree);
        let cfg = AnalysisConfig::default();
        let sets = generate(&tree, &cfg, &index, &CancellationToken::new()).unwrap();
        assert!(sets.is_empty());
    }

    #[test]
    fn not_of_and_pushes_down_via_de_morgan() {
        // top = NOT(AND(a,b)) = OR(NOT a, NOT b): no positive-only cut set
        // exists since every resolved branch needs a negative term, so the
        // minimal-cut-set (all-positive) view of this tree is empty.
        let mut tree = FaultTree::new("t");
        tree.add_basic_event("a", None).unwrap();
        tree.add_basic_event("b", None).unwrap();
        tree.add_gate("inner", GateKind::And, &["a", "b"]).unwrap();
        tree.add_gate("top", GateKind::Not, &["inner"]).unwrap();
        tree.declare_top_event("top").unwrap();
        seal(&mut tree, false).unwrap();

        let index = BasicEventIndex::build(&tree);
        let cfg = AnalysisConfig::default();
        let sets = generate(&tree, &cfg, &index, &CancellationToken::new()).unwrap();
        assert!(sets.is_empty());
    }

    #[test]
    fn limit_order_prunes_large_cut_sets() {
        let mut tree = FaultTree::new("t");
        let ids = ["a", "b", "c", "d"];
        for id in ids {
            tree.add_basic_event(id, None).unwrap();
        }
        tree.add_gate("top", GateKind::And, &ids).unwrap();
        tree.declare_top_event("top").unwrap();
        seal(&mut tree, false).unwrap();

        let index = BasicEventIndex::build(&tree);
        let mut cfg = AnalysisConfig::default();
        cfg.limit_order = 3;
        let sets = generate(&tree, &cfg, &index, &CancellationToken::new()).unwrap();
        assert!(sets.is_empty(), "the only candidate has order 4 and should be pruned");
    }
}
