//! Event and gate model, and the fault tree that owns them (component C2,
//! spec section 4.2, data model section 3).
//!
//! Events are arena-indexed rather than held behind shared owning pointers
//! with weak parent back-references, per the teacher's own design notes
//! (spec section 9): a fault tree is a `Vec<Node>` plus a
//! normalized-identifier index, and every reference after the first is a
//! plain [`NodeId`]. This makes acyclicity provable by DFS coloring over
//! indices (done in `validate.rs`) instead of by pointer bookkeeping.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::expr::{ExprId, ExpressionGraph};
use crate::validate::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateKind {
    And,
    Or,
    Not,
    Xor,
    Nand,
    Nor,
    /// K-out-of-N: `k` must satisfy `2 <= n` and `k <= n`, `n` is the
    /// gate's child count.
    KOfN { k: u32 },
    /// Passes its single child through unchanged.
    Null,
    /// Alias for K-out-of-N with `k` fixed and `n` given by child count,
    /// matching the legacy `ATLEAST(k)` naming from the source model.
    AtLeast { k: u32 },
}

impl GateKind {
    /// Minimum children required by this gate kind, independent of `n`.
    pub fn min_children(&self) -> usize {
        match self {
            GateKind::Not | GateKind::Null => 1,
            GateKind::And | GateKind::Or | GateKind::Nand | GateKind::Nor => 1,
            GateKind::Xor => 2,
            GateKind::KOfN { .. } | GateKind::AtLeast { .. } => 2,
        }
    }

    /// Exact children count required, if the kind demands one.
    pub fn exact_children(&self) -> Option<usize> {
        match self {
            GateKind::Not | GateKind::Null => Some(1),
            GateKind::Xor => Some(2),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GateNode {
    pub id: NodeId,
    pub normalized_id: String,
    pub original_id: String,
    pub kind: GateKind,
    /// Declared children, in declaration order; normalized identifiers.
    /// Duplicate-free (enforced by `add_child`).
    pub children: Vec<String>,
    /// Populated during `seal()`; every gate that lists this gate as a
    /// child, keyed by that parent's normalized identifier.
    pub parents: BTreeMap<String, NodeId>,
}

#[derive(Debug, Clone)]
pub struct BasicEventNode {
    pub id: NodeId,
    pub normalized_id: String,
    pub original_id: String,
    pub expression: Option<ExprId>,
    pub parents: BTreeMap<String, NodeId>,
}

#[derive(Debug, Clone)]
pub struct HouseEventNode {
    pub id: NodeId,
    pub normalized_id: String,
    pub original_id: String,
    pub state: bool,
    pub parents: BTreeMap<String, NodeId>,
}

#[derive(Debug, Clone)]
pub enum Node {
    Gate(GateNode),
    Basic(BasicEventNode),
    House(HouseEventNode),
}

impl Node {
    pub fn id(&self) -> NodeId {
        match self {
            Node::Gate(g) => g.id,
            Node::Basic(b) => b.id,
            Node::House(h) => h.id,
        }
    }

    pub fn normalized_id(&self) -> &str {
        match self {
            Node::Gate(g) => &g.normalized_id,
            Node::Basic(b) => &b.normalized_id,
            Node::House(h) => &h.normalized_id,
        }
    }

    pub fn original_id(&self) -> &str {
        match self {
            Node::Gate(g) => &g.original_id,
            Node::Basic(b) => &b.original_id,
            Node::House(h) => &h.original_id,
        }
    }

    pub fn parents(&self) -> &BTreeMap<String, NodeId> {
        match self {
            Node::Gate(g) => &g.parents,
            Node::Basic(b) => &b.parents,
            Node::House(h) => &h.parents,
        }
    }

    fn parents_mut(&mut self) -> &mut BTreeMap<String, NodeId> {
        match self {
            Node::Gate(g) => &mut g.parents,
            Node::Basic(b) => &mut b.parents,
            Node::House(h) => &mut h.parents,
        }
    }

    pub fn is_gate(&self) -> bool {
        matches!(self, Node::Gate(_))
    }
}

/// A fault tree under construction, or sealed for analysis. Built by a
/// parser (out of scope here — see `SPEC_FULL.md`), sealed by
/// `validate::seal`, read-only thereafter.
#[derive(Debug, Clone)]
pub struct FaultTree {
    pub name: String,
    nodes: Vec<Node>,
    id_index: BTreeMap<String, NodeId>,
    top: Option<NodeId>,
    pub expressions: ExpressionGraph,
    /// Gates reachable from the top event, discovered during `seal()`.
    /// Empty before sealing.
    pub inter_events: std::collections::BTreeSet<NodeId>,
    /// Subset of `inter_events` the caller did not pre-register via
    /// `add_gate` before it was first reached as a child.
    pub implicit_gates: std::collections::BTreeSet<NodeId>,
    pub sealed: bool,
}

fn normalize(id: &str) -> String {
    id.trim().to_lowercase()
}

impl FaultTree {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            id_index: BTreeMap::new(),
            top: None,
            expressions: ExpressionGraph::new(),
            inter_events: Default::default(),
            implicit_gates: Default::default(),
            sealed: false,
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn find(&self, original_or_any_case_id: &str) -> Option<NodeId> {
        self.id_index.get(&normalize(original_or_any_case_id)).copied()
    }

    pub fn top(&self) -> Option<NodeId> {
        self.top
    }

    pub fn declare_top_event(&mut self, id: &str) -> Result<(), ValidationError> {
        let node_id = self
            .find(id)
            .ok_or_else(|| ValidationError::UndefinedIdentifier {
                id: id.to_string(),
                tree: self.name.clone(),
            })?;
        if !self.node(node_id).is_gate() {
            return Err(ValidationError::TopEventNotAGate { id: id.to_string() });
        }
        self.top = Some(node_id);
        Ok(())
    }

    fn reserve_id(&mut self, id: &str) -> Result<NodeId, ValidationError> {
        let normalized = normalize(id);
        if self.id_index.contains_key(&normalized) {
            return Err(ValidationError::DuplicateDefinition { id: id.to_string() });
        }
        let node_id = NodeId(self.nodes.len() as u32);
        self.id_index.insert(normalized, node_id);
        Ok(node_id)
    }

    pub fn add_gate(
        &mut self,
        id: &str,
        kind: GateKind,
        child_ids: &[&str],
    ) -> Result<NodeId, ValidationError> {
        self.insert_gate(id, kind, child_ids, true)
    }

    /// Like [`FaultTree::add_gate`], but does not register the gate into
    /// `inter_events` immediately. Models a parser that encountered a gate
    /// defined inline (e.g. as an unnamed sub-formula) rather than as a
    /// standalone top-level declaration; `seal()`'s DFS will discover it and
    /// record it as an implicit gate (spec section 4.3, step 2).
    pub fn add_gate_pending(
        &mut self,
        id: &str,
        kind: GateKind,
        child_ids: &[&str],
    ) -> Result<NodeId, ValidationError> {
        self.insert_gate(id, kind, child_ids, false)
    }

    fn insert_gate(
        &mut self,
        id: &str,
        kind: GateKind,
        child_ids: &[&str],
        register: bool,
    ) -> Result<NodeId, ValidationError> {
        let node_id = self.reserve_id(id)?;
        self.nodes.push(Node::Gate(GateNode {
            id: node_id,
            normalized_id: normalize(id),
            original_id: id.to_string(),
            kind,
            children: Vec::new(),
            parents: BTreeMap::new(),
        }));
        if register {
            self.inter_events.insert(node_id);
        }
        for child in child_ids {
            self.add_child(id, child)?;
        }
        Ok(node_id)
    }

    /// Attach `child_id` to `gate_id`. The child need not exist yet — it is
    /// resolved against the identifier index during `seal()`, which is how
    /// forward references and dangling identifiers are told apart (spec
    /// section 4.3, completeness check).
    pub fn add_child(&mut self, gate_id: &str, child_id: &str) -> Result<(), ValidationError> {
        let normalized_gate = normalize(gate_id);
        let gate_node_id = *self
            .id_index
            .get(&normalized_gate)
            .ok_or_else(|| ValidationError::UndefinedIdentifier {
                id: gate_id.to_string(),
                tree: self.name.clone(),
            })?;
        let normalized_child = normalize(child_id);
        match &mut self.nodes[gate_node_id.0 as usize] {
            Node::Gate(g) => {
                if g.children.iter().any(|c| *c == normalized_child) {
                    return Err(ValidationError::DuplicateChild {
                        gate: gate_id.to_string(),
                        child: child_id.to_string(),
                    });
                }
                g.children.push(normalized_child);
                Ok(())
            }
            _ => Err(ValidationError::NotAGate { id: gate_id.to_string() }),
        }
    }

    pub fn add_basic_event(
        &mut self,
        id: &str,
        expression: Option<ExprId>,
    ) -> Result<NodeId, ValidationError> {
        let node_id = self.reserve_id(id)?;
        self.nodes.push(Node::Basic(BasicEventNode {
            id: node_id,
            normalized_id: normalize(id),
            original_id: id.to_string(),
            expression,
            parents: BTreeMap::new(),
        }));
        Ok(node_id)
    }

    pub fn add_house_event(&mut self, id: &str, state: bool) -> Result<NodeId, ValidationError> {
        let node_id = self.reserve_id(id)?;
        self.nodes.push(Node::House(HouseEventNode {
            id: node_id,
            normalized_id: normalize(id),
            original_id: id.to_string(),
            state,
            parents: BTreeMap::new(),
        }));
        Ok(node_id)
    }

    /// Record a gate discovered via DFS that was not pre-registered into
    /// `inter_events` (i.e. it was built with `add_gate_pending`) — an
    /// "implicit gate" (spec section 3, 4.3 point 2).
    pub(crate) fn mark_implicit(&mut self, id: NodeId) {
        self.implicit_gates.insert(id);
        self.inter_events.insert(id);
    }

    pub(crate) fn record_parent(&mut self, child: NodeId, parent: NodeId) {
        let parent_key = self.node(parent).normalized_id().to_string();
        self.nodes[child.0 as usize].parents_mut().insert(parent_key, parent);
    }

    pub fn resolve_child(&self, normalized_child_id: &str) -> Option<NodeId> {
        self.id_index.get(normalized_child_id).copied()
    }

    /// Mutable access to every node's parent map, for `validate::seal` to
    /// clear before recomputing it from scratch.
    pub(crate) fn nodes_mut_parents_reset(&mut self) -> impl Iterator<Item = &mut BTreeMap<String, NodeId>> {
        self.nodes.iter_mut().map(|n| n.parents_mut())
    }

    pub fn gate(&self, id: NodeId) -> Option<&GateNode> {
        match self.node(id) {
            Node::Gate(g) => Some(g),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_normalized_case_insensitively() {
        let mut tree = FaultTree::new("t");
        tree.add_basic_event("Pump-A", None).unwrap();
        assert_eq!(tree.find("pump-a"), tree.find("PUMP-A"));
        assert_eq!(tree.node(tree.find("pump-a").unwrap()).original_id(), "Pump-A");
    }

    #[test]
    fn add_gate_rejects_duplicate_children() {
        let mut tree = FaultTree::new("t");
        tree.add_basic_event("a", None).unwrap();
        let err = tree.add_gate("g1", GateKind::Or, &["a", "a"]).unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateChild { .. }));
    }

    #[test]
    fn duplicate_identifier_is_rejected() {
        let mut tree = FaultTree::new("t");
        tree.add_basic_event("a", None).unwrap();
        let err = tree.add_basic_event("a", None).unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateDefinition { .. }));
    }

    #[test]
    fn declare_top_event_requires_a_gate() {
        let mut tree = FaultTree::new("t");
        tree.add_basic_event("a", None).unwrap();
        let err = tree.declare_top_event("a").unwrap_err();
        assert!(matches!(err, ValidationError::TopEventNotAGate { .. }));
    }
}
