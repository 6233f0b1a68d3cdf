//! JSON fault-tree loader.
//!
//! A real MEF/OpenPSA front end parses XML into the model in `model.rs`;
//! that parser is out of scope here (see `SPEC_FULL.md`, section A). This
//! is a thin stand-in so the CLI has something to read: a flat JSON
//! document naming gates, basic events, and house events, with each basic
//! event's probability given directly as one of the expression kinds from
//! `expr.rs` rather than as a nested expression graph.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::expr::ExprKind;
use crate::model::{FaultTree, GateKind};
use crate::validate::ValidationError;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("failed to read '{path}': {source}")]
    Io { path: String, #[source] source: std::io::Error },

    #[error("failed to parse '{path}': {source}")]
    Json { path: String, #[source] source: serde_json::Error },

    #[error(transparent)]
    Model(#[from] ValidationError),
}

#[derive(Debug, Deserialize)]
struct TreeDocument {
    name: String,
    top: String,
    #[serde(default)]
    gates: Vec<GateSpec>,
    #[serde(default)]
    basic_events: Vec<BasicEventSpec>,
    #[serde(default)]
    house_events: Vec<HouseEventSpec>,
}

#[derive(Debug, Deserialize)]
struct GateSpec {
    id: String,
    kind: GateKindSpec,
    #[serde(default)]
    k: Option<u32>,
    children: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum GateKindSpec {
    And,
    Or,
    Not,
    Xor,
    Nand,
    Nor,
    Null,
    KOfN,
    AtLeast,
}

#[derive(Debug, Deserialize)]
struct BasicEventSpec {
    id: String,
    #[serde(default)]
    expression: Option<ExprSpec>,
}

#[derive(Debug, Deserialize)]
struct HouseEventSpec {
    id: String,
    state: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ExprSpec {
    Const { value: f64 },
    Param { name: String },
    Uniform { low: f64, high: f64 },
    LogNormal { median: f64, error_factor: f64 },
    Exponential { lambda: f64, time: f64 },
    Glm { gamma: f64, lambda: f64, mu: f64, time: f64 },
    Weibull { alpha: f64, beta: f64, t0: f64, time: f64 },
    PeriodicTest4 { lambda: f64, tau: f64, theta: f64, time: f64 },
    PeriodicTest5 { lambda: f64, tau: f64, theta: f64, mu: f64, time: f64 },
}

pub fn load_from_path(path: &Path) -> Result<FaultTree, LoaderError> {
    let raw = std::fs::read_to_string(path).map_err(|source| LoaderError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_from_str(&raw, &path.display().to_string())
}

pub fn load_from_str(raw: &str, label: &str) -> Result<FaultTree, LoaderError> {
    let doc: TreeDocument = serde_json::from_str(raw)
        .map_err(|source| LoaderError::Json { path: label.to_string(), source })?;
    build_tree(doc)
}

fn build_tree(doc: TreeDocument) -> Result<FaultTree, LoaderError> {
    let mut tree = FaultTree::new(doc.name);

    for house in &doc.house_events {
        tree.add_house_event(&house.id, house.state)?;
    }

    for basic in &doc.basic_events {
        let expr = basic.expression.as_ref().map(|spec| add_expr(&mut tree, spec));
        tree.add_basic_event(&basic.id, expr)?;
    }

    for gate in &doc.gates {
        let kind = resolve_gate_kind(&gate.kind, gate.k)?;
        let children: Vec<&str> = gate.children.iter().map(String::as_str).collect();
        tree.add_gate(&gate.id, kind, &children)?;
    }

    tree.declare_top_event(&doc.top)?;
    Ok(tree)
}

fn resolve_gate_kind(spec: &GateKindSpec, k: Option<u32>) -> Result<GateKind, LoaderError> {
    Ok(match spec {
        GateKindSpec::And => GateKind::And,
        GateKindSpec::Or => GateKind::Or,
        GateKindSpec::Not => GateKind::Not,
        GateKindSpec::Xor => GateKind::Xor,
        GateKindSpec::Nand => GateKind::Nand,
        GateKindSpec::Nor => GateKind::Nor,
        GateKindSpec::Null => GateKind::Null,
        GateKindSpec::KOfN => GateKind::KOfN { k: k.unwrap_or(1) },
        GateKindSpec::AtLeast => GateKind::AtLeast { k: k.unwrap_or(1) },
    })
}

fn add_expr(tree: &mut FaultTree, spec: &ExprSpec) -> crate::expr::ExprId {
    let g = &mut tree.expressions;
    let c = |g: &mut crate::expr::ExpressionGraph, v: f64| g.add(ExprKind::Const(v));
    match *spec {
        ExprSpec::Const { value } => g.add(ExprKind::Const(value)),
        ExprSpec::Param { ref name } => g.add(ExprKind::Param(name.clone())),
        ExprSpec::Uniform { low, high } => {
            let (low, high) = (c(g, low), c(g, high));
            g.add(ExprKind::Uniform { low, high })
        }
        ExprSpec::LogNormal { median, error_factor } => {
            let (median, error_factor) = (c(g, median), c(g, error_factor));
            g.add(ExprKind::LogNormal { median, error_factor })
        }
        ExprSpec::Exponential { lambda, time } => {
            let (lambda, time) = (c(g, lambda), c(g, time));
            g.add(ExprKind::Exponential { lambda, time })
        }
        ExprSpec::Glm { gamma, lambda, mu, time } => {
            let (gamma, lambda, mu, time) = (c(g, gamma), c(g, lambda), c(g, mu), c(g, time));
            g.add(ExprKind::Glm { gamma, lambda, mu, time })
        }
        ExprSpec::Weibull { alpha, beta, t0, time } => {
            let (alpha, beta, t0, time) = (c(g, alpha), c(g, beta), c(g, t0), c(g, time));
            g.add(ExprKind::Weibull { alpha, beta, t0, time })
        }
        ExprSpec::PeriodicTest4 { lambda, tau, theta, time } => {
            let (lambda, tau, theta, time) = (c(g, lambda), c(g, tau), c(g, theta), c(g, time));
            g.add(ExprKind::PeriodicTest4 { lambda, tau, theta, time })
        }
        ExprSpec::PeriodicTest5 { lambda, tau, theta, mu, time } => {
            let (lambda, tau, theta, mu, time) =
                (c(g, lambda), c(g, tau), c(g, theta), c(g, mu), c(g, time));
            g.add(ExprKind::PeriodicTest5 { lambda, tau, theta, mu, time })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_minimal_or_tree() {
        let json = r#"{
            "name": "demo",
            "top": "TOP",
            "gates": [{"id": "TOP", "kind": "or", "children": ["A", "B"]}],
            "basic_events": [
                {"id": "A", "expression": {"type": "const", "value": 0.01}},
                {"id": "B", "expression": {"type": "exponential", "lambda": 1e-4, "time": 1000.0}}
            ]
        }"#;
        let tree = load_from_str(json, "inline").unwrap();
        assert_eq!(tree.name, "demo");
        assert!(tree.find("TOP").is_some());
        assert!(tree.find("A").is_some());
    }

    #[test]
    fn rejects_malformed_json() {
        let err = load_from_str("not json", "inline").unwrap_err();
        assert!(matches!(err, LoaderError::Json { .. }));
    }

    #[test]
    fn loads_from_a_real_path() {
        use std::io::Write;

        let json = r#"{
            "name": "on_disk",
            "top": "TOP",
            "gates": [{"id": "TOP", "kind": "and", "children": ["A", "B"]}],
            "basic_events": [
                {"id": "A", "expression": {"type": "const", "value": 0.1}},
                {"id": "B", "expression": {"type": "const", "value": 0.2}}
            ]
        }"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let tree = load_from_path(file.path()).unwrap();
        assert_eq!(tree.name, "on_disk");
    }

    #[test]
    fn missing_file_reports_io_error() {
        let err = load_from_path(Path::new("/nonexistent/does-not-exist.json")).unwrap_err();
        assert!(matches!(err, LoaderError::Io { .. }));
    }
}
