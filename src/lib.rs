//! Fault-tree analysis engine: a sealed, arena-indexed fault tree, minimal
//! cut set generation, an exact/rare-event probability kernel, and a Monte
//! Carlo sampler, wired together by [`analysis::analyze`].

pub mod analysis;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod expr;
pub mod mcs;
pub mod model;
pub mod montecarlo;
pub mod probability;
pub mod validate;

pub use analysis::{analyze, AnalysisResult};
pub use config::AnalysisConfig;
pub use error::FaultTreeError;
pub use model::{FaultTree, GateKind};
