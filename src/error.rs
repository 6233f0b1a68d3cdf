//! Crate-level error aggregation.
//!
//! Each component owns its own error type (`DomainError` in `expr`,
//! `ValidationError` in `validate`, `McsError` in `mcs`); this module
//! aggregates them at the `Analyzer`/CLI boundary, the same shape as the
//! teacher's `CompilerError` aggregating `Lexer`/`Parser`/`Semantic`/`Io`.

use thiserror::Error;

use crate::config::ConfigError;
use crate::expr::DomainError;
use crate::mcs::McsError;
use crate::probability::ProbabilityError;
use crate::validate::ValidationError;

/// The error kinds from the specification's error-handling design:
/// structural validation failures, expression domain failures, minimal
/// cut set / probability kernel failures, configuration failures, broken
/// internal invariants, and cooperative cancellation.
#[derive(Debug, Error)]
pub enum FaultTreeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Mcs(#[from] McsError),

    #[error(transparent)]
    Probability(#[from] ProbabilityError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A reachable gate had no parent index after `seal()` — should be
    /// unreachable; names the invariant that broke.
    #[error("internal invariant violated: {0}")]
    Logic(String),

    /// Cooperative cancellation took effect; partial results are discarded.
    #[error("analysis cancelled")]
    Cancelled,
}
