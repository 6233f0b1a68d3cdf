//! Analysis configuration (spec section 6).
//!
//! A plain serde struct with documented defaults, the same shape as the
//! teacher's `FTAConfig`/`SafetyConfig` in `safety/mod.rs`. Unlike those,
//! this one is read by the algorithm, not just carried around for display.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Maximum cut-set size; supersets larger than this are pruned during
    /// MCS expansion (AND-only growth makes this safe).
    pub limit_order: usize,

    /// Discard cut sets with computed probability below this threshold.
    pub cut_off: f64,

    /// Inclusion-exclusion truncation: at most this many terms (by order)
    /// are summed.
    pub n_sums: u64,

    /// When true, compute only the first-order (rare-event) sum.
    pub rare_event: bool,

    /// Number of Monte Carlo simulations; zero disables MC entirely.
    pub n_simulations: u64,

    /// Master seed for the Monte Carlo driver's RNG.
    pub seed: u64,

    /// Whether to compute Fussell-Vesely importance per basic event.
    pub compute_importance: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            limit_order: 20,
            cut_off: 0.0,
            n_sums: 1_000_000,
            rare_event: false,
            n_simulations: 0,
            seed: 0,
            compute_importance: true,
        }
    }
}

/// Errors raised while assembling a layered configuration (file + env).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl AnalysisConfig {
    /// Build a config by layering an optional TOML file under the builtin
    /// defaults, then overlaying `FTA_`-prefixed environment variables
    /// (e.g. `FTA_LIMIT_ORDER=15`).
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let defaults = AnalysisConfig::default();
        let mut builder = config::Config::builder().add_source(
            config::Config::try_from(&defaults).map_err(ConfigError::Load)?,
        );

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path).required(false).format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(config::Environment::with_prefix("FTA"));

        let built = builder.build().map_err(ConfigError::Load)?;
        built.try_deserialize().map_err(ConfigError::Load)
    }
}
