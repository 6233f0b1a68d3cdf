//! Expression graph (component C1, spec section 4.1).
//!
//! A DAG of numeric expression nodes, arena-indexed (same indexing idiom as
//! `model.rs`, per the teacher's own design-notes recommendation to hold
//! shared structures in an arena and refer to them by handle rather than by
//! owning pointer). Every node answers four pure queries — `mean`, `min`,
//! `max`, `sample` — plus `validate`. Basic events hold a non-owning
//! [`ExprId`] into the graph; the graph itself is owned by the
//! [`crate::model::FaultTree`].
//!
//! The four expression kinds named by the specification (`Exponential`,
//! `Glm`, `Weibull`, the two `PeriodicTest` flavors) are fully deterministic
//! given their parameters. Since the Monte-Carlo driver (C6) needs an actual
//! point of stochastic variation to sample from, this graph additionally
//! carries `Uniform` and `LogNormal` leaf kinds — the two distributions a
//! basic-event failure rate is conventionally given as in probabilistic risk
//! assessment models — so that `sample` has something non-degenerate to
//! draw. `Const`/`Param`/`Add`/`Mul` round out the arithmetic needed to wire
//! those into the four named formulas.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Handle into an [`ExpressionGraph`]. Never dereferenced directly; always
/// resolved through the graph that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExprId(pub u32);

#[derive(Debug, thiserror::Error, PartialEq, Clone)]
pub enum DomainError {
    #[error("negative rate parameter: {0}")]
    NegativeRate(f64),

    #[error("negative time parameter: {0}")]
    NegativeTime(f64),

    #[error("weibull shape parameter beta must be > 0, got {0}")]
    NonPositiveShape(f64),

    #[error("weibull scale parameter alpha must be > 0, got {0}")]
    NonPositiveScale(f64),

    #[error("time {t} is before characteristic life t0 {t0}")]
    TimeBeforeT0 { t: f64, t0: f64 },

    #[error("GLM denominator (lambda + mu) is zero")]
    GlmZeroDenominator,

    #[error("GLM gamma must be in [0, 1], got {0}")]
    GlmGammaOutOfRange(f64),

    #[error("periodic-test interval tau must be > 0, got {0}")]
    NonPositiveInterval(f64),

    #[error("periodic-test downtime theta must be in [0, tau], got theta={theta} tau={tau}")]
    ThetaOutOfRange { theta: f64, tau: f64 },

    #[error("periodic-test finite-repair-rate mu must be > 0, got {0}")]
    NonPositiveRepairRate(f64),

    #[error("uniform distribution requires low <= high, got low={low} high={high}")]
    UniformBoundsReversed { low: f64, high: f64 },

    #[error("lognormal median must be > 0, got {0}")]
    NonPositiveMedian(f64),

    #[error("lognormal error factor must be > 1, got {0}")]
    InvalidErrorFactor(f64),

    #[error("unknown parameter reference: {0}")]
    UnknownParam(String),

    #[error("expression node {0:?} does not exist in this graph")]
    UnknownNode(ExprId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    Const(f64),
    Param(String),
    Uniform { low: ExprId, high: ExprId },
    LogNormal { median: ExprId, error_factor: ExprId },
    Exponential { lambda: ExprId, time: ExprId },
    Glm { gamma: ExprId, lambda: ExprId, mu: ExprId, time: ExprId },
    Weibull { alpha: ExprId, beta: ExprId, t0: ExprId, time: ExprId },
    /// Periodic test, instantaneous-repair flavor: `(lambda, tau, theta, time)`.
    PeriodicTest4 { lambda: ExprId, tau: ExprId, theta: ExprId, time: ExprId },
    /// Periodic test, finite-repair-rate flavor: `(lambda, tau, theta, mu, time)`.
    PeriodicTest5 { lambda: ExprId, tau: ExprId, theta: ExprId, mu: ExprId, time: ExprId },
    Add(ExprId, ExprId),
    Mul(ExprId, ExprId),
}

/// Arena owning every expression node built for a fault tree. Sampling is
/// single-threaded per analysis run; the graph caches sampled values for a
/// node against the "sample epoch" supplied by the caller (C6 advances the
/// epoch once per Monte Carlo iteration) so a node sampled twice within the
/// same epoch returns the same draw.
#[derive(Debug, Clone, Default)]
pub struct ExpressionGraph {
    nodes: Vec<ExprKind>,
    params: HashMap<String, f64>,
    sample_cache: std::cell::RefCell<HashMap<(ExprId, u64), f64>>,
}

impl ExpressionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: ExprKind) -> ExprId {
        self.nodes.push(kind);
        ExprId((self.nodes.len() - 1) as u32)
    }

    pub fn set_param(&mut self, name: impl Into<String>, value: f64) {
        self.params.insert(name.into(), value);
    }

    fn node(&self, id: ExprId) -> Result<&ExprKind, DomainError> {
        self.nodes.get(id.0 as usize).ok_or(DomainError::UnknownNode(id))
    }

    pub fn mean(&self, id: ExprId) -> Result<f64, DomainError> {
        use ExprKind::*;
        Ok(match self.node(id)?.clone() {
            Const(v) => v,
            Param(name) => self.param(&name)?,
            Uniform { low, high } => (self.mean(low)? + self.mean(high)?) / 2.0,
            LogNormal { median, error_factor } => {
                let (m, ef) = (self.mean(median)?, self.mean(error_factor)?);
                let sigma = lognormal_sigma(ef);
                m * (sigma * sigma / 2.0).exp()
            }
            Exponential { lambda, time } => {
                exponential_cdf(self.mean(lambda)?, self.mean(time)?)
            }
            Glm { gamma, lambda, mu, time } => {
                glm(self.mean(gamma)?, self.mean(lambda)?, self.mean(mu)?, self.mean(time)?)
            }
            Weibull { alpha, beta, t0, time } => weibull_cdf(
                self.mean(alpha)?,
                self.mean(beta)?,
                self.mean(t0)?,
                self.mean(time)?,
            ),
            PeriodicTest4 { lambda, tau, theta, time } => periodic_test_instantaneous(
                self.mean(lambda)?,
                self.mean(tau)?,
                self.mean(theta)?,
                self.mean(time)?,
            ),
            PeriodicTest5 { lambda, tau, theta, mu, time } => periodic_test_finite_repair(
                self.mean(lambda)?,
                self.mean(tau)?,
                self.mean(theta)?,
                self.mean(mu)?,
                self.mean(time)?,
            ),
            Add(a, b) => self.mean(a)? + self.mean(b)?,
            Mul(a, b) => self.mean(a)? * self.mean(b)?,
        })
    }

    pub fn min(&self, id: ExprId) -> Result<f64, DomainError> {
        use ExprKind::*;
        Ok(match self.node(id)?.clone() {
            Const(v) => v,
            Param(name) => self.param(&name)?,
            Uniform { low, .. } => self.min(low)?,
            // Lognormal is unbounded above and below zero; 0 is a safe,
            // loose lower bound (see GLM's min/max note).
            LogNormal { .. } => 0.0,
            Exponential { lambda, time } => exponential_cdf(self.min(lambda)?, self.min(time)?),
            // GLM min/max are stubbed to {0, 1}: conservative but loose,
            // per the open question this carries forward unresolved from
            // the source model. Tightening is possible but not required.
            Glm { .. } => 0.0,
            Weibull { alpha, beta, t0, time } => weibull_cdf(
                self.max(alpha)?,
                self.min(beta)?,
                self.max(t0)?,
                self.min(time)?,
            ),
            PeriodicTest4 { lambda, tau, theta, time } => periodic_test_instantaneous(
                self.min(lambda)?,
                self.min(tau)?,
                self.min(theta)?,
                self.min(time)?,
            ),
            PeriodicTest5 { lambda, tau, theta, mu, time } => periodic_test_finite_repair(
                self.min(lambda)?,
                self.min(tau)?,
                self.min(theta)?,
                self.max(mu)?,
                self.min(time)?,
            ),
            Add(a, b) => self.min(a)? + self.min(b)?,
            Mul(a, b) => self.min(a)? * self.min(b)?,
        })
    }

    pub fn max(&self, id: ExprId) -> Result<f64, DomainError> {
        use ExprKind::*;
        Ok(match self.node(id)?.clone() {
            Const(v) => v,
            Param(name) => self.param(&name)?,
            Uniform { high, .. } => self.max(high)?,
            LogNormal { median, error_factor } => {
                let (m, ef) = (self.max(median)?, self.max(error_factor)?);
                m * ef.powi(3)
            }
            Exponential { lambda, time } => exponential_cdf(self.max(lambda)?, self.max(time)?),
            Glm { .. } => 1.0,
            Weibull { alpha, beta, t0, time } => weibull_cdf(
                self.min(alpha)?,
                self.max(beta)?,
                self.min(t0)?,
                self.max(time)?,
            ),
            PeriodicTest4 { lambda, tau, theta, time } => periodic_test_instantaneous(
                self.max(lambda)?,
                self.max(tau)?,
                self.max(theta)?,
                self.max(time)?,
            ),
            PeriodicTest5 { lambda, tau, theta, mu, time } => periodic_test_finite_repair(
                self.max(lambda)?,
                self.max(tau)?,
                self.max(theta)?,
                self.min(mu)?,
                self.max(time)?,
            ),
            Add(a, b) => self.max(a)? + self.max(b)?,
            Mul(a, b) => self.max(a)? * self.max(b)?,
        })
    }

    /// Draw a value consistent with the node's distribution. `epoch`
    /// identifies the sampling round (C6 advances it once per Monte Carlo
    /// iteration); repeated samples of the same node within one epoch are
    /// memoized so that a basic event referenced by several gates draws the
    /// same value throughout a single iteration.
    pub fn sample(
        &self,
        id: ExprId,
        rng: &mut impl Rng,
        epoch: u64,
    ) -> Result<f64, DomainError> {
        if let Some(v) = self.sample_cache.borrow().get(&(id, epoch)) {
            return Ok(*v);
        }
        let value = self.sample_uncached(id, rng, epoch)?;
        self.sample_cache.borrow_mut().insert((id, epoch), value);
        Ok(value)
    }

    fn sample_uncached(
        &self,
        id: ExprId,
        rng: &mut impl Rng,
        epoch: u64,
    ) -> Result<f64, DomainError> {
        use ExprKind::*;
        Ok(match self.node(id)?.clone() {
            Const(v) => v,
            Param(name) => self.param(&name)?,
            Uniform { low, high } => {
                let (lo, hi) = (self.sample(low, rng, epoch)?, self.sample(high, rng, epoch)?);
                if lo >= hi {
                    lo
                } else {
                    rng.gen_range(lo..hi)
                }
            }
            LogNormal { median, error_factor } => {
                let (m, ef) = (
                    self.sample(median, rng, epoch)?,
                    self.sample(error_factor, rng, epoch)?,
                );
                let sigma = lognormal_sigma(ef);
                let z = standard_normal(rng);
                (m.ln() + sigma * z).exp()
            }
            Exponential { lambda, time } => {
                let l = self.sample(lambda, rng, epoch)?.max(0.0);
                let t = self.sample(time, rng, epoch)?.max(0.0);
                exponential_cdf(l, t)
            }
            Glm { gamma, lambda, mu, time } => {
                let g = self.sample(gamma, rng, epoch)?.clamp(0.0, 1.0);
                let l = self.sample(lambda, rng, epoch)?.max(0.0);
                let m = self.sample(mu, rng, epoch)?.max(0.0);
                let t = self.sample(time, rng, epoch)?.max(0.0);
                glm(g, l, m, t)
            }
            Weibull { alpha, beta, t0, time } => {
                let a = self.sample(alpha, rng, epoch)?.max(f64::MIN_POSITIVE);
                let b = self.sample(beta, rng, epoch)?.max(f64::MIN_POSITIVE);
                let t0v = self.sample(t0, rng, epoch)?;
                let t = self.sample(time, rng, epoch)?.max(t0v);
                weibull_cdf(a, b, t0v, t)
            }
            PeriodicTest4 { lambda, tau, theta, time } => periodic_test_instantaneous(
                self.sample(lambda, rng, epoch)?.max(0.0),
                self.sample(tau, rng, epoch)?.max(f64::MIN_POSITIVE),
                self.sample(theta, rng, epoch)?.max(0.0),
                self.sample(time, rng, epoch)?.max(0.0),
            ),
            PeriodicTest5 { lambda, tau, theta, mu, time } => periodic_test_finite_repair(
                self.sample(lambda, rng, epoch)?.max(0.0),
                self.sample(tau, rng, epoch)?.max(f64::MIN_POSITIVE),
                self.sample(theta, rng, epoch)?.max(0.0),
                self.sample(mu, rng, epoch)?.max(f64::MIN_POSITIVE),
                self.sample(time, rng, epoch)?.max(0.0),
            ),
            Add(a, b) => self.sample(a, rng, epoch)? + self.sample(b, rng, epoch)?,
            Mul(a, b) => self.sample(a, rng, epoch)? * self.sample(b, rng, epoch)?,
        })
    }

    /// Domain checks on parameter ranges. Numerical underflow/overflow
    /// inside the formulas themselves is not a domain error (it collapses
    /// to 0 or 1, per spec); this only catches parameters that are
    /// mathematically out of range.
    pub fn validate(&self, id: ExprId) -> Result<(), DomainError> {
        use ExprKind::*;
        match self.node(id)?.clone() {
            Const(_) | Param(_) => {}
            Uniform { low, high } => {
                self.validate(low)?;
                self.validate(high)?;
                let (lo, hi) = (self.mean(low)?, self.mean(high)?);
                if lo > hi {
                    return Err(DomainError::UniformBoundsReversed { low: lo, high: hi });
                }
            }
            LogNormal { median, error_factor } => {
                self.validate(median)?;
                self.validate(error_factor)?;
                let m = self.mean(median)?;
                let ef = self.mean(error_factor)?;
                if m <= 0.0 {
                    return Err(DomainError::NonPositiveMedian(m));
                }
                if ef <= 1.0 {
                    return Err(DomainError::InvalidErrorFactor(ef));
                }
            }
            Exponential { lambda, time } => {
                self.validate(lambda)?;
                self.validate(time)?;
                let l = self.mean(lambda)?;
                let t = self.mean(time)?;
                if l < 0.0 {
                    return Err(DomainError::NegativeRate(l));
                }
                if t < 0.0 {
                    return Err(DomainError::NegativeTime(t));
                }
            }
            Glm { gamma, lambda, mu, time } => {
                self.validate(gamma)?;
                self.validate(lambda)?;
                self.validate(mu)?;
                self.validate(time)?;
                let g = self.mean(gamma)?;
                let l = self.mean(lambda)?;
                let m = self.mean(mu)?;
                let t = self.mean(time)?;
                if !(0.0..=1.0).contains(&g) {
                    return Err(DomainError::GlmGammaOutOfRange(g));
                }
                if l < 0.0 {
                    return Err(DomainError::NegativeRate(l));
                }
                if m < 0.0 {
                    return Err(DomainError::NegativeRate(m));
                }
                if t < 0.0 {
                    return Err(DomainError::NegativeTime(t));
                }
                if l + m == 0.0 {
                    return Err(DomainError::GlmZeroDenominator);
                }
            }
            Weibull { alpha, beta, t0, time } => {
                self.validate(alpha)?;
                self.validate(beta)?;
                self.validate(t0)?;
                self.validate(time)?;
                let a = self.mean(alpha)?;
                let b = self.mean(beta)?;
                let t0v = self.mean(t0)?;
                let t = self.mean(time)?;
                if a <= 0.0 {
                    return Err(DomainError::NonPositiveScale(a));
                }
                if b <= 0.0 {
                    return Err(DomainError::NonPositiveShape(b));
                }
                if t < t0v {
                    return Err(DomainError::TimeBeforeT0 { t, t0: t0v });
                }
            }
            PeriodicTest4 { lambda, tau, theta, time } => {
                self.validate(lambda)?;
                self.validate(tau)?;
                self.validate(theta)?;
                self.validate(time)?;
                validate_periodic_params(
                    self.mean(lambda)?,
                    self.mean(tau)?,
                    self.mean(theta)?,
                    self.mean(time)?,
                )?;
            }
            PeriodicTest5 { lambda, tau, theta, mu, time } => {
                self.validate(lambda)?;
                self.validate(tau)?;
                self.validate(theta)?;
                self.validate(mu)?;
                self.validate(time)?;
                validate_periodic_params(
                    self.mean(lambda)?,
                    self.mean(tau)?,
                    self.mean(theta)?,
                    self.mean(time)?,
                )?;
                let m = self.mean(mu)?;
                if m <= 0.0 {
                    return Err(DomainError::NonPositiveRepairRate(m));
                }
            }
            Add(a, b) | Mul(a, b) => {
                self.validate(a)?;
                self.validate(b)?;
            }
        }
        Ok(())
    }

    fn param(&self, name: &str) -> Result<f64, DomainError> {
        self.params
            .get(name)
            .copied()
            .ok_or_else(|| DomainError::UnknownParam(name.to_string()))
    }
}

fn validate_periodic_params(lambda: f64, tau: f64, theta: f64, time: f64) -> Result<(), DomainError> {
    let _ = time;
    if lambda < 0.0 {
        return Err(DomainError::NegativeRate(lambda));
    }
    if tau <= 0.0 {
        return Err(DomainError::NonPositiveInterval(tau));
    }
    if theta < 0.0 || theta > tau {
        return Err(DomainError::ThetaOutOfRange { theta, tau });
    }
    Ok(())
}

fn lognormal_sigma(error_factor: f64) -> f64 {
    // 1.645 = z-score of the 95th percentile: EF is defined as the ratio
    // between the median and the 95% bound in the OpenPSA parameterization.
    error_factor.max(1.0 + f64::EPSILON).ln() / 1.645
}

fn standard_normal(rng: &mut impl Rng) -> f64 {
    // Box-Muller, avoiding an extra distribution dependency.
    let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// `1 - e^(-lambda*t)`. Underflow of the exponent collapses to `1`,
/// overflow collapses to `0`, per spec — `f64::exp`/`ln` already saturate
/// this way so no special casing is needed.
fn exponential_cdf(lambda: f64, time: f64) -> f64 {
    (1.0 - (-lambda * time).exp()).clamp(0.0, 1.0)
}

/// Two-state Markov availability model: transient term plus steady-state
/// unavailability, given an initial failure-on-demand probability `gamma`.
fn glm(gamma: f64, lambda: f64, mu: f64, time: f64) -> f64 {
    let denom = lambda + mu;
    if denom <= 0.0 {
        return gamma.clamp(0.0, 1.0);
    }
    let steady_state = lambda / denom;
    let transient = (gamma - steady_state) * (-denom * time).exp();
    (steady_state + transient).clamp(0.0, 1.0)
}

fn weibull_cdf(alpha: f64, beta: f64, t0: f64, time: f64) -> f64 {
    if time < t0 {
        return 0.0;
    }
    let ratio = (time - t0) / alpha;
    (1.0 - (-ratio.powf(beta)).exp()).clamp(0.0, 1.0)
}

/// Instantaneous-repair periodic test: the component is unavailable for the
/// duration of each test (`theta`), and otherwise accumulates undetected
/// failure probability since the last test concluded.
fn periodic_test_instantaneous(lambda: f64, tau: f64, theta: f64, time: f64) -> f64 {
    let phase = time.rem_euclid(tau);
    if phase < theta {
        1.0
    } else {
        exponential_cdf(lambda, phase - theta)
    }
}

/// Finite-repair-rate periodic test: same standby/test phases as the
/// instantaneous flavor, plus a steady-state repair-queue contribution
/// `lambda / mu` once a failure has been detected.
fn periodic_test_finite_repair(lambda: f64, tau: f64, theta: f64, mu: f64, time: f64) -> f64 {
    let base = periodic_test_instantaneous(lambda, tau, theta, time);
    (base + lambda / mu).clamp(0.0, 1.0)
}
