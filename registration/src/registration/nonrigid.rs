//! Nonrigid Coherent Point Drift
//!
//! Each iteration solves
//!
//! ```text
//! (diag(p1)·G + λσ²·I) · W = px − diag(p1)·Y
//! ```
//!
//! for the displacement weights `W`, moves the points to `Y + G·W`, and
//! re-estimates the noise variance σ². `G` is the Gaussian affinity of the
//! moving set, built once in [`Transform::init`].
//!
//! The linear solve has two strategies, selected at compile time:
//! - [`Precision`]: column-pivoted Householder QR, robust on near-singular
//!   systems (tiny β, duplicated points)
//! - [`Performance`]: plain Householder QR, faster but assumes a reasonably
//!   conditioned system

use super::affinity::affinity;
use super::gauss::Probabilities;
use super::{RegistrationOptions, RegistrationResult, Transform};
use cpd_core::{ensure_same_dimension, Error, PointSet, Result};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::time::Duration;

/// Default kernel bandwidth.
pub const DEFAULT_BETA: f64 = 3.0;
/// Default regularization strength.
pub const DEFAULT_LAMBDA: f64 = 3.0;
/// Default for linked scaling of the two sets during normalization.
pub const DEFAULT_LINKED: bool = true;

/// Linear solve strategy for the regularized system.
pub trait SolverPolicy {
    const NAME: &'static str;

    /// Solve `lhs · W = rhs`. Returns `None` when the decomposition hits an
    /// exactly zero pivot.
    fn solve(lhs: PointSet, rhs: &PointSet) -> Option<PointSet>;
}

/// Column-pivoted QR.
#[derive(Debug, Clone, Copy, Default)]
pub struct Precision;

/// Unpivoted Householder QR.
#[derive(Debug, Clone, Copy, Default)]
pub struct Performance;

impl SolverPolicy for Precision {
    const NAME: &'static str = "precision";

    fn solve(lhs: PointSet, rhs: &PointSet) -> Option<PointSet> {
        lhs.col_piv_qr().solve(rhs)
    }
}

impl SolverPolicy for Performance {
    const NAME: &'static str = "performance";

    fn solve(lhs: PointSet, rhs: &PointSet) -> Option<PointSet> {
        lhs.qr().solve(rhs)
    }
}

/// Which displacement weights the likelihood penalty is evaluated against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegularizationTarget {
    /// Keep the zero weights set by `init`. The penalty always measures the
    /// rest state and therefore contributes nothing to the likelihood.
    #[default]
    RestState,
    /// Store the weights solved by every iteration; the next
    /// `modify_probabilities` call penalizes them.
    LatestWeights,
}

/// Nonrigid transform parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NonrigidConfig {
    /// Gaussian kernel bandwidth (β).
    pub beta: f64,
    /// Smoothness regularization weight (λ).
    pub lambda: f64,
    /// Scale fixed and moving sets together when normalizing.
    pub linked: bool,
    /// Weights penalized by `modify_probabilities`: the rest state or the latest solve.
    pub regularization: RegularizationTarget,
}

impl Default for NonrigidConfig {
    fn default() -> Self {
        Self {
            beta: DEFAULT_BETA,
            lambda: DEFAULT_LAMBDA,
            linked: DEFAULT_LINKED,
            regularization: RegularizationTarget::RestState,
        }
    }
}

impl NonrigidConfig {
    pub fn validate(&self) -> Result<()> {
        check_positive("beta", self.beta)?;
        check_positive("lambda", self.lambda)
    }
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::invalid_config(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}

/// Nonrigid CPD transform with solver strategy `P`.
#[derive(Debug, Clone)]
pub struct Nonrigid<P: SolverPolicy = Precision> {
    config: NonrigidConfig,
    /// Affinity of the moving set, `N x N`.
    g: PointSet,
    /// Displacement weights, `N x D`.
    w: PointSet,
    _policy: PhantomData<P>,
}

/// Nonrigid transform using the faster unpivoted solve.
pub type NonrigidQuick = Nonrigid<Performance>;

impl<P: SolverPolicy> Default for Nonrigid<P> {
    fn default() -> Self {
        Self {
            config: NonrigidConfig::default(),
            g: PointSet::zeros(0, 0),
            w: PointSet::zeros(0, 0),
            _policy: PhantomData,
        }
    }
}

impl<P: SolverPolicy> Nonrigid<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: NonrigidConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Set the kernel bandwidth β. Takes effect at the next `init`.
    pub fn with_beta(mut self, beta: f64) -> Result<Self> {
        check_positive("beta", beta)?;
        self.config.beta = beta;
        Ok(self)
    }

    /// Set the regularization weight λ.
    pub fn with_lambda(mut self, lambda: f64) -> Result<Self> {
        check_positive("lambda", lambda)?;
        self.config.lambda = lambda;
        Ok(self)
    }

    /// Set whether the two sets share one normalization scale.
    pub fn with_linked(mut self, linked: bool) -> Self {
        self.config.linked = linked;
        self
    }

    pub fn with_regularization(mut self, target: RegularizationTarget) -> Self {
        self.config.regularization = target;
        self
    }

    pub fn config(&self) -> &NonrigidConfig {
        &self.config
    }

    pub fn beta(&self) -> f64 {
        self.config.beta
    }

    pub fn lambda(&self) -> f64 {
        self.config.lambda
    }

    pub fn regularization(&self) -> RegularizationTarget {
        self.config.regularization
    }

    /// Affinity matrix built by the last `init`.
    pub fn affinity(&self) -> &PointSet {
        &self.g
    }

    /// Stored displacement weights. Zero after `init`; only updated by
    /// iterations under [`RegularizationTarget::LatestWeights`].
    pub fn weights(&self) -> &PointSet {
        &self.w
    }

    /// Solve the regularized system for the displacement weights.
    pub fn solve_weights(
        &self,
        moving: &PointSet,
        probabilities: &Probabilities,
        sigma2: f64,
    ) -> Result<PointSet> {
        let n = moving.nrows();
        let p1 = &probabilities.p1;

        // diag(p1)·G + λσ²·I
        let mut lhs = self.g.clone();
        for (i, mut row) in lhs.row_iter_mut().enumerate() {
            row *= p1[i];
        }
        let shift = self.config.lambda * sigma2;
        for i in 0..n {
            lhs[(i, i)] += shift;
        }

        // px − diag(p1)·Y
        let mut rhs = probabilities.px.clone();
        for (i, mut row) in rhs.row_iter_mut().enumerate() {
            for (d, value) in row.iter_mut().enumerate() {
                *value -= p1[i] * moving[(i, d)];
            }
        }

        tracing::trace!(strategy = P::NAME, n, dims = moving.ncols(), "solving nonrigid system");

        P::solve(lhs, &rhs).ok_or_else(|| {
            Error::degenerate(format!(
                "regularized {n}x{n} system is singular ({} solver)",
                P::NAME
            ))
        })
    }

    /// `Y + G·W`.
    pub fn apply_weights(&self, moving: &PointSet, w: &PointSet) -> PointSet {
        moving + &self.g * w
    }

    /// Penalty `λ/2 · tr(Wᵀ·G·W)` for the stored weights.
    pub fn regularization_penalty(&self) -> f64 {
        if self.w.is_empty() {
            return 0.0;
        }
        self.config.lambda / 2.0 * self.w.dot(&(&self.g * &self.w))
    }

    fn check_state(&self, moving: &PointSet) -> Result<()> {
        if self.g.nrows() != moving.nrows() || self.w.shape() != moving.shape() {
            if self.g.is_empty() && !moving.is_empty() {
                return Err(Error::not_initialized("nonrigid transform used before init"));
            }
            return Err(Error::dimension_mismatch(format!(
                "transform was initialized for {} points, got {:?}",
                self.g.nrows(),
                moving.shape()
            )));
        }
        Ok(())
    }
}

/// Noise variance re-estimate for updated points `t`:
///
/// `|Σ pt1_i·|x_i|² + Σ p1_j·|t_j|² − 2·tr(pxᵀ·T)| / (Np·D)`
pub fn estimate_sigma2(
    fixed: &PointSet,
    points: &PointSet,
    probabilities: &Probabilities,
) -> Result<f64> {
    let np = probabilities.np();
    if !(np.is_finite() && np > 0.0) {
        return Err(Error::degenerate(format!(
            "total correspondence mass must be positive, got {np}"
        )));
    }
    let cols = fixed.ncols();

    let fixed_term: f64 = fixed
        .row_iter()
        .zip(probabilities.pt1.iter())
        .map(|(row, &w)| row.norm_squared() * w)
        .sum();
    let moving_term: f64 = points
        .row_iter()
        .zip(probabilities.p1.iter())
        .map(|(row, &w)| row.norm_squared() * w)
        .sum();
    let cross = probabilities.px.dot(points);

    Ok((fixed_term + moving_term - 2.0 * cross).abs() / (np * cols as f64))
}

impl<P: SolverPolicy> Transform for Nonrigid<P> {
    fn init(&mut self, _fixed: &PointSet, moving: &PointSet) -> Result<()> {
        tracing::debug!(
            points = moving.nrows(),
            dims = moving.ncols(),
            beta = self.config.beta,
            "initializing nonrigid transform"
        );
        self.g = affinity(moving, moving, self.config.beta)?;
        self.w = PointSet::zeros(moving.nrows(), moving.ncols());
        Ok(())
    }

    fn modify_probabilities(&self, probabilities: &mut Probabilities) {
        probabilities.l += self.regularization_penalty();
    }

    fn compute_one_iteration(
        &mut self,
        fixed: &PointSet,
        moving: &PointSet,
        probabilities: &Probabilities,
        sigma2: f64,
    ) -> Result<RegistrationResult> {
        ensure_same_dimension(fixed, moving)?;
        self.check_state(moving)?;
        probabilities.validate(fixed, moving)?;

        let w = self.solve_weights(moving, probabilities, sigma2)?;
        let points = self.apply_weights(moving, &w);
        let sigma2 = estimate_sigma2(fixed, &points, probabilities)?;

        if self.config.regularization == RegularizationTarget::LatestWeights {
            self.w = w;
        }

        Ok(RegistrationResult {
            points,
            sigma2,
            iterations: 0,
            runtime: Duration::ZERO,
        })
    }

    fn linked(&self) -> bool {
        self.config.linked
    }
}

/// Run a full nonrigid registration with the precision solver and default
/// options.
pub fn nonrigid(fixed: &PointSet, moving: &PointSet) -> Result<RegistrationResult> {
    let mut transform = Nonrigid::<Precision>::new();
    super::run(&mut transform, fixed, moving, &RegistrationOptions::default())
}

/// Run a full nonrigid registration with the performance solver and default
/// options.
pub fn nonrigid_quick(fixed: &PointSet, moving: &PointSet) -> Result<RegistrationResult> {
    let mut transform = NonrigidQuick::new();
    super::run(&mut transform, fixed, moving, &RegistrationOptions::default())
}
