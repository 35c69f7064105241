//! Coherent Point Drift Registration Module
//!
//! Probabilistic point set registration in the CPD family:
//! - Gaussian affinity kernels
//! - Direct Gauss transform (soft correspondences with an outlier term)
//! - Nonrigid transform with precision/performance solver strategies
//! - EM driver shared by every transform kind

pub mod affinity;
pub mod gauss;
pub mod nonrigid;
pub mod normalization;


pub use affinity::affinity;
pub use cpd_core::{Error, PointSet, Result};
pub use gauss::{gauss_transform, Probabilities};
pub use nonrigid::{
    estimate_sigma2, nonrigid, nonrigid_quick, Nonrigid, NonrigidConfig, NonrigidQuick,
    Performance, Precision, RegularizationTarget, SolverPolicy,
};
pub use normalization::Normalization;

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Default cap on EM iterations.
pub const DEFAULT_MAX_ITERATIONS: usize = 150;
/// Default relative likelihood change at which the EM loop stops.
pub const DEFAULT_TOLERANCE: f64 = 1e-5;
/// Default weight of the uniform outlier component.
pub const DEFAULT_OUTLIERS: f64 = 0.1;
/// Initial variance; zero means "derive from the data".
pub const DEFAULT_SIGMA2: f64 = 0.0;
pub const DEFAULT_NORMALIZE: bool = true;

/// Outcome of one registration step or of a full run.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationResult {
    /// Moving points after the transform, same shape as the input moving set.
    pub points: PointSet,
    /// Estimated Gaussian noise variance.
    pub sigma2: f64,
    /// EM iterations performed (zero for a single step).
    pub iterations: usize,
    pub runtime: Duration,
}

impl RegistrationResult {
    /// Map the points back from normalized space into the fixed set's frame.
    pub fn denormalize(&mut self, normalization: &Normalization) {
        self.points = normalization.denormalize_points(&self.points);
    }
}

/// One kind of CPD transform (nonrigid here; rigid and affine plug in the
/// same way).
pub trait Transform {
    /// Prepare per-run state. Must be called before any iteration, and again
    /// whenever the moving point count changes.
    fn init(&mut self, fixed: &PointSet, moving: &PointSet) -> Result<()>;

    /// Add this transform's contribution to the running likelihood.
    fn modify_probabilities(&self, _probabilities: &mut Probabilities) {}

    /// Compute one M-step from the current correspondence aggregates.
    fn compute_one_iteration(
        &mut self,
        fixed: &PointSet,
        moving: &PointSet,
        probabilities: &Probabilities,
        sigma2: f64,
    ) -> Result<RegistrationResult>;

    /// Whether both sets share one normalization scale.
    fn linked(&self) -> bool {
        true
    }
}

/// EM loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationOptions {
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Weight of the uniform outlier component, in `[0, 1)`.
    pub outliers: f64,
    /// Initial variance; `0.0` derives it from the data.
    pub sigma2: f64,
    pub normalize: bool,
}

impl Default for RegistrationOptions {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            outliers: DEFAULT_OUTLIERS,
            sigma2: DEFAULT_SIGMA2,
            normalize: DEFAULT_NORMALIZE,
        }
    }
}

impl RegistrationOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::invalid_config("max_iterations must be at least 1"));
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(Error::invalid_config(format!(
                "tolerance must be non-negative, got {}",
                self.tolerance
            )));
        }
        if !(0.0..1.0).contains(&self.outliers) {
            return Err(Error::invalid_config(format!(
                "outliers must be in [0, 1), got {}",
                self.outliers
            )));
        }
        if !(self.sigma2.is_finite() && self.sigma2 >= 0.0) {
            return Err(Error::invalid_config(format!(
                "sigma2 must be non-negative, got {}",
                self.sigma2
            )));
        }
        Ok(())
    }
}

/// Mean squared distance over all fixed/moving pairs, per dimension.
pub fn default_sigma2(fixed: &PointSet, moving: &PointSet) -> f64 {
    let m = fixed.nrows() as f64;
    let n = moving.nrows() as f64;
    let cols = fixed.ncols();

    let cross: f64 = (0..cols)
        .map(|c| fixed.column(c).sum() * moving.column(c).sum())
        .sum();

    (n * fixed.norm_squared() + m * moving.norm_squared() - 2.0 * cross) / (m * n * cols as f64)
}

/// Register `moving` onto `fixed` with the EM loop.
///
/// Iterates until the relative likelihood change drops below the tolerance,
/// the variance collapses, or `max_iterations` is reached. The returned points
/// are in the fixed set's frame.
pub fn run<T: Transform>(
    transform: &mut T,
    fixed: &PointSet,
    moving: &PointSet,
    options: &RegistrationOptions,
) -> Result<RegistrationResult> {
    let start = Instant::now();
    options.validate()?;
    cpd_core::ensure_same_dimension(fixed, moving)?;
    if fixed.is_empty() || moving.is_empty() {
        return Err(Error::degenerate("registration needs non-empty point sets"));
    }
    cpd_core::ensure_finite("fixed", fixed)?;
    cpd_core::ensure_finite("moving", moving)?;

    let normalization = Normalization::new(fixed, moving, transform.linked())?;
    let (fixed, moving) = if options.normalize {
        (normalization.fixed.clone(), normalization.moving.clone())
    } else {
        (fixed.clone(), moving.clone())
    };

    transform.init(&fixed, &moving)?;

    let sigma2 = if options.sigma2 == 0.0 {
        default_sigma2(&fixed, &moving)
    } else if options.normalize {
        options.sigma2 / normalization.fixed_scale
    } else {
        options.sigma2
    };
    let mut result = RegistrationResult {
        points: moving.clone(),
        sigma2,
        iterations: 0,
        runtime: Duration::ZERO,
    };

    let mut iterations = 0;
    let mut ntol = options.tolerance + 10.0;
    let mut l = 0.0;
    while iterations < options.max_iterations
        && ntol > options.tolerance
        && result.sigma2 > 10.0 * f64::EPSILON
    {
        let mut probabilities =
            gauss_transform(&fixed, &result.points, result.sigma2, options.outliers)?;
        transform.modify_probabilities(&mut probabilities);

        ntol = ((probabilities.l - l) / probabilities.l).abs();
        l = probabilities.l;

        result = transform.compute_one_iteration(&fixed, &moving, &probabilities, result.sigma2)?;
        iterations += 1;

        tracing::debug!(iteration = iterations, sigma2 = result.sigma2, ntol, l, "cpd iteration");
    }

    if options.normalize {
        result.denormalize(&normalization);
    }
    result.iterations = iterations;
    result.runtime = start.elapsed();

    tracing::debug!(
        iterations,
        sigma2 = result.sigma2,
        runtime_ms = result.runtime.as_secs_f64() * 1e3,
        "cpd registration finished"
    );
    Ok(result)
}
