//! Direct Gauss transform: soft correspondences between the fixed set and the
//! current moving set under a Gaussian mixture with a uniform outlier term.

use cpd_core::{ensure_same_dimension, squared_distance, Error, PointSet, Result, Vector};
use rayon::prelude::*;
use std::f64::consts::PI;

/// Correspondence aggregates for one EM iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Probabilities {
    /// Per moving point correspondence mass (length N).
    pub p1: Vector,
    /// Per fixed point correspondence mass (length M).
    pub pt1: Vector,
    /// Correspondence-weighted fixed points (N x D).
    pub px: PointSet,
    /// Running negative log-likelihood. Transforms only ever add to it.
    pub l: f64,
    /// Index of the most probable fixed point for each moving point.
    pub correspondence: Vec<usize>,
}

impl Probabilities {
    /// Check that the aggregates fit an `M x D` fixed set and an `N x D`
    /// moving set.
    pub fn validate(&self, fixed: &PointSet, moving: &PointSet) -> Result<()> {
        let n = moving.nrows();
        if self.p1.len() != n {
            return Err(Error::dimension_mismatch(format!(
                "p1 has length {}, expected {n}",
                self.p1.len()
            )));
        }
        if self.pt1.len() != fixed.nrows() {
            return Err(Error::dimension_mismatch(format!(
                "pt1 has length {}, expected {}",
                self.pt1.len(),
                fixed.nrows()
            )));
        }
        if self.px.shape() != moving.shape() {
            return Err(Error::dimension_mismatch(format!(
                "px is {:?}, expected {:?}",
                self.px.shape(),
                moving.shape()
            )));
        }
        Ok(())
    }

    /// Total correspondence mass `Np = sum(p1)`.
    pub fn np(&self) -> f64 {
        self.p1.sum()
    }
}

/// Compute [`Probabilities`] for `fixed` (M x D) against `moving` (N x D).
///
/// `outliers` is the weight of the uniform component, in `[0, 1)`.
pub fn gauss_transform(
    fixed: &PointSet,
    moving: &PointSet,
    sigma2: f64,
    outliers: f64,
) -> Result<Probabilities> {
    ensure_same_dimension(fixed, moving)?;
    if !(sigma2.is_finite() && sigma2 > 0.0) {
        return Err(Error::degenerate(format!(
            "sigma2 must be positive, got {sigma2}"
        )));
    }
    if !(0.0..1.0).contains(&outliers) {
        return Err(Error::invalid_config(format!(
            "outlier weight must be in [0, 1), got {outliers}"
        )));
    }

    let m = fixed.nrows();
    let n = moving.nrows();
    let cols = fixed.ncols();
    if m == 0 || n == 0 {
        return Err(Error::degenerate("gauss transform needs non-empty point sets"));
    }

    let ksig = -2.0 * sigma2;
    let outlier_term =
        outliers * n as f64 * (-ksig * PI).powf(0.5 * cols as f64) / ((1.0 - outliers) * m as f64);

    // Normalizer per fixed point
    let sp: Vec<f64> = (0..m)
        .into_par_iter()
        .map(|i| {
            (0..n)
                .map(|j| (squared_distance(fixed, i, moving, j) / ksig).exp())
                .sum::<f64>()
                + outlier_term
        })
        .collect();

    let pt1 = Vector::from_iterator(m, sp.iter().map(|&s| 1.0 - outlier_term / s));
    let mut l: f64 = sp.iter().map(|s| -s.ln()).sum();
    l += cols as f64 * m as f64 * sigma2.ln() / 2.0;

    // Posterior mass per moving point
    let per_moving: Vec<(f64, Vec<f64>, usize)> = (0..n)
        .into_par_iter()
        .map(|j| {
            let mut p1 = 0.0;
            let mut px = vec![0.0; cols];
            let mut best = (0usize, 0.0f64);
            for (i, &s) in sp.iter().enumerate() {
                let p = (squared_distance(fixed, i, moving, j) / ksig).exp() / s;
                p1 += p;
                for (d, acc) in px.iter_mut().enumerate() {
                    *acc += fixed[(i, d)] * p;
                }
                if p > best.1 {
                    best = (i, p);
                }
            }
            (p1, px, best.0)
        })
        .collect();

    let mut p1 = Vector::zeros(n);
    let mut px = PointSet::zeros(n, cols);
    let mut correspondence = Vec::with_capacity(n);
    for (j, (mass, row, best)) in per_moving.into_iter().enumerate() {
        p1[j] = mass;
        for (d, value) in row.into_iter().enumerate() {
            px[(j, d)] = value;
        }
        correspondence.push(best);
    }

    Ok(Probabilities {
        p1,
        pt1,
        px,
        l,
        correspondence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn line(n: usize, offset: f64) -> PointSet {
        PointSet::from_fn(n, 2, |r, c| if c == 0 { r as f64 + offset } else { 0.0 })
    }

    #[test]
    fn without_outliers_every_fixed_point_is_fully_explained() {
        let fixed = line(5, 0.0);
        let moving = line(4, 0.2);
        let p = gauss_transform(&fixed, &moving, 0.5, 0.0).unwrap();

        for v in p.pt1.iter() {
            assert_relative_eq!(*v, 1.0, epsilon = 1e-12);
        }
        // Each fixed point distributes unit mass over the moving points
        assert_relative_eq!(p.np(), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn outliers_reduce_mass() {
        let fixed = line(5, 0.0);
        let moving = line(5, 0.0);
        let p = gauss_transform(&fixed, &moving, 0.5, 0.1).unwrap();

        assert!(p.pt1.iter().all(|&v| v > 0.0 && v < 1.0));
        assert!(p.np() < 5.0);
        assert_relative_eq!(p.np(), p.pt1.sum(), epsilon = 1e-12);
    }

    #[test]
    fn correspondence_picks_nearest_fixed_point() {
        let fixed = line(4, 0.0);
        let moving = PointSet::from_row_slice(2, 2, &[2.9, 0.0, 0.1, 0.0]);
        let p = gauss_transform(&fixed, &moving, 0.1, 0.0).unwrap();
        assert_eq!(p.correspondence, vec![3, 0]);
    }

    #[test]
    fn px_is_weighted_fixed_sum() {
        let fixed = line(3, 0.0);
        let moving = line(3, 0.0);
        let p = gauss_transform(&fixed, &moving, 1e-4, 0.0).unwrap();
        // Tiny variance: each moving point owns exactly its fixed twin
        assert_relative_eq!(p.px, fixed, epsilon = 1e-9);
    }

    #[test]
    fn likelihood_includes_variance_term() {
        let fixed = line(2, 0.0);
        let moving = line(2, 0.0);
        let sigma2 = 0.25;
        let p = gauss_transform(&fixed, &moving, sigma2, 0.0).unwrap();

        let sp = 1.0 + (-1.0 / (2.0 * sigma2)).exp();
        let expected = -2.0 * sp.ln() + 2.0 * 2.0 * sigma2.ln() / 2.0;
        assert_relative_eq!(p.l, expected, epsilon = 1e-12);
    }

    #[test]
    fn rejects_invalid_arguments() {
        let a = line(3, 0.0);
        let b = PointSet::zeros(3, 3);
        assert!(matches!(
            gauss_transform(&a, &b, 1.0, 0.1),
            Err(Error::DimensionMismatch(_))
        ));
        assert!(matches!(
            gauss_transform(&a, &a, 0.0, 0.1),
            Err(Error::DegenerateInput(_))
        ));
        assert!(matches!(
            gauss_transform(&a, &a, 1.0, 1.0),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn validate_checks_every_shape() {
        let fixed = line(3, 0.0);
        let moving = line(2, 0.0);
        let mut p = gauss_transform(&fixed, &moving, 1.0, 0.0).unwrap();
        assert!(p.validate(&fixed, &moving).is_ok());
        assert!(p.validate(&moving, &fixed).is_err());

        p.px = PointSet::zeros(2, 3);
        assert!(p.validate(&fixed, &moving).is_err());
    }
}
