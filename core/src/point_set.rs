//! Dense point sets
//!
//! Registration works on `N x D` matrices rather than vectors of points so the
//! nonrigid solve can use dense linear algebra directly. Helpers here convert
//! to and from nalgebra points and hold the shape checks shared by every stage.

use crate::{Error, Result};
use nalgebra::{DMatrix, DVector, Point2, Point3};

/// Dense point set: one row per point, one column per spatial dimension.
pub type PointSet = DMatrix<f64>;

/// Dense column vector (per-point masses and similar).
pub type Vector = DVector<f64>;

/// Build an `N x 3` point set from 3D points.
pub fn point_set_from_points3(points: &[Point3<f64>]) -> PointSet {
    PointSet::from_fn(points.len(), 3, |r, c| points[r][c])
}

/// Build an `N x 2` point set from 2D points.
pub fn point_set_from_points2(points: &[Point2<f64>]) -> PointSet {
    PointSet::from_fn(points.len(), 2, |r, c| points[r][c])
}

/// Convert an `N x 3` point set back into 3D points.
pub fn point_set_to_points3(set: &PointSet) -> Result<Vec<Point3<f64>>> {
    if set.ncols() != 3 {
        return Err(Error::dimension_mismatch(format!(
            "expected 3 columns, got {}",
            set.ncols()
        )));
    }
    Ok(set
        .row_iter()
        .map(|row| Point3::new(row[0], row[1], row[2]))
        .collect())
}

/// Convert an `N x 2` point set back into 2D points.
pub fn point_set_to_points2(set: &PointSet) -> Result<Vec<Point2<f64>>> {
    if set.ncols() != 2 {
        return Err(Error::dimension_mismatch(format!(
            "expected 2 columns, got {}",
            set.ncols()
        )));
    }
    Ok(set.row_iter().map(|row| Point2::new(row[0], row[1])).collect())
}

/// Squared Euclidean distance between row `i` of `a` and row `j` of `b`.
///
/// Both sets must have the same column count.
#[inline]
pub fn squared_distance(a: &PointSet, i: usize, b: &PointSet, j: usize) -> f64 {
    (0..a.ncols())
        .map(|d| {
            let diff = a[(i, d)] - b[(j, d)];
            diff * diff
        })
        .sum()
}

/// Reject point sets whose dimensionality differs.
pub fn ensure_same_dimension(fixed: &PointSet, moving: &PointSet) -> Result<()> {
    if fixed.ncols() != moving.ncols() {
        return Err(Error::dimension_mismatch(format!(
            "fixed points have {} columns, moving points have {}",
            fixed.ncols(),
            moving.ncols()
        )));
    }
    Ok(())
}

/// Reject point sets containing NaN or infinite coordinates.
pub fn ensure_finite(name: &str, set: &PointSet) -> Result<()> {
    if let Some(idx) = set.iter().position(|v| !v.is_finite()) {
        // column-major storage
        let rows = set.nrows().max(1);
        return Err(Error::degenerate(format!(
            "{name} has a non-finite coordinate at row {}, column {}",
            idx % rows,
            idx / rows
        )));
    }
    Ok(())
}
