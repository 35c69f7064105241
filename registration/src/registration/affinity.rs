//! Gaussian affinity (smoothness kernel) matrices
//!
//! `G(i, j) = exp(-|x_i - y_j|² / (2β²))`. With `x == y` the result is the
//! symmetric positive semi-definite kernel that regularizes the nonrigid
//! displacement field.

use cpd_core::{ensure_same_dimension, squared_distance, Error, PointSet, Result};
use rayon::prelude::*;

/// Build the Gaussian affinity matrix between `x` (rows) and `y` (columns).
///
/// Columns are filled in parallel; every entry is computed by exactly one task
/// so the output is identical for identical inputs regardless of thread count.
pub fn affinity(x: &PointSet, y: &PointSet, beta: f64) -> Result<PointSet> {
    ensure_same_dimension(x, y)?;
    if !(beta.is_finite() && beta > 0.0) {
        return Err(Error::invalid_config(format!(
            "affinity bandwidth must be positive, got {beta}"
        )));
    }

    let rows = x.nrows();
    let cols = y.nrows();
    if rows == 0 || cols == 0 {
        return Ok(PointSet::zeros(rows, cols));
    }

    let k = -2.0 * beta * beta;
    let mut data = vec![0.0; rows * cols];
    // nalgebra storage is column-major: chunk j is column j
    data.par_chunks_mut(rows)
        .enumerate()
        .for_each(|(j, column)| {
            for (i, value) in column.iter_mut().enumerate() {
                *value = (squared_distance(x, i, y, j) / k).exp();
            }
        });

    Ok(PointSet::from_vec(rows, cols, data))
}
