//! Center and scale point sets before registration

use cpd_core::{PointSet, Result};
use nalgebra::RowDVector;

/// Centered and scaled copies of a fixed/moving pair plus what is needed to
/// undo the transform on the fixed side.
#[derive(Debug, Clone)]
pub struct Normalization {
    pub fixed_mean: RowDVector<f64>,
    pub fixed_scale: f64,
    pub fixed: PointSet,
    pub moving_mean: RowDVector<f64>,
    pub moving_scale: f64,
    pub moving: PointSet,
}

impl Normalization {
    /// Normalize both sets. With `linked` both share the larger of the two
    /// scales, which keeps their relative size intact.
    pub fn new(fixed: &PointSet, moving: &PointSet, linked: bool) -> Result<Self> {
        cpd_core::ensure_same_dimension(fixed, moving)?;

        let (fixed_mean, mut fixed_centered) = center(fixed);
        let (moving_mean, mut moving_centered) = center(moving);
        let mut fixed_scale = rms_scale(&fixed_centered);
        let mut moving_scale = rms_scale(&moving_centered);

        if linked {
            let scale = fixed_scale.max(moving_scale);
            fixed_scale = scale;
            moving_scale = scale;
        }

        fixed_centered /= fixed_scale;
        moving_centered /= moving_scale;

        Ok(Self {
            fixed_mean,
            fixed_scale,
            fixed: fixed_centered,
            moving_mean,
            moving_scale,
            moving: moving_centered,
        })
    }

    /// Map points from normalized space back into the fixed set's frame.
    pub fn denormalize_points(&self, points: &PointSet) -> PointSet {
        let mut out = points * self.fixed_scale;
        for mut row in out.row_iter_mut() {
            for (d, value) in row.iter_mut().enumerate() {
                *value += self.fixed_mean[d];
            }
        }
        out
    }
}

fn center(points: &PointSet) -> (RowDVector<f64>, PointSet) {
    let cols = points.ncols();
    let rows = points.nrows();
    let mean = if rows == 0 {
        RowDVector::zeros(cols)
    } else {
        RowDVector::from_iterator(cols, (0..cols).map(|c| points.column(c).sum() / rows as f64))
    };

    let mut centered = points.clone();
    for mut row in centered.row_iter_mut() {
        for (d, value) in row.iter_mut().enumerate() {
            *value -= mean[d];
        }
    }
    (mean, centered)
}

fn rms_scale(centered: &PointSet) -> f64 {
    let rows = centered.nrows();
    let scale = if rows == 0 {
        0.0
    } else {
        (centered.norm_squared() / rows as f64).sqrt()
    };

    if scale > 0.0 && scale.is_finite() {
        scale
    } else {
        tracing::warn!(rows, "point set has zero spread, using unit scale");
        1.0
    }
}
