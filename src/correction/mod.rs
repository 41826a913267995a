//! Bragg-angle corrections for a pinhole camera.
//!
//! Two effects move the apparent 2θ of a detector point away from the value
//! computed for an ideal point source at the pinhole center:
//!
//! - [`sample_layer`]: the diffracting layer sits upstream of the pinhole, so
//!   the true scattering point is offset along the beam by
//!   `zs = standoff + thickness/2 + pinhole_thickness/2`. Closed form.
//! - [`pinhole`]: the pinhole itself radiates as an extended source. Each point
//!   is re-traced from an origin on the pinhole rim that depends on the
//!   point's own azimuth, so the evaluation is a per-point loop.
//!
//! # Output conventions
//!
//! Point evaluators return one `[2θ, η]` row per input point, η always being the
//! nominal azimuth. With `return_nominal = true` the first column is the
//! corrected angle `2θ_nom - tth_corr`; with `false` it is `-tth_corr`.
//!
//! Map evaluators return `+tth_corr` per pixel, i.e. `2θ_model - 2θ_nom`.
//! The raw point output is therefore the negated map value at the same pixel
//! center. The sign of the raw point form has not been validated against an
//! independent reference calculation.

pub mod pinhole;
pub mod sample_layer;

use std::collections::BTreeMap;

use nalgebra::DMatrix;

use crate::error::Result;
use crate::AngleBatch;

pub use pinhole::{
    evaluate_pinhole_map, evaluate_pinhole_points, pinhole_tth_correction, PinholeDistortion,
    PinholeGeometry,
};
pub use sample_layer::{
    evaluate_sample_layer_map, evaluate_sample_layer_points, sample_layer_tth_correction,
    LayerGeometry, SampleLayerDistortion,
};

/// Per-detector `2θ_model - 2θ_nom` fields in radians, shaped like each pixel grid.
pub type CorrectionField = BTreeMap<String, DMatrix<f64>>;

/// A correction model bound to a detector and its physical parameters.
pub trait BraggCorrection {
    /// Correct detector points; see the module docs for `return_nominal`.
    fn apply(&self, xy: &[[f64; 2]], return_nominal: bool) -> Result<AngleBatch>;
}

/// Combine nominal angles with the per-point correction term.
fn corrected_angles(nominal: &[[f64; 2]], tth_corr: &[f64], return_nominal: bool) -> AngleBatch {
    nominal
        .iter()
        .zip(tth_corr)
        .map(|(&[tth, eta], &corr)| {
            if return_nominal {
                [tth - corr, eta]
            } else {
                [-corr, eta]
            }
        })
        .collect()
}

/// Flatten a grid in row-major order to match [`crate::AngleConversion::pixel_xys`].
fn row_major(m: &DMatrix<f64>) -> Vec<f64> {
    m.transpose().as_slice().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrected_angles_conventions() {
        let nominal = [[0.5, 1.0], [0.25, -2.0]];
        let corr = [0.125, -0.0625];

        let nom = corrected_angles(&nominal, &corr, true);
        assert_eq!(nom, vec![[0.375, 1.0], [0.3125, -2.0]]);

        let raw = corrected_angles(&nominal, &corr, false);
        assert_eq!(raw, vec![[-0.125, 1.0], [0.0625, -2.0]]);
    }

    #[test]
    fn test_row_major_flatten() {
        let m = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(row_major(&m), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }
}
