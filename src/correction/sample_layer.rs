//! Sample-layer standoff correction.
//!
//! The diffracting layer sits a distance `zs` upstream of the pinhole center,
//! where
//!
//! ```text
//! zs = standoff + thickness/2 + pinhole_thickness/2
//! ```
//!
//! With the source a distance `L` upstream of the pinhole and `cos β` the beam
//! component of the lab direction to the detector point, the shift of the
//! apparent Bragg angle is
//!
//! ```text
//! tth_corr = atan( sin 2θ_nom / (L·cos β / zs − cos 2θ_nom) )
//! ```
//!
//! The denominator is not guarded. Where it vanishes the term becomes `±π/2`,
//! or NaN when `sin 2θ_nom` vanishes as well; such rows are returned as-is.

use nalgebra::DMatrix;
use tracing::debug;

use super::{corrected_angles, BraggCorrection, CorrectionField};
use crate::detector::AngleConversion;
use crate::error::{finite, not_nan, Result};
use crate::instrument::Instrument;
use crate::transforms::unit_vector;
use crate::{AngleBatch, Matrix3, Vector3};

/// Sample layer and pinhole heights along the beam, in mm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerGeometry {
    /// Gap between the sample layer and the upstream face of the pinhole.
    pub standoff: f64,
    /// Thickness of the sample layer.
    pub thickness: f64,
    /// Height of the pinhole cylinder.
    pub pinhole_thickness: f64,
}

impl LayerGeometry {
    /// All three lengths must be finite; their sign is left to the caller.
    pub fn new(standoff: f64, thickness: f64, pinhole_thickness: f64) -> Result<Self> {
        Ok(Self {
            standoff: finite("standoff", standoff)?,
            thickness: finite("thickness", thickness)?,
            pinhole_thickness: finite("pinhole_thickness", pinhole_thickness)?,
        })
    }

    /// Distance from the pinhole center to the middle of the layer (`zs`).
    pub fn layer_offset(&self) -> f64 {
        self.standoff + 0.5 * self.thickness + 0.5 * self.pinhole_thickness
    }
}

/// Beam-axis cosine of the lab direction to a detector point.
fn cos_beta(rmat: &Matrix3, tvec: &Vector3, xy: [f64; 2]) -> f64 {
    let p = rmat * Vector3::new(xy[0], xy[1], 0.0) + tvec;
    -unit_vector(&p).z
}

#[inline]
fn layer_term(tth_nom: f64, cos_beta: f64, source_distance: f64, zs: f64) -> f64 {
    (tth_nom.sin() / (source_distance * cos_beta / zs - tth_nom.cos())).atan()
}

/// Nominal angles and the `tth_corr` term for each point.
fn layer_correction<D: AngleConversion + ?Sized>(
    detector: &D,
    xy: &[[f64; 2]],
    geometry: &LayerGeometry,
    source_distance: f64,
) -> Result<(AngleBatch, Vec<f64>)> {
    let zs = geometry.layer_offset();
    let ref_angs = detector.cart_to_angles(xy, true)?;

    // The layer direction uses the measured coordinates, not the
    // distortion-corrected ones the nominal angles came from.
    let tth_corr = xy
        .iter()
        .zip(&ref_angs)
        .map(|(&p, a)| {
            let cb = cos_beta(detector.rmat(), detector.tvec(), p);
            layer_term(a[0], cb, source_distance, zs)
        })
        .collect();
    Ok((ref_angs, tth_corr))
}

/// Per-point `tth_corr` term of the sample-layer model.
pub fn sample_layer_tth_correction<D: AngleConversion + ?Sized>(
    detector: &D,
    xy: &[[f64; 2]],
    geometry: &LayerGeometry,
    source_distance: f64,
) -> Result<Vec<f64>> {
    layer_correction(detector, xy, geometry, source_distance).map(|(_, corr)| corr)
}

/// Apply the sample-layer correction to detector points.
///
/// Returns `[2θ_nom - tth_corr, η]` per point when `return_nominal` is set,
/// otherwise `[-tth_corr, η]`.
pub fn evaluate_sample_layer_points<D: AngleConversion + ?Sized>(
    detector: &D,
    xy: &[[f64; 2]],
    geometry: &LayerGeometry,
    source_distance: f64,
    return_nominal: bool,
) -> Result<AngleBatch> {
    let (ref_angs, tth_corr) = layer_correction(detector, xy, geometry, source_distance)?;
    Ok(corrected_angles(&ref_angs, &tth_corr, return_nominal))
}

/// Sample-layer correction field for every detector of `instrument`.
///
/// The source distance is the instrument's. Each field holds `+tth_corr`,
/// i.e. `2θ_sam - 2θ_nom`, per pixel.
pub fn evaluate_sample_layer_map(
    instrument: &Instrument,
    geometry: &LayerGeometry,
) -> Result<CorrectionField> {
    let zs = geometry.layer_offset();
    let source_distance = instrument.source_distance();

    let mut field = CorrectionField::new();
    for (key, det) in instrument.detectors() {
        let (ref_ptth, _) = det.pixel_angles()?;
        let (py, px) = det.pixel_coords();
        let (rows, cols) = det.shape();
        debug!(
            "Sample-layer map for {} ({}x{}), zs = {:.4} mm",
            key, rows, cols, zs
        );

        let corr = DMatrix::from_fn(rows, cols, |i, j| {
            let cb = cos_beta(det.rmat(), det.tvec(), [px[(i, j)], py[(i, j)]]);
            layer_term(ref_ptth[(i, j)], cb, source_distance, zs)
        });
        field.insert(key.to_string(), corr);
    }
    Ok(field)
}

/// Sample-layer model bound to one detector.
#[derive(Debug)]
pub struct SampleLayerDistortion<'a, D: AngleConversion + ?Sized> {
    detector: &'a D,
    geometry: LayerGeometry,
    source_distance: f64,
}

impl<'a, D: AngleConversion + ?Sized> SampleLayerDistortion<'a, D> {
    /// Bind `geometry` to `detector`, validating the source distance.
    pub fn new(detector: &'a D, geometry: LayerGeometry, source_distance: f64) -> Result<Self> {
        Ok(Self {
            detector,
            geometry,
            source_distance: not_nan("source_distance", source_distance)?,
        })
    }

    /// Detector the model is bound to.
    pub fn detector(&self) -> &'a D {
        self.detector
    }

    /// Layer and pinhole dimensions.
    pub fn geometry(&self) -> &LayerGeometry {
        &self.geometry
    }

    /// Sample standoff in mm.
    pub fn standoff(&self) -> f64 {
        self.geometry.standoff
    }

    /// Layer thickness in mm.
    pub fn thickness(&self) -> f64 {
        self.geometry.thickness
    }

    /// Pinhole height in mm.
    pub fn pinhole_thickness(&self) -> f64 {
        self.geometry.pinhole_thickness
    }

    /// Source-to-pinhole distance in mm.
    pub fn source_distance(&self) -> f64 {
        self.source_distance
    }

    /// Same parameters against another detector.
    pub fn with_detector<'b>(self, detector: &'b D) -> SampleLayerDistortion<'b, D> {
        SampleLayerDistortion {
            detector,
            geometry: self.geometry,
            source_distance: self.source_distance,
        }
    }

    /// Same model with a new sample standoff.
    pub fn with_standoff(mut self, standoff: f64) -> Result<Self> {
        self.geometry.standoff = finite("standoff", standoff)?;
        Ok(self)
    }

    /// Same model with a new layer thickness.
    pub fn with_thickness(mut self, thickness: f64) -> Result<Self> {
        self.geometry.thickness = finite("thickness", thickness)?;
        Ok(self)
    }

    /// Same model with a new pinhole height.
    pub fn with_pinhole_thickness(mut self, pinhole_thickness: f64) -> Result<Self> {
        self.geometry.pinhole_thickness = finite("pinhole_thickness", pinhole_thickness)?;
        Ok(self)
    }

    /// Same model with a new source distance. NaN is rejected.
    pub fn with_source_distance(mut self, source_distance: f64) -> Result<Self> {
        self.source_distance = not_nan("source_distance", source_distance)?;
        Ok(self)
    }

    /// Correct detector points, see [`evaluate_sample_layer_points`].
    pub fn apply(&self, xy: &[[f64; 2]], return_nominal: bool) -> Result<AngleBatch> {
        evaluate_sample_layer_points(
            self.detector,
            xy,
            &self.geometry,
            self.source_distance,
            return_nominal,
        )
    }
}

impl<D: AngleConversion + ?Sized> Clone for SampleLayerDistortion<'_, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D: AngleConversion + ?Sized> Copy for SampleLayerDistortion<'_, D> {}

impl<D: AngleConversion + ?Sized> BraggCorrection for SampleLayerDistortion<'_, D> {
    fn apply(&self, xy: &[[f64; 2]], return_nominal: bool) -> Result<AngleBatch> {
        SampleLayerDistortion::apply(self, xy, return_nominal)
    }
}
