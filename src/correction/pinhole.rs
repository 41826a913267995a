//! Pinhole-as-source correction.
//!
//! A pinhole of finite radius and height acts as a spatially extended secondary
//! source. For a detector point at reference azimuth `η_ref` (its azimuth about
//! the canonical beam axis, lab −Z) the effective ray origin is placed on the
//! pinhole's back rim, diametrically opposite the point:
//!
//! ```text
//! origin = −radius · (cos η_ref, sin η_ref, thickness/2)
//! ```
//!
//! The point is re-traced from that origin with the detector's own beam frame,
//! and the correction is `tth_corr = 2θ_pin − 2θ_nom`. Placing the origin on the
//! back surface rather than the pinhole center is the convention used here;
//! the center convention is a valid alternative but is not what this module
//! computes.
//!
//! Every point has its own origin, so the evaluation is an independent loop per
//! point, run in parallel.

use nalgebra::DMatrix;
use rayon::prelude::*;
use tracing::debug;

use super::{corrected_angles, row_major, BraggCorrection, CorrectionField};
use crate::detector::AngleConversion;
use crate::error::{finite, Result};
use crate::instrument::Instrument;
use crate::transforms::{self, unit_vector, BeamFrame, SampleFrame, BEAM_VEC};
use crate::{AngleBatch, Matrix3, Vector3};

/// Pinhole cylinder dimensions in mm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinholeGeometry {
    /// Height of the pinhole cylinder.
    pub thickness: f64,
    /// Radius of the pinhole aperture.
    pub radius: f64,
}

impl PinholeGeometry {
    /// Validated pinhole dimensions; both must be finite.
    pub fn new(thickness: f64, radius: f64) -> Result<Self> {
        Ok(Self {
            thickness: finite("pinhole_thickness", thickness)?,
            radius: finite("pinhole_radius", radius)?,
        })
    }

    /// Effective ray origin for a point at reference azimuth `ref_eta`.
    pub fn ray_origin(&self, ref_eta: f64) -> Vector3 {
        let (s, c) = ref_eta.sin_cos();
        -self.radius * Vector3::new(c, s, 0.5 * self.thickness)
    }
}

/// 2θ of each point re-traced from its rim origin.
fn displaced_tth(
    xy: &[[f64; 2]],
    ref_eta: &[f64],
    rmat_d: &Matrix3,
    tvec_d: &Vector3,
    frame: &BeamFrame,
    geometry: &PinholeGeometry,
) -> Result<Vec<f64>> {
    let b_hat = unit_vector(&frame.beam);
    let rmat_e = frame.eta_rot_mat()?;

    Ok(xy
        .par_iter()
        .zip(ref_eta)
        .map(|(&p, &eta)| {
            let sample = SampleFrame::with_origin(geometry.ray_origin(eta));
            transforms::xy_to_angles(p, rmat_d, tvec_d, &sample, &b_hat, &rmat_e).tth
        })
        .collect())
}

/// Nominal angles and the `tth_corr` term for each point.
fn pinhole_correction<D: AngleConversion + ?Sized>(
    detector: &D,
    xy: &[[f64; 2]],
    geometry: &PinholeGeometry,
) -> Result<(AngleBatch, Vec<f64>)> {
    // Azimuths about the pinhole axis, independent of the actual beam direction.
    let pinhole_frame = detector.beam_frame().with_beam(BEAM_VEC);
    let ref_eta: Vec<f64> = detector
        .cart_to_angles_in(xy, &SampleFrame::IDENTITY, &pinhole_frame, true)?
        .iter()
        .map(|a| a[1])
        .collect();

    let nom_angs = detector.cart_to_angles(xy, true)?;
    let pin_tth = displaced_tth(
        xy,
        &ref_eta,
        detector.rmat(),
        detector.tvec(),
        detector.beam_frame(),
        geometry,
    )?;

    let tth_corr = pin_tth
        .iter()
        .zip(&nom_angs)
        .map(|(pin, nom)| pin - nom[0])
        .collect();
    Ok((nom_angs, tth_corr))
}

/// Per-point `tth_corr = 2θ_pin − 2θ_nom` of the pinhole model.
pub fn pinhole_tth_correction<D: AngleConversion + ?Sized>(
    detector: &D,
    xy: &[[f64; 2]],
    geometry: &PinholeGeometry,
) -> Result<Vec<f64>> {
    pinhole_correction(detector, xy, geometry).map(|(_, corr)| corr)
}

/// Apply the pinhole correction to detector points.
///
/// Returns `[2θ_nom - tth_corr, η]` per point when `return_nominal` is set,
/// otherwise `[-tth_corr, η]`.
pub fn evaluate_pinhole_points<D: AngleConversion + ?Sized>(
    detector: &D,
    xy: &[[f64; 2]],
    geometry: &PinholeGeometry,
    return_nominal: bool,
) -> Result<AngleBatch> {
    let (nom_angs, tth_corr) = pinhole_correction(detector, xy, geometry)?;
    Ok(corrected_angles(&nom_angs, &tth_corr, return_nominal))
}

/// Pinhole correction field for every detector of `instrument`.
///
/// Rays are traced in the instrument's beam frame; each field holds
/// `2θ_pin - 2θ_nom` per pixel.
pub fn evaluate_pinhole_map(
    instrument: &Instrument,
    geometry: &PinholeGeometry,
) -> Result<CorrectionField> {
    let mut field = CorrectionField::new();
    for (key, det) in instrument.detectors() {
        let (rows, cols) = det.shape();
        debug!(
            "Pinhole map for {} ({}x{}), radius = {} mm, thickness = {} mm",
            key, rows, cols, geometry.radius, geometry.thickness
        );

        let pinhole_frame = det.beam_frame().with_beam(BEAM_VEC);
        let (_, ref_peta) = det.pixel_angles_in(&pinhole_frame)?;
        let (nom_ptth, _) = det.pixel_angles()?;

        let new_ptth = displaced_tth(
            &det.pixel_xys(),
            &row_major(&ref_peta),
            det.rmat(),
            det.tvec(),
            instrument.beam_frame(),
            geometry,
        )?;
        let corr = DMatrix::from_row_slice(rows, cols, &new_ptth) - nom_ptth;
        field.insert(key.to_string(), corr);
    }
    Ok(field)
}

/// Pinhole model bound to one detector.
#[derive(Debug)]
pub struct PinholeDistortion<'a, D: AngleConversion + ?Sized> {
    detector: &'a D,
    geometry: PinholeGeometry,
}

impl<'a, D: AngleConversion + ?Sized> PinholeDistortion<'a, D> {
    /// Bind `geometry` to `detector`.
    pub fn new(detector: &'a D, geometry: PinholeGeometry) -> Self {
        Self { detector, geometry }
    }

    /// Detector the model is bound to.
    pub fn detector(&self) -> &'a D {
        self.detector
    }

    /// Pinhole dimensions.
    pub fn geometry(&self) -> &PinholeGeometry {
        &self.geometry
    }

    /// Pinhole height in mm.
    pub fn pinhole_thickness(&self) -> f64 {
        self.geometry.thickness
    }

    /// Pinhole radius in mm.
    pub fn pinhole_radius(&self) -> f64 {
        self.geometry.radius
    }

    /// Same parameters against another detector.
    pub fn with_detector<'b>(self, detector: &'b D) -> PinholeDistortion<'b, D> {
        PinholeDistortion {
            detector,
            geometry: self.geometry,
        }
    }

    /// Same model with a new pinhole height.
    pub fn with_pinhole_thickness(mut self, thickness: f64) -> Result<Self> {
        self.geometry.thickness = finite("pinhole_thickness", thickness)?;
        Ok(self)
    }

    /// Same model with a new pinhole radius.
    pub fn with_pinhole_radius(mut self, radius: f64) -> Result<Self> {
        self.geometry.radius = finite("pinhole_radius", radius)?;
        Ok(self)
    }

    /// Correct detector points, see [`evaluate_pinhole_points`].
    pub fn apply(&self, xy: &[[f64; 2]], return_nominal: bool) -> Result<AngleBatch> {
        evaluate_pinhole_points(self.detector, xy, &self.geometry, return_nominal)
    }
}

impl<D: AngleConversion + ?Sized> Clone for PinholeDistortion<'_, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D: AngleConversion + ?Sized> Copy for PinholeDistortion<'_, D> {}

impl<D: AngleConversion + ?Sized> BraggCorrection for PinholeDistortion<'_, D> {
    fn apply(&self, xy: &[[f64; 2]], return_nominal: bool) -> Result<AngleBatch> {
        PinholeDistortion::apply(self, xy, return_nominal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{PlanarDetector, PlanarDetectorConfig};
    use crate::error::Error;

    #[test]
    fn test_ray_origin_on_back_rim() {
        let g = PinholeGeometry::new(0.1, 0.2).unwrap();
        let o = g.ray_origin(0.0);
        assert!((o - Vector3::new(-0.2, 0.0, -0.01)).norm() < 1e-15, "origin {o}");

        let o = g.ray_origin(std::f64::consts::FRAC_PI_2);
        assert!((o - Vector3::new(0.0, -0.2, -0.01)).norm() < 1e-15, "origin {o}");
    }

    #[test]
    fn test_correction_moves_points_outward() {
        // The origin sits opposite the point, so rays reach the panel at a
        // steeper angle than from the pinhole center.
        let det = PlanarDetector::new(PlanarDetectorConfig {
            rows: 8,
            cols: 8,
            translation: [0.0, 0.0, -100.0],
            ..Default::default()
        })
        .unwrap();
        let g = PinholeGeometry::new(0.0, 0.5).unwrap();
        let xy = [[50.0, 0.0], [0.0, -30.0], [-20.0, 20.0]];
        let corr = pinhole_tth_correction(&det, &xy, &g).unwrap();
        for (p, c) in xy.iter().zip(&corr) {
            assert!(*c > 0.0, "expected positive correction at {p:?}, got {c}");
        }

        // In-plane displacement only: tan 2θ_pin = (r + R) / D.
        let expected = (50.5_f64 / 100.0).atan() - (50.0_f64 / 100.0).atan();
        assert!((corr[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_colinear_detector_frame_propagates() {
        let det = PlanarDetector::new(PlanarDetectorConfig {
            rows: 2,
            cols: 2,
            beam_frame: BeamFrame::new(Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 1.0)),
            ..Default::default()
        })
        .unwrap();
        let g = PinholeGeometry::new(0.1, 0.1).unwrap();
        assert_eq!(
            evaluate_pinhole_points(&det, &[[1.0, 1.0]], &g, true),
            Err(Error::ColinearFrame)
        );
    }

    #[test]
    fn test_wrapper_setters_validate() {
        let det = PlanarDetector::new(PlanarDetectorConfig::default()).unwrap();
        let model = PinholeDistortion::new(&det, PinholeGeometry::new(0.05, 0.2).unwrap());
        let model = model.with_pinhole_radius(0.3).unwrap();
        assert_eq!(model.pinhole_radius(), 0.3);
        assert_eq!(model.pinhole_thickness(), 0.05);
        assert!(matches!(
            model.with_pinhole_thickness(f64::INFINITY),
            Err(Error::InvalidParameter { name: "pinhole_thickness", .. })
        ));
    }
}
