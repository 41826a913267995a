//! Planar area detector: pixel grid, lab placement, and angle conversion.
//!
//! # Coordinate conventions
//!
//! - **Detector coordinates** `(x, y)`: millimeters in the panel plane, origin at
//!   the panel center, +X along increasing column, +Y along decreasing row.
//! - **Pixel grids**: `(rows, cols)` matrices indexed `[(i, j)]` with row 0 at the
//!   top of the panel.
//!
//! The correction models only need what [`AngleConversion`] exposes, so any
//! detector type implementing it can be corrected.

use nalgebra::DMatrix;

use crate::distortion::PanelDistortion;
use crate::error::{Error, Result};
use crate::transforms::{self, BeamFrame, SampleFrame};
use crate::{AngleBatch, Matrix3, Vector3};

/// Capability interface for detectors the correction models can evaluate.
pub trait AngleConversion {
    /// Detector-to-lab rotation.
    fn rmat(&self) -> &Matrix3;
    /// Lab position of the panel center in mm.
    fn tvec(&self) -> &Vector3;
    /// Beam and azimuth reference the detector reports angles in.
    fn beam_frame(&self) -> &BeamFrame;
    /// Pixel grid shape `(rows, cols)`.
    fn shape(&self) -> (usize, usize);
    /// Pixel-center coordinates as `(py, px)` grids.
    fn pixel_coords(&self) -> (DMatrix<f64>, DMatrix<f64>);

    /// (2θ, η) of detector points for an arbitrary sample and beam frame.
    fn cart_to_angles_in(
        &self,
        xy: &[[f64; 2]],
        sample: &SampleFrame,
        frame: &BeamFrame,
        apply_distortion: bool,
    ) -> Result<AngleBatch>;

    /// Per-pixel `(2θ, η)` grids in the given beam frame, distortion applied.
    fn pixel_angles_in(&self, frame: &BeamFrame) -> Result<(DMatrix<f64>, DMatrix<f64>)>;

    /// (2θ, η) with the identity sample frame and the detector's own beam.
    fn cart_to_angles(&self, xy: &[[f64; 2]], apply_distortion: bool) -> Result<AngleBatch> {
        self.cart_to_angles_in(xy, &SampleFrame::IDENTITY, self.beam_frame(), apply_distortion)
    }

    /// Per-pixel `(2θ, η)` grids in the detector's own beam frame.
    fn pixel_angles(&self) -> Result<(DMatrix<f64>, DMatrix<f64>)> {
        self.pixel_angles_in(self.beam_frame())
    }

    /// Pixel centers as `(x, y)` rows, row-major over the grid.
    fn pixel_xys(&self) -> Vec<[f64; 2]> {
        let (py, px) = self.pixel_coords();
        let (rows, cols) = self.shape();
        let mut out = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                out.push([px[(i, j)], py[(i, j)]]);
            }
        }
        out
    }
}

/// Parameters for building a [`PlanarDetector`].
#[derive(Debug, Clone)]
pub struct PlanarDetectorConfig {
    /// Number of pixel rows. Default 2048.
    pub rows: usize,
    /// Number of pixel columns. Default 2048.
    pub cols: usize,
    /// Pixel pitch `[row, col]` in mm. Default 0.2 mm square pixels.
    pub pixel_size: [f64; 2],
    /// Panel orientation as an exponential map (axis × angle, radians).
    pub tilt: [f64; 3],
    /// Lab position of the panel center in mm. Default 1 m downstream.
    pub translation: [f64; 3],
    /// Beam and azimuth reference. Replaced by the instrument's on assembly.
    pub beam_frame: BeamFrame,
    /// Panel distortion model.
    pub distortion: PanelDistortion,
}

impl Default for PlanarDetectorConfig {
    fn default() -> Self {
        Self {
            rows: 2048,
            cols: 2048,
            pixel_size: [0.2, 0.2],
            tilt: [0.0; 3],
            translation: [0.0, 0.0, -1000.0],
            beam_frame: BeamFrame::CANONICAL,
            distortion: PanelDistortion::None,
        }
    }
}

/// Flat rectangular area detector.
#[derive(Debug, Clone)]
pub struct PlanarDetector {
    rows: usize,
    cols: usize,
    pixel_size: [f64; 2],
    tilt: Vector3,
    rmat: Matrix3,
    tvec: Vector3,
    frame: BeamFrame,
    distortion: PanelDistortion,
}

impl PlanarDetector {
    /// Build a detector, validating the pixel grid and placement.
    pub fn new(config: PlanarDetectorConfig) -> Result<Self> {
        if config.rows == 0 || config.cols == 0 {
            return Err(Error::EmptyPanel {
                rows: config.rows,
                cols: config.cols,
            });
        }
        for (name, value) in [
            ("pixel_size[row]", config.pixel_size[0]),
            ("pixel_size[col]", config.pixel_size[1]),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidParameter { name, value });
            }
        }
        let tilt = Vector3::from(config.tilt);
        let tvec = Vector3::from(config.translation);
        for (name, v) in [("tilt", &tilt), ("translation", &tvec)] {
            if let Some(&value) = v.iter().find(|c| !c.is_finite()) {
                return Err(Error::InvalidParameter { name, value });
            }
        }

        Ok(Self {
            rows: config.rows,
            cols: config.cols,
            pixel_size: config.pixel_size,
            tilt,
            rmat: transforms::rot_mat_of_exp_map(&tilt),
            tvec,
            frame: config.beam_frame,
            distortion: config.distortion,
        })
    }

    /// Number of pixel rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of pixel columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Pixel pitch `[row, col]` in mm.
    pub fn pixel_size(&self) -> [f64; 2] {
        self.pixel_size
    }

    /// Panel orientation as an exponential map.
    pub fn tilt(&self) -> &Vector3 {
        &self.tilt
    }

    /// Distortion model applied to measured coordinates.
    pub fn distortion(&self) -> &PanelDistortion {
        &self.distortion
    }

    /// Re-orient the panel; the rotation matrix is rebuilt from the exp map.
    pub fn set_tilt(&mut self, tilt: Vector3) {
        self.tilt = tilt;
        self.rmat = transforms::rot_mat_of_exp_map(&tilt);
    }

    /// Move the panel center to `tvec` (lab frame, mm).
    pub fn set_translation(&mut self, tvec: Vector3) {
        self.tvec = tvec;
    }

    /// Replace the beam frame angles are reported in.
    pub fn set_beam_frame(&mut self, frame: BeamFrame) {
        self.frame = frame;
    }

    /// Pixel-center y of row `i`.
    fn row_center(&self, i: usize) -> f64 {
        self.pixel_size[0] * (0.5 * self.rows as f64 - i as f64 - 0.5)
    }

    /// Pixel-center x of column `j`.
    fn col_center(&self, j: usize) -> f64 {
        self.pixel_size[1] * (j as f64 + 0.5 - 0.5 * self.cols as f64)
    }
}

impl AngleConversion for PlanarDetector {
    fn rmat(&self) -> &Matrix3 {
        &self.rmat
    }

    fn tvec(&self) -> &Vector3 {
        &self.tvec
    }

    fn beam_frame(&self) -> &BeamFrame {
        &self.frame
    }

    fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn pixel_coords(&self) -> (DMatrix<f64>, DMatrix<f64>) {
        let py = DMatrix::from_fn(self.rows, self.cols, |i, _| self.row_center(i));
        let px = DMatrix::from_fn(self.rows, self.cols, |_, j| self.col_center(j));
        (py, px)
    }

    fn cart_to_angles_in(
        &self,
        xy: &[[f64; 2]],
        sample: &SampleFrame,
        frame: &BeamFrame,
        apply_distortion: bool,
    ) -> Result<AngleBatch> {
        if xy.is_empty() {
            return Err(Error::EmptyBatch);
        }
        let (angs, _) = if apply_distortion && !self.distortion.is_none() {
            let corrected = self.distortion.apply_batch(xy);
            transforms::detector_xy_to_gvec(&corrected, &self.rmat, &self.tvec, sample, frame)?
        } else {
            transforms::detector_xy_to_gvec(xy, &self.rmat, &self.tvec, sample, frame)?
        };
        Ok(angs)
    }

    fn pixel_angles_in(&self, frame: &BeamFrame) -> Result<(DMatrix<f64>, DMatrix<f64>)> {
        let angs = self.cart_to_angles_in(&self.pixel_xys(), &SampleFrame::IDENTITY, frame, true)?;
        let tth: Vec<f64> = angs.iter().map(|a| a[0]).collect();
        let eta: Vec<f64> = angs.iter().map(|a| a[1]).collect();
        Ok((
            DMatrix::from_row_slice(self.rows, self.cols, &tth),
            DMatrix::from_row_slice(self.rows, self.cols, &eta),
        ))
    }
}
