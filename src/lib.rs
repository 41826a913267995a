//! # pinhole-tth
//!
//! Geometric corrections to the Bragg angle (2θ) measured by planar area
//! detectors behind a pinhole aperture.
//!
//! The nominal 2θ of a detector point assumes every ray leaves an ideal point
//! source at the pinhole center. Two finite-size effects break that assumption:
//!
//! - **Sample layer**: the diffracting layer sits upstream of the pinhole
//!   (standoff + half layer thickness + half pinhole height). Closed form.
//! - **Pinhole as extended source**: rays effectively leave the pinhole rim
//!   opposite the detector point. Re-traced per point.
//!
//! Each model can be evaluated on an explicit list of detector coordinates or
//! as a per-pixel correction field for every detector in an [`Instrument`].
//!
//! ## Example
//!
//! ```no_run
//! use pinhole_tth::{
//!     evaluate_pinhole_map, evaluate_sample_layer_points, Instrument, InstrumentConfig,
//!     LayerGeometry, PinholeGeometry, PlanarDetector, PlanarDetectorConfig,
//! };
//!
//! let det = PlanarDetector::new(PlanarDetectorConfig {
//!     rows: 1024,
//!     cols: 1024,
//!     translation: [0.0, 0.0, -150.0],
//!     ..Default::default()
//! })?;
//!
//! // Corrected (2θ, η) for a few detector points, 25 mm from the source.
//! let layer = LayerGeometry::new(0.5, 0.02, 0.1)?;
//! let xy = [[10.0, 20.0], [-35.0, 4.0]];
//! let angles = evaluate_sample_layer_points(&det, &xy, &layer, 25.0, true)?;
//! println!("{angles:?}");
//!
//! // Per-pixel pinhole correction for a one-panel instrument.
//! let instr = Instrument::new(InstrumentConfig::default())?.with_detector("imaging", det)?;
//! let field = evaluate_pinhole_map(&instr, &PinholeGeometry::new(0.1, 0.2)?)?;
//! println!("max Δ2θ = {:.3e} rad", field["imaging"].max());
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Conventions
//!
//! Lengths are millimeters, angles radians. Detector coordinates are panel-local
//! with the origin at the panel center. See [`correction`] for the sign
//! conventions of the point and map outputs.

pub mod correction;
pub mod detector;
pub mod distortion;
mod error;
pub mod instrument;
pub mod transforms;

pub use correction::{
    evaluate_pinhole_map, evaluate_pinhole_points, evaluate_sample_layer_map,
    evaluate_sample_layer_points, pinhole_tth_correction, sample_layer_tth_correction,
    BraggCorrection, CorrectionField, LayerGeometry, PinholeDistortion, PinholeGeometry,
    SampleLayerDistortion,
};
pub use detector::{AngleConversion, PlanarDetector, PlanarDetectorConfig};
pub use distortion::{PanelDistortion, RadialDistortion};
pub use error::{Error, Result};
pub use instrument::{Instrument, InstrumentConfig};
pub use transforms::{BeamFrame, SampleFrame};

// Commonly used types. All geometry runs in f64.
pub type Vector3 = nalgebra::Vector3<f64>;
pub type Matrix3 = nalgebra::Matrix3<f64>;

/// One `[2θ, η]` row per detector point, radians.
pub type AngleBatch = Vec<[f64; 2]>;
