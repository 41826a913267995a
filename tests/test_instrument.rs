//! Shared synthetic pinhole-camera geometry for the integration tests.

#![allow(dead_code)]

use pinhole_tth::{
    BeamFrame, Instrument, InstrumentConfig, PanelDistortion, PlanarDetector,
    PlanarDetectorConfig, RadialDistortion, Vector3,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Source 40 mm upstream of the pinhole.
pub const SOURCE_DISTANCE: f64 = 40.0;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("debug").try_init();
}

/// Untilted panel centered on the beam axis, `distance` mm downstream.
pub fn on_axis_panel(rows: usize, cols: usize, pixel_size: f64, distance: f64) -> PlanarDetector {
    PlanarDetector::new(PlanarDetectorConfig {
        rows,
        cols,
        pixel_size: [pixel_size, pixel_size],
        translation: [0.0, 0.0, -distance],
        ..Default::default()
    })
    .expect("valid on-axis panel")
}

/// Off-axis panel tilted toward the pinhole, with mild barrel distortion.
pub fn side_panel() -> PlanarDetector {
    PlanarDetector::new(PlanarDetectorConfig {
        rows: 24,
        cols: 32,
        pixel_size: [2.5, 2.0],
        tilt: [0.0, 0.35, 0.05],
        translation: [45.0, -10.0, -80.0],
        distortion: PanelDistortion::Radial(RadialDistortion::new(-4e-6, 0.0, 0.0)),
        ..Default::default()
    })
    .expect("valid side panel")
}

/// Two-panel pinhole camera with a slightly tilted beam.
pub fn pinhole_camera() -> Instrument {
    let beam = Vector3::new(0.02, -0.01, -1.0).normalize();
    Instrument::new(InstrumentConfig {
        beam_vector: beam,
        source_distance: SOURCE_DISTANCE,
        ..Default::default()
    })
    .and_then(|i| i.with_detector("IMAGE-PLATE-1", on_axis_panel(20, 20, 3.0, 60.0)))
    .and_then(|i| i.with_detector("IMAGE-PLATE-2", side_panel()))
    .expect("valid instrument")
}

/// Panel reporting angles about a tilted beam, outside any instrument.
pub fn tilted_beam_panel() -> PlanarDetector {
    let mut det = side_panel();
    det.set_beam_frame(BeamFrame::CANONICAL.with_beam(Vector3::new(-0.03, 0.02, -1.0)));
    det
}

/// Gaussian cloud of detector points around the panel center.
pub fn random_points(seed: u64, n: usize, sigma_mm: f64) -> Vec<[f64; 2]> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, sigma_mm).expect("valid sigma");
    (0..n)
        .map(|_| [normal.sample(&mut rng), normal.sample(&mut rng)])
        .collect()
}

pub fn assert_close(actual: f64, expected: f64, tol: f64, what: &str) {
    assert!(
        (actual - expected).abs() <= tol,
        "{what}: expected {expected:.12e}, got {actual:.12e} (tol {tol:.1e})"
    );
}
