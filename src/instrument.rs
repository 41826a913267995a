//! Pinhole-camera instrument: detector panels sharing one beam and source.

use std::collections::BTreeMap;

use anyhow::{ensure, Context};
use tracing::debug;

use crate::detector::{AngleConversion, PlanarDetector};
use crate::error::{Error, Result};
use crate::transforms::{BeamFrame, BEAM_VEC, ETA_VEC};
use crate::Vector3;

/// Instrument-wide geometry.
#[derive(Debug, Clone)]
pub struct InstrumentConfig {
    /// Beam propagation direction. Default lab −Z.
    pub beam_vector: Vector3,
    /// Azimuth reference direction. Default lab +X.
    pub eta_vector: Vector3,
    /// Distance from the pinhole center to the X-ray source in mm.
    /// Default `+∞` (parallel incident beam).
    pub source_distance: f64,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            beam_vector: BEAM_VEC,
            eta_vector: ETA_VEC,
            source_distance: f64::INFINITY,
        }
    }
}

/// Keyed set of planar detectors behind a common pinhole.
///
/// Every detector reports angles in the instrument's beam frame; adding a
/// detector or changing the beam vector keeps them in sync.
#[derive(Debug, Clone)]
pub struct Instrument {
    frame: BeamFrame,
    source_distance: f64,
    detectors: BTreeMap<String, PlanarDetector>,
}

impl Instrument {
    /// Build an empty instrument, validating the beam frame and source distance.
    pub fn new(config: InstrumentConfig) -> anyhow::Result<Self> {
        ensure!(
            !config.source_distance.is_nan(),
            "source distance must be a number"
        );
        let frame = BeamFrame::new(config.beam_vector, config.eta_vector);
        frame
            .eta_rot_mat()
            .context("beam vector and eta vector do not define an azimuth frame")?;
        Ok(Self {
            frame,
            source_distance: config.source_distance,
            detectors: BTreeMap::new(),
        })
    }

    /// Register a panel under `key`, taking over its beam frame.
    pub fn add_detector(
        &mut self,
        key: impl Into<String>,
        mut detector: PlanarDetector,
    ) -> anyhow::Result<()> {
        let key = key.into();
        ensure!(
            !self.detectors.contains_key(&key),
            "detector `{key}` is already registered"
        );
        detector.set_beam_frame(self.frame);
        let (rows, cols) = detector.shape();
        debug!("Added detector {} ({}x{})", key, rows, cols);
        self.detectors.insert(key, detector);
        Ok(())
    }

    /// Builder form of [`Instrument::add_detector`].
    pub fn with_detector(
        mut self,
        key: impl Into<String>,
        detector: PlanarDetector,
    ) -> anyhow::Result<Self> {
        self.add_detector(key, detector)?;
        Ok(self)
    }

    pub fn beam_vector(&self) -> &Vector3 {
        &self.frame.beam
    }

    pub fn eta_vector(&self) -> &Vector3 {
        &self.frame.eta
    }

    pub fn beam_frame(&self) -> &BeamFrame {
        &self.frame
    }

    /// Source-to-pinhole distance in mm, `+∞` for a parallel beam.
    pub fn source_distance(&self) -> f64 {
        self.source_distance
    }

    /// Point the beam somewhere else; every detector follows.
    pub fn set_beam_vector(&mut self, beam: Vector3) -> Result<()> {
        let frame = self.frame.with_beam(beam);
        frame.eta_rot_mat()?;
        self.frame = frame;
        for det in self.detectors.values_mut() {
            det.set_beam_frame(frame);
        }
        Ok(())
    }

    /// Change the source distance. NaN is rejected; `+∞` is allowed.
    pub fn set_source_distance(&mut self, distance: f64) -> Result<()> {
        if distance.is_nan() {
            return Err(Error::InvalidParameter {
                name: "source_distance",
                value: distance,
            });
        }
        self.source_distance = distance;
        Ok(())
    }

    /// Detectors in key order.
    pub fn detectors(&self) -> impl Iterator<Item = (&str, &PlanarDetector)> {
        self.detectors.iter().map(|(k, d)| (k.as_str(), d))
    }

    /// Look up a detector by key.
    pub fn detector(&self, key: &str) -> Result<&PlanarDetector> {
        self.detectors
            .get(key)
            .ok_or_else(|| Error::UnknownDetector(key.to_string()))
    }

    pub fn num_detectors(&self) -> usize {
        self.detectors.len()
    }
}
