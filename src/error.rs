//! Error type shared by the geometry, detector, and correction modules.

use thiserror::Error;

/// Errors raised while building geometry or evaluating corrections.
///
/// Analytic singularities in the correction formulas are never reported here;
/// they surface as non-finite values in the returned angles.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A scalar parameter was rejected (non-finite length, bad pixel size, ...).
    #[error("invalid parameter `{name}`: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    /// The beam and azimuth reference vectors do not span a plane.
    #[error("beam vector and eta reference vector must not be colinear")]
    ColinearFrame,

    /// A coordinate batch with zero rows was passed to an angle conversion.
    #[error("coordinate batch is empty")]
    EmptyBatch,

    /// A detector was configured with zero rows or columns.
    #[error("detector panel has no pixels ({rows}x{cols})")]
    EmptyPanel { rows: usize, cols: usize },

    /// No detector with this key exists in the instrument.
    #[error("unknown detector `{0}`")]
    UnknownDetector(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Reject NaN and infinite lengths.
pub(crate) fn finite(name: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::InvalidParameter { name, value })
    }
}

/// Reject NaN; infinities are meaningful (e.g. a source at infinity).
pub(crate) fn not_nan(name: &'static str, value: f64) -> Result<f64> {
    if value.is_nan() {
        Err(Error::InvalidParameter { name, value })
    } else {
        Ok(value)
    }
}
