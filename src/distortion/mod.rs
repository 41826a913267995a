//! Panel distortion applied by a detector before angle conversion.
//!
//! A detector's measured coordinates are first corrected ("applied") into ideal
//! detector-plane coordinates; the ray geometry then runs on the corrected
//! points. The correction models deliberately bypass this step where the
//! reference behavior does (see [`crate::correction`]).

pub mod radial;

pub use radial::RadialDistortion;

/// Detector panel distortion model.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PanelDistortion {
    /// Measured coordinates are already ideal.
    #[default]
    None,
    /// Radially symmetric distortion about the panel center.
    Radial(RadialDistortion),
}

impl PanelDistortion {
    /// Measured → ideal detector coordinates.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            PanelDistortion::None => (x, y),
            PanelDistortion::Radial(r) => r.undistort(x, y),
        }
    }

    /// Ideal → measured detector coordinates.
    pub fn apply_inverse(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            PanelDistortion::None => (x, y),
            PanelDistortion::Radial(r) => r.distort(x, y),
        }
    }

    /// Correct a whole batch of measured points.
    pub fn apply_batch(&self, xy: &[[f64; 2]]) -> Vec<[f64; 2]> {
        xy.iter()
            .map(|&[x, y]| {
                let (u, v) = self.apply(x, y);
                [u, v]
            })
            .collect()
    }

    /// True when the model leaves coordinates unchanged.
    pub fn is_none(&self) -> bool {
        match self {
            PanelDistortion::None => true,
            PanelDistortion::Radial(r) => r.is_zero(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_undoes_apply_inverse() {
        let none = PanelDistortion::None;
        assert_eq!(none.apply_inverse(3.0, -4.0), (3.0, -4.0));

        let radial = PanelDistortion::Radial(RadialDistortion::new(-5e-6, 0.0, 0.0));
        let (xm, ym) = radial.apply_inverse(60.0, 80.0);
        // r = 100 mm shrinks by k1·r² = 5%.
        assert!((xm - 57.0).abs() < 1e-12 && (ym - 76.0).abs() < 1e-12, "({xm}, {ym})");
        let (x, y) = radial.apply(xm, ym);
        assert!((x - 60.0).abs() < 1e-9 && (y - 80.0).abs() < 1e-9, "({x}, {y})");
        assert!(!radial.is_none());
    }
}
