//! Radial panel distortion: r_measured = r × (1 + k1·r² + k2·r⁴ + k3·r⁶).
//!
//! Coordinates are detector-plane millimeters relative to the panel center.

const NEWTON_STEPS: usize = 20;
const NEWTON_TOL: f64 = 1e-12;
/// Points closer than this to the panel center are left as measured (mm).
const RADIUS_FLOOR: f64 = 1e-12;

/// Radial distortion with up to 3 coefficients (mm⁻², mm⁻⁴, mm⁻⁶).
///
/// The forward model maps an ideal radius `r` to the radius where the signal
/// lands on the panel:
///
/// ```text
/// r_m = r × (1 + k1·r² + k2·r⁴ + k3·r⁶)
/// ```
///
/// Correcting a measured point inverts this by Newton-Raphson iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadialDistortion {
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
}

impl RadialDistortion {
    /// Coefficients in mm⁻², mm⁻⁴ and mm⁻⁶.
    pub fn new(k1: f64, k2: f64, k3: f64) -> Self {
        Self { k1, k2, k3 }
    }

    /// Radial scale factor `s(r²)`.
    fn scale(&self, r2: f64) -> f64 {
        1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3))
    }

    /// `ds/d(r²)`.
    fn scale_slope(&self, r2: f64) -> f64 {
        self.k1 + r2 * (2.0 * self.k2 + 3.0 * r2 * self.k3)
    }

    /// Ideal → measured.
    pub fn distort(&self, x: f64, y: f64) -> (f64, f64) {
        let s = self.scale(x * x + y * y);
        (x * s, y * s)
    }

    /// Measured → ideal.
    pub fn undistort(&self, x_m: f64, y_m: f64) -> (f64, f64) {
        let r_m = x_m.hypot(y_m);
        if r_m < RADIUS_FLOOR {
            return (x_m, y_m);
        }

        // Newton on g(r) = r·s(r²) − r_m, with g'(r) = s(r²) + 2r²·s'(r²).
        let mut r = r_m;
        for _ in 0..NEWTON_STEPS {
            let r2 = r * r;
            let s = self.scale(r2);
            let step = (r * s - r_m) / (s + 2.0 * r2 * self.scale_slope(r2));
            r -= step;
            if step.abs() < NEWTON_TOL {
                break;
            }
        }

        let ratio = r / r_m;
        (x_m * ratio, y_m * ratio)
    }

    /// True when every coefficient is zero.
    pub fn is_zero(&self) -> bool {
        self.k1 == 0.0 && self.k2 == 0.0 && self.k3 == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undistort_inverts_distort() {
        // Barrel distortion of a few tens of microns at the corner of a 400 mm panel.
        let d = RadialDistortion::new(-2e-9, 1e-15, 0.0);
        for &(x, y) in &[(10.0, 20.0), (150.0, -90.0), (0.0, 200.0), (-180.0, -180.0)] {
            let (xm, ym) = d.distort(x, y);
            let (xu, yu) = d.undistort(xm, ym);
            assert!(
                (xu - x).abs() < 1e-9 && (yu - y).abs() < 1e-9,
                "({x}, {y}) came back as ({xu}, {yu})"
            );
        }
    }

    #[test]
    fn test_center_is_fixed() {
        let d = RadialDistortion::new(-1e-6, 1e-12, 0.0);
        assert_eq!(d.undistort(0.0, 0.0), (0.0, 0.0));
        assert_eq!(d.distort(0.0, 0.0), (0.0, 0.0));
    }

    #[test]
    fn test_scale_slope_matches_finite_difference() {
        let d = RadialDistortion::new(-3e-6, 2e-11, -1e-16);
        let h = 1e-3;
        for r2 in [0.0, 400.0, 2.5e4] {
            let fd = (d.scale(r2 + h) - d.scale(r2 - h)) / (2.0 * h);
            let slope = d.scale_slope(r2);
            assert!((fd - slope).abs() < 1e-12, "r² = {r2}: {fd:e} vs {slope:e}");
        }
    }
}
