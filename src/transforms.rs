//! Lab-frame ray geometry: detector-plane points to diffraction angles.
//!
//! # Frames
//!
//! - **Detector frame**: panel-local Cartesian plane, origin at the panel center,
//!   third axis along the panel normal. Detector points always have zero third
//!   component.
//! - **Lab frame**: the detector frame is placed in the lab by a rotation
//!   `rmat_d` and translation `tvec_d`. The nominal ray origin is the lab origin
//!   (the pinhole center).
//! - **Eta frame**: basis with `-beam` as its third axis and the eta reference
//!   vector fixing `η = 0`. Columns are `(Xe, Ye, -b)`.
//!
//! The diffraction angle of a detector point is the angle between the beam and
//! the ray running from the ray origin to that point:
//!
//! ```text
//! P2 = rmat_d · (x, y, 0) + tvec_d
//! P0 = tvec_s + rmat_s · tvec_c
//! d  = unit(P2 - P0)
//! 2θ = acos(b · d)
//! η  = atan2((Reᵀ d)_y, (Reᵀ d)_x)
//! ```

use nalgebra::Rotation3;

use crate::error::{Error, Result};
use crate::{AngleBatch, Matrix3, Vector3};

/// Canonical beam propagation direction (lab −Z).
pub const BEAM_VEC: Vector3 = Vector3::new(0.0, 0.0, -1.0);
/// Canonical azimuth reference direction (lab +X).
pub const ETA_VEC: Vector3 = Vector3::new(1.0, 0.0, 0.0);
/// Zero translation.
pub const ZEROS_3: Vector3 = Vector3::new(0.0, 0.0, 0.0);
/// Machine epsilon used as the norm floor.
pub const EPSF: f64 = f64::EPSILON;

/// Minimum |e × b| for a usable eta frame.
const COLINEAR_TOL: f64 = 1e-8;

/// Identity rotation.
pub fn identity_3x3() -> Matrix3 {
    Matrix3::identity()
}

/// Beam direction plus azimuth reference, the pair that defines (2θ, η).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamFrame {
    /// Beam propagation direction in the lab frame.
    pub beam: Vector3,
    /// Direction that fixes `η = 0`.
    pub eta: Vector3,
}

impl BeamFrame {
    /// Beam along lab −Z, eta reference along lab +X.
    pub const CANONICAL: BeamFrame = BeamFrame {
        beam: BEAM_VEC,
        eta: ETA_VEC,
    };

    pub fn new(beam: Vector3, eta: Vector3) -> Self {
        Self { beam, eta }
    }

    /// Same azimuth reference, different beam direction.
    pub fn with_beam(&self, beam: Vector3) -> Self {
        Self {
            beam,
            eta: self.eta,
        }
    }

    /// Change-of-basis matrix into this frame's eta basis.
    pub fn eta_rot_mat(&self) -> Result<Matrix3> {
        make_eta_frame_rot_mat(&self.beam, &self.eta)
    }
}

impl Default for BeamFrame {
    fn default() -> Self {
        Self::CANONICAL
    }
}

/// Sample rotation and translation plus crystal translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleFrame {
    /// Sample orientation in the lab frame.
    pub rmat_s: Matrix3,
    /// Sample position in the lab frame.
    pub tvec_s: Vector3,
    /// Crystal position in the sample frame.
    pub tvec_c: Vector3,
}

impl SampleFrame {
    /// No rotation and no offsets: rays start at the lab origin.
    pub const IDENTITY: SampleFrame = SampleFrame {
        rmat_s: Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0),
        tvec_s: ZEROS_3,
        tvec_c: ZEROS_3,
    };

    /// Identity sample orientation with the ray origin moved to `origin`.
    pub fn with_origin(origin: Vector3) -> Self {
        Self {
            tvec_c: origin,
            ..Self::IDENTITY
        }
    }

    /// Ray origin in the lab frame.
    pub fn ray_origin(&self) -> Vector3 {
        self.tvec_s + self.rmat_s * self.tvec_c
    }
}

impl Default for SampleFrame {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Normalize `v`; vectors with norm at or below [`EPSF`] are returned as-is.
pub fn unit_vector(v: &Vector3) -> Vector3 {
    let nrm = v.norm();
    if nrm > EPSF {
        v / nrm
    } else {
        *v
    }
}

/// Rotation matrix of an exponential-map vector (axis scaled by angle).
///
/// A zero vector yields exactly the identity.
pub fn rot_mat_of_exp_map(expmap: &Vector3) -> Matrix3 {
    if expmap.norm() <= EPSF {
        return Matrix3::identity();
    }
    Rotation3::new(*expmap).into_inner()
}

/// Eta-frame basis with `-b_hat` as third column and `Ye = unit(e_hat × b_hat)`.
pub fn make_eta_frame_rot_mat(b_hat: &Vector3, e_hat: &Vector3) -> Result<Matrix3> {
    let b = unit_vector(b_hat);
    let e = unit_vector(e_hat);
    let ye = e.cross(&b);
    if ye.norm() < COLINEAR_TOL {
        return Err(Error::ColinearFrame);
    }
    let ye = unit_vector(&ye);
    let xe = b.cross(&ye);
    Ok(Matrix3::from_columns(&[xe, ye, -b]))
}

/// Rotate `v` about the unit axis `k` by `angle` (Rodrigues).
fn rotate_about_axis(v: &Vector3, k: &Vector3, angle: f64) -> Vector3 {
    let (s, c) = angle.sin_cos();
    v * c + k.cross(v) * s + k * (k.dot(v) * (1.0 - c))
}

/// Angles and diffraction vector for one ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayAngles {
    /// Diffraction angle 2θ in radians.
    pub tth: f64,
    /// Azimuth η in radians.
    pub eta: f64,
    /// Unit diffraction (G) vector in the lab frame.
    pub gvec: Vector3,
}

/// Diffraction angles of a single detector point for a ray leaving `P0`.
///
/// `rmat_e` is the eta-frame basis of `frame` (see [`make_eta_frame_rot_mat`]);
/// callers evaluating many points compute it once.
pub fn xy_to_angles(
    xy: [f64; 2],
    rmat_d: &Matrix3,
    tvec_d: &Vector3,
    sample: &SampleFrame,
    b_hat: &Vector3,
    rmat_e: &Matrix3,
) -> RayAngles {
    let p2 = rmat_d * Vector3::new(xy[0], xy[1], 0.0) + tvec_d;
    let d_hat = unit_vector(&(p2 - sample.ray_origin()));

    let tth = b_hat.dot(&d_hat).clamp(-1.0, 1.0).acos();
    let d_e = rmat_e.transpose() * d_hat;
    let eta = d_e.y.atan2(d_e.x);

    // Laue condition: G bisects the incident and diffracted directions.
    // For a ray along the beam the rotation axis is undefined and stays zero.
    let n_g = unit_vector(&b_hat.cross(&d_hat));
    let gvec = rotate_about_axis(&d_hat, &n_g, 0.5 * (std::f64::consts::PI - tth));

    RayAngles { tth, eta, gvec }
}

/// Batch form of [`xy_to_angles`]: (2θ, η) per row plus the G vectors.
pub fn detector_xy_to_gvec(
    xy: &[[f64; 2]],
    rmat_d: &Matrix3,
    tvec_d: &Vector3,
    sample: &SampleFrame,
    frame: &BeamFrame,
) -> Result<(AngleBatch, Vec<Vector3>)> {
    let b_hat = unit_vector(&frame.beam);
    let rmat_e = frame.eta_rot_mat()?;

    let (angs, gvecs) = xy
        .iter()
        .map(|&p| {
            let r = xy_to_angles(p, rmat_d, tvec_d, sample, &b_hat, &rmat_e);
            ([r.tth, r.eta], r.gvec)
        })
        .unzip();
    Ok((angs, gvecs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_eta_frame_is_identity() {
        let r = BeamFrame::CANONICAL.eta_rot_mat().unwrap();
        assert!(
            (r - Matrix3::identity()).norm() < 1e-15,
            "canonical eta frame should be identity, got {r}"
        );
    }

    #[test]
    fn test_colinear_frame_rejected() {
        let frame = BeamFrame::new(BEAM_VEC, Vector3::new(0.0, 0.0, 2.0));
        assert_eq!(frame.eta_rot_mat(), Err(Error::ColinearFrame));
    }

    #[test]
    fn test_unit_vector_leaves_zero_alone() {
        assert_eq!(unit_vector(&ZEROS_3), ZEROS_3);
        let u = unit_vector(&Vector3::new(3.0, 0.0, -4.0));
        assert!((u - Vector3::new(0.6, 0.0, -0.8)).norm() < 1e-15);
    }

    #[test]
    fn test_exp_map_quarter_turn() {
        assert_eq!(rot_mat_of_exp_map(&ZEROS_3), Matrix3::identity());

        let r = rot_mat_of_exp_map(&Vector3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2));
        let v = r * Vector3::new(1.0, 0.0, 0.0);
        assert!(
            (v - Vector3::new(0.0, 1.0, 0.0)).norm() < 1e-12,
            "quarter turn about z should map x to y, got {v}"
        );
    }

    #[test]
    fn test_known_angles_on_axis_detector() {
        // Detector 100 mm downstream; a point 100 mm off axis sits at 2θ = 45°.
        let tvec = Vector3::new(0.0, 0.0, -100.0);
        let pts = [[100.0, 0.0], [0.0, 100.0], [-100.0, 0.0]];
        let (angs, gvecs) = detector_xy_to_gvec(
            &pts,
            &identity_3x3(),
            &tvec,
            &SampleFrame::IDENTITY,
            &BeamFrame::CANONICAL,
        )
        .unwrap();

        let quarter = std::f64::consts::FRAC_PI_4;
        for a in &angs {
            assert!((a[0] - quarter).abs() < 1e-12, "2θ = {}", a[0]);
        }
        assert!(angs[0][1].abs() < 1e-12);
        assert!((angs[1][1] - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((angs[2][1].abs() - std::f64::consts::PI).abs() < 1e-12);

        // G is along d - b: equal projections onto -b and d.
        let d = unit_vector(&Vector3::new(100.0, 0.0, -100.0));
        let g = gvecs[0];
        assert!((g.norm() - 1.0).abs() < 1e-12);
        assert!((g.dot(&-BEAM_VEC) - g.dot(&d)).abs() < 1e-12);
        assert!((g - unit_vector(&(d - BEAM_VEC))).norm() < 1e-12);
    }

    #[test]
    fn test_ray_origin_shifts_angle() {
        let tvec = Vector3::new(0.0, 0.0, -100.0);
        let b_hat = unit_vector(&BEAM_VEC);
        let rmat_e = BeamFrame::CANONICAL.eta_rot_mat().unwrap();

        let nominal = xy_to_angles(
            [100.0, 0.0],
            &identity_3x3(),
            &tvec,
            &SampleFrame::IDENTITY,
            &b_hat,
            &rmat_e,
        );
        // Origin moved 100 mm along +x: the ray now runs straight down the beam.
        let shifted = xy_to_angles(
            [100.0, 0.0],
            &identity_3x3(),
            &tvec,
            &SampleFrame::with_origin(Vector3::new(100.0, 0.0, 0.0)),
            &b_hat,
            &rmat_e,
        );
        assert!((nominal.tth - std::f64::consts::FRAC_PI_4).abs() < 1e-12);
        assert!(shifted.tth.abs() < 1e-7, "shifted 2θ = {}", shifted.tth);
    }
}
