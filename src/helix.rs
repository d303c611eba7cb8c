//! Perigee helix parametrization and the geometric queries the vertexing
//! stages need: position along the trajectory, closest approach to an
//! arbitrary space point, and propagation of the 5x5 parameter covariance to
//! a 3x3 spatial covariance at that point.
//!
//! The closest-approach search works on the true helical trajectory (coarse
//! bracketing scan followed by Newton polishing of the distance derivative).
//! No parabolic small-angle approximation is used anywhere.
//!
//! Units are millimetres; angles in radians. Curvature `omega` is signed,
//! `1/omega` the signed radius in the transverse plane.

use nalgebra::{Matrix3, SMatrix, Vector3};
use serde::Serialize;

/// 5x5 covariance of the perigee parameters, ordered
/// `(d0, phi0, omega, z0, tan_lambda)`.
pub type Cov5 = SMatrix<f64, 5, 5>;

/// Below this |omega| the trajectory is evaluated in its straight-line limit.
const OMEGA_EPS: f64 = 1e-9;

/// Coarse samples used to bracket the closest approach before polishing.
const SCAN_STEPS: usize = 64;
const NEWTON_ITERS: usize = 12;
const NEWTON_TOL: f64 = 1e-9;

/// Perigee parameters at the point of closest approach to the reference.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerigeeParams {
    /// Signed transverse impact parameter (mm).
    pub d0: f64,
    /// Azimuth of the transverse momentum at the perigee.
    pub phi0: f64,
    /// Signed transverse curvature (1/mm).
    pub omega: f64,
    /// Longitudinal offset at the perigee (mm).
    pub z0: f64,
    /// Dip slope dz/ds, with `s` the transverse arc length.
    pub tan_lambda: f64,
}

/// A measured trajectory: perigee parameters relative to a reference point
/// plus their covariance.
#[derive(Clone, Debug)]
pub struct Helix {
    pub reference: Vector3<f64>,
    pub params: PerigeeParams,
    pub covariance: Cov5,
}

impl Helix {
    pub fn new(reference: Vector3<f64>, params: PerigeeParams, covariance: Cov5) -> Self {
        Self {
            reference,
            params,
            covariance,
        }
    }

    /// The perigee point itself (transverse closest approach to the reference).
    pub fn perigee(&self) -> Vector3<f64> {
        position_at(&self.reference, &self.params, 0.0)
    }

    /// Position at transverse arc length `s` from the perigee.
    pub fn position_at(&self, s: f64) -> Vector3<f64> {
        position_at(&self.reference, &self.params, s)
    }

    /// Unit tangent at transverse arc length `s`.
    pub fn direction_at(&self, s: f64) -> Vector3<f64> {
        let p = &self.params;
        let phi = p.phi0 + p.omega * s;
        Vector3::new(phi.cos(), phi.sin(), p.tan_lambda).normalize()
    }

    /// Transverse arc length of the trajectory point closest to `r`.
    ///
    /// Brackets the minimum with a coarse scan over a window sized by the
    /// distance of `r` from the perigee, then polishes with Newton steps on
    /// the derivative of the squared distance. Falls back to the best scanned
    /// sample if the polish wanders out of the window.
    pub fn closest_phase_to(&self, r: &Vector3<f64>) -> f64 {
        let span = (r - self.perigee()).norm().max(1.0) * 2.0;
        let mut best_s = 0.0;
        let mut best_d2 = f64::INFINITY;
        for i in 0..=SCAN_STEPS {
            let s = -span + 2.0 * span * (i as f64) / (SCAN_STEPS as f64);
            let d2 = (self.position_at(s) - r).norm_squared();
            if d2 < best_d2 {
                best_d2 = d2;
                best_s = s;
            }
        }

        let mut s = best_s;
        for _ in 0..NEWTON_ITERS {
            let (g, h) = self.distance_derivatives(s, r);
            if h.abs() < 1e-12 {
                break;
            }
            let step = g / h;
            s -= step;
            if !s.is_finite() || s.abs() > 2.0 * span {
                return best_s;
            }
            if step.abs() < NEWTON_TOL {
                break;
            }
        }
        if (self.position_at(s) - r).norm_squared() <= best_d2 {
            s
        } else {
            best_s
        }
    }

    /// Point on the trajectory closest to `r`.
    pub fn closest_point_to(&self, r: &Vector3<f64>) -> Vector3<f64> {
        self.position_at(self.closest_phase_to(r))
    }

    /// 3x3 spatial covariance of the trajectory point at arc length `s`,
    /// propagated from the perigee covariance through the position Jacobian
    /// (central differences in each of the five parameters).
    pub fn position_covariance_at(&self, s: f64) -> Matrix3<f64> {
        let mut jac = SMatrix::<f64, 3, 5>::zeros();
        let base = [
            self.params.d0,
            self.params.phi0,
            self.params.omega,
            self.params.z0,
            self.params.tan_lambda,
        ];
        for k in 0..5 {
            let h = 1e-6 * (1.0 + base[k].abs());
            let mut lo = base;
            let mut hi = base;
            lo[k] -= h;
            hi[k] += h;
            let p_lo = position_at(&self.reference, &params_from(&lo), s);
            let p_hi = position_at(&self.reference, &params_from(&hi), s);
            let col = (p_hi - p_lo) / (2.0 * h);
            for row in 0..3 {
                jac[(row, k)] = col[row];
            }
        }
        jac * self.covariance * jac.transpose()
    }

    /// First and second derivatives of `0.5 * |pos(s) - r|^2`.
    fn distance_derivatives(&self, s: f64, r: &Vector3<f64>) -> (f64, f64) {
        let p = &self.params;
        let phi = p.phi0 + p.omega * s;
        let tangent = Vector3::new(phi.cos(), phi.sin(), p.tan_lambda);
        let curvature = Vector3::new(-phi.sin() * p.omega, phi.cos() * p.omega, 0.0);
        let delta = self.position_at(s) - r;
        let g = delta.dot(&tangent);
        let h = tangent.norm_squared() + delta.dot(&curvature);
        (g, h)
    }
}

fn params_from(v: &[f64; 5]) -> PerigeeParams {
    PerigeeParams {
        d0: v[0],
        phi0: v[1],
        omega: v[2],
        z0: v[3],
        tan_lambda: v[4],
    }
}

fn position_at(reference: &Vector3<f64>, p: &PerigeeParams, s: f64) -> Vector3<f64> {
    let perigee = Vector3::new(
        reference.x - p.d0 * p.phi0.sin(),
        reference.y + p.d0 * p.phi0.cos(),
        reference.z + p.z0,
    );
    if p.omega.abs() < OMEGA_EPS {
        perigee + Vector3::new(s * p.phi0.cos(), s * p.phi0.sin(), s * p.tan_lambda)
    } else {
        let phi = p.phi0 + p.omega * s;
        perigee
            + Vector3::new(
                (phi.sin() - p.phi0.sin()) / p.omega,
                -(phi.cos() - p.phi0.cos()) / p.omega,
                s * p.tan_lambda,
            )
    }
}
