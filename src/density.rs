//! Gaussian "tube" density functions.
//!
//! Each track contributes an unnormalized Gaussian
//! `f(r) = exp(-0.5 (r - p)' V^-1 (r - p))` where `p` is the point of closest
//! approach of the trajectory to the query point and `V` the spatial track
//! covariance there. The interaction point contributes the analogous density
//! with its fixed position and covariance.
//!
//! Positive-definiteness is checked with a Cholesky factorization; a failure
//! surfaces as [`Error::DegenerateCovariance`] so the caller can exclude the
//! offending object instead of propagating NaNs.

use nalgebra::{Cholesky, Matrix3, Vector3};

use crate::error::{Error, Result};
use crate::event::{InteractionPoint, Track, IP_ID};

/// Tube density of a track at `r`, evaluated at the true-helix closest
/// approach to `r`.
pub fn tube_density(track: &Track, r: &Vector3<f64>) -> Result<f64> {
    let s = track.helix.closest_phase_to(r);
    let p = track.helix.position_at(s);
    let cov = track.helix.position_covariance_at(s);
    gaussian_weight(&p, &cov, r).ok_or(Error::DegenerateCovariance { id: track.id })
}

/// Tube density of the interaction point pseudo-track at `r`.
pub fn ip_density(ip: &InteractionPoint, r: &Vector3<f64>) -> Result<f64> {
    gaussian_weight(&ip.position, &ip.covariance, r)
        .ok_or(Error::DegenerateCovariance { id: IP_ID })
}

/// `exp(-0.5 d' V^-1 d)` via Cholesky solve; `None` when `cov` is not
/// positive-definite.
fn gaussian_weight(p: &Vector3<f64>, cov: &Matrix3<f64>, r: &Vector3<f64>) -> Option<f64> {
    let chol = Cholesky::new(*cov)?;
    let d = r - p;
    let md2 = d.dot(&chol.solve(&d));
    if !md2.is_finite() {
        return None;
    }
    Some((-0.5 * md2).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helix::{Cov5, Helix, PerigeeParams};

    fn x_axis_track(id: u32, sigma: f64) -> Track {
        let mut cov = Cov5::zeros();
        cov[(0, 0)] = sigma * sigma; // d0
        cov[(1, 1)] = 1e-6; // phi0
        cov[(2, 2)] = 1e-12; // omega
        cov[(3, 3)] = sigma * sigma; // z0
        cov[(4, 4)] = 1e-6; // tan_lambda
        Track::new(
            id,
            Helix::new(
                Vector3::zeros(),
                PerigeeParams {
                    d0: 0.0,
                    phi0: 0.0,
                    omega: 0.0,
                    z0: 0.0,
                    tan_lambda: 0.0,
                },
                cov,
            ),
        )
    }

    #[test]
    fn density_is_one_on_trajectory_and_falls_off() {
        let track = x_axis_track(0, 0.01);
        let on = tube_density(&track, &Vector3::new(2.0, 0.0, 0.0)).unwrap();
        assert!((on - 1.0).abs() < 1e-6, "on-track density {on}");
        let near = tube_density(&track, &Vector3::new(2.0, 0.005, 0.0)).unwrap();
        let far = tube_density(&track, &Vector3::new(2.0, 0.05, 0.0)).unwrap();
        assert!(on > near && near > far);
        assert!(far < 1e-4);
    }

    #[test]
    fn singular_covariance_is_rejected() {
        let mut track = x_axis_track(7, 0.01);
        track.helix.covariance = Cov5::zeros();
        let err = tube_density(&track, &Vector3::new(1.0, 0.0, 0.0)).unwrap_err();
        assert_eq!(err, Error::DegenerateCovariance { id: 7 });
    }

    #[test]
    fn ip_density_peaks_at_ip() {
        let ip = InteractionPoint::new(Vector3::zeros(), Matrix3::identity() * 1e-4);
        let at = ip_density(&ip, &Vector3::zeros()).unwrap();
        assert!((at - 1.0).abs() < 1e-12);
        let off = ip_density(&ip, &Vector3::new(0.05, 0.0, 0.0)).unwrap();
        assert!(off < at);
    }
}
