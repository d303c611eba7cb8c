//! Builders for straight toy tracks with realistic (10 micron) errors.

use nalgebra::{Matrix3, Vector3};
use zvtop::helix::{Cov5, Helix, PerigeeParams};
use zvtop::{InteractionPoint, Jet, Track};

/// Diagonal perigee covariance: 10 micron impact-parameter errors with
/// small, non-degenerate angular terms.
pub fn standard_cov() -> Cov5 {
    let mut cov = Cov5::zeros();
    cov[(0, 0)] = 1e-4; // d0 (mm^2)
    cov[(1, 1)] = 1e-8; // phi0
    cov[(2, 2)] = 1e-14; // omega
    cov[(3, 3)] = 1e-4; // z0 (mm^2)
    cov[(4, 4)] = 1e-8; // tan_lambda
    cov
}

/// Straight track through `point` with transverse direction `phi` and dip
/// slope `tan_lambda`, referenced to the origin.
pub fn track_through(id: u32, point: Vector3<f64>, phi: f64, tan_lambda: f64) -> Track {
    let dx = phi.cos();
    let dy = phi.sin();
    // Transverse closest approach of the line to the origin.
    let t_star = -(point.x * dx + point.y * dy);
    let pca_x = point.x + t_star * dx;
    let pca_y = point.y + t_star * dy;
    let d0 = -pca_x * phi.sin() + pca_y * phi.cos();
    // Arc length from the perigee to `point` is -t_star.
    let z0 = point.z - (-t_star) * tan_lambda;
    Track::new(
        id,
        Helix::new(
            Vector3::zeros(),
            PerigeeParams {
                d0,
                phi0: phi,
                omega: 0.0,
                z0,
                tan_lambda,
            },
            standard_cov(),
        ),
    )
}

/// Interaction point at the origin with 5/5/20 micron errors.
pub fn ip_at_origin() -> InteractionPoint {
    InteractionPoint::new(
        Vector3::zeros(),
        Matrix3::from_diagonal(&Vector3::new(
            (5.0e-3_f64).powi(2),
            (5.0e-3_f64).powi(2),
            (20.0e-3_f64).powi(2),
        )),
    )
}

/// A jet along `axis` at 45 GeV.
pub fn jet_along(axis: Vector3<f64>, tracks: Vec<Track>) -> Jet {
    Jet::new(tracks, axis, 45.0)
}

/// Cascade topology: two prompt tracks through the origin and two tracks
/// from a displaced vertex at `secondary`, all inside a jet along +x.
pub fn cascade_jet(secondary: Vector3<f64>) -> Jet {
    let tracks = vec![
        track_through(0, Vector3::zeros(), 0.35, 0.0),
        track_through(1, Vector3::zeros(), -0.3, 0.0),
        track_through(2, secondary, -0.15, 0.3),
        track_through(3, secondary, 0.25, 0.35),
    ];
    jet_along(Vector3::x(), tracks)
}
