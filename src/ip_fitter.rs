//! Per-event interaction-point fit.
//!
//! Fits all supplied tracks to a common point and trims the worst
//! chi-squared contributor until the fit probability clears a threshold,
//! yielding an [`InteractionPoint`] for the vertexing pipeline. Callers fall
//! back to a configured default IP when too few tracks survive.

use log::{debug, warn};
use nalgebra::Vector3;

use crate::error::{Error, Result};
use crate::event::{InteractionPoint, Track};
use crate::fitter::{fit_vertex, FitObject, FitParams};

/// Knobs for the iterative IP fit.
#[derive(Clone, Debug)]
pub struct IpFitParams {
    /// Tracks are removed until the fit probability reaches this threshold.
    pub probability_threshold: f64,
    pub fit: FitParams,
}

impl Default for IpFitParams {
    fn default() -> Self {
        Self {
            probability_threshold: 0.01,
            fit: FitParams::default(),
        }
    }
}

/// Fit the event IP from `tracks`, trimming the worst contributor while the
/// chi-squared probability stays below the threshold.
///
/// Fails with [`Error::InsufficientTracks`] when fewer than two tracks
/// remain before the threshold is met, and with the underlying fit error if
/// even the first full fit degenerates.
pub fn fit_event_ip(tracks: &[Track], params: &IpFitParams) -> Result<InteractionPoint> {
    let mut members: Vec<&Track> = tracks.iter().collect();
    if members.len() < 2 {
        return Err(Error::InsufficientTracks {
            found: members.len(),
        });
    }

    let mut seed = Vector3::zeros();
    loop {
        let objects: Vec<FitObject<'_>> = members.iter().map(|&t| FitObject::Track(t)).collect();
        let fit = fit_vertex(&objects, &seed, &params.fit)?;
        let ndf = 2 * members.len() as i32 - 3;
        let prob = chi2_probability(fit.total_chi2(), ndf.max(1) as f64);
        if prob >= params.probability_threshold {
            debug!(
                "IP fit converged with {} tracks, chi2 {:.2}, prob {:.4}",
                members.len(),
                fit.total_chi2(),
                prob
            );
            return Ok(InteractionPoint::new(fit.position, fit.covariance));
        }
        let worst = fit
            .chi2
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0);
        debug!(
            "IP fit prob {:.4} below threshold, dropping track {}",
            prob, members[worst].id
        );
        members.remove(worst);
        if members.len() < 2 {
            warn!("IP fit ran out of tracks before reaching probability threshold");
            return Err(Error::InsufficientTracks {
                found: members.len(),
            });
        }
        seed = fit.position;
    }
}

/// Upper-tail chi-squared probability `P(chi2' >= chi2 | ndf)`, the
/// regularized upper incomplete gamma function `Q(ndf/2, chi2/2)`.
pub fn chi2_probability(chi2: f64, ndf: f64) -> f64 {
    if chi2 <= 0.0 {
        return 1.0;
    }
    gamma_q(0.5 * ndf, 0.5 * chi2)
}

fn gamma_q(a: f64, x: f64) -> f64 {
    if x < a + 1.0 {
        1.0 - gamma_p_series(a, x)
    } else {
        gamma_q_continued_fraction(a, x)
    }
}

fn gamma_p_series(a: f64, x: f64) -> f64 {
    let mut ap = a;
    let mut sum = 1.0 / a;
    let mut del = sum;
    for _ in 0..200 {
        ap += 1.0;
        del *= x / ap;
        sum += del;
        if del.abs() < sum.abs() * 1e-14 {
            break;
        }
    }
    sum * (-x + a * x.ln() - ln_gamma(a)).exp()
}

fn gamma_q_continued_fraction(a: f64, x: f64) -> f64 {
    let tiny = 1e-300;
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / tiny;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..200 {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < tiny {
            d = tiny;
        }
        c = b + an / c;
        if c.abs() < tiny {
            c = tiny;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < 1e-14 {
            break;
        }
    }
    h * (-x + a * x.ln() - ln_gamma(a)).exp()
}

/// Lanczos approximation, g = 5, n = 6.
fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 6] = [
        76.180_091_729_471_46,
        -86.505_320_329_416_77,
        24.014_098_240_830_91,
        -1.231_739_572_450_155,
        0.120_865_097_386_617_5e-2,
        -0.539_523_938_495_3e-5,
    ];
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut ser = 1.000_000_000_190_015;
    for c in COEFFS {
        y += 1.0;
        ser += c / y;
    }
    -tmp + (2.506_628_274_631_000_5 * ser / x).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helix::{Cov5, Helix, PerigeeParams};
    use nalgebra::Vector3;

    fn track_with_d0(id: u32, d0: f64, phi0: f64) -> Track {
        let mut cov = Cov5::zeros();
        cov[(0, 0)] = 1e-4;
        cov[(1, 1)] = 1e-8;
        cov[(2, 2)] = 1e-14;
        cov[(3, 3)] = 1e-4;
        cov[(4, 4)] = 1e-8;
        Track::new(
            id,
            Helix::new(
                Vector3::zeros(),
                PerigeeParams {
                    d0,
                    phi0,
                    omega: 0.0,
                    z0: 0.0,
                    tan_lambda: 0.0,
                },
                cov,
            ),
        )
    }

    #[test]
    fn chi2_probability_matches_known_values() {
        // P(chi2 >= 0) = 1, and for 2 dof the tail is exp(-x/2).
        assert!((chi2_probability(0.0, 2.0) - 1.0).abs() < 1e-12);
        assert!((chi2_probability(4.0, 2.0) - (-2.0f64).exp()).abs() < 1e-9);
        assert!((chi2_probability(1.0, 1.0) - 0.3173).abs() < 1e-3);
        assert!(chi2_probability(100.0, 3.0) < 1e-10);
    }

    #[test]
    fn consistent_tracks_fit_without_trimming() {
        let tracks = vec![
            track_with_d0(0, 0.0, 0.3),
            track_with_d0(1, 0.0, 1.5),
            track_with_d0(2, 0.0, -0.8),
        ];
        let ip = fit_event_ip(&tracks, &IpFitParams::default()).unwrap();
        assert!(ip.position.norm() < 0.01, "IP at {:?}", ip.position);
    }

    #[test]
    fn displaced_track_is_trimmed_away() {
        let tracks = vec![
            track_with_d0(0, 0.0, 0.3),
            track_with_d0(1, 0.0, 1.5),
            track_with_d0(2, 0.0, -0.8),
            // 2 mm off with 10 micron errors: hopeless outlier.
            track_with_d0(3, 2.0, 0.9),
        ];
        let ip = fit_event_ip(&tracks, &IpFitParams::default()).unwrap();
        assert!(ip.position.norm() < 0.01, "IP at {:?}", ip.position);
    }

    #[test]
    fn one_track_is_insufficient() {
        let tracks = vec![track_with_d0(0, 0.0, 0.3)];
        let err = fit_event_ip(&tracks, &IpFitParams::default()).unwrap_err();
        assert_eq!(err, Error::InsufficientTracks { found: 1 });
    }
}
