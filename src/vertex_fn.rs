//! The vertex function `V(r)` and its local-maximum search.
//!
//! `V(r)` combines the per-track tube densities with an IP pseudo-track and a
//! jet-axis cone suppression:
//!
//! ```text
//! V(r) = [ k_ip f0 + sum fi - (k_ip f0^2 + sum fi^2) / (k_ip f0 + sum fi) ]
//!        * exp(-k_alpha * alpha(r)^2)
//! ```
//!
//! The bracketed term is near zero wherever fewer than two objects overlap
//! and peaks at track coincidences. `alpha(r)` is the angle between the wall
//! of a thin cylinder around the jet axis (based at the IP) and the line from
//! the base rim to `r`; it is zero inside the cylinder, so on-axis structure
//! is untouched while off-axis coincidences are damped.
//!
//! Tracks whose covariance degenerates at a particular query point are
//! excluded from that evaluation (debug-logged), never turned into NaNs.

use std::f64::consts::FRAC_PI_2;

use log::debug;
use nalgebra::Vector3;
use serde::Serialize;

use crate::density::{ip_density, tube_density};
use crate::event::{InteractionPoint, Jet, Track};

/// Gradient-ascent knobs for the `V(r_max)` search.
#[derive(Clone, Debug)]
pub struct AscentParams {
    /// Iteration budget; exhaustion marks the result unconverged, not failed.
    pub max_iters: usize,
    /// Initial step length (mm).
    pub initial_step: f64,
    /// Step length below which the search is declared converged (mm).
    pub min_step: f64,
    /// Offset used for the numerical gradient (mm).
    pub gradient_step: f64,
}

impl Default for AscentParams {
    fn default() -> Self {
        Self {
            max_iters: 100,
            initial_step: 0.01,
            min_step: 1e-5,
            gradient_step: 1e-4,
        }
    }
}

/// Outcome of the local-maximum search.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ascent {
    pub position: Vector3<f64>,
    pub value: f64,
    /// `false` when the iteration budget ran out first. Unconverged results
    /// are valid but lower-confidence; callers never treat them as fatal.
    pub converged: bool,
}

/// Cone suppression factor around the jet axis.
#[derive(Clone, Debug)]
pub struct ConeWeight {
    base: Vector3<f64>,
    axis: Vector3<f64>,
    radius: f64,
    k_alpha: f64,
}

impl ConeWeight {
    pub fn new(base: Vector3<f64>, axis: Vector3<f64>, radius: f64, k_alpha: f64) -> Self {
        Self {
            base,
            axis,
            radius,
            k_alpha,
        }
    }

    /// Angle between the cylinder wall and the line from the base rim to `r`.
    /// Zero inside the cylinder; pi/2 behind the base plane.
    pub fn alpha(&self, r: &Vector3<f64>) -> f64 {
        let v = r - self.base;
        let along = v.dot(&self.axis);
        let perp = (v - along * self.axis).norm();
        if along <= 0.0 {
            if perp <= self.radius {
                0.0
            } else {
                FRAC_PI_2
            }
        } else if perp <= self.radius {
            0.0
        } else {
            (perp - self.radius).atan2(along)
        }
    }

    pub fn weight(&self, r: &Vector3<f64>) -> f64 {
        let a = self.alpha(r);
        (-self.k_alpha * a * a).exp()
    }
}

/// Read-only evaluator over one jet's tracks (plus the optional weighted IP).
pub struct VertexFunction<'a> {
    tracks: &'a [Track],
    ip: Option<&'a InteractionPoint>,
    ip_weight: f64,
    cone: Option<ConeWeight>,
    ascent: AscentParams,
}

impl<'a> VertexFunction<'a> {
    pub fn new(
        jet: &'a Jet,
        ip: Option<&'a InteractionPoint>,
        ip_weight: f64,
        cone: Option<ConeWeight>,
        ascent: AscentParams,
    ) -> Self {
        Self {
            tracks: jet.tracks(),
            ip,
            ip_weight,
            cone,
            ascent,
        }
    }

    /// `V(r)`. Defined as zero when the density sum vanishes.
    pub fn eval(&self, r: &Vector3<f64>) -> f64 {
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        if let Some(ip) = self.ip {
            match ip_density(ip, r) {
                Ok(f0) => {
                    sum += self.ip_weight * f0;
                    sum_sq += self.ip_weight * f0 * f0;
                }
                Err(err) => debug!("vertex function: skipping IP at {r:?}: {err}"),
            }
        }
        for track in self.tracks {
            match tube_density(track, r) {
                Ok(f) => {
                    sum += f;
                    sum_sq += f * f;
                }
                Err(err) => debug!("vertex function: skipping track at {r:?}: {err}"),
            }
        }
        if sum <= f64::MIN_POSITIVE {
            return 0.0;
        }
        let bare = sum - sum_sq / sum;
        match &self.cone {
            Some(cone) => bare * cone.weight(r),
            None => bare,
        }
    }

    /// Steepest-ascent search for the local maximum of `V` starting at `seed`.
    ///
    /// The step shrinks whenever a trial point does not improve and grows
    /// mildly after an accepted move; the search stops once the step falls
    /// below `min_step` or the budget is exhausted.
    pub fn ascend(&self, seed: &Vector3<f64>) -> Ascent {
        let mut r = *seed;
        let mut value = self.eval(&r);
        let mut step = self.ascent.initial_step;
        let mut converged = false;
        for _ in 0..self.ascent.max_iters {
            if step < self.ascent.min_step {
                converged = true;
                break;
            }
            let g = self.gradient(&r);
            let norm = g.norm();
            if norm < 1e-30 {
                converged = true;
                break;
            }
            let trial = r + g * (step / norm);
            let trial_value = self.eval(&trial);
            if trial_value > value {
                r = trial;
                value = trial_value;
                step *= 1.2;
            } else {
                step *= 0.5;
            }
        }
        Ascent {
            position: r,
            value,
            converged,
        }
    }

    fn gradient(&self, r: &Vector3<f64>) -> Vector3<f64> {
        let h = self.ascent.gradient_step;
        let mut g = Vector3::zeros();
        for k in 0..3 {
            let mut hi = *r;
            let mut lo = *r;
            hi[k] += h;
            lo[k] -= h;
            g[k] = (self.eval(&hi) - self.eval(&lo)) / (2.0 * h);
        }
        g
    }
}
