//! Typed configuration for the topological vertex finder.
//!
//! Field names follow the historical steering parameters (`IPWeighting`,
//! `JetWeightingEnergyScaling`, `TwoTrackCut`, `TrackTrimCut`,
//! `ResolverCut`); unknown or inconsistent settings are rejected once, at
//! configuration time, by [`ZvtopParams::validate`].

use nalgebra::{Matrix3, Vector3};

use crate::error::Error;
use crate::event::InteractionPoint;
use crate::fitter::FitParams;
use crate::vertex_fn::AscentParams;

/// Finder-wide parameters controlling the multi-stage pipeline.
#[derive(Clone, Debug)]
pub struct ZvtopParams {
    /// Weight `K_IP` of the IP pseudo-track in the vertex function.
    pub ip_weight: f64,
    /// `K_alpha = jet_energy_scaling * jet energy (GeV)`; larger values make
    /// a narrower acceptance cone around the jet axis.
    pub jet_energy_scaling: f64,
    /// Radius (mm) of the cone-suppression cylinder around the jet axis.
    pub cone_radius: f64,
    /// Resolution threshold `R0`: vertex pairs whose valley ratio stays at
    /// or above this are unresolved and will merge.
    pub resolver_cut: f64,
    /// Sample count along the inter-vertex segment for the resolution test.
    pub resolver_samples: usize,
    /// Candidate-pair acceptance: either member's chi-squared must stay
    /// below this (`chi2_0`).
    pub chi2_cut: f64,
    /// Candidate-pair acceptance: `V(r_vert)` must reach this (`V0`).
    pub min_vertex_fn: f64,
    /// Trimming cut on the worst member contribution (`chi2_0TRIM`).
    pub trim_cut: f64,
    /// Whether to form track-IP candidate pairs and weight the IP into the
    /// vertex function.
    pub use_ip: bool,
    /// Fallback IP when the event supplies none.
    pub default_ip_position: Vector3<f64>,
    /// Fallback IP covariance (5 micron transverse, 20 micron longitudinal).
    pub default_ip_covariance: Matrix3<f64>,
    pub fit: FitParams,
    pub ascent: AscentParams,
}

impl Default for ZvtopParams {
    fn default() -> Self {
        Self {
            ip_weight: 1.0,
            jet_energy_scaling: 0.125,
            cone_radius: 0.01,
            resolver_cut: 0.6,
            resolver_samples: 11,
            chi2_cut: 10.0,
            min_vertex_fn: 1e-3,
            trim_cut: 10.0,
            use_ip: true,
            default_ip_position: Vector3::zeros(),
            default_ip_covariance: Matrix3::from_diagonal(&Vector3::new(
                (5.0e-3_f64).powi(2),
                (5.0e-3_f64).powi(2),
                (20.0e-3_f64).powi(2),
            )),
            fit: FitParams::default(),
            ascent: AscentParams::default(),
        }
    }
}

impl ZvtopParams {
    /// Reject inconsistent settings before any event is touched.
    pub fn validate(&self) -> Result<(), Error> {
        if self.ip_weight < 0.0 {
            return Err(Error::Config("ip_weight must be non-negative".into()));
        }
        if self.jet_energy_scaling < 0.0 {
            return Err(Error::Config(
                "jet_energy_scaling must be non-negative".into(),
            ));
        }
        if self.cone_radius < 0.0 {
            return Err(Error::Config("cone_radius must be non-negative".into()));
        }
        if !(self.resolver_cut > 0.0 && self.resolver_cut <= 1.0) {
            return Err(Error::Config("resolver_cut must be in (0, 1]".into()));
        }
        if self.resolver_samples < 2 {
            return Err(Error::Config(
                "resolver_samples must be at least 2 (the endpoints)".into(),
            ));
        }
        if self.chi2_cut <= 0.0 || self.trim_cut <= 0.0 {
            return Err(Error::Config("chi-squared cuts must be positive".into()));
        }
        if self.min_vertex_fn < 0.0 {
            return Err(Error::Config("min_vertex_fn must be non-negative".into()));
        }
        if self.fit.max_iters == 0 || self.fit.position_tol <= 0.0 {
            return Err(Error::Config("fit iteration budget must be positive".into()));
        }
        if self.ascent.max_iters == 0
            || self.ascent.initial_step <= 0.0
            || self.ascent.min_step <= 0.0
            || self.ascent.gradient_step <= 0.0
        {
            return Err(Error::Config("ascent parameters must be positive".into()));
        }
        Ok(())
    }

    /// The fallback IP built from the configured defaults.
    pub fn default_ip(&self) -> InteractionPoint {
        InteractionPoint::new(self.default_ip_position, self.default_ip_covariance)
    }
}
