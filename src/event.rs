//! Per-event input model: tracks, the interaction point, and jets.
//!
//! These are immutable snapshots for the duration of one jet's vertexing;
//! the finder never mutates them and holds only shared references.

use nalgebra::{Matrix3, Vector3};

use crate::helix::Helix;

/// Pseudo-id used for the interaction point where an object id is needed
/// alongside track ids (diagnostics, error reporting).
pub const IP_ID: u32 = u32::MAX;

/// A measured track. Read-only to every algorithm component.
#[derive(Clone, Debug)]
pub struct Track {
    /// Unique within the event; drives every deterministic tie-break.
    pub id: u32,
    pub helix: Helix,
}

impl Track {
    pub fn new(id: u32, helix: Helix) -> Self {
        Self { id, helix }
    }
}

/// The nominal primary collision vertex, acting as a pseudo-track with a
/// fixed position rather than a trajectory.
#[derive(Clone, Debug)]
pub struct InteractionPoint {
    pub position: Vector3<f64>,
    pub covariance: Matrix3<f64>,
}

impl InteractionPoint {
    pub fn new(position: Vector3<f64>, covariance: Matrix3<f64>) -> Self {
        Self {
            position,
            covariance,
        }
    }
}

/// An ordered collection of tracks with an axis and energy.
///
/// The axis direction seeds the cone suppression of the vertex function; the
/// energy scales its opening weight `k_alpha`.
#[derive(Clone, Debug)]
pub struct Jet {
    tracks: Vec<Track>,
    axis: Vector3<f64>,
    energy: f64,
}

impl Jet {
    /// `axis` need not be normalized; a zero axis is replaced by +z so a
    /// malformed jet degrades instead of poisoning every cone query.
    pub fn new(tracks: Vec<Track>, axis: Vector3<f64>, energy: f64) -> Self {
        let axis = if axis.norm_squared() > 0.0 {
            axis.normalize()
        } else {
            Vector3::z()
        };
        Self {
            tracks,
            axis,
            energy,
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track_by_id(&self, id: u32) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    /// Unit jet axis.
    pub fn axis(&self) -> Vector3<f64> {
        self.axis
    }

    /// Jet energy in GeV.
    pub fn energy(&self) -> f64 {
        self.energy
    }
}
