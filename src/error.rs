use thiserror::Error;

/// Failure modes of the vertexing core.
///
/// Everything except [`Error::Config`] is recovered inside the jet being
/// processed: a degenerate track is skipped, a non-converging fit drops its
/// candidate, a missing primary vertex falls back to the configured default.
/// No variant ever aborts a run across jet boundaries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Covariance matrix is singular or not positive-definite.
    #[error("degenerate covariance for object {id}")]
    DegenerateCovariance {
        /// Track id, or [`IP_ID`](crate::event::IP_ID) for the interaction point.
        id: u32,
    },

    /// Vertex fit exceeded its iteration bound without the linearization
    /// point settling.
    #[error("vertex fit did not converge within {max_iters} iterations")]
    FitDidNotConverge { max_iters: usize },

    /// No flagged primary vertex in the supplied event.
    #[error("no primary vertex found in event")]
    NoPrimaryVertex,

    /// A jet (or IP fit input) with fewer than two usable tracks.
    #[error("insufficient tracks: found {found}, need at least 2")]
    InsufficientTracks { found: usize },

    /// Rejected at configuration load; the only fatal variant.
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
