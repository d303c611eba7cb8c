#![doc = include_str!("../README.md")]

// Public modules (stable-ish surface)
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod finder;

// "Expert" modules - still public, but considered unstable internals.
pub mod density;
pub mod fitter;
pub mod helix;
pub mod ip_fitter;
pub mod vertex_fn;

// --- High-level re-exports -------------------------------------------------

// Main entry points: finder + results.
pub use crate::finder::{
    ip_or_default, process_jets, DecayChain, ResolvedVertex, TopologicalVertexFinder,
    VertexFinder, ZvtopParams,
};

// High-level diagnostics returned by the finder.
pub use crate::diagnostics::{PipelineTrace, VertexingReport};

pub use crate::error::Error;
pub use crate::event::{InteractionPoint, Jet, Track};

// --- Prelude ---------------------------------------------------------------

/// Small prelude for quick experiments.
///
/// ```no_run
/// use zvtop::prelude::*;
///
/// # fn example(jet: Jet, ip: InteractionPoint) {
/// let finder = TopologicalVertexFinder::new(ZvtopParams::default()).unwrap();
/// let report = finder.process(&jet, &ip);
/// println!(
///     "{} vertices in {:.3} ms",
///     report.chain.len(),
///     report.trace.timings.total_ms
/// );
/// # }
/// ```
pub mod prelude {
    pub use crate::event::{InteractionPoint, Jet, Track};
    pub use crate::{DecayChain, TopologicalVertexFinder, VertexingReport, ZvtopParams};
}
