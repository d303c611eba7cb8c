//! The topological vertex finder: candidate generation, ambiguity
//! resolution, chi-squared trimming and decay-chain assembly.
//!
//! Stages
//! - `candidates` - fit and cut all two-object pairs in the jet.
//! - `resolver` - the deterministic track-removal / vertex-merging state
//!   machine built on the vertex-function resolution test.
//! - `trimmer` - worst-member chi-squared trimming with refits.
//! - `chain` - final track partition and ordered chain assembly.
//! - `pipeline` - the orchestrating [`TopologicalVertexFinder`].
//! - [`params`] - typed configuration with load-time validation.

pub(crate) mod candidates;
pub mod chain;
pub mod params;
pub(crate) mod pipeline;
pub(crate) mod resolver;
pub(crate) mod trimmer;

pub use chain::{DecayChain, ResolvedVertex};
pub use params::ZvtopParams;
pub use pipeline::{ip_or_default, process_jets, TopologicalVertexFinder, VertexFinder};
