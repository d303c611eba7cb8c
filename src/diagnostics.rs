//! Per-run diagnostics returned next to the decay chain.
//!
//! Counters live in per-stage structs assembled into a [`PipelineTrace`];
//! nothing is accumulated in globals. Everything serializes so traces can be
//! dumped alongside results for offline inspection.

use serde::Serialize;

use crate::finder::chain::DecayChain;

/// Result produced by
/// [`TopologicalVertexFinder::process`](crate::TopologicalVertexFinder::process).
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VertexingReport {
    pub chain: DecayChain,
    pub trace: PipelineTrace,
}

/// End-to-end trace describing one jet's trip through the finder.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTrace {
    pub input: InputDescriptor,
    pub timings: TimingBreakdown,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidates: Option<CandidateStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolver: Option<ResolverStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trim: Option<TrimStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition: Option<PartitionStage>,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDescriptor {
    pub tracks: usize,
    pub jet_energy: f64,
    pub use_ip: bool,
    /// Cone weight actually applied: `jet_energy_scaling * jet_energy`.
    pub k_alpha: f64,
}

/// Candidate generation & cutting counters.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateStage {
    pub pairs_considered: usize,
    pub ip_pairs_considered: usize,
    pub cut_chi2: usize,
    pub cut_vertex_fn: usize,
    pub cut_fit_failed: usize,
    pub survivors: usize,
}

/// Ambiguity-resolution counters.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverStage {
    pub pre_pruned: usize,
    pub stripped_unresolved: usize,
    pub ip_stripped: usize,
    pub dropped_empty: usize,
    pub merged: usize,
    pub survivors: usize,
}

/// Chi-squared trimming counters.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrimStage {
    pub tracks_removed: usize,
    pub refit_failures: usize,
    pub dropped: usize,
    pub survivors: usize,
}

/// Final partition counters.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionStage {
    pub tracks_reassigned: usize,
    pub dropped: usize,
    pub survivors: usize,
}

/// Timing entry for a single pipeline stage.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTiming {
    pub label: String,
    pub elapsed_ms: f64,
}

impl StageTiming {
    pub fn new(label: impl Into<String>, elapsed_ms: f64) -> Self {
        Self {
            label: label.into(),
            elapsed_ms,
        }
    }
}

/// Aggregated timing trace for one jet.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingBreakdown {
    pub total_ms: f64,
    pub stages: Vec<StageTiming>,
}

impl TimingBreakdown {
    pub fn push(&mut self, label: impl Into<String>, elapsed_ms: f64) {
        self.stages.push(StageTiming::new(label, elapsed_ms));
    }
}
