//! Orchestration of the per-jet vertexing pipeline.
//!
//! Stage order: candidate generation -> ambiguity resolution -> chi-squared
//! trimming -> final partition -> chain assembly. One jet runs to completion
//! before the next; all working state is scoped to the call and dropped with
//! it. Jets are independent, so [`process_jets`] fans them out with rayon.

use std::time::Instant;

use log::{debug, warn};
use rayon::prelude::*;

use crate::diagnostics::{InputDescriptor, PipelineTrace, VertexingReport};
use crate::error::Result;
use crate::event::{InteractionPoint, Jet};
use crate::finder::candidates::generate_candidates;
use crate::finder::chain::{assemble_chain, resolve_partition, DecayChain};
use crate::finder::params::ZvtopParams;
use crate::finder::resolver::resolve_ambiguities;
use crate::finder::trimmer::trim_vertices;
use crate::vertex_fn::{ConeWeight, VertexFunction};

/// Strategy seam for vertex-finding variants; the topological (ZVRES-style)
/// finder is the implementation provided here.
pub trait VertexFinder {
    fn find_vertices(&self, jet: &Jet, ip: &InteractionPoint) -> VertexingReport;
}

/// The topological vertex finder.
pub struct TopologicalVertexFinder {
    params: ZvtopParams,
}

impl TopologicalVertexFinder {
    /// Build a finder; configuration is validated here, once, so no invalid
    /// setting survives to event processing.
    pub fn new(params: ZvtopParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &ZvtopParams {
        &self.params
    }

    /// Run the full pipeline for one jet.
    ///
    /// Degenerate jets (fewer than two tracks) yield an empty chain, never
    /// an error; every recoverable failure inside the stages stays local to
    /// this jet.
    pub fn process(&self, jet: &Jet, ip: &InteractionPoint) -> VertexingReport {
        let total_start = Instant::now();
        let k_alpha = self.params.jet_energy_scaling * jet.energy();
        let mut trace = PipelineTrace {
            input: InputDescriptor {
                tracks: jet.tracks().len(),
                jet_energy: jet.energy(),
                use_ip: self.params.use_ip,
                k_alpha,
            },
            ..Default::default()
        };

        if jet.tracks().len() < 2 {
            debug!(
                "jet with {} track(s): returning empty decay chain",
                jet.tracks().len()
            );
            trace.timings.total_ms = elapsed_ms(total_start);
            return VertexingReport {
                chain: DecayChain::default(),
                trace,
            };
        }

        let ip_for_fn = self.params.use_ip.then_some(ip);
        let cone = ConeWeight::new(ip.position, jet.axis(), self.params.cone_radius, k_alpha);
        let vf = VertexFunction::new(
            jet,
            ip_for_fn,
            self.params.ip_weight,
            Some(cone),
            self.params.ascent.clone(),
        );

        let stage_start = Instant::now();
        let (mut candidates, candidate_stage) =
            generate_candidates(jet, ip_for_fn, &vf, &self.params);
        trace.timings.push("candidates", elapsed_ms(stage_start));
        trace.candidates = Some(candidate_stage);

        let stage_start = Instant::now();
        let resolver_stage = resolve_ambiguities(&mut candidates, &vf, &self.params);
        trace.timings.push("resolver", elapsed_ms(stage_start));
        trace.resolver = Some(resolver_stage);

        let stage_start = Instant::now();
        let trim_stage = trim_vertices(&mut candidates, jet, ip_for_fn, &vf, &self.params);
        trace.timings.push("trim", elapsed_ms(stage_start));
        trace.trim = Some(trim_stage);

        let stage_start = Instant::now();
        let partition_stage = resolve_partition(&mut candidates);
        let chain = assemble_chain(&candidates, jet, ip, self.params.use_ip, &vf, &self.params);
        trace.timings.push("chain", elapsed_ms(stage_start));
        trace.partition = Some(partition_stage);

        trace.timings.total_ms = elapsed_ms(total_start);
        VertexingReport { chain, trace }
    }
}

impl VertexFinder for TopologicalVertexFinder {
    fn find_vertices(&self, jet: &Jet, ip: &InteractionPoint) -> VertexingReport {
        self.process(jet, ip)
    }
}

/// Process independent jets in parallel. Each jet still runs the
/// single-threaded pipeline; only the fan-out is parallel.
pub fn process_jets<F>(finder: &F, jets: &[(Jet, InteractionPoint)]) -> Vec<VertexingReport>
where
    F: VertexFinder + Sync,
{
    jets.par_iter()
        .map(|(jet, ip)| finder.find_vertices(jet, ip))
        .collect()
}

/// The event IP to vertex against: the supplied one, or the configured
/// default when the event carries none.
pub fn ip_or_default(supplied: Option<InteractionPoint>, params: &ZvtopParams) -> InteractionPoint {
    match supplied {
        Some(ip) => ip,
        None => {
            warn!("no primary vertex supplied; falling back to the configured default IP");
            params.default_ip()
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1e3
}
