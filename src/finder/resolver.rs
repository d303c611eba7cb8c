//! Iterative ambiguity resolution over the candidate set.
//!
//! Five deterministic steps:
//!
//! 1. per-track pre-pruning of candidates whose `V(r_vert)` falls below 10%
//!    of the best candidate containing that track;
//! 2. greedy retention: repeatedly keep the best remaining candidate for the
//!    track and strip the track from every candidate unresolved from a
//!    retained one (no refit - candidates keep their two-object geometry);
//! 3. the IP stays only in its best candidate;
//! 4. empty candidates are dropped;
//! 5. connected components of the "unresolved" graph merge into a single
//!    vertex each.
//!
//! Ties on `V` break toward the lowest candidate id so repeated runs are
//! bit-identical.

use log::debug;
use nalgebra::Vector3;

use crate::diagnostics::ResolverStage;
use crate::finder::candidates::{Candidate, Member};
use crate::finder::params::ZvtopParams;
use crate::vertex_fn::VertexFunction;

/// Fraction of the per-track best `V(r_vert)` below which a candidate is
/// pre-pruned for that track.
const PRE_PRUNE_FRACTION: f64 = 0.1;

/// Resolution test: two candidate vertices are unresolved (one spatial peak,
/// should merge) when the valley between them is shallow:
/// `min{V(r) : r on segment} / min{V(r1), V(r2)} >= resolver_cut`.
///
/// `V` is sampled at `resolver_samples` evenly spaced points including both
/// endpoints. A non-positive endpoint minimum counts as unresolved (both
/// candidates sit in dead field; merging is the conservative outcome).
/// Symmetric in its two arguments by construction.
pub(crate) fn unresolved_pair(
    a: &Vector3<f64>,
    b: &Vector3<f64>,
    vf: &VertexFunction<'_>,
    params: &ZvtopParams,
) -> bool {
    let n = params.resolver_samples.max(2);
    let mut min_all = f64::INFINITY;
    let mut v_first = 0.0;
    let mut v_last = 0.0;
    for k in 0..n {
        let t = k as f64 / (n - 1) as f64;
        let r = a + (b - a) * t;
        let v = vf.eval(&r);
        if k == 0 {
            v_first = v;
        }
        if k == n - 1 {
            v_last = v;
        }
        min_all = min_all.min(v);
    }
    let denom = v_first.min(v_last);
    if denom <= 0.0 {
        return true;
    }
    min_all / denom >= params.resolver_cut
}

/// Run the full ambiguity-resolution state machine in place.
///
/// The output set is reduced but not yet track-disjoint; the trimmer and the
/// final partition pass finish the job.
pub(crate) fn resolve_ambiguities(
    cands: &mut Vec<Candidate>,
    vf: &VertexFunction<'_>,
    params: &ZvtopParams,
) -> ResolverStage {
    let mut stage = ResolverStage::default();

    let mut track_ids: Vec<u32> = cands.iter().flat_map(|c| c.track_ids()).collect();
    track_ids.sort_unstable();
    track_ids.dedup();

    for &track in &track_ids {
        let mut cv: Vec<usize> = (0..cands.len())
            .filter(|&i| cands[i].contains_track(track))
            .collect();
        if cv.is_empty() {
            continue;
        }

        // Step 1: pre-prune against the best candidate for this track.
        let best_v = cv
            .iter()
            .map(|&i| cands[i].v_vert)
            .fold(f64::NEG_INFINITY, f64::max);
        let mut kept = Vec::with_capacity(cv.len());
        for idx in cv {
            if cands[idx].v_vert < PRE_PRUNE_FRACTION * best_v {
                cands[idx].remove_member(Member::Track(track));
                stage.pre_pruned += 1;
            } else {
                kept.push(idx);
            }
        }
        cv = kept;

        // Step 2: greedy retention; ties break toward the lowest candidate id.
        let mut retained: Vec<usize> = Vec::new();
        while !cv.is_empty() {
            let mut best = 0;
            for (slot, &idx) in cv.iter().enumerate() {
                let (bv, bid) = (cands[cv[best]].v_vert, cands[cv[best]].id);
                let (v, id) = (cands[idx].v_vert, cands[idx].id);
                if v > bv || (v == bv && id < bid) {
                    best = slot;
                }
            }
            let chosen = cv.swap_remove(best);
            retained.push(chosen);

            let mut remaining = Vec::with_capacity(cv.len());
            for idx in cv {
                let clashes = retained.iter().any(|&r| {
                    unresolved_pair(&cands[idx].position, &cands[r].position, vf, params)
                });
                if clashes {
                    cands[idx].remove_member(Member::Track(track));
                    stage.stripped_unresolved += 1;
                } else {
                    remaining.push(idx);
                }
            }
            cv = remaining;
        }
    }

    // Step 3: the IP stays only in its best candidate.
    let ip_holders: Vec<usize> = (0..cands.len()).filter(|&i| cands[i].has_ip()).collect();
    if ip_holders.len() > 1 {
        let mut best = ip_holders[0];
        for &idx in &ip_holders[1..] {
            if cands[idx].v_vert > cands[best].v_vert
                || (cands[idx].v_vert == cands[best].v_vert && cands[idx].id < cands[best].id)
            {
                best = idx;
            }
        }
        for &idx in &ip_holders {
            if idx != best {
                cands[idx].remove_member(Member::Ip);
                stage.ip_stripped += 1;
            }
        }
    }

    // Step 4: drop candidates with no members left.
    let before = cands.len();
    cands.retain(|c| !c.members.is_empty());
    stage.dropped_empty = before - cands.len();

    // Step 5: merge each connected component of the unresolved graph.
    stage.merged = merge_unresolved_components(cands, vf, params);
    stage.survivors = cands.len();
    debug!(
        "resolver: {} pre-pruned, {} stripped, {} merged, {} survivors",
        stage.pre_pruned, stage.stripped_unresolved, stage.merged, stage.survivors
    );
    stage
}

/// Merge every connected component of the pairwise-unresolved graph into its
/// best member. Returns the number of candidates absorbed.
///
/// The survivor is the component member with the highest `V(r_max)` (tie:
/// lowest id); the rest are absorbed lowest-`V(r_max)` first. Absorption
/// moves members across without refitting - the trimmer refits everything
/// anyway - and skips objects the survivor already holds.
fn merge_unresolved_components(
    cands: &mut Vec<Candidate>,
    vf: &VertexFunction<'_>,
    params: &ZvtopParams,
) -> usize {
    let n = cands.len();
    if n < 2 {
        return 0;
    }
    let mut adjacency = vec![Vec::new(); n];
    for i in 0..n {
        for j in i + 1..n {
            if unresolved_pair(&cands[i].position, &cands[j].position, vf, params) {
                adjacency[i].push(j);
                adjacency[j].push(i);
            }
        }
    }

    let mut component = vec![usize::MAX; n];
    let mut n_components = 0;
    for start in 0..n {
        if component[start] != usize::MAX {
            continue;
        }
        let mut frontier = vec![start];
        component[start] = n_components;
        while let Some(node) = frontier.pop() {
            for &next in &adjacency[node] {
                if component[next] == usize::MAX {
                    component[next] = n_components;
                    frontier.push(next);
                }
            }
        }
        n_components += 1;
    }

    let mut absorbed = vec![false; n];
    let mut merged = 0;
    for comp in 0..n_components {
        let mut indices: Vec<usize> = (0..n).filter(|&i| component[i] == comp).collect();
        if indices.len() < 2 {
            continue;
        }
        // Survivor first, then ascending V(r_max) so the weakest candidate
        // is absorbed first.
        indices.sort_by(|&a, &b| {
            cands[b]
                .v_max
                .partial_cmp(&cands[a].v_max)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(cands[a].id.cmp(&cands[b].id))
        });
        let survivor = indices[0];
        for &victim in indices[1..].iter().rev() {
            let moved: Vec<(Member, f64)> = cands[victim]
                .members
                .iter()
                .copied()
                .zip(cands[victim].chi2.iter().copied())
                .collect();
            for (member, chi2) in moved {
                let duplicate = match member {
                    Member::Track(id) => cands[survivor].contains_track(id),
                    Member::Ip => cands[survivor].has_ip(),
                };
                if !duplicate {
                    cands[survivor].members.push(member);
                    cands[survivor].chi2.push(chi2);
                }
            }
            absorbed[victim] = true;
            merged += 1;
        }
    }

    let mut keep = absorbed.iter().map(|a| !a);
    cands.retain(|_| keep.next().unwrap_or(false));
    merged
}
