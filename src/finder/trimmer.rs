//! Chi-squared trimming of resolved candidates.
//!
//! Each candidate is refit with the full least-squares vertex fit and the
//! worst-contributing track removed while it exceeds `trim_cut` and the
//! vertex keeps its minimum membership (two tracks, or one track plus the
//! IP). The IP itself is never trimmed. Candidates whose refit fails, or
//! that finish below minimum membership, are discarded; both outcomes stay
//! local to the jet.

use log::{debug, warn};

use crate::diagnostics::TrimStage;
use crate::event::{InteractionPoint, Jet};
use crate::finder::candidates::{Candidate, Member};
use crate::finder::params::ZvtopParams;
use crate::fitter::{fit_vertex, FitObject};
use crate::vertex_fn::VertexFunction;

pub(crate) fn trim_vertices(
    cands: &mut Vec<Candidate>,
    jet: &Jet,
    ip: Option<&InteractionPoint>,
    vf: &VertexFunction<'_>,
    params: &ZvtopParams,
) -> TrimStage {
    let mut stage = TrimStage::default();
    let mut dropped = vec![false; cands.len()];

    for (slot, cand) in cands.iter_mut().enumerate() {
        loop {
            let objects: Vec<FitObject<'_>> = match gather_objects(cand, jet, ip) {
                Some(objects) => objects,
                None => {
                    dropped[slot] = true;
                    stage.dropped += 1;
                    break;
                }
            };
            if objects.len() < 2 {
                dropped[slot] = true;
                stage.dropped += 1;
                break;
            }
            let fit = match fit_vertex(&objects, &cand.position, &params.fit) {
                Ok(fit) => fit,
                Err(err) => {
                    warn!("trim refit failed for candidate {}: {err}", cand.id);
                    dropped[slot] = true;
                    stage.refit_failures += 1;
                    stage.dropped += 1;
                    break;
                }
            };
            cand.position = fit.position;
            cand.covariance = fit.covariance;
            cand.chi2 = fit.chi2;

            // Worst track contribution (ties toward the lowest track id;
            // the IP is exempt from trimming).
            let mut worst: Option<(usize, u32, f64)> = None;
            for (k, member) in cand.members.iter().enumerate() {
                let Member::Track(id) = member else { continue };
                let c = cand.chi2[k];
                let beats = match worst {
                    None => true,
                    Some((_, wid, wc)) => c > wc || (c == wc && *id < wid),
                };
                if beats {
                    worst = Some((k, *id, c));
                }
            }
            let Some((worst_idx, worst_id, worst_chi2)) = worst else {
                dropped[slot] = true;
                stage.dropped += 1;
                break;
            };

            let tracks_after = cand.track_count() - 1;
            let removable = tracks_after >= 2 || (cand.has_ip() && tracks_after >= 1);
            if worst_chi2 > params.trim_cut && removable {
                debug!(
                    "trimming track {} (chi2 {:.2}) from candidate {}",
                    worst_id, worst_chi2, cand.id
                );
                cand.members.remove(worst_idx);
                cand.chi2.remove(worst_idx);
                stage.tracks_removed += 1;
                continue;
            }
            if worst_chi2 > params.trim_cut {
                // Worst member still fails but removal would break the
                // membership floor: the candidate no longer defines a point.
                dropped[slot] = true;
                stage.dropped += 1;
            } else {
                cand.v_vert = vf.eval(&cand.position);
                let ascent = vf.ascend(&cand.position);
                cand.v_max = ascent.value;
                cand.max_converged = ascent.converged;
            }
            break;
        }
    }

    let mut keep = dropped.iter().map(|d| !d);
    cands.retain(|_| keep.next().unwrap_or(false));
    cands.retain(|c| c.meets_minimum());
    stage.survivors = cands.len();
    stage
}

/// Resolve member ids back to borrowed fit objects. `None` when a member
/// track id is unknown to the jet (cannot happen in a consistent pipeline,
/// but a missing id must not panic mid-jet).
fn gather_objects<'a>(
    cand: &Candidate,
    jet: &'a Jet,
    ip: Option<&'a InteractionPoint>,
) -> Option<Vec<FitObject<'a>>> {
    let mut objects = Vec::with_capacity(cand.members.len());
    for member in &cand.members {
        match member {
            Member::Track(id) => objects.push(FitObject::Track(jet.track_by_id(*id)?)),
            Member::Ip => objects.push(FitObject::Ip(ip?)),
        }
    }
    Some(objects)
}
