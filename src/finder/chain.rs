//! Final track-partition pass and decay-chain assembly.
//!
//! A track can still sit in several vertices after trimming (pre-pruning and
//! merging act on overlapping candidate sets). Vertices claim their tracks
//! in descending `V(r_max)` order (ties toward the lowest candidate id), so
//! membership becomes a strict partition. Survivors are refit for their
//! final membership and emitted ordered by distance from the IP.

use log::{debug, warn};

use nalgebra::{Matrix3, Vector3};
use serde::Serialize;

use crate::diagnostics::PartitionStage;
use crate::event::{InteractionPoint, Jet};
use crate::finder::candidates::{Candidate, Member};
use crate::finder::params::ZvtopParams;
use crate::fitter::{fit_vertex, FitObject};
use crate::vertex_fn::VertexFunction;

/// A vertex that survived resolution and trimming; part of the output.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedVertex {
    pub position: Vector3<f64>,
    pub covariance: Matrix3<f64>,
    /// Member tracks, ascending id.
    pub track_ids: Vec<u32>,
    /// Chi-squared contribution per member track, aligned with `track_ids`.
    pub track_chi2: Vec<f64>,
    pub contains_ip: bool,
    /// `V` at the fitted position.
    pub vertex_fn: f64,
    /// `V` at the local maximum above the fitted position.
    pub vertex_fn_max: f64,
    pub distance_from_ip: f64,
}

/// Ordered decay chain for one jet: vertices sorted by increasing distance
/// from the IP, each conceptually descending from its predecessor.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecayChain {
    pub vertices: Vec<ResolvedVertex>,
}

impl DecayChain {
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// All track ids assigned to any vertex, in chain order.
    pub fn assigned_tracks(&self) -> impl Iterator<Item = u32> + '_ {
        self.vertices.iter().flat_map(|v| v.track_ids.iter().copied())
    }
}

/// Enforce the partition invariant in place.
pub(crate) fn resolve_partition(cands: &mut Vec<Candidate>) -> PartitionStage {
    let mut stage = PartitionStage::default();

    let mut order: Vec<usize> = (0..cands.len()).collect();
    order.sort_by(|&a, &b| {
        cands[b]
            .v_max
            .partial_cmp(&cands[a].v_max)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(cands[a].id.cmp(&cands[b].id))
    });

    let mut claimed: Vec<u32> = Vec::new();
    for idx in order {
        let mine: Vec<u32> = cands[idx].track_ids().collect();
        for id in mine {
            if claimed.contains(&id) {
                cands[idx].remove_member(Member::Track(id));
                stage.tracks_reassigned += 1;
            } else {
                claimed.push(id);
            }
        }
    }

    let before = cands.len();
    cands.retain(|c| c.meets_minimum());
    stage.dropped = before - cands.len();
    stage.survivors = cands.len();
    stage
}

/// Refit the final candidates and assemble the ordered chain.
pub(crate) fn assemble_chain(
    cands: &[Candidate],
    jet: &Jet,
    ip: &InteractionPoint,
    use_ip: bool,
    vf: &VertexFunction<'_>,
    params: &ZvtopParams,
) -> DecayChain {
    let mut vertices = Vec::with_capacity(cands.len());
    for cand in cands {
        let mut position = cand.position;
        let mut covariance = cand.covariance;
        let mut chi2 = cand.chi2.clone();
        let mut vertex_fn = cand.v_vert;
        let mut vertex_fn_max = cand.v_max;
        let members = &cand.members;

        let objects: Vec<FitObject<'_>> = members
            .iter()
            .filter_map(|m| match m {
                Member::Track(id) => jet.track_by_id(*id).map(FitObject::Track),
                Member::Ip => use_ip.then_some(FitObject::Ip(ip)),
            })
            .collect();
        // Refit only with the full membership; otherwise the per-member
        // chi-squared would no longer line up.
        if objects.len() == members.len() {
            match fit_vertex(&objects, &cand.position, &params.fit) {
                Ok(fit) => {
                    position = fit.position;
                    covariance = fit.covariance;
                    chi2 = fit.chi2;
                    // The partition pass may have changed membership since the
                    // cached values were computed; refresh them at the refit
                    // position.
                    vertex_fn = vf.eval(&position);
                    vertex_fn_max = vf.ascend(&position).value;
                }
                // A vertex that passed every cut is kept with its pre-refit
                // geometry rather than silently vanishing.
                Err(err) => warn!("final refit failed for candidate {}: {err}", cand.id),
            }
        }

        let mut tracks: Vec<(u32, f64)> = members
            .iter()
            .zip(chi2.iter())
            .filter_map(|(m, &c)| match m {
                Member::Track(id) => Some((*id, c)),
                Member::Ip => None,
            })
            .collect();
        tracks.sort_by_key(|&(id, _)| id);
        let contains_ip = members.iter().any(|m| matches!(m, Member::Ip));

        vertices.push(ResolvedVertex {
            position,
            covariance,
            track_ids: tracks.iter().map(|&(id, _)| id).collect(),
            track_chi2: tracks.iter().map(|&(_, c)| c).collect(),
            contains_ip,
            vertex_fn,
            vertex_fn_max,
            distance_from_ip: (position - ip.position).norm(),
        });
    }

    vertices.sort_by(|a, b| {
        a.distance_from_ip
            .partial_cmp(&b.distance_from_ip)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.track_ids.cmp(&b.track_ids))
    });
    debug!("assembled decay chain with {} vertices", vertices.len());
    DecayChain { vertices }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helix::{Cov5, Helix, PerigeeParams};
    use crate::vertex_fn::AscentParams;

    fn candidate(id: u32, v_max: f64, tracks: &[u32]) -> Candidate {
        Candidate {
            id,
            position: Vector3::new(id as f64, 0.0, 0.0),
            covariance: Matrix3::identity() * 1e-4,
            members: tracks.iter().map(|&t| Member::Track(t)).collect(),
            chi2: vec![0.0; tracks.len()],
            v_vert: v_max,
            v_max,
            max_converged: true,
        }
    }

    #[test]
    fn shared_track_goes_to_highest_v_max() {
        let mut cands = vec![
            candidate(0, 1.0, &[1, 2, 3]),
            candidate(1, 2.0, &[3, 4, 5]),
        ];
        let stage = resolve_partition(&mut cands);
        assert_eq!(stage.tracks_reassigned, 1);
        // Track 3 stays with candidate 1 (higher v_max).
        let keeper = cands.iter().find(|c| c.id == 1).unwrap();
        assert!(keeper.contains_track(3));
        let other = cands.iter().find(|c| c.id == 0).unwrap();
        assert!(!other.contains_track(3));
    }

    #[test]
    fn v_max_tie_breaks_toward_lowest_id() {
        let mut cands = vec![candidate(0, 1.0, &[7, 8]), candidate(1, 1.0, &[7, 9])];
        resolve_partition(&mut cands);
        // Candidate 1 loses track 7 and drops below minimum membership.
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].id, 0);
        assert!(cands[0].contains_track(7));
    }

    fn track_through_origin(id: u32, phi0: f64) -> crate::event::Track {
        let mut cov = Cov5::zeros();
        cov[(0, 0)] = 1e-4;
        cov[(1, 1)] = 1e-8;
        cov[(2, 2)] = 1e-14;
        cov[(3, 3)] = 1e-4;
        cov[(4, 4)] = 1e-8;
        crate::event::Track::new(
            id,
            Helix::new(
                Vector3::zeros(),
                PerigeeParams {
                    d0: 0.0,
                    phi0,
                    omega: 0.0,
                    z0: 0.0,
                    tan_lambda: 0.0,
                },
                cov,
            ),
        )
    }

    #[test]
    fn refit_refreshes_vertex_function_values() {
        // Candidate parked off the crossing with stale V values: after the
        // final refit moves it onto the crossing, the emitted vertex_fn must
        // match the field at the reported position.
        let jet = Jet::new(
            vec![track_through_origin(0, 0.4), track_through_origin(1, -0.4)],
            Vector3::x(),
            45.0,
        );
        let ip = InteractionPoint::new(Vector3::zeros(), Matrix3::identity() * 1e-4);
        let vf = VertexFunction::new(&jet, None, 1.0, None, AscentParams::default());
        let cand = Candidate {
            id: 0,
            position: Vector3::new(0.05, 0.0, 0.0),
            covariance: Matrix3::identity() * 1e-4,
            members: vec![Member::Track(0), Member::Track(1)],
            chi2: vec![0.0, 0.0],
            v_vert: 0.123,
            v_max: 0.123,
            max_converged: true,
        };
        let chain = assemble_chain(&[cand], &jet, &ip, false, &vf, &ZvtopParams::default());
        assert_eq!(chain.len(), 1);
        let vtx = &chain.vertices[0];
        assert!(vtx.position.norm() < 1e-3, "refit at {:?}", vtx.position);
        assert!((vtx.vertex_fn - vf.eval(&vtx.position)).abs() < 1e-12);
        assert!(vtx.vertex_fn > 0.9, "stale value survived: {}", vtx.vertex_fn);
        assert!(vtx.vertex_fn_max >= vtx.vertex_fn);
    }

    #[test]
    fn degenerate_claimants_are_dropped() {
        let mut cands = vec![
            candidate(0, 3.0, &[1, 2]),
            candidate(1, 1.0, &[1, 2]),
        ];
        let stage = resolve_partition(&mut cands);
        assert_eq!(cands.len(), 1);
        assert_eq!(stage.dropped, 1);
        assert_eq!(cands[0].id, 0);
    }
}
