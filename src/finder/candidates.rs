//! Candidate-vertex generation and cutting.
//!
//! Every track-track pair in the jet (and, when the IP is in use, every
//! track-IP pair) is fitted to a two-object vertex. Pairs survive when both
//! chi-squared contributions stay below `chi2_cut` and - for track-track
//! pairs only - `V(r_vert)` reaches `min_vertex_fn`; track-IP pairs are cut
//! on chi-squared alone. Each survivor becomes a [`Candidate`] carrying its
//! fitted geometry plus the cached `V(r_vert)` / `V(r_max)` values the later
//! stages rank on.

use log::debug;
use nalgebra::{Matrix3, Vector3};

use crate::diagnostics::CandidateStage;
use crate::event::{InteractionPoint, Jet};
use crate::finder::params::ZvtopParams;
use crate::fitter::{fit_two, FitObject};
use crate::vertex_fn::VertexFunction;

/// One object held by a candidate vertex.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Member {
    Track(u32),
    Ip,
}

/// Mutable working vertex, alive from candidate generation until the decay
/// chain is assembled or the candidate degenerates.
#[derive(Clone, Debug)]
pub(crate) struct Candidate {
    /// Creation-order id; every deterministic tie-break falls back to it.
    pub id: u32,
    pub position: Vector3<f64>,
    pub covariance: Matrix3<f64>,
    pub members: Vec<Member>,
    /// Index-aligned with `members`; stale after members are removed without
    /// a refit (the resolver deliberately does not refit).
    pub chi2: Vec<f64>,
    /// `V` at the fitted position.
    pub v_vert: f64,
    /// `V` at the local maximum reached by gradient ascent.
    pub v_max: f64,
    pub max_converged: bool,
}

impl Candidate {
    pub fn contains_track(&self, id: u32) -> bool {
        self.members.contains(&Member::Track(id))
    }

    pub fn has_ip(&self) -> bool {
        self.members.contains(&Member::Ip)
    }

    pub fn track_count(&self) -> usize {
        self.members
            .iter()
            .filter(|m| matches!(m, Member::Track(_)))
            .count()
    }

    pub fn track_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.members.iter().filter_map(|m| match m {
            Member::Track(id) => Some(*id),
            Member::Ip => None,
        })
    }

    pub fn remove_member(&mut self, member: Member) {
        if let Some(idx) = self.members.iter().position(|m| *m == member) {
            self.members.remove(idx);
            self.chi2.remove(idx);
        }
    }

    /// A candidate still defines a point in space with two tracks, or one
    /// track plus the IP.
    pub fn meets_minimum(&self) -> bool {
        let tracks = self.track_count();
        tracks >= 2 || (self.has_ip() && tracks >= 1)
    }
}

/// Enumerate, fit and cut all two-object pairs for one jet.
pub(crate) fn generate_candidates(
    jet: &Jet,
    ip: Option<&InteractionPoint>,
    vf: &VertexFunction<'_>,
    params: &ZvtopParams,
) -> (Vec<Candidate>, CandidateStage) {
    let tracks = jet.tracks();
    let mut candidates = Vec::new();
    let mut stage = CandidateStage::default();
    let mut next_id = 0u32;

    for (i, a) in tracks.iter().enumerate() {
        for b in &tracks[i + 1..] {
            stage.pairs_considered += 1;
            let seed = 0.5 * (a.helix.closest_point_to(&b.helix.perigee())
                + b.helix.closest_point_to(&a.helix.perigee()));
            let fit = match fit_two(FitObject::Track(a), FitObject::Track(b), &seed, &params.fit)
            {
                Ok(fit) => fit,
                Err(err) => {
                    debug!("pair ({}, {}) dropped: {err}", a.id, b.id);
                    stage.cut_fit_failed += 1;
                    continue;
                }
            };
            if fit.chi2.iter().any(|&c| c > params.chi2_cut) {
                stage.cut_chi2 += 1;
                continue;
            }
            let v_vert = vf.eval(&fit.position);
            if v_vert < params.min_vertex_fn {
                stage.cut_vertex_fn += 1;
                continue;
            }
            let ascent = vf.ascend(&fit.position);
            candidates.push(Candidate {
                id: next_id,
                position: fit.position,
                covariance: fit.covariance,
                members: vec![Member::Track(a.id), Member::Track(b.id)],
                chi2: fit.chi2,
                v_vert,
                v_max: ascent.value,
                max_converged: ascent.converged,
            });
            next_id += 1;
        }
    }

    if let Some(ip) = ip {
        for track in tracks {
            stage.ip_pairs_considered += 1;
            let seed = 0.5 * (track.helix.closest_point_to(&ip.position) + ip.position);
            let fit = match fit_two(FitObject::Track(track), FitObject::Ip(ip), &seed, &params.fit)
            {
                Ok(fit) => fit,
                Err(err) => {
                    debug!("IP pair with track {} dropped: {err}", track.id);
                    stage.cut_fit_failed += 1;
                    continue;
                }
            };
            // Track-IP pairs are cut on chi-squared only.
            if fit.chi2.iter().any(|&c| c > params.chi2_cut) {
                stage.cut_chi2 += 1;
                continue;
            }
            let v_vert = vf.eval(&fit.position);
            let ascent = vf.ascend(&fit.position);
            candidates.push(Candidate {
                id: next_id,
                position: fit.position,
                covariance: fit.covariance,
                members: vec![Member::Track(track.id), Member::Ip],
                chi2: fit.chi2,
                v_vert,
                v_max: ascent.value,
                max_converged: ascent.converged,
            });
            next_id += 1;
        }
    }

    stage.survivors = candidates.len();
    debug!(
        "candidate generation: {} survivors from {} pairs",
        stage.survivors,
        stage.pairs_considered + stage.ip_pairs_considered
    );
    (candidates, stage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helix::{Cov5, Helix, PerigeeParams};
    use crate::vertex_fn::AscentParams;

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
    fn crossing_pair_survives_the_cuts() {
        let jet = Jet::new(
            vec![track_through_origin(0, 0.3), track_through_origin(1, -0.3)],
            Vector3::x(),
            45.0,
        );
        let params = ZvtopParams {
            use_ip: false,
            ..Default::default()
        };
        let vf = VertexFunction::new(&jet, None, params.ip_weight, None, AscentParams::default());
        let (cands, stage) = generate_candidates(&jet, None, &vf, &params);
        assert_eq!(stage.pairs_considered, 1);
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].track_count(), 2);
        assert!(cands[0].v_vert > params.min_vertex_fn);
    }

    #[test]
    fn minimum_membership_rules() {
        let mut c = Candidate {
            id: 0,
            position: Vector3::zeros(),
            covariance: Matrix3::identity(),
            members: vec![Member::Track(1), Member::Track(2)],
            chi2: vec![0.0, 0.0],
            v_vert: 1.0,
            v_max: 1.0,
            max_converged: true,
        };
        assert!(c.meets_minimum());
        c.remove_member(Member::Track(2));
        assert!(!c.meets_minimum());
        c.members.push(Member::Ip);
        c.chi2.push(0.0);
        assert!(c.meets_minimum());
        c.remove_member(Member::Track(1));
        assert!(!c.meets_minimum());
    }
}
