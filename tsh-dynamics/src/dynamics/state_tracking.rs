use crate::c64;
use crate::errors::TshError;
use crate::initialization::methods::{Representation, StateTracking, TimeOverlapMethod};
use crate::initialization::{DynamicConfiguration, Ensemble, StateTrackingConfiguration};
use crate::interface::{HamiltonianProvider, UniformSource};
use crate::utils::*;
use log::{debug, trace};
use ndarray::prelude::*;

/// Time-overlaps S = U_prev^H U of all children. With [TimeOverlapMethod::Recompute]
/// the overlaps are built from the basis transforms stored before the geometry
/// update and handed back to the provider.
pub fn compute_time_overlaps(
    config: &DynamicConfiguration,
    ham: &mut dyn HamiltonianProvider,
    previous_basis: &[Array2<c64>],
) -> Result<Vec<Array2<c64>>, TshError> {
    match config.tracking_config.time_overlap_method {
        TimeOverlapMethod::Recompute => {
            let mut overlaps: Vec<Array2<c64>> = Vec::with_capacity(previous_basis.len());
            for (child, u_prev) in previous_basis.iter().enumerate() {
                let overlap: Array2<c64> = adjoint(u_prev.view()).dot(&ham.basis_transform(child));
                ham.set_time_overlap_adi(child, overlap.view());
                overlaps.push(overlap);
            }
            Ok(overlaps)
        }
        TimeOverlapMethod::Provider => Ok((0..previous_basis.len())
            .map(|child| ham.time_overlap_adi(child).to_owned())
            .collect()),
    }
}

/// For every child a permutation `perm`, such that the previous state `i` continues
/// as the current state `perm[i]`
pub fn compute_permutations(
    config: &DynamicConfiguration,
    energies: &[Array1<f64>],
    overlaps: &[Array2<c64>],
    rnd: &mut dyn UniformSource,
) -> Result<Vec<Vec<usize>>, TshError> {
    let tracking: &StateTrackingConfiguration = &config.tracking_config;
    let mut perms: Vec<Vec<usize>> = Vec::with_capacity(overlaps.len());
    for (child, (overlap, energy)) in overlaps.iter().zip(energies.iter()).enumerate() {
        check_overlap(child, overlap.view(), tracking.overlap_threshold)?;
        let perm: Vec<usize> = match tracking.state_tracking_algo {
            StateTracking::None => (0..overlap.nrows()).collect(),
            StateTracking::Greedy => {
                assign_states(overlap.view(), energy.view(), tracking, None)
            }
            StateTracking::Stochastic => {
                assign_states(overlap.view(), energy.view(), tracking, Some(&mut *rnd))
            }
        };
        if perm.iter().enumerate().any(|(i, j)| i != *j) {
            debug!("states of child {} are reordered: {:?}", child, perm);
        }
        perms.push(perm);
    }
    Ok(perms)
}

/// Every overlap must be finite. An overlap row without any usable element means that
/// a state vanished from the basis, which can not be tracked.
fn check_overlap(child: usize, overlap: ArrayView2<c64>, threshold: f64) -> Result<(), TshError> {
    if overlap.iter().any(|val| !(val.re.is_finite() && val.im.is_finite())) {
        return Err(TshError::NonFinite {
            stage: "time-overlap",
        });
    }
    for (state, row) in overlap.axis_iter(Axis(0)).enumerate() {
        if row.iter().all(|val| !(val.norm() >= threshold)) {
            return Err(TshError::DegenerateOverlap { traj: child, state });
        }
    }
    Ok(())
}

/// Greedy assignment: the largest remaining |S_ij| pairs the previous state i with the
/// current state j. Pairs within `tracking_threshold` of the largest one are ties.
/// Ties are broken by the smallest energy difference |E_j - E_i| (first in row-major
/// order if still equal), or uniformly at random if a source of random numbers is given.
pub fn assign_states(
    overlap: ArrayView2<c64>,
    energies: ArrayView1<f64>,
    tracking: &StateTrackingConfiguration,
    mut rnd: Option<&mut dyn UniformSource>,
) -> Vec<usize> {
    let n: usize = overlap.nrows();
    let magnitude: Array2<f64> = overlap.mapv(|val| val.norm());
    let mut perm: Vec<usize> = vec![0; n];
    let mut row_free: Vec<bool> = vec![true; n];
    let mut col_free: Vec<bool> = vec![true; n];

    for _ in 0..n {
        let mut best: f64 = f64::NEG_INFINITY;
        for i in (0..n).filter(|i| row_free[*i]) {
            for j in (0..n).filter(|j| col_free[*j]) {
                best = best.max(magnitude[[i, j]]);
            }
        }
        let mut candidates: Vec<(usize, usize)> = Vec::new();
        for i in (0..n).filter(|i| row_free[*i]) {
            for j in (0..n).filter(|j| col_free[*j]) {
                if magnitude[[i, j]] >= best - tracking.tracking_threshold {
                    candidates.push((i, j));
                }
            }
        }
        let (i, j): (usize, usize) = match rnd.as_deref_mut() {
            Some(rnd) if candidates.len() > 1 => {
                let draw: f64 = rnd.uniform(0.0, candidates.len() as f64);
                candidates[(draw.floor() as usize).min(candidates.len() - 1)]
            }
            _ => candidates
                .iter()
                .copied()
                .min_by(|(i_a, j_a), (i_b, j_b)| {
                    let gap_a: f64 = (energies[*j_a] - energies[*i_a]).abs();
                    let gap_b: f64 = (energies[*j_b] - energies[*i_b]).abs();
                    gap_a.total_cmp(&gap_b)
                })
                .unwrap_or_else(|| {
                    (
                        row_free.iter().position(|free| *free).unwrap_or(0),
                        col_free.iter().position(|free| *free).unwrap_or(0),
                    )
                }),
        };
        perm[i] = j;
        row_free[i] = false;
        col_free[j] = false;
    }
    perm
}

/// Correction matrices that map the amplitudes of the previous basis onto the current
/// one: P[perm[i], i] = conj(S[i, perm[i]]) / |S[i, perm[i]]| with phase correction,
/// a plain permutation without it
pub fn compute_projectors(
    config: &DynamicConfiguration,
    overlaps: &[Array2<c64>],
    perms: &[Vec<usize>],
) -> Vec<Array2<c64>> {
    overlaps
        .iter()
        .zip(perms.iter())
        .map(|(overlap, perm)| {
            let n: usize = overlap.nrows();
            let mut projector: Array2<c64> = Array2::zeros((n, n));
            for (i, j) in perm.iter().enumerate() {
                let s: c64 = overlap[[i, *j]];
                let norm: f64 = s.norm();
                projector[[*j, i]] = if config.tracking_config.do_phase_correction
                    && norm >= config.tracking_config.overlap_threshold
                {
                    s.conj() / norm
                } else {
                    c64::new(1.0, 0.0)
                };
            }
            projector
        })
        .collect()
}

/// New active states after the reordering: state `i` becomes `perm[i]`
pub fn permute_states(
    config: &DynamicConfiguration,
    perms: &[Vec<usize>],
    act_states: &[usize],
) -> Vec<usize> {
    act_states
        .iter()
        .enumerate()
        .map(|(traj, state)| perms[config.child(traj)][*state])
        .collect()
}

impl Ensemble {
    /// Apply the state tracking of this step. The correction acts on the adiabatic
    /// amplitudes only in the adiabatic representation; the diabatic amplitudes do
    /// not depend on the ordering of the adiabatic states.
    pub fn apply_state_tracking(
        &mut self,
        config: &DynamicConfiguration,
        perms: &[Vec<usize>],
        projectors: &[Array2<c64>],
    ) {
        if config.rep_tdse == Representation::Adiabatic {
            for traj in 0..self.ntraj {
                let projector: &Array2<c64> = &projectors[config.child(traj)];
                let c_new: Array1<c64> = projector.dot(&self.ampl_adi.column(traj));
                self.ampl_adi.column_mut(traj).assign(&c_new);
            }
        }
        let new_states: Vec<usize> = permute_states(config, perms, &self.act_states);
        for (traj, (old, new)) in self.act_states.iter().zip(new_states.iter()).enumerate() {
            if old != new {
                trace!("trajectory {}: active state {} is now labelled {}", traj, old, new);
            }
        }
        self.act_states = new_states;

        for traj in 0..self.ntraj {
            let child: usize = config.child(traj);
            let projector: &Array2<c64> = &projectors[child];
            // auxiliary quantities follow the relabelling of the states
            if !self.afssh_dr.is_empty() {
                let projector_h: Array2<c64> = adjoint(projector.view());
                for dof in 0..self.ndof {
                    let idx: usize = self.moment_index(traj, dof);
                    self.afssh_dr[idx] = projector.dot(&self.afssh_dr[idx]).dot(&projector_h);
                    self.afssh_dp[idx] = projector.dot(&self.afssh_dp[idx]).dot(&projector_h);
                }
            }
            let clock: Array1<f64> = self.coherence_time.column(traj).to_owned();
            let interval: Array1<f64> = self.coherence_interval.column(traj).to_owned();
            for (i, j) in perms[child].iter().enumerate() {
                self.coherence_time[[*j, traj]] = clock[i];
                self.coherence_interval[[*j, traj]] = interval[i];
            }
            self.projectors[traj].assign(projector);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initialization::SystemData;
    use crate::models::{CrossingParabolas, ModelHamiltonian};
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn real(matrix: Array2<f64>) -> Array2<c64> {
        to_complex(matrix.view())
    }

    #[test]
    fn forced_swap_is_detected() {
        let mut config = DynamicConfiguration::default();
        config.tracking_config.state_tracking_algo = StateTracking::Greedy;
        let overlaps: Vec<Array2<c64>> = vec![real(array![[0.0, 1.0], [1.0, 0.0]])];
        let energies: Vec<Array1<f64>> = vec![array![-0.1, 0.1]];
        let mut rng = StdRng::seed_from_u64(1);
        let perms = compute_permutations(&config, &energies, &overlaps, &mut rng).unwrap();
        assert_eq!(perms, vec![vec![1, 0]]);

        let projectors = compute_projectors(&config, &overlaps, &perms);
        assert_eq!(projectors[0], real(array![[0.0, 1.0], [1.0, 0.0]]));

        let mut ham = ModelHamiltonian::new(CrossingParabolas::default(), 1);
        let system = SystemData::new(array![[0.0]], array![[0.0]], array![0.01], 2, 0).unwrap();
        let mut ensemble = Ensemble::new(system, &config, &mut ham).unwrap();
        ensemble.apply_state_tracking(&config, &perms, &projectors);
        assert_eq!(ensemble.act_states, vec![1]);
        assert_abs_diff_eq!(ensemble.ampl_adi[[1, 0]].norm(), 1.0, epsilon = 1e-14);
        assert_abs_diff_eq!(ensemble.ampl_adi[[0, 0]].norm(), 0.0, epsilon = 1e-14);
    }

    #[test]
    fn phase_flips_are_removed() {
        let config = DynamicConfiguration::default();
        let overlaps: Vec<Array2<c64>> = vec![array![
            [c64::new(-1.0, 0.0), c64::new(0.0, 0.0)],
            [c64::new(0.0, 0.0), c64::new(0.0, 1.0)]
        ]];
        let perms: Vec<Vec<usize>> = vec![vec![0, 1]];
        let projectors = compute_projectors(&config, &overlaps, &perms);
        assert_eq!(projectors[0][[0, 0]], c64::new(-1.0, 0.0));
        assert_eq!(projectors[0][[1, 1]], c64::new(0.0, -1.0));
        // the corrected basis has positive diagonal overlaps
        let corrected: Array2<c64> = overlaps[0].dot(&projectors[0]);
        assert_abs_diff_eq!(corrected[[0, 0]].re, 1.0, epsilon = 1e-14);
        assert_abs_diff_eq!(corrected[[1, 1]].re, 1.0, epsilon = 1e-14);
    }

    #[test]
    fn greedy_assignment_of_three_states() {
        let tracking = StateTrackingConfiguration::default();
        let overlap: Array2<c64> = real(array![
            [0.1, 0.9, 0.1],
            [0.8, 0.2, 0.3],
            [0.2, 0.3, 0.9]
        ]);
        let perm = assign_states(overlap.view(), array![0.0, 1.0, 2.0].view(), &tracking, None);
        assert_eq!(perm, vec![1, 0, 2]);
    }

    #[test]
    fn ties_are_broken_by_energy_or_randomly() {
        let tracking = StateTrackingConfiguration::default();
        let s: f64 = 0.5_f64.sqrt();
        let overlap: Array2<c64> = real(array![[s, s], [s, -s]]);
        let perm = assign_states(overlap.view(), array![0.0, 0.5].view(), &tracking, None);
        assert_eq!(perm, vec![0, 1]);

        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..20 {
            let perm = assign_states(overlap.view(), array![0.0, 0.5].view(), &tracking, Some(&mut rng as &mut dyn UniformSource));
            assert!(perm == vec![0, 1] || perm == vec![1, 0]);
        }
    }

    #[test]
    fn vanished_state_is_fatal() {
        let mut config = DynamicConfiguration::default();
        config.tracking_config.state_tracking_algo = StateTracking::Greedy;
        let overlaps: Vec<Array2<c64>> = vec![real(array![[1.0, 0.0], [0.0, 0.0]])];
        let energies: Vec<Array1<f64>> = vec![array![0.0, 1.0]];
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            compute_permutations(&config, &energies, &overlaps, &mut rng),
            Err(TshError::DegenerateOverlap { traj: 0, state: 1 })
        );
    }

    #[test]
    fn non_finite_overlap_is_fatal() {
        let mut config = DynamicConfiguration::default();
        config.tracking_config.state_tracking_algo = StateTracking::Greedy;
        let overlaps: Vec<Array2<c64>> = vec![real(array![[1.0, 1.0], [1.0, f64::NAN]])];
        let energies: Vec<Array1<f64>> = vec![array![0.0, 1.0]];
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            compute_permutations(&config, &energies, &overlaps, &mut rng),
            Err(TshError::NonFinite {
                stage: "time-overlap"
            })
        );
        // the assignment itself never fails on unusable elements
        let perm = assign_states(
            overlaps[0].view(),
            energies[0].view(),
            &config.tracking_config,
            None,
        );
        let mut sorted: Vec<usize> = perm.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1]);
    }
}
