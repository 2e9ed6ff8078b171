use crate::c64;
use crate::errors::TshError;
use ndarray::prelude::*;
use rand::Rng;

/// Trait that provides an interface to the electronic structure of the ensemble.
///
/// The provider owns one child per trajectory (a single child when the NBRA is used)
/// and is addressed by the trajectory index. [compute](HamiltonianProvider::compute)
/// re-evaluates a child at a new geometry, all other functions are read-only
/// accessors to the quantities of the last evaluation. Adiabatic quantities refer to
/// the eigenvectors returned by [basis_transform](HamiltonianProvider::basis_transform),
/// in ascending order of energy and without any phase convention.
/// Read access may happen from several threads at once.
pub trait HamiltonianProvider: Sync {
    /// Number of diabatic states
    fn ndia(&self) -> usize;
    /// Number of adiabatic states
    fn nadi(&self) -> usize;
    /// Number of nuclear DOFs
    fn ndof(&self) -> usize;
    /// Number of children, i.e. independently evaluated Hamiltonians
    fn nchildren(&self) -> usize;

    /// Evaluate the Hamiltonian of child `traj` at the coordinates `q`
    fn compute(&mut self, traj: usize, q: ArrayView1<f64>) -> Result<(), TshError>;

    fn ham_dia(&self, traj: usize) -> ArrayView2<c64>;
    fn ham_adi(&self, traj: usize) -> ArrayView2<c64>;
    /// dH/dq_dof in the diabatic basis
    fn d1ham_dia(&self, traj: usize, dof: usize) -> ArrayView2<c64>;
    /// dH/dq_dof in the adiabatic basis, i.e. U^H dH_dia U
    fn d1ham_adi(&self, traj: usize, dof: usize) -> ArrayView2<c64>;
    /// Derivative couplings <i|d/dq_dof|j> of the adiabatic states
    fn dc1_adi(&self, traj: usize, dof: usize) -> ArrayView2<c64>;
    /// Derivative couplings of the diabatic states, `None` for a strictly diabatic basis
    fn dc1_dia(&self, _traj: usize, _dof: usize) -> Option<ArrayView2<c64>> {
        None
    }
    /// Eigenvectors of the diabatic Hamiltonian (columns)
    fn basis_transform(&self, traj: usize) -> ArrayView2<c64>;
    /// Overlap of the adiabatic states of the previous and the current evaluation
    fn time_overlap_adi(&self, traj: usize) -> ArrayView2<c64>;
    fn set_time_overlap_adi(&mut self, traj: usize, overlap: ArrayView2<c64>);
}

/// Source of uniform deviates shared by all stochastic parts of the stepper
pub trait UniformSource {
    fn uniform(&mut self, low: f64, high: f64) -> f64;
}

impl<R: Rng> UniformSource for R {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if high > low {
            self.gen_range(low..high)
        } else {
            low
        }
    }
}
