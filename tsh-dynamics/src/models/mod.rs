//! Analytic diabatic model potentials and a [HamiltonianProvider](crate::interface::HamiltonianProvider)
//! that diagonalises them on the fly.
pub use hamiltonian::*;
pub use potentials::*;

mod hamiltonian;
mod potentials;

use ndarray::prelude::*;

/// A diabatic model: the electronic Hamiltonian and its first derivatives as
/// analytic functions of the nuclear coordinates.
pub trait DiabaticModel: Send + Sync {
    fn nstates(&self) -> usize;
    fn ndof(&self) -> usize;
    fn hamiltonian(&self, q: ArrayView1<f64>) -> Array2<f64>;
    /// dH/dq_dof
    fn gradient(&self, q: ArrayView1<f64>, dof: usize) -> Array2<f64>;
}
