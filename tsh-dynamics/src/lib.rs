//! Trajectory surface hopping for ensembles of coupled nuclear-electronic trajectories.
//!
//! The entry point for a single time step is [compute_dynamics](dynamics::compute_dynamics),
//! which advances an [Ensemble](initialization::Ensemble) in place using a
//! [HamiltonianProvider](interface::HamiltonianProvider) and a
//! [UniformSource](interface::UniformSource). [Simulation](initialization::Simulation)
//! wraps the same step into a run loop for the command line driver.
pub mod constants;
pub mod defaults;
pub mod dynamics;
pub mod errors;
pub mod initialization;
pub mod interface;
pub mod models;
pub mod output;
pub mod utils;

/// Complex double precision scalar used for all electronic quantities.
#[allow(non_camel_case_types)]
pub type c64 = num_complex::Complex<f64>;

pub use dynamics::compute_dynamics;
pub use errors::TshError;
