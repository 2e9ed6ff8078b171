use thiserror::Error;

/// Fatal conditions of a surface hopping run.
///
/// Numerical edge cases that the algorithm is expected to absorb (negative hop
/// probabilities, energetically forbidden hops) are not errors and never show up here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TshError {
    #[error("unknown {selector} code {code}")]
    UnknownEnumerator { selector: &'static str, code: i32 },

    #[error(
        "the number of thermostat DOFs (currently {thermostat}) must be equal to the number \
         of DOFs listed in `thermostat_dofs` (currently {configured})"
    )]
    ThermostatDofMismatch { thermostat: usize, configured: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("non-finite value encountered during {stage}")]
    NonFinite { stage: &'static str },

    #[error("time-overlap matrix of trajectory {traj} has no usable overlap for state {state}")]
    DegenerateOverlap { traj: usize, state: usize },

    #[error("hamiltonian provider failed: {0}")]
    Provider(String),
}

impl From<toml::de::Error> for TshError {
    fn from(err: toml::de::Error) -> Self {
        TshError::InvalidConfiguration(err.to_string())
    }
}
