// number of nuclear steps
pub const NSTEP: usize = 1000;
// nuclear stepsize in atomic units
pub const DT: f64 = 1.0;
// number of electronic substeps per half of the nuclear step
pub const NUM_ELECTRONIC_SUBSTEPS: usize = 1;
// Neighbouring Basis Reuse Approximation: one Hamiltonian for all trajectories
pub const IS_NBRA: bool = false;
// initial electronic state
pub const INITIAL_STATE: usize = 0;
// seed of the random number generator
pub const SEED: u64 = 0;

// hopping
// probabilities below this value are set to zero
pub const PROBABILITY_FLOOR: f64 = 0.0;
// temperature (K) of the Boltzmann acceptance criterion
pub const HOP_TEMPERATURE: f64 = 300.0;

// decoherence
// C and epsilon of the energy-based decoherence times (hartree)
pub const DECOHERENCE_C_PARAM: f64 = 1.0;
pub const DECOHERENCE_EPS_PARAM: f64 = 0.1;
pub const DEPHASING_INFORMED: bool = false;
// the active state population below which SDM leaves the amplitudes untouched
pub const SDM_NORM_TOLERANCE: f64 = 0.0;

// state tracking
pub const DO_PHASE_CORRECTION: bool = true;
// overlaps closer than this are treated as a tie
pub const TRACKING_THRESHOLD: f64 = 1.0e-3;
// overlap magnitudes below this are treated as zero
pub const OVERLAP_THRESHOLD: f64 = 1.0e-8;

// thermostat
// temperature (K)
pub const TEMPERATURE: f64 = 300.0;
// coupling time of the Berendsen thermostat (au)
pub const TIME_COUPLING: f64 = 1000.0;
// characteristic frequency of the Nose-Hoover chain (au)
pub const NU_THERM: f64 = 0.001;
// length of the Nose-Hoover chain
pub const NHC_SIZE: usize = 1;
// translational and rotational DOFs controlled by the thermostat
pub const NF_T: usize = 1;
pub const NF_R: usize = 0;

// entanglement
pub const ETHD3_ALPHA: f64 = 0.0;
pub const ETHD3_BETA: f64 = 0.0;

// energy gaps below this value are treated as degenerate (hartree)
pub const DEGENERACY_THRESHOLD: f64 = 1.0e-10;
