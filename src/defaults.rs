// config file
pub const CONFIG_FILE_NAME: &str = "tsh.toml";

// logging
pub const VERBOSE: i8 = 0;
// number of threads of the rayon pool, 0 lets rayon decide
pub const NUMBER_OF_CORES: usize = 0;

// INITIAL CONDITIONS
pub const NTRAJ: usize = 100;
pub const INITIAL_STATE: usize = 0;
// seed of the sampling of the initial conditions
pub const SAMPLING_SEED: u64 = 0;
// mean and width of the Gaussian coordinate and momentum distributions (au)
pub const Q_MEAN: f64 = -2.0;
pub const Q_WIDTH: f64 = 0.5;
pub const P_MEAN: f64 = 20.0;
pub const P_WIDTH: f64 = 2.0;
// inverse mass (au) of the model DOF
pub const INV_MASS: f64 = 0.0005;
