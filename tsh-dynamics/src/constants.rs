// Boltzmann constant in hartree per kelvin
pub const K_BOLTZMANN: f64 = 3.166_811_563e-6;
// femtoseconds to atomic units of time
pub const FS_TO_AU: f64 = 41.341_374_575_751;
// hartree to electronvolt
pub const HARTREE_TO_EV: f64 = 27.211_386_245_988;
