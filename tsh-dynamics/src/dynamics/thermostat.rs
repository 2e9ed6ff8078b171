use crate::constants;
use crate::initialization::ThermostatConfiguration;
use crate::initialization::methods::ThermostatType;

/// Velocity-scaling thermostat of a single trajectory.
///
/// The integrator only needs the scaling factor for a (half) time step and a hook
/// that advances the internal state with the current kinetic energy of the
/// thermostatted DOFs.
pub trait Thermostat: Send {
    fn vel_scale(&self, dt: f64) -> f64;
    fn propagate_nhc(&mut self, dt: f64, kinetic_energy: f64);
    /// Number of DOFs that the thermostat acts on
    fn n_dofs(&self) -> usize;
    fn get_temperature(&self, kinetic_energy: f64) -> f64 {
        let n_dofs: f64 = self.n_dofs() as f64;
        if n_dofs > 0.0 {
            2.0 * kinetic_energy / (n_dofs * constants::K_BOLTZMANN)
        } else {
            0.0
        }
    }
}

/// Create the thermostat of one trajectory from the configuration
pub fn build_thermostat(config: &ThermostatConfiguration) -> Box<dyn Thermostat> {
    let n_dofs: usize = config.nf_t + config.nf_r;
    match config.thermostat_type {
        ThermostatType::Berendsen => Box::new(BerendsenThermostat::new(
            config.time_coupling,
            n_dofs,
            config.temperature,
        )),
        ThermostatType::NoseHooverChain => Box::new(NoseHooverChain::new(
            config.nhc_size,
            config.nu_therm,
            n_dofs,
            config.temperature,
        )),
    }
}

pub struct NullThermostat {
    pub scaling: f64,
    pub n_dofs: usize,
}

impl NullThermostat {
    pub fn new(n_dofs: usize) -> Self {
        NullThermostat {
            scaling: 1.0,
            n_dofs,
        }
    }
}

impl Thermostat for NullThermostat {
    fn vel_scale(&self, _dt: f64) -> f64 {
        self.scaling
    }
    fn propagate_nhc(&mut self, _dt: f64, _kinetic_energy: f64) {}
    fn n_dofs(&self) -> usize {
        self.n_dofs
    }
}

/// Weak coupling to a heat bath. The scaling factor refers to the kinetic
/// energy that was passed to the last call of `propagate_nhc`.
pub struct BerendsenThermostat {
    pub tau: f64,
    pub n_dofs: usize,
    pub target_temperature: f64,
    current_temperature: Option<f64>,
}

impl BerendsenThermostat {
    pub fn new(tau: f64, n_dofs: usize, temperature: f64) -> Self {
        BerendsenThermostat {
            tau,
            n_dofs,
            target_temperature: temperature,
            current_temperature: None,
        }
    }
}

impl Thermostat for BerendsenThermostat {
    fn vel_scale(&self, dt: f64) -> f64 {
        match self.current_temperature {
            Some(temperature) if temperature > 0.0 => {
                let arg: f64 =
                    1.0 + (dt / self.tau) * (self.target_temperature / temperature - 1.0);
                arg.max(0.0).sqrt()
            }
            _ => 1.0,
        }
    }

    fn propagate_nhc(&mut self, _dt: f64, kinetic_energy: f64) {
        self.current_temperature = Some(self.get_temperature(kinetic_energy));
    }

    fn n_dofs(&self) -> usize {
        self.n_dofs
    }
}

/// Nose-Hoover chain of arbitrary length. The first link couples to the kinetic
/// energy of the thermostatted DOFs, every further link to its predecessor.
pub struct NoseHooverChain {
    pub n_dofs: usize,
    pub target_temperature: f64,
    /// thermostat masses
    pub q_mass: Vec<f64>,
    /// thermostat positions
    pub ksi: Vec<f64>,
    /// thermostat velocities
    pub v_ksi: Vec<f64>,
}

impl NoseHooverChain {
    pub fn new(size: usize, nu_therm: f64, n_dofs: usize, temperature: f64) -> Self {
        let size: usize = size.max(1);
        let kt: f64 = constants::K_BOLTZMANN * temperature;
        let nu2: f64 = nu_therm * nu_therm;
        let q_mass: Vec<f64> = (0..size)
            .map(|link| {
                if link == 0 {
                    n_dofs as f64 * kt / nu2
                } else {
                    kt / nu2
                }
            })
            .collect();
        NoseHooverChain {
            n_dofs,
            target_temperature: temperature,
            q_mass,
            ksi: vec![0.0; size],
            v_ksi: vec![0.0; size],
        }
    }

    /// Energy stored in the chain
    pub fn energy(&self) -> f64 {
        let kt: f64 = constants::K_BOLTZMANN * self.target_temperature;
        let mut energy: f64 = 0.0;
        for (link, (v, ksi)) in self.v_ksi.iter().zip(self.ksi.iter()).enumerate() {
            energy += 0.5 * self.q_mass[link] * v * v;
            let nf: f64 = if link == 0 { self.n_dofs as f64 } else { 1.0 };
            energy += nf * kt * ksi;
        }
        energy
    }
}

impl Thermostat for NoseHooverChain {
    fn vel_scale(&self, dt: f64) -> f64 {
        (-dt * self.v_ksi[0]).exp()
    }

    fn propagate_nhc(&mut self, dt: f64, kinetic_energy: f64) {
        let kt: f64 = constants::K_BOLTZMANN * self.target_temperature;
        let size: usize = self.v_ksi.len();
        if self.q_mass.iter().any(|q| !(*q > 0.0)) {
            return;
        }
        for link in 0..size {
            let driving: f64 = if link == 0 {
                (2.0 * kinetic_energy - self.n_dofs as f64 * kt) / self.q_mass[0]
            } else {
                (self.q_mass[link - 1] * self.v_ksi[link - 1].powi(2) - kt) / self.q_mass[link]
            };
            let friction: f64 = if link + 1 < size {
                self.v_ksi[link] * self.v_ksi[link + 1]
            } else {
                0.0
            };
            self.v_ksi[link] += dt * (driving - friction);
        }
        for (ksi, v) in self.ksi.iter_mut().zip(self.v_ksi.iter()) {
            *ksi += dt * v;
        }
    }

    fn n_dofs(&self) -> usize {
        self.n_dofs
    }
}
