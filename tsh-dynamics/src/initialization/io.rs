use crate::defaults::*;
use crate::errors::TshError;
use crate::initialization::methods::*;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

fn default_nstep() -> usize {
    NSTEP
}
fn default_dt() -> f64 {
    DT
}
fn default_num_electronic_substeps() -> usize {
    NUM_ELECTRONIC_SUBSTEPS
}
fn default_rep_tdse() -> Representation {
    Representation::Adiabatic
}
fn default_tsh_method() -> TshMethod {
    TshMethod::Fssh
}
fn default_force_method() -> ForceMethod {
    ForceMethod::ActiveState
}
fn default_is_nbra() -> bool {
    IS_NBRA
}
fn default_ensemble() -> EnsembleType {
    EnsembleType::Nve
}
fn default_seed() -> u64 {
    SEED
}
fn default_hop_acceptance() -> HopAcceptance {
    HopAcceptance::Energy
}
fn default_momenta_rescaling() -> MomentumRescaling {
    MomentumRescaling::Isotropic
}
fn default_frustrated_hop() -> FrustratedHop {
    FrustratedHop::Keep
}
fn default_probability_floor() -> f64 {
    PROBABILITY_FLOOR
}
fn default_hop_temperature() -> f64 {
    HOP_TEMPERATURE
}
fn default_decoherence_algo() -> DecoherenceMethod {
    DecoherenceMethod::None
}
fn default_decoherence_times_type() -> DecoherenceTimes {
    DecoherenceTimes::None
}
fn default_decoherence_c_param() -> f64 {
    DECOHERENCE_C_PARAM
}
fn default_decoherence_eps_param() -> f64 {
    DECOHERENCE_EPS_PARAM
}
fn default_dephasing_informed() -> bool {
    DEPHASING_INFORMED
}
fn default_sdm_norm_tolerance() -> f64 {
    SDM_NORM_TOLERANCE
}
fn default_instantaneous_variant() -> InstantaneousVariant {
    InstantaneousVariant::Accepted
}
fn default_collapse_option() -> CollapseOption {
    CollapseOption::KeepPhase
}
fn default_state_tracking_algo() -> StateTracking {
    StateTracking::None
}
fn default_do_phase_correction() -> bool {
    DO_PHASE_CORRECTION
}
fn default_time_overlap_method() -> TimeOverlapMethod {
    TimeOverlapMethod::Recompute
}
fn default_tracking_threshold() -> f64 {
    TRACKING_THRESHOLD
}
fn default_overlap_threshold() -> f64 {
    OVERLAP_THRESHOLD
}
fn default_thermostat_type() -> ThermostatType {
    ThermostatType::NoseHooverChain
}
fn default_temperature() -> f64 {
    TEMPERATURE
}
fn default_time_coupling() -> f64 {
    TIME_COUPLING
}
fn default_nu_therm() -> f64 {
    NU_THERM
}
fn default_nhc_size() -> usize {
    NHC_SIZE
}
fn default_nf_t() -> usize {
    NF_T
}
fn default_nf_r() -> usize {
    NF_R
}
fn default_entanglement_opt() -> EntanglementOption {
    EntanglementOption::None
}
fn default_ethd3_alpha() -> f64 {
    ETHD3_ALPHA
}
fn default_ethd3_beta() -> f64 {
    ETHD3_BETA
}

/// Struct that holds all switches of the surface hopping stepper.
/// It is read once and passed by reference into every stage of a step.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DynamicConfiguration {
    #[serde(default = "default_nstep")]
    pub nstep: usize,
    #[serde(default = "default_dt")]
    pub dt: f64,
    #[serde(default = "default_num_electronic_substeps")]
    pub num_electronic_substeps: usize,
    #[serde(default = "default_rep_tdse")]
    pub rep_tdse: Representation,
    #[serde(default = "default_tsh_method")]
    pub tsh_method: TshMethod,
    #[serde(default = "default_force_method")]
    pub force_method: ForceMethod,
    #[serde(default = "default_is_nbra", alias = "isNBRA")]
    pub is_nbra: bool,
    #[serde(default = "default_ensemble")]
    pub ensemble: EnsembleType,
    #[serde(default)]
    pub thermostat_dofs: Vec<usize>,
    #[serde(default)]
    pub constrained_dofs: Vec<usize>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub hopping_config: HoppingConfiguration,
    #[serde(default)]
    pub decoherence_config: DecoherenceConfiguration,
    #[serde(default)]
    pub tracking_config: StateTrackingConfiguration,
    #[serde(default)]
    pub thermostat_config: ThermostatConfiguration,
    #[serde(default)]
    pub entanglement_config: EntanglementConfiguration,
}

impl DynamicConfiguration {
    /// Read the configuration from a TOML string, missing keys take their default values
    pub fn from_toml_str(input: &str) -> Result<Self, TshError> {
        let config: Self = toml::from_str(input)?;
        Ok(config)
    }

    /// Length of one electronic substep
    pub fn dt_el(&self) -> f64 {
        self.dt / self.num_electronic_substeps as f64
    }

    /// Index of the Hamiltonian child that serves trajectory `traj`
    pub fn child(&self, traj: usize) -> usize {
        if self.is_nbra {
            0
        } else {
            traj
        }
    }

    /// Number of independently evaluated Hamiltonians for an ensemble of `ntraj` trajectories
    pub fn n_children(&self, ntraj: usize) -> usize {
        if self.is_nbra {
            1
        } else {
            ntraj
        }
    }

    /// Consistency checks of the configuration against the dimensions of the ensemble.
    /// All of these are fatal: a step never starts with an inconsistent configuration.
    pub fn check(&self, nstates: usize, ndof: usize) -> Result<(), TshError> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(TshError::InvalidConfiguration(format!(
                "the time step must be positive, got {}",
                self.dt
            )));
        }
        if self.num_electronic_substeps == 0 {
            return Err(TshError::InvalidConfiguration(String::from(
                "num_electronic_substeps must be at least 1",
            )));
        }
        for dof in self.constrained_dofs.iter().chain(self.thermostat_dofs.iter()) {
            if *dof >= ndof {
                return Err(TshError::InvalidConfiguration(format!(
                    "DOF index {} is out of range for {} DOFs",
                    dof, ndof
                )));
            }
        }
        if self.ensemble == EnsembleType::Nvt {
            let n_therm_dofs: usize =
                self.thermostat_config.nf_t + self.thermostat_config.nf_r;
            if n_therm_dofs != self.thermostat_dofs.len() {
                return Err(TshError::ThermostatDofMismatch {
                    thermostat: n_therm_dofs,
                    configured: self.thermostat_dofs.len(),
                });
            }
        }
        self.decoherence_config.check(nstates)
    }
}

impl Default for DynamicConfiguration {
    fn default() -> Self {
        DynamicConfiguration {
            nstep: default_nstep(),
            dt: default_dt(),
            num_electronic_substeps: default_num_electronic_substeps(),
            rep_tdse: default_rep_tdse(),
            tsh_method: default_tsh_method(),
            force_method: default_force_method(),
            is_nbra: default_is_nbra(),
            ensemble: default_ensemble(),
            thermostat_dofs: Vec::new(),
            constrained_dofs: Vec::new(),
            seed: default_seed(),
            hopping_config: HoppingConfiguration::default(),
            decoherence_config: DecoherenceConfiguration::default(),
            tracking_config: StateTrackingConfiguration::default(),
            thermostat_config: ThermostatConfiguration::default(),
            entanglement_config: EntanglementConfiguration::default(),
        }
    }
}

/// Structs that holds the parameters for the surface hopping routines
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HoppingConfiguration {
    #[serde(default = "default_hop_acceptance")]
    pub hop_acceptance_algo: HopAcceptance,
    #[serde(default = "default_momenta_rescaling")]
    pub momenta_rescaling_algo: MomentumRescaling,
    #[serde(default = "default_frustrated_hop")]
    pub frustrated_hop: FrustratedHop,
    #[serde(default = "default_probability_floor")]
    pub probability_floor: f64,
    #[serde(default = "default_hop_temperature")]
    pub temperature: f64,
}

impl Default for HoppingConfiguration {
    fn default() -> Self {
        HoppingConfiguration {
            hop_acceptance_algo: default_hop_acceptance(),
            momenta_rescaling_algo: default_momenta_rescaling(),
            frustrated_hop: default_frustrated_hop(),
            probability_floor: default_probability_floor(),
            temperature: default_hop_temperature(),
        }
    }
}

/// Structs that holds the parameters of the decoherence corrections
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DecoherenceConfiguration {
    #[serde(default = "default_decoherence_algo")]
    pub decoherence_algo: DecoherenceMethod,
    #[serde(default = "default_decoherence_times_type")]
    pub decoherence_times_type: DecoherenceTimes,
    #[serde(default = "default_decoherence_c_param")]
    pub decoherence_c_param: f64,
    #[serde(default = "default_decoherence_eps_param")]
    pub decoherence_eps_param: f64,
    /// Fixed decoherence rates (nstates x nstates), used with `decoherence_times_type = 0`
    #[serde(default)]
    pub decoherence_rates: Option<Vec<Vec<f64>>>,
    #[serde(default = "default_dephasing_informed")]
    pub dephasing_informed: bool,
    /// Average energy gaps (nstates x nstates) of the dephasing-informed correction
    #[serde(default)]
    pub ave_gaps: Option<Vec<Vec<f64>>>,
    #[serde(default = "default_sdm_norm_tolerance")]
    pub sdm_norm_tolerance: f64,
    #[serde(default = "default_instantaneous_variant")]
    pub instantaneous_decoherence_variant: InstantaneousVariant,
    #[serde(default = "default_collapse_option")]
    pub collapse_option: CollapseOption,
}

impl DecoherenceConfiguration {
    pub fn fixed_rates(&self) -> Option<Array2<f64>> {
        self.decoherence_rates.as_ref().and_then(|rows| nested_to_array(rows))
    }

    pub fn average_gaps(&self) -> Option<Array2<f64>> {
        self.ave_gaps.as_ref().and_then(|rows| nested_to_array(rows))
    }

    fn check(&self, nstates: usize) -> Result<(), TshError> {
        if self.decoherence_times_type == DecoherenceTimes::Fixed {
            check_square(self.fixed_rates(), nstates, "decoherence_rates")?;
        }
        if self.dephasing_informed {
            check_square(self.average_gaps(), nstates, "ave_gaps")?;
        }
        Ok(())
    }
}

impl Default for DecoherenceConfiguration {
    fn default() -> Self {
        DecoherenceConfiguration {
            decoherence_algo: default_decoherence_algo(),
            decoherence_times_type: default_decoherence_times_type(),
            decoherence_c_param: default_decoherence_c_param(),
            decoherence_eps_param: default_decoherence_eps_param(),
            decoherence_rates: None,
            dephasing_informed: default_dephasing_informed(),
            ave_gaps: None,
            sdm_norm_tolerance: default_sdm_norm_tolerance(),
            instantaneous_decoherence_variant: default_instantaneous_variant(),
            collapse_option: default_collapse_option(),
        }
    }
}

/// Structs that holds the parameters of the phase correction and state tracking
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StateTrackingConfiguration {
    #[serde(default = "default_state_tracking_algo")]
    pub state_tracking_algo: StateTracking,
    #[serde(default = "default_do_phase_correction")]
    pub do_phase_correction: bool,
    #[serde(default = "default_time_overlap_method")]
    pub time_overlap_method: TimeOverlapMethod,
    #[serde(default = "default_tracking_threshold")]
    pub tracking_threshold: f64,
    #[serde(default = "default_overlap_threshold")]
    pub overlap_threshold: f64,
}

impl StateTrackingConfiguration {
    /// True if the time-overlaps are needed in this step
    pub fn is_active(&self) -> bool {
        self.do_phase_correction || self.state_tracking_algo != StateTracking::None
    }
}

impl Default for StateTrackingConfiguration {
    fn default() -> Self {
        StateTrackingConfiguration {
            state_tracking_algo: default_state_tracking_algo(),
            do_phase_correction: default_do_phase_correction(),
            time_overlap_method: default_time_overlap_method(),
            tracking_threshold: default_tracking_threshold(),
            overlap_threshold: default_overlap_threshold(),
        }
    }
}

/// Struct that holds the parameters for the Thermostat
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ThermostatConfiguration {
    #[serde(default = "default_thermostat_type")]
    pub thermostat_type: ThermostatType,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_time_coupling")]
    pub time_coupling: f64,
    #[serde(default = "default_nu_therm")]
    pub nu_therm: f64,
    #[serde(default = "default_nhc_size")]
    pub nhc_size: usize,
    #[serde(default = "default_nf_t")]
    pub nf_t: usize,
    #[serde(default = "default_nf_r")]
    pub nf_r: usize,
}

impl Default for ThermostatConfiguration {
    fn default() -> Self {
        ThermostatConfiguration {
            thermostat_type: default_thermostat_type(),
            temperature: default_temperature(),
            time_coupling: default_time_coupling(),
            nu_therm: default_nu_therm(),
            nhc_size: default_nhc_size(),
            nf_t: default_nf_t(),
            nf_r: default_nf_r(),
        }
    }
}

/// Struct that holds the parameters of the quantum nuclear effect corrections
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EntanglementConfiguration {
    #[serde(default = "default_entanglement_opt")]
    pub entanglement_opt: EntanglementOption,
    #[serde(default = "default_ethd3_alpha")]
    pub ethd3_alpha: f64,
    #[serde(default = "default_ethd3_beta")]
    pub ethd3_beta: f64,
}

impl Default for EntanglementConfiguration {
    fn default() -> Self {
        EntanglementConfiguration {
            entanglement_opt: default_entanglement_opt(),
            ethd3_alpha: default_ethd3_alpha(),
            ethd3_beta: default_ethd3_beta(),
        }
    }
}

fn nested_to_array(rows: &[Vec<f64>]) -> Option<Array2<f64>> {
    let nrows: usize = rows.len();
    let ncols: usize = rows.first().map(|row| row.len()).unwrap_or(0);
    if rows.iter().any(|row| row.len() != ncols) {
        return None;
    }
    let flat: Vec<f64> = rows.iter().flatten().cloned().collect();
    Array2::from_shape_vec((nrows, ncols), flat).ok()
}

fn check_square(
    matrix: Option<Array2<f64>>,
    nstates: usize,
    what: &'static str,
) -> Result<(), TshError> {
    match matrix {
        None => Err(TshError::InvalidConfiguration(format!(
            "`{}` is required and must be a rectangular matrix",
            what
        ))),
        Some(matrix) if matrix.dim() != (nstates, nstates) => Err(TshError::DimensionMismatch {
            what,
            expected: nstates,
            found: matrix.nrows(),
        }),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_gives_defaults() {
        let config = DynamicConfiguration::from_toml_str("").unwrap();
        assert_eq!(config.nstep, NSTEP);
        assert_eq!(config.tsh_method, TshMethod::Fssh);
        assert_eq!(config.rep_tdse, Representation::Adiabatic);
        assert_eq!(
            config.decoherence_config.decoherence_algo,
            DecoherenceMethod::None
        );
        assert!(config.tracking_config.do_phase_correction);
    }

    #[test]
    fn integer_codes_are_read() {
        let input: &str = r#"
            dt = 0.5
            tsh_method = 1
            rep_tdse = 0
            isNBRA = true
            [decoherence_config]
            decoherence_algo = 0
            decoherence_times_type = 1
            [hopping_config]
            momenta_rescaling_algo = 200
        "#;
        let config = DynamicConfiguration::from_toml_str(input).unwrap();
        assert_eq!(config.dt, 0.5);
        assert_eq!(config.tsh_method, TshMethod::Gfsh);
        assert_eq!(config.rep_tdse, Representation::Diabatic);
        assert!(config.is_nbra);
        assert_eq!(
            config.decoherence_config.decoherence_times_type,
            DecoherenceTimes::Edc
        );
        assert_eq!(
            config.hopping_config.momenta_rescaling_algo,
            MomentumRescaling::Coupling
        );
    }

    #[test]
    fn unknown_method_is_fatal() {
        assert!(DynamicConfiguration::from_toml_str("tsh_method = 9").is_err());
        let input: &str = "[decoherence_config]\ndecoherence_algo = 7";
        assert!(DynamicConfiguration::from_toml_str(input).is_err());
    }

    #[test]
    fn thermostat_dof_mismatch_is_fatal() {
        let mut config = DynamicConfiguration::default();
        config.ensemble = EnsembleType::Nvt;
        config.thermostat_config.nf_t = 2;
        config.thermostat_dofs = vec![0];
        assert_eq!(
            config.check(2, 3),
            Err(TshError::ThermostatDofMismatch {
                thermostat: 2,
                configured: 1
            })
        );
        config.thermostat_dofs = vec![0, 1];
        assert!(config.check(2, 3).is_ok());
    }

    #[test]
    fn fixed_rates_need_matching_shape() {
        let mut config = DynamicConfiguration::default();
        config.decoherence_config.decoherence_times_type = DecoherenceTimes::Fixed;
        assert!(config.check(2, 1).is_err());
        config.decoherence_config.decoherence_rates = Some(vec![vec![0.0, 0.1], vec![0.1, 0.0]]);
        assert!(config.check(2, 1).is_ok());
        assert!(config.check(3, 1).is_err());
    }
}
