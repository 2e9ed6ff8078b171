use crate::defaults::*;
use serde::{Deserialize, Serialize};
use tsh_dynamics::initialization::DynamicConfiguration;
use tsh_dynamics::models::{ConstantCoupling, CosineModel, CrossingParabolas, Harmonic};

fn default_verbose() -> i8 {
    VERBOSE
}
fn default_number_of_cores() -> usize {
    NUMBER_OF_CORES
}
fn default_ntraj() -> usize {
    NTRAJ
}
fn default_initial_state() -> usize {
    INITIAL_STATE
}
fn default_sampling_seed() -> u64 {
    SAMPLING_SEED
}
fn default_q_mean() -> Vec<f64> {
    vec![Q_MEAN]
}
fn default_q_width() -> Vec<f64> {
    vec![Q_WIDTH]
}
fn default_p_mean() -> Vec<f64> {
    vec![P_MEAN]
}
fn default_p_width() -> Vec<f64> {
    vec![P_WIDTH]
}
fn default_inv_mass() -> Vec<f64> {
    vec![INV_MASS]
}
fn default_model() -> ModelConfig {
    ModelConfig::CrossingParabolas(CrossingParabolas::default())
}

/// Settings of the command line driver
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Configuration {
    #[serde(default = "default_verbose")]
    pub verbose: i8,
    #[serde(default = "default_number_of_cores")]
    pub number_of_cores: usize,
    #[serde(default = "default_model")]
    pub model: ModelConfig,
    #[serde(default)]
    pub initial_conditions: InitialConditionsConfig,
    #[serde(default)]
    pub dynamics: DynamicConfiguration,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            verbose: default_verbose(),
            number_of_cores: default_number_of_cores(),
            model: default_model(),
            initial_conditions: InitialConditionsConfig::default(),
            dynamics: DynamicConfiguration::default(),
        }
    }
}

/// The analytic model that provides the electronic structure
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum ModelConfig {
    Harmonic(Harmonic),
    CrossingParabolas(CrossingParabolas),
    Cosine(CosineModel),
    ConstantCoupling(ConstantCoupling),
}

/// Gaussian distribution of the initial coordinates and momenta. With
/// `temperature` the momenta are sampled from the Maxwell-Boltzmann distribution instead.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct InitialConditionsConfig {
    #[serde(default = "default_ntraj")]
    pub ntraj: usize,
    #[serde(default = "default_initial_state")]
    pub initial_state: usize,
    #[serde(default = "default_sampling_seed")]
    pub seed: u64,
    #[serde(default = "default_q_mean")]
    pub q_mean: Vec<f64>,
    #[serde(default = "default_q_width")]
    pub q_width: Vec<f64>,
    #[serde(default = "default_p_mean")]
    pub p_mean: Vec<f64>,
    #[serde(default = "default_p_width")]
    pub p_width: Vec<f64>,
    #[serde(default = "default_inv_mass")]
    pub inv_mass: Vec<f64>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

impl Default for InitialConditionsConfig {
    fn default() -> Self {
        InitialConditionsConfig {
            ntraj: default_ntraj(),
            initial_state: default_initial_state(),
            seed: default_sampling_seed(),
            q_mean: default_q_mean(),
            q_width: default_q_width(),
            p_mean: default_p_mean(),
            p_width: default_p_width(),
            inv_mass: default_inv_mass(),
            temperature: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsh_dynamics::initialization::methods::{DecoherenceMethod, TshMethod};

    #[test]
    fn empty_input_gives_defaults() {
        let config: Configuration = toml::from_str("").unwrap();
        assert_eq!(config.verbose, 0);
        assert_eq!(config.initial_conditions.ntraj, NTRAJ);
        assert!(matches!(config.model, ModelConfig::CrossingParabolas(_)));
        assert_eq!(config.dynamics.tsh_method, TshMethod::Fssh);
    }

    #[test]
    fn model_and_dynamics_tables() {
        let input: &str = r#"
            verbose = 1

            [model]
            name = "cosine"
            k = 0.2
            w = 0.5
            v = 0.01

            [initial_conditions]
            ntraj = 10
            temperature = 300.0

            [dynamics]
            nstep = 20
            tsh_method = 2
            isNBRA = true

            [dynamics.decoherence_config]
            decoherence_algo = 0
        "#;
        let config: Configuration = toml::from_str(input).unwrap();
        match config.model {
            ModelConfig::Cosine(model) => assert_eq!(model.w, 0.5),
            other => panic!("unexpected model {:?}", other),
        }
        assert_eq!(config.initial_conditions.ntraj, 10);
        assert_eq!(config.initial_conditions.temperature, Some(300.0));
        assert_eq!(config.dynamics.nstep, 20);
        assert_eq!(config.dynamics.tsh_method, TshMethod::Mssh);
        assert!(config.dynamics.is_nbra);
        assert_eq!(
            config.dynamics.decoherence_config.decoherence_algo,
            DecoherenceMethod::Sdm
        );
    }

    #[test]
    fn unknown_method_code_is_rejected() {
        let input: &str = "[dynamics]\ntsh_method = 7\n";
        assert!(toml::from_str::<Configuration>(input).is_err());
    }

    #[test]
    fn written_configuration_can_be_read_again() {
        let config: Configuration = Configuration::default();
        let written: String = toml::to_string(&config).unwrap();
        let read: Configuration = toml::from_str(&written).unwrap();
        assert_eq!(read.initial_conditions.q_mean, config.initial_conditions.q_mean);
        assert_eq!(read.dynamics.dt, config.dynamics.dt);
    }
}
