use crate::io::{read_input, write_footer, write_header, Configuration, ModelConfig};
use crate::utils::Timer;
use anyhow::{Context, Result};
use clap::{crate_name, crate_version, Arg, Command};
use env_logger::Builder;
use log::{info, LevelFilter};
use ndarray::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::Write;
use tsh_dynamics::dynamics::StepReport;
use tsh_dynamics::initialization::{Simulation, SystemData};
use tsh_dynamics::models::{DiabaticModel, ModelHamiltonian};

mod defaults;
mod io;
mod utils;

fn main() -> Result<()> {
    // Input.
    let matches = Command::new(crate_name!())
        .version(crate_version!())
        .about("trajectory surface hopping dynamics of model Hamiltonians")
        .arg(
            Arg::new("config-File")
                .help("Sets the TOML configuration file to use")
                .index(1),
        )
        .get_matches();
    let config: Configuration = read_input(matches.value_of("config-File"))?;

    // Multithreading.
    rayon::ThreadPoolBuilder::new()
        .num_threads(config.number_of_cores)
        .build_global()
        .context("Unable to build the thread pool")?;

    // Logging.
    // The log level is set.
    let log_level: LevelFilter = match config.verbose {
        2 => LevelFilter::Trace,
        1 => LevelFilter::Debug,
        0 => LevelFilter::Info,
        -1 => LevelFilter::Warn,
        -2 => LevelFilter::Error,
        _ => LevelFilter::Info,
    };
    // and the logger is build.
    Builder::new()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .filter(None, log_level)
        .init();

    write_header();
    let timer: Timer = Timer::start();

    let report: StepReport = match config.model.clone() {
        ModelConfig::Harmonic(model) => run_dynamics(model, &config)?,
        ModelConfig::CrossingParabolas(model) => run_dynamics(model, &config)?,
        ModelConfig::Cosine(model) => run_dynamics(model, &config)?,
        ModelConfig::ConstantCoupling(model) => run_dynamics(model, &config)?,
    };
    info!(
        "{: <25} {:>6} accepted, {:>6} frustrated",
        "Hops of the run:", report.accepted_hops, report.frustrated_hops
    );

    write_footer(timer);
    Ok(())
}

/// Sample the initial conditions and run the ensemble on the given model
fn run_dynamics<M: DiabaticModel>(model: M, config: &Configuration) -> Result<StepReport> {
    let initial = &config.initial_conditions;
    let mut rng: StdRng = StdRng::seed_from_u64(initial.seed);
    let nstates: usize = model.nstates();

    let mut system: SystemData = SystemData::sample_gaussian(
        Array1::from(initial.q_mean.clone()).view(),
        Array1::from(initial.q_width.clone()).view(),
        Array1::from(initial.p_mean.clone()).view(),
        Array1::from(initial.p_width.clone()).view(),
        Array1::from(initial.inv_mass.clone()),
        initial.ntraj,
        nstates,
        initial.initial_state,
        &mut rng,
    )
    .context("Invalid initial conditions")?;
    if let Some(temperature) = initial.temperature {
        system = system.with_boltzmann_momenta(temperature, &mut rng)?;
    }

    let mut ham: ModelHamiltonian<M> =
        ModelHamiltonian::new(model, config.dynamics.n_children(initial.ntraj));
    let mut simulation: Simulation = Simulation::new(config.dynamics.clone(), system, &mut ham)?;
    let report: StepReport = simulation.run(&mut ham)?;
    Ok(report)
}
