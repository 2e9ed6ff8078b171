use crate::dynamics::StepReport;
use crate::constants::HARTREE_TO_EV;
use log::{info, warn};

pub fn print_header_dynamics(ntraj: usize, nstep: usize) {
    warn!("{:^90}", "");
    warn!("{: ^90}", "Surface Hopping Dynamics");
    warn!("{:-^90}", "");
    warn!("{: <30} {:>10}", "Number of trajectories:", ntraj);
    warn!("{: <30} {:>10}", "Number of steps:", nstep);
    warn!("{:-^90}", "");
}

pub fn print_step_summary(
    step: usize,
    time: f64,
    kinetic_energy: f64,
    total_energy: f64,
    energy_diff: f64,
    report: &StepReport,
) {
    info!(
        "step {:>7}  t = {:>12.3} au  Ekin = {:>14.8} Ha  Etot = {:>14.8} Ha  dE = {:>10.3e} eV",
        step,
        time,
        kinetic_energy,
        total_energy,
        energy_diff * HARTREE_TO_EV
    );
    info!(
        "{: <25} {:>6} accepted, {:>6} frustrated, {:>6} decoherence events",
        "Hops:", report.accepted_hops, report.frustrated_hops, report.decoherence_events
    );
}

pub fn print_footer_dynamics(timing: f64, totals: &StepReport) {
    warn!("{:-<90} ", "");
    warn!(
        "{: <25} {:>6} accepted, {:>6} frustrated, {:>6} decoherence events",
        "Total hops:", totals.accepted_hops, totals.frustrated_hops, totals.decoherence_events
    );
    warn!(
        "{:>78} {:>8.2} s",
        "Surface Hopping Dynamics finished in", timing
    );
}
