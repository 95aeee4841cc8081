//! SymPlace command-line interface.
//!
//! `symplace <input> <output> [area_ratio]` reads a hard-block problem
//! file, runs the annealing floorplanner under a wall-clock watchdog, and
//! writes the best placement found. On timeout the best-so-far placement
//! is still written and the exit code is 0; only unrecoverable errors
//! (missing files, parse failures, no placement at all) exit nonzero.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use symplace_core::{AnnealConfig, Watchdog};
use symplace_floorplan::{
    read_problem_file, write_placement_file, PlacementSolver, SolverConfig,
};

#[derive(Parser)]
#[command(name = "symplace")]
#[command(about = "Analog-layout floorplanner with symmetry constraints")]
#[command(version)]
struct Cli {
    /// Input problem file.
    input: PathBuf,

    /// Output placement file.
    output: PathBuf,

    /// Area weight in the cost function; the wirelength weight is its
    /// complement.
    #[arg(default_value = "1.0")]
    area_ratio: f64,

    /// Random seed for reproducible runs.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Wall-clock budget in seconds before the cooperative stop fires.
    #[arg(short, long, default_value = "240")]
    timeout: u64,

    /// Grace period in seconds before the emergency shutdown writes the
    /// best-so-far placement and exits.
    #[arg(long, default_value = "10")]
    grace: u64,

    /// Initial annealing temperature (0 = auto from sampled moves).
    #[arg(long, default_value = "0.0")]
    initial_temperature: f64,

    /// Final annealing temperature.
    #[arg(long, default_value = "0.1")]
    final_temperature: f64,

    /// Geometric cooling rate per temperature level.
    #[arg(long, default_value = "0.9")]
    cooling_rate: f64,

    /// Moves attempted per temperature level.
    #[arg(long, default_value = "1500")]
    moves_per_temperature: u32,

    /// Consecutive non-improving levels before extra cooling.
    #[arg(long, default_value = "3")]
    no_improvement_limit: u32,
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    if !(0.0..=1.0).contains(&cli.area_ratio) {
        anyhow::bail!("area_ratio must be between 0.0 and 1.0");
    }

    let (modules, groups) = read_problem_file(&cli.input)
        .with_context(|| format!("failed to read problem from {}", cli.input.display()))?;
    log::info!(
        "loaded {} modules, {} symmetry groups",
        modules.len(),
        groups.len()
    );

    let mut anneal = AnnealConfig::new()
        .with_initial_temperature(cli.initial_temperature)
        .with_final_temperature(cli.final_temperature)
        .with_cooling_rate(cli.cooling_rate)
        .with_moves_per_temperature(cli.moves_per_temperature)
        .with_no_improvement_limit(cli.no_improvement_limit);
    if let Some(seed) = cli.seed {
        anneal = anneal.with_seed(seed);
    }

    let config = SolverConfig::new()
        .with_area_ratio(cli.area_ratio)
        .with_anneal(anneal);
    let mut solver = PlacementSolver::new(config);

    // The watchdog requests a cooperative stop at the timeout; if the
    // solver has not wound down after the grace period, the emergency
    // callback writes whatever best placement exists and exits cleanly.
    let shared_best = solver.shared_best();
    let emergency_output = cli.output.clone();
    let watchdog = Watchdog::spawn(
        Duration::from_secs(cli.timeout),
        Duration::from_secs(cli.grace),
        move || {
            let snapshot = shared_best.lock().ok().and_then(|slot| slot.clone());
            match snapshot {
                Some((placements, area)) => {
                    eprintln!("emergency shutdown: writing best placement so far");
                    if let Err(e) = write_placement_file(&emergency_output, &placements, area) {
                        eprintln!("emergency write failed: {}", e);
                        std::process::exit(1);
                    }
                    std::process::exit(0);
                }
                None => {
                    eprintln!("emergency shutdown: no placement available");
                    std::process::exit(1);
                }
            }
        },
    );

    solver.set_stop_handle(watchdog.stop_handle());

    let result = solver.solve(modules, groups)?;
    watchdog.disarm();

    if !result.is_successful() {
        anyhow::bail!("no placement produced");
    }
    if result.cancelled {
        log::info!("stopped on timeout; writing best placement found");
    }

    write_placement_file(&cli.output, &result.placements, result.area)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;

    println!(
        "area {} with {} modules in {} ms ({} iterations)",
        result.area,
        result.placements.len(),
        result.computation_time_ms,
        result.iterations
    );
    Ok(())
}
