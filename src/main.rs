use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, trace, warn};
use particle_life_engine::{Simulation, SimulationConfig, Snapshot};
use std::path::PathBuf;
use std::time::Instant;

/// Command-line arguments for the headless driver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML). Defaults are used if it does not exist.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Number of steps to run, overriding `timing.total_steps`
    #[arg(short, long)]
    steps: Option<u32>,

    /// Rayon worker threads, overriding `engine.num_threads`
    #[arg(short, long)]
    threads: Option<usize>,
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();
    let args = Args::parse();

    info!("Starting Particle Life Engine (CPU Parallel)...");

    // --- Load Configuration ---
    let config = if args.config.exists() {
        SimulationConfig::load(&args.config)?
    } else {
        warn!(
            "Config file '{}' not found. Using default configuration.",
            args.config.display()
        );
        SimulationConfig::default()
    };

    // --- Configure Rayon Thread Pool (Optional) ---
    if let Some(num_threads) = args.threads.or(config.engine.num_threads) {
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .context("Failed to configure the rayon thread pool")?;
    }
    info!("Using {} Rayon threads.", rayon::current_num_threads());

    let total_steps = args.steps.unwrap_or(config.timing.total_steps);
    let record_interval_steps = config.timing.record_interval_steps.max(1);

    // --- Initialize Simulation ---
    let mut sim = Simulation::new(config)?;
    debug!("Simulation Parameters: {:#?}", sim.params());
    let dt = sim.params().dt;

    // --- Simulation Loop ---
    sim.start();
    info!("Starting simulation loop for {} steps...", total_steps);
    let mut snapshots: Vec<Snapshot> = vec![sim.snapshot(false)];
    let start_time = Instant::now();

    for step in 0..total_steps {
        let step_start_time = Instant::now();
        sim.step(dt)
            .with_context(|| format!("Simulation step {} failed", step + 1))?;
        let step_duration = step_start_time.elapsed();

        let is_record_step = (step + 1) % record_interval_steps == 0;
        let is_last_step = step + 1 == total_steps;
        if is_record_step || is_last_step {
            let snapshot = sim.snapshot(false);
            info!(
                "Step [{}/{}] (t = {:.3}) | Particles: {} | Mean speed: {:.4} | Step Time: {:6.2} ms | Elapsed: {:.2} s",
                step + 1,
                total_steps,
                snapshot.time,
                snapshot.total_particle_count,
                snapshot.mean_speed,
                step_duration.as_secs_f64() * 1000.0,
                start_time.elapsed().as_secs_f64()
            );
            snapshots.push(snapshot);
        } else {
            trace!(
                "Step [{}/{}] completed in {:.2} ms",
                step + 1,
                total_steps,
                step_duration.as_secs_f64() * 1000.0
            );
        }
    }
    sim.stop();

    let total_duration = start_time.elapsed();
    info!(
        "Simulation finished in {:.3} seconds ({} snapshots recorded).",
        total_duration.as_secs_f64(),
        snapshots.len()
    );
    if let Some(last) = snapshots.last() {
        info!("Final type counts: {:?}", last.type_counts);
    }
    if total_steps > 0 {
        info!(
            "Average step time: {:.3} ms",
            total_duration.as_secs_f64() * 1000.0 / total_steps as f64
        );
    }

    Ok(())
}
