//! dispatch-sim: run a simulated fleet against the dispatch core and print a
//! JSON summary.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dispatch_sim::config_file::load_config;
use dispatch_sim::scenario::{run_scenario, ScenarioParams};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dispatch-sim")]
#[command(about = "Simulate drivers and riders against the dispatch core", long_about = None)]
struct Args {
    /// Number of drivers
    #[arg(long, default_value_t = 5)]
    drivers: usize,

    /// Number of riders
    #[arg(long, default_value_t = 10)]
    riders: usize,

    /// Seed for driver placement and rider choices
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Wall-clock run time in seconds
    #[arg(long, default_value_t = 60)]
    duration_secs: u64,

    /// Chance that a rider cancels a matched ride before pickup
    #[arg(long, default_value_t = 0.1)]
    cancel_probability: f64,

    /// JSON dispatch config; defaults apply to missing fields
    #[arg(long, env = "DISPATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Write the summary here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    let params = ScenarioParams::default()
        .with_drivers(args.drivers)
        .with_riders(args.riders)
        .with_seed(args.seed)
        .with_duration(Duration::from_secs(args.duration_secs))
        .with_cancel_probability(args.cancel_probability);

    let summary = run_scenario(config, params).await?;
    let json = serde_json::to_string_pretty(&summary)?;
    match args.output {
        Some(path) => fs::write(&path, json)
            .with_context(|| format!("failed to write summary to {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}
