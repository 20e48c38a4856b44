use std::process::{exit, Command};

use clap::{Parser, Subcommand, ValueEnum};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the dispatch workspace",
    long_about = "A unified CLI for running the fleet simulation, benchmarks,\n\
                  and CI checks in the dispatch workspace."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the standard simulation (5 drivers, 10 riders, 60 s)
    Run {
        /// Optional JSON dispatch config
        #[arg(long)]
        config: Option<String>,
    },
    /// Run a crowded simulation (200 drivers, 1 000 riders, 120 s)
    RunLarge,
    /// Run Criterion benchmarks
    Bench,
    /// Run CI checks (fmt, clippy, tests, benchmarks)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting, clippy, and tests
    Check,
    /// Short simulation smoke run
    Sim,
    /// Run benchmarks
    Bench,
    /// Run check + sim + bench
    All,
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn run_cargo(args: &[&str]) {
    eprintln!("+ cargo {}", args.join(" "));
    match Command::new("cargo").args(args).status() {
        Ok(status) if status.success() => {}
        Ok(status) => exit(status.code().unwrap_or(1)),
        Err(err) => {
            eprintln!("failed to execute cargo: {err}");
            exit(1);
        }
    }
}

fn run_sim(extra: &[&str]) {
    let mut args = vec!["run", "-p", "dispatch_sim", "--release", "--"];
    args.extend_from_slice(extra);
    run_cargo(&args);
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);

    step("Test dispatch_core");
    run_cargo(&["test", "-p", "dispatch_core"]);

    step("Test dispatch_sim");
    run_cargo(&["test", "-p", "dispatch_sim"]);
}

fn ci_sim() {
    step("Simulation smoke run (10 s)");
    run_sim(&["--duration-secs", "10"]);
}

fn ci_bench() {
    step("Run benchmarks");
    run_cargo(&["bench", "--package", "dispatch_core", "--bench", "performance"]);
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => match config.as_deref() {
            Some(path) => run_sim(&["--config", path]),
            None => run_sim(&[]),
        },
        Commands::RunLarge => run_sim(&[
            "--drivers",
            "200",
            "--riders",
            "1000",
            "--duration-secs",
            "120",
        ]),
        Commands::Bench => ci_bench(),
        Commands::Ci { job } => match job {
            CiJob::Check => ci_check(),
            CiJob::Sim => ci_sim(),
            CiJob::Bench => ci_bench(),
            CiJob::All => {
                ci_check();
                ci_sim();
                ci_bench();
            }
        },
    }
}
