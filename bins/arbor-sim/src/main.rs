//! Arbor fork simulator.
//!
//! Drives a ledger with several simulated miners that fork, spend, and
//! occasionally misbehave, then reports what the branch index retained.

mod sim;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use arbor_chain::fork_choice::ForkChoiceKind;
use arbor_chain::{ChainConfig, Ledger};

use crate::sim::{SimParams, Summary};

#[derive(Parser, Debug)]
#[command(
    name = "arbor-sim",
    version,
    about = "Simulate competing miners against a fork-aware Arbor ledger"
)]
struct Args {
    /// Number of blocks to attempt
    #[arg(long, default_value_t = 200)]
    blocks: u64,

    /// Number of simulated miners
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u8).range(1..))]
    miners: u8,

    /// Probability that a block extends a random retained block instead of the best tip
    #[arg(long, default_value_t = 0.2)]
    fork_rate: f64,

    /// Probability that a block is deliberately faulty
    #[arg(long, default_value_t = 0.05)]
    invalid_rate: f64,

    /// RNG seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Chain config file (TOML); ARBOR_* environment variables override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured cutoff age
    #[arg(long)]
    cutoff_age: Option<u64>,

    /// Override the configured fork choice ("first-seen" or "lowest-hash")
    #[arg(long)]
    fork_choice: Option<ForkChoiceKind>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn chain_config(&self) -> Result<ChainConfig> {
        let mut config = match &self.config {
            Some(path) => ChainConfig::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => ChainConfig::default(),
        };
        if let Some(cutoff_age) = self.cutoff_age {
            config.cutoff_age = cutoff_age;
        }
        if let Some(fork_choice) = self.fork_choice {
            config.fork_choice = fork_choice;
        }
        config.validate().context("invalid chain config")?;
        Ok(config)
    }

    fn sim_params(&self) -> SimParams {
        SimParams {
            rounds: self.blocks,
            miners: self.miners,
            fork_rate: self.fork_rate,
            invalid_rate: self.invalid_rate,
            seed: self.seed,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, &args.log_format);

    let config = args.chain_config()?;
    let params = args.sim_params();
    info!("Arbor simulator v{}", env!("CARGO_PKG_VERSION"));

    let genesis = sim::genesis(params.miners);
    let ledger = Ledger::new(genesis.clone(), config).context("failed to create ledger")?;
    let summary = sim::run(&ledger, genesis, &params)?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("failed to serialize summary")?
        );
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &Summary) {
    println!("rounds:             {}", summary.rounds);
    println!("accepted:           {}", summary.accepted);
    println!("tip changes:        {}", summary.tip_changes);
    println!("staged spends:      {}", summary.staged);
    println!("evicted:            {}", summary.evicted);
    for (kind, count) in &summary.rejected {
        println!("rejected ({kind}): {count}");
    }
    println!("best height:        {}", summary.best_height);
    println!("best tip:           {}", summary.best_tip);
    println!("lowest height:      {}", summary.lowest_height);
    println!("retained blocks:    {}", summary.retained_blocks);
    println!("retained snapshots: {}", summary.retained_snapshots);
    println!("live tips:          {}", summary.live_tips);
    println!("cutoff age:         {}", summary.cutoff_age);
    println!("fork choice:        {}", summary.fork_choice);
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// `RUST_LOG` takes precedence over `level_str`. Pass `format = "json"` for
/// structured output; anything else is human-readable text. Logs go to
/// stderr so the summary on stdout stays machine-readable.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
            .init();
    }
}
