//! Runs a recursive fan-out through a tracker and waits until every thread
//! it spawned has finished.
//!
//! ```text
//! cargo run --example fanout -- --variant registry --countdown 100 --width 2
//! ```

use clap::{Parser, ValueEnum};
use spawnwatch::{Builder, FanOut, Track, Tracker, spawn_fan_out};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Variant {
    /// Count live threads
    Counting,
    /// Record the identity of every live thread
    Registry,
}

#[derive(Parser)]
#[command(name = "fanout")]
#[command(about = "Stress a thread tracker with recursive fan-out", long_about = None)]
struct Cli {
    /// Tracker flavor
    #[arg(long, value_enum, default_value_t = Variant::Registry)]
    variant: Variant,

    /// Number of bodies allowed to branch
    #[arg(long, default_value_t = 100)]
    countdown: usize,

    /// Children spawned by every branching body
    #[arg(long, default_value_t = 2)]
    width: usize,

    /// Supervisor sleep between two live-count reads
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval_ms: u64,

    /// Sleep inside every body before it branches
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,
}

fn build_tracker(cli: &Cli) -> anyhow::Result<Tracker> {
    let builder = match cli.variant {
        Variant::Counting => Builder::new_counting(),
        Variant::Registry => Builder::new_registry(),
    };

    let tracker = builder
        .thread_name("fanout")
        .poll_interval(Duration::from_millis(cli.poll_interval_ms))
        .try_build()?;

    Ok(tracker)
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let tracker = match build_tracker(&cli) {
        Ok(tracker) => tracker,
        Err(e) => {
            error!(error = %e, "failed to create tracker");
            return ExitCode::FAILURE;
        }
    };

    let mut plan = FanOut::new(cli.countdown, cli.width);
    if cli.delay_ms > 0 {
        plan = plan.with_delay(Duration::from_millis(cli.delay_ms));
    }
    let plan = Arc::new(plan);

    let start = Instant::now();
    let root = tracker.run(|tracker| spawn_fan_out(tracker, Arc::clone(&plan)));

    if let Err(e) = root {
        error!(error = %e, "failed to spawn the fan-out root");
        return ExitCode::FAILURE;
    }

    info!(
        variant = ?cli.variant,
        executed = plan.executed(),
        expected = FanOut::total_bodies(cli.countdown, cli.width),
        spawn_failures = plan.spawn_failures(),
        elapsed = ?start.elapsed(),
        "all tracked threads finished"
    );

    ExitCode::SUCCESS
}
