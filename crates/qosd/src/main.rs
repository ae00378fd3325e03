//! `qosd`: the QoS adjustment daemon.
//!
//! Hosts the adjustment engine and exposes its self-checks.
//!
//! # Usage
//!
//! ```text
//! qosd config                                 # print the effective configuration
//! qosd -c qosd.toml config                    # same, from a config file
//! qosd simulate -n 1000 -a replicate-copy     # drive the engine against loopback pools
//! qosd simulate -a wait-for-stage --cancel-every 10 --fail-every 7
//! ```

mod config;
mod loopback;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use qos_adjuster::{AdjusterFactory, CopyRelay, WorkerPool};
use qos_types::{AdjustmentTask, FileAttributes, FileId, PoolInfo, QosAction};
use tokio::runtime::Handle;
use tracing::{debug, info};

use config::CliConfig;
use loopback::{Loopback, Tally};

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "qosd", version, about = "QoS adjustment engine daemon")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true, env = "QOSD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration as TOML.
    Config,

    /// Run adjustments against in-memory pools and a loopback pin manager.
    Simulate {
        /// Number of files to adjust.
        #[arg(short = 'n', long, default_value = "100")]
        files: usize,

        /// QoS action to apply to every file (e.g. `set-persisted`).
        #[arg(short, long, default_value = "replicate-copy")]
        action: QosAction,

        /// Answer every N-th remote request with an error.
        #[arg(long)]
        fail_every: Option<u64>,

        /// Cancel every N-th task right after starting it.
        #[arg(long)]
        cancel_every: Option<usize>,

        /// Simulated remote latency in milliseconds.
        #[arg(long, default_value = "5")]
        latency_ms: u64,
    },
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    telemetry::init(&config.log.level);

    match cli.command {
        Commands::Config => cmd_config(&config),
        Commands::Simulate {
            files,
            action,
            fail_every,
            cancel_every,
            latency_ms,
        } => {
            let summary = cmd_simulate(
                &config,
                SimulateOptions {
                    files,
                    action,
                    fail_every,
                    cancel_every,
                    latency: Duration::from_millis(latency_ms),
                },
            )
            .await?;
            summary.print();
            Ok(())
        }
    }
}

// -----------------------------------------------------------------------
// qosd config
// -----------------------------------------------------------------------

fn cmd_config(config: &CliConfig) -> Result<()> {
    let rendered = config.to_toml().context("failed to render config")?;
    print!("{rendered}");
    Ok(())
}

// -----------------------------------------------------------------------
// qosd simulate
// -----------------------------------------------------------------------

struct SimulateOptions {
    files: usize,
    action: QosAction,
    fail_every: Option<u64>,
    cancel_every: Option<usize>,
    latency: Duration,
}

#[derive(Debug)]
struct Summary {
    action: QosAction,
    files: usize,
    completed: usize,
    failed: usize,
    cancelled: usize,
    requests: u64,
    unpins: u64,
    cancelled_copies: u64,
    elapsed: Duration,
}

impl Summary {
    fn print(&self) {
        println!("QoS Simulation");
        println!("  action:    {}", self.action);
        println!("  files:     {}", self.files);
        println!();
        println!("Outcomes:");
        println!("  completed: {}", self.completed);
        println!("  failed:    {}", self.failed);
        println!("  cancelled: {}", self.cancelled);
        println!();
        println!("Remote traffic:");
        println!("  requests:         {}", self.requests);
        println!("  unpins:           {}", self.unpins);
        println!("  copy cancels:     {}", self.cancelled_copies);
        println!();
        println!(
            "Elapsed: {:.2}s ({:.0} tasks/s)",
            self.elapsed.as_secs_f64(),
            self.files as f64 / self.elapsed.as_secs_f64().max(f64::EPSILON)
        );
    }
}

/// Build the synthetic task for file number `i`.
fn simulated_task(i: usize, action: QosAction) -> AdjustmentTask {
    let mut attributes = FileAttributes::new(FileId::new(format!("sim-{i:06}")), 1 << 20);
    attributes.locations = vec!["pool-src".to_string()];
    attributes.on_nearline = action == QosAction::WaitForStage;

    AdjustmentTask::new(attributes, action)
        .with_source("pool-src")
        .with_target(PoolInfo::named("pool-dst"))
        .with_pool_group("sim-group")
}

async fn cmd_simulate(config: &CliConfig, opts: SimulateOptions) -> Result<Summary> {
    let engine_config = config.adjuster_config();
    let relay = CopyRelay::new();
    let loopback = Loopback::new(Handle::current(), relay.clone(), opts.latency, opts.fail_every);
    let tally = Arc::new(Tally::default());
    let workers = WorkerPool::current(engine_config.max_concurrent);

    let factory = AdjusterFactory::new(
        loopback.clone(),
        loopback.clone(),
        loopback.clone(),
        workers,
        tally.clone(),
        engine_config,
    )
    .with_copy_relay(relay);

    if !factory.supports(opts.action) {
        bail!("no adjuster handles QoS action {}", opts.action);
    }

    info!(files = opts.files, action = %opts.action, "starting simulation");
    let start = Instant::now();

    for i in 0..opts.files {
        let adjuster = factory.for_action(opts.action).build();
        adjuster.clone().adjust_qos(simulated_task(i, opts.action));

        if opts.cancel_every.is_some_and(|n| n > 0 && (i + 1) % n == 0) {
            adjuster.cancel("cancelled by simulation");
        }
    }

    tally.wait_for(opts.files).await;
    let elapsed = start.elapsed();
    debug!(?elapsed, "all outcomes delivered");

    let (completed, failed, cancelled) = tally.counts();
    let stats = loopback.stats();
    Ok(Summary {
        action: opts.action,
        files: opts.files,
        completed,
        failed,
        cancelled,
        requests: stats.requests,
        unpins: stats.unpins,
        cancelled_copies: stats.cancelled_copies,
        elapsed,
    })
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
