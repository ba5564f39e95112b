//! Balancer CLI Application

use anyhow::{bail, Context};
use balancer_core::domain::{
    Adjustment, BalanceProfile, CompiledProfile, ProfileStore, SinkFilter, SinkSession,
    VolumeRange,
};
use balancer_infra::audio::{BalanceEngine, EngineOptions, PactlSession, RunSummary, SinkOutcome};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "balancer")]
#[command(about = "Rebalance the channels of audio sinks from named profiles", long_about = None)]
struct Cli {
    /// Overall level change with a trailing sign, e.g. `5+`, `10-` or `0.05-`
    adjustment: Option<Adjustment>,

    /// Balance profile to apply (default: every channel equal)
    #[arg(short, long)]
    profile: Option<String>,

    /// Profile file (default: <config dir>/balancer/balance.yml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only balance sinks whose "#index name description" matches
    #[arg(short, long, value_name = "PATTERN")]
    sink: Option<String>,

    /// Highest linear volume any channel may be set to, in percent of unity
    #[arg(long, value_name = "PERCENT", default_value_t = 150.0)]
    max_volume: f64,

    /// Sound server to connect to instead of the default one
    #[arg(long, value_name = "SERVER")]
    server: Option<String>,

    /// Compute and print the new volumes without applying them
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Print the available profiles and exit
    #[arg(short, long)]
    list_profiles: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let store = load_profiles(&cli).await?;

    if cli.list_profiles {
        print_profiles(&store);
        return Ok(());
    }

    // Everything that can fail on bad input fails here, before any sink is touched
    let profile = store.select(cli.profile.as_deref())?;
    let compiled = CompiledProfile::compile(&profile)?;
    let filter = match &cli.sink {
        Some(pattern) => SinkFilter::new(pattern)?,
        None => SinkFilter::all(),
    };

    let options = EngineOptions {
        adjustment: cli.adjustment.unwrap_or_default(),
        range: VolumeRange::from_percent(cli.max_volume),
        filter,
        dry_run: cli.dry_run,
    };

    info!(profile = %compiled.name, "Balancer starting");

    let session = match &cli.server {
        Some(server) => PactlSession::new().with_server(server.as_str()),
        None => PactlSession::new(),
    };
    let session: Arc<dyn SinkSession> = Arc::new(session);
    let summary = BalanceEngine::new(session, compiled)
        .with_options(options)
        .run()
        .await?;

    print_summary(&summary);

    if !summary.is_success() {
        bail!(
            "{} of {} sinks could not be balanced",
            summary.sinks_failed(),
            summary.sinks_selected()
        );
    }

    Ok(())
}

async fn load_profiles(cli: &Cli) -> anyhow::Result<ProfileStore> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => ProfileStore::default_config_path()?,
    };

    ProfileStore::load_for_run(&path, cli.config.is_some(), cli.profile.as_deref())
        .await
        .with_context(|| format!("loading profiles from {}", path.display()))
}

fn print_profiles(store: &ProfileStore) {
    let default = BalanceProfile::default_profile();
    for profile in std::iter::once(&default).chain(store.profiles()) {
        println!("{}:", profile.name);
        for rule in &profile.rules {
            println!("  {:>5.0}%  {}", rule.weight * 100.0, rule.pattern);
        }
    }
}

fn print_summary(summary: &RunSummary) {
    for report in &summary.reports {
        let sink = &report.sink;
        println!(
            "sink {} <{}> ({} channels) {}:",
            sink.index,
            sink.name,
            sink.channel_count(),
            sink.description.as_deref().unwrap_or("(no description)")
        );

        for (channel, target) in sink.channels.iter().zip(&report.resolution.channels) {
            let mut flags = String::new();
            if target.clamped {
                flags.push_str("  floor");
            }
            if target.out_of_range {
                flags.push_str("  max");
            }
            println!(
                "{:>20}  {:>6.1}% -> {:>6.1}%{}",
                channel.position,
                channel.volume * 100.0,
                target.target_volume * 100.0,
                flags
            );
        }

        match &report.outcome {
            SinkOutcome::Applied => println!("  volume set"),
            SinkOutcome::DryRun => println!("  dry run, volume not set"),
            SinkOutcome::Skipped(reason) => println!("  skipped: {}", reason),
            SinkOutcome::Failed(reason) => println!("  volume not set: {}", reason),
        }
    }

    if summary.reports.is_empty() {
        println!("no sinks selected ({} available)", summary.sinks_seen);
    }
}
