//! One-shot balance run over every sink of a session
//!
//! The engine lists sinks once, resolves each selected sink against the
//! compiled profile and submits all volume changes concurrently. It only
//! returns once every submitted request has been acknowledged or failed, so
//! no acknowledgement is lost when the caller tears the session down.

use balancer_core::domain::balance::{BalanceResolver, Resolution};
use balancer_core::domain::pattern::{CompiledProfile, SinkFilter};
use balancer_core::domain::sink::{Result, SinkIndex, SinkInfo, SinkSession};
use balancer_core::domain::volume::{Adjustment, VolumeRange};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

/// Per-run options
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub adjustment: Adjustment,
    pub range: VolumeRange,
    pub filter: SinkFilter,
    /// Resolve and report without touching any sink
    pub dry_run: bool,
}

/// What happened to one sink
#[derive(Debug, Clone, PartialEq)]
pub enum SinkOutcome {
    Applied,
    DryRun,
    Skipped(String),
    Failed(String),
}

/// Resolution and outcome for one selected sink
#[derive(Debug, Clone)]
pub struct SinkReport {
    pub sink: SinkInfo,
    pub resolution: Resolution,
    pub outcome: SinkOutcome,
}

/// Result of a whole run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Sinks reported by the session
    pub sinks_seen: usize,
    /// Reports for the sinks the filter selected, in session order
    pub reports: Vec<SinkReport>,
}

impl RunSummary {
    pub fn sinks_selected(&self) -> usize {
        self.reports.len()
    }

    pub fn sinks_balanced(&self) -> usize {
        self.count(|o| matches!(o, SinkOutcome::Applied))
    }

    pub fn sinks_failed(&self) -> usize {
        self.count(|o| matches!(o, SinkOutcome::Failed(_)))
    }

    pub fn warnings(&self) -> usize {
        self.reports
            .iter()
            .map(|r| r.resolution.warnings.len())
            .sum()
    }

    pub fn is_success(&self) -> bool {
        self.sinks_failed() == 0
    }

    fn count(&self, predicate: impl Fn(&SinkOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| predicate(&r.outcome)).count()
    }
}

/// Balance engine driving one sink session
pub struct BalanceEngine {
    session: Arc<dyn SinkSession>,
    profile: Arc<CompiledProfile>,
    options: EngineOptions,
}

impl BalanceEngine {
    pub fn new(session: Arc<dyn SinkSession>, profile: CompiledProfile) -> Self {
        Self {
            session,
            profile: Arc::new(profile),
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Resolve a single sink without applying anything
    pub fn resolve(&self, sink: &SinkInfo) -> Resolution {
        BalanceResolver::new(&self.profile)
            .with_range(self.options.range)
            .resolve(&sink.channels, self.options.adjustment)
    }

    /// List, resolve and apply. Fails only if the sink list cannot be read;
    /// per-sink failures are reported in the summary.
    #[instrument(skip(self), fields(profile = %self.profile.name))]
    pub async fn run(&self) -> Result<RunSummary> {
        let sinks = self.session.list_sinks().await?;
        info!(
            count = sinks.len(),
            adjustment = %self.options.adjustment,
            dry_run = self.options.dry_run,
            "Balancing sinks"
        );

        let mut summary = RunSummary {
            sinks_seen: sinks.len(),
            reports: Vec::new(),
        };

        // The join set is the tally of requests still in flight
        let mut in_flight = JoinSet::new();
        let mut pending: HashMap<SinkIndex, usize> = HashMap::new();

        for sink in sinks {
            if !self.options.filter.accepts(&sink) {
                debug!(sink = %sink.index, name = %sink.name, "Sink not selected");
                continue;
            }

            let resolution = self.resolve(&sink);
            log_resolution(&sink, &resolution);

            let outcome = if sink.channels.is_empty() {
                SinkOutcome::Skipped("sink has no channels".to_string())
            } else if self.options.dry_run {
                SinkOutcome::DryRun
            } else {
                let session = Arc::clone(&self.session);
                let index = sink.index;
                let volumes = resolution.volumes();
                in_flight.spawn(async move {
                    let result = session.set_sink_volume(index, &volumes).await;
                    (index, result)
                });
                pending.insert(index, summary.reports.len());
                // Replaced once the request completes
                SinkOutcome::Failed("request never completed".to_string())
            };

            summary.reports.push(SinkReport {
                sink,
                resolution,
                outcome,
            });
        }

        debug!(in_flight = in_flight.len(), "Waiting for volume acknowledgements");

        while let Some(joined) = in_flight.join_next().await {
            match joined {
                Ok((index, Ok(()))) => {
                    info!(sink = %index, "Volume set");
                    if let Some(&slot) = pending.get(&index) {
                        summary.reports[slot].outcome = SinkOutcome::Applied;
                    }
                }
                Ok((index, Err(e))) => {
                    error!(sink = %index, error = %e, "Volume not set");
                    if let Some(&slot) = pending.get(&index) {
                        summary.reports[slot].outcome = SinkOutcome::Failed(e.to_string());
                    }
                }
                Err(e) => {
                    // The sink stays marked as never completed
                    error!(error = %e, "Volume request task failed");
                }
            }
        }

        info!(
            selected = summary.sinks_selected(),
            balanced = summary.sinks_balanced(),
            failed = summary.sinks_failed(),
            warnings = summary.warnings(),
            "Balance run finished"
        );

        Ok(summary)
    }
}

fn log_resolution(sink: &SinkInfo, resolution: &Resolution) {
    debug!(
        sink = %sink.index,
        name = %sink.name,
        channels = sink.channel_count(),
        target_mean = resolution.target_mean,
        "Resolved sink"
    );

    for (channel, target) in sink.channels.iter().zip(&resolution.channels) {
        debug!(
            sink = %sink.index,
            position = %channel.position,
            current = channel.volume,
            target = target.target_volume,
            clamped = target.clamped,
            "Channel target"
        );
    }

    for warning in &resolution.warnings {
        warn!(sink = %sink.index, name = %sink.name, "{}", warning);
    }
}
