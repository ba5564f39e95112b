//! Shared fixtures for the balancer integration tests

use balancer_core::domain::sink::{
    ChannelSnapshot, Result, SessionError, SinkIndex, SinkInfo, SinkSession,
};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

/// In-memory sound server
///
/// Volume requests update the stored sinks, so a second listing sees the
/// result of the first run. Requests can be slowed down to check that a run
/// waits for every acknowledgement.
#[derive(Default)]
pub struct MemorySession {
    sinks: Mutex<Vec<SinkInfo>>,
    failing: HashSet<SinkIndex>,
    delay: Duration,
    requests: Mutex<Vec<SinkIndex>>,
}

impl MemorySession {
    pub fn new(sinks: Vec<SinkInfo>) -> Self {
        Self {
            sinks: Mutex::new(sinks),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_failing(mut self, index: u32) -> Self {
        self.failing.insert(SinkIndex::new(index));
        self
    }

    /// Current volumes of a sink, in channel order
    pub fn volumes(&self, index: u32) -> Vec<f64> {
        self.sinks
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.index == SinkIndex::new(index))
            .map(|s| s.channels.iter().map(|c| c.volume).collect())
            .unwrap_or_default()
    }

    /// Sinks that received a volume request, in arrival order
    pub fn requests(&self) -> Vec<SinkIndex> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SinkSession for MemorySession {
    async fn list_sinks(&self) -> Result<Vec<SinkInfo>> {
        Ok(self.sinks.lock().unwrap().clone())
    }

    async fn set_sink_volume(&self, index: SinkIndex, volumes: &[f64]) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.requests.lock().unwrap().push(index);

        if self.failing.contains(&index) {
            return Err(SessionError::CommandFailed(format!("sink {} refused", index)));
        }

        let mut sinks = self.sinks.lock().unwrap();
        let sink = sinks
            .iter_mut()
            .find(|s| s.index == index)
            .ok_or(SessionError::SinkNotFound(index))?;

        if sink.channels.len() != volumes.len() {
            return Err(SessionError::CommandFailed(format!(
                "sink {} has {} channels, got {} volumes",
                index,
                sink.channels.len(),
                volumes.len()
            )));
        }

        for (channel, volume) in sink.channels.iter_mut().zip(volumes) {
            channel.volume = *volume;
        }
        Ok(())
    }
}

/// Build a sink from `(position, volume)` pairs
pub fn sink(index: u32, name: &str, description: &str, channels: &[(&str, f64)]) -> SinkInfo {
    SinkInfo {
        index: SinkIndex::new(index),
        name: name.to_string(),
        description: Some(description.to_string()),
        channels: channels
            .iter()
            .map(|(position, volume)| ChannelSnapshot::new(*position, *volume))
            .collect(),
    }
}

/// A 5.1 sink with every channel at `level`
pub fn surround_51(index: u32, level: f64) -> SinkInfo {
    sink(
        index,
        "alsa_output.pci-0000_00_1f.3.analog-surround-51",
        "Built-in Audio Analog Surround 5.1",
        &[
            ("front-left", level),
            ("front-right", level),
            ("rear-left", level),
            ("rear-right", level),
            ("front-center", level),
            ("lfe", level),
        ],
    )
}
