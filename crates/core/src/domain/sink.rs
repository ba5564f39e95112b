//! Sink (output device) abstractions and domain models
//!
//! This module defines the interface a sound server session has to offer
//! the balancer. Implementations for a specific server (e.g. PulseAudio via
//! `pactl`) live in the `infra` crate.

use std::fmt;
use thiserror::Error;

/// Errors that can occur while talking to the sound server
#[derive(Debug, Error)]
pub enum SessionError {
    /// The sound server could not be reached
    #[error("Sound server unavailable: {0}")]
    Unavailable(String),

    /// A request was rejected or its helper exited unsuccessfully
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// The server answered with something we could not interpret
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Requested sink was not found
    #[error("Sink not found: {0}")]
    SinkNotFound(SinkIndex),

    /// Input/Output error at the OS level
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Server-assigned index of a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkIndex(u32);

impl SinkIndex {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SinkIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One physical channel of a sink as reported by the server
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSnapshot {
    /// Channel position name, e.g. `front-left` or `lfe`
    pub position: String,
    /// Current volume as a linear fraction of unity
    pub volume: f64,
}

impl ChannelSnapshot {
    pub fn new(position: impl Into<String>, volume: f64) -> Self {
        Self {
            position: position.into(),
            volume,
        }
    }
}

/// Information about a sink and its current channel volumes
#[derive(Debug, Clone)]
pub struct SinkInfo {
    pub index: SinkIndex,
    pub name: String,
    pub description: Option<String>,
    /// Channels in server order; the order is kept through resolution
    pub channels: Vec<ChannelSnapshot>,
}

impl SinkInfo {
    /// Text that sink selection patterns are matched against:
    /// `#<index> <name> <description>`
    pub fn descriptor(&self) -> String {
        match &self.description {
            Some(description) => format!("{} {} {}", self.index, self.name, description),
            None => format!("{} {}", self.index, self.name),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

/// Session with a sound server
///
/// A session lists sinks together with their channel layout and accepts new
/// per-channel volumes. Requests may be issued concurrently; completion of a
/// returned future means the server acknowledged the request.
#[async_trait::async_trait]
pub trait SinkSession: Send + Sync {
    /// List every sink with its current channel volumes
    async fn list_sinks(&self) -> Result<Vec<SinkInfo>>;

    /// Set per-channel linear volumes on a sink. `volumes` is in the same
    /// order as the sink's channels.
    async fn set_sink_volume(&self, index: SinkIndex, volumes: &[f64]) -> Result<()>;
}
