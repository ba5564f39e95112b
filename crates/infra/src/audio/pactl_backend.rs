//! `pactl`-based sink session
//!
//! Talks to a PulseAudio-compatible server (PulseAudio itself or
//! pipewire-pulse) by running `pactl`. Sinks are read from
//! `pactl --format=json list sinks` and volumes are written with
//! `pactl set-sink-volume`.
//!
//! Volume encoding lives here. The server's raw volume is a cubic software
//! scale: `(raw / PA_VOLUME_NORM)^3` is the linear amplitude the resolver
//! works with, so a raw 50 % is an amplitude of 1/8.

use balancer_core::domain::sink::{
    ChannelSnapshot, Result, SessionError, SinkIndex, SinkInfo, SinkSession,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::io;
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Raw volume of the reference (100 %) level
pub const PA_VOLUME_NORM: u32 = 0x10000;

/// Largest raw volume the server accepts
pub const PA_VOLUME_MAX: u32 = u32::MAX / 2;

/// Raw server volume to linear amplitude
pub fn decode_volume(raw: u32) -> f64 {
    (raw as f64 / PA_VOLUME_NORM as f64).powi(3)
}

/// Linear amplitude to raw server volume, rounded and kept in range
pub fn encode_volume(linear: f64) -> u32 {
    let raw = (linear.max(0.0).cbrt() * PA_VOLUME_NORM as f64).round();
    raw.min(PA_VOLUME_MAX as f64) as u32
}

#[derive(Debug, Deserialize)]
struct PactlSink {
    index: u32,
    name: String,
    #[serde(default)]
    description: Option<String>,
    channel_map: String,
    volume: HashMap<String, PactlChannelVolume>,
}

#[derive(Debug, Deserialize)]
struct PactlChannelVolume {
    value: u32,
}

impl PactlSink {
    fn into_sink_info(self) -> Result<SinkInfo> {
        let channels = self
            .channel_map
            .split(',')
            .map(str::trim)
            .filter(|position| !position.is_empty())
            .map(|position| {
                let volume = self.volume.get(position).ok_or_else(|| {
                    SessionError::Protocol(format!(
                        "sink #{} has no volume for channel `{}`",
                        self.index, position
                    ))
                })?;
                Ok(ChannelSnapshot::new(position, decode_volume(volume.value)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SinkInfo {
            index: SinkIndex::new(self.index),
            name: self.name,
            description: self.description.filter(|d| !d.is_empty()),
            channels,
        })
    }
}

/// Parse the output of `pactl --format=json list sinks`
pub fn parse_sink_list(json: &str) -> Result<Vec<SinkInfo>> {
    let sinks: Vec<PactlSink> = serde_json::from_str(json)
        .map_err(|e| SessionError::Protocol(format!("unreadable sink list: {}", e)))?;

    sinks.into_iter().map(PactlSink::into_sink_info).collect()
}

/// Sink session backed by the `pactl` tool
#[derive(Clone)]
pub struct PactlSession {
    program: String,
    leading_args: Vec<String>,
    server: Option<String>,
}

impl Default for PactlSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PactlSession {
    pub fn new() -> Self {
        Self {
            program: "pactl".to_string(),
            leading_args: Vec::new(),
            server: None,
        }
    }

    /// Run `pactl` through another command, e.g.
    /// `flatpak-spawn --host pactl` from inside a sandbox
    pub fn with_command(program: impl Into<String>, leading_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            leading_args,
            server: None,
        }
    }

    /// Connect to a specific server instead of the default one
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    async fn run(&self, args: &[String]) -> Result<String> {
        let mut command = Command::new(&self.program);
        command.args(&self.leading_args);
        if let Some(server) = &self.server {
            command.arg(format!("--server={}", server));
        }
        command.args(args);

        debug!(program = %self.program, ?args, "Running pactl");

        let output = command.output().await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                SessionError::Unavailable(format!("`{}` is not installed", self.program))
            }
            _ => SessionError::Io(e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("Connection failure") {
                return Err(SessionError::Unavailable(stderr));
            }
            return Err(SessionError::CommandFailed(format!(
                "{} {} exited with {}: {}",
                self.program,
                args.join(" "),
                output.status,
                stderr
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| SessionError::Protocol(format!("non UTF-8 output: {}", e)))
    }
}

impl fmt::Debug for PactlSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PactlSession")
            .field("program", &self.program)
            .field("server", &self.server)
            .finish()
    }
}

#[async_trait::async_trait]
impl SinkSession for PactlSession {
    #[instrument(skip(self))]
    async fn list_sinks(&self) -> Result<Vec<SinkInfo>> {
        let args = ["--format=json", "list", "sinks"].map(String::from);
        let json = self.run(&args).await?;
        let sinks = parse_sink_list(&json)?;

        info!("Found {} sinks", sinks.len());
        Ok(sinks)
    }

    #[instrument(skip(self, volumes))]
    async fn set_sink_volume(&self, index: SinkIndex, volumes: &[f64]) -> Result<()> {
        if volumes.is_empty() {
            return Err(SessionError::CommandFailed(format!(
                "no channel volumes given for sink {}",
                index
            )));
        }

        let mut args = vec!["set-sink-volume".to_string(), index.get().to_string()];
        args.extend(volumes.iter().map(|v| encode_volume(*v).to_string()));

        self.run(&args).await?;
        debug!(sink = %index, ?volumes, "Volume set");
        Ok(())
    }
}
