//! Sound server backends and the balance run that uses them
//!
//! - `pactl_backend`: PulseAudio (and PipeWire's pulse server) through the
//!   `pactl` command line tool
//! - `engine`: lists sinks, resolves each one and applies the result

pub mod engine;
pub mod pactl_backend;

pub use engine::*;
pub use pactl_backend::*;
