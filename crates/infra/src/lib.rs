//! Balancer infrastructure
//!
//! Sound server sessions and the one-shot balance engine that drives them.

pub mod audio;
