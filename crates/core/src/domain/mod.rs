//! Domain entities and business rules

pub mod balance;
pub mod config;
pub mod pattern;
pub mod sink;
pub mod volume;

pub use balance::{resolve, BalanceResolver, BalanceWarning, ChannelTarget, Resolution};
pub use config::{BalanceProfile, ChannelRule, ConfigError, ProfileStore};
pub use pattern::{CompiledProfile, CompiledRule, SinkFilter};
pub use sink::{ChannelSnapshot, SessionError, SinkIndex, SinkInfo, SinkSession};
pub use volume::{Adjustment, AdjustmentError, VolumeRange};
