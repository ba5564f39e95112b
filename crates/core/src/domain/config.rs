//! Balance profile configuration
//!
//! This module provides:
//! - Parsing of the YAML profile file into named, ordered rule lists
//! - The implicit default profile used when nothing is selected
//! - Loading from disk and default path resolution
//!
//! The file format is:
//!
//! ```yaml
//! balance_profiles:
//!   - movie:
//!       - "100% front-(left|right)"
//!       - "50% lfe"
//! ```
//!
//! Parsing is all-or-nothing: the first structural or rule error aborts
//! loading and no partial profile set is returned.

use serde_yml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level key holding the profile list
pub const PROFILES_KEY: &str = "balance_profiles";

/// Errors that can occur while loading or selecting profiles
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yml::Error),

    #[error("Malformed configuration: {0}")]
    MalformedConfig(String),

    #[error("Invalid rule in profile `{profile}`: '{rule}' {reason}")]
    InvalidRule {
        profile: String,
        rule: String,
        reason: String,
    },

    #[error("Invalid pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// One `<percent>% <pattern>` line of a profile
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRule {
    /// Relative loudness, `percent / 100`
    pub weight: f64,
    /// Case-insensitive regular expression matched against channel positions
    pub pattern: String,
}

impl ChannelRule {
    pub fn new(weight: f64, pattern: impl Into<String>) -> Self {
        Self {
            weight,
            pattern: pattern.into(),
        }
    }

    /// Parse a rule line. The text before the first `%` is an integer
    /// percentage, the trimmed text after it is the pattern.
    pub fn parse(profile: &str, text: &str) -> Result<Self> {
        let invalid = |reason: &str| ConfigError::InvalidRule {
            profile: profile.to_string(),
            rule: text.to_string(),
            reason: reason.to_string(),
        };

        let (percent, pattern) = text
            .split_once('%')
            .ok_or_else(|| invalid("is invalid; it must contain a %"))?;

        let percent: i64 = percent
            .trim()
            .parse()
            .map_err(|_| invalid("does not start with an integer percentage"))?;

        if percent < 0 {
            return Err(invalid("has a negative percentage"));
        }

        Ok(Self {
            weight: percent as f64 / 100.0,
            pattern: pattern.trim().to_string(),
        })
    }
}

/// Named, ordered list of channel rules. The first matching rule wins.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceProfile {
    pub name: String,
    pub rules: Vec<ChannelRule>,
}

impl BalanceProfile {
    pub const DEFAULT_NAME: &'static str = "default";
    pub const MATCH_ALL: &'static str = ".*";

    /// Uniform balance: every channel at weight 1
    pub fn default_profile() -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            rules: vec![ChannelRule::new(1.0, Self::MATCH_ALL)],
        }
    }
}

impl Default for BalanceProfile {
    fn default() -> Self {
        Self::default_profile()
    }
}

/// Parsed set of balance profiles keyed by name
#[derive(Debug, Clone, Default)]
pub struct ProfileStore {
    profiles: BTreeMap<String, BalanceProfile>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration text
    pub fn parse(text: &str) -> Result<Self> {
        let root: Value = serde_yml::from_str(text)?;

        let root = root
            .as_mapping()
            .ok_or_else(|| ConfigError::MalformedConfig("the root must be a mapping".to_string()))?;

        let entries = root
            .get(PROFILES_KEY)
            .and_then(Value::as_sequence)
            .ok_or_else(|| {
                ConfigError::MalformedConfig(format!("{} must be a list", PROFILES_KEY))
            })?;

        let mut profiles = BTreeMap::new();
        for (position, entry) in entries.iter().enumerate() {
            let profile = Self::parse_entry(position, entry)?;

            if profiles.contains_key(&profile.name) {
                return Err(ConfigError::MalformedConfig(format!(
                    "profile {} reuses the name `{}`",
                    position, profile.name
                )));
            }

            debug!(
                profile = %profile.name,
                rules = profile.rules.len(),
                "Parsed balance profile"
            );
            profiles.insert(profile.name.clone(), profile);
        }

        Ok(Self { profiles })
    }

    fn parse_entry(position: usize, entry: &Value) -> Result<BalanceProfile> {
        let shape_error = || {
            ConfigError::MalformedConfig(format!(
                "profile {} must be a dict from name to list",
                position
            ))
        };

        let mapping = entry.as_mapping().ok_or_else(shape_error)?;
        if mapping.len() != 1 {
            return Err(shape_error());
        }
        let (key, items) = mapping.iter().next().ok_or_else(shape_error)?;

        let name = scalar_text(key).ok_or_else(|| {
            ConfigError::MalformedConfig(format!("profile {} has a non-scalar name", position))
        })?;
        let items = items.as_sequence().ok_or_else(shape_error)?;

        let rules = items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let text = scalar_text(item).ok_or_else(|| {
                    ConfigError::MalformedConfig(format!(
                        "profile `{}` rule {} must be a string",
                        name, index
                    ))
                })?;
                ChannelRule::parse(&name, &text)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(BalanceProfile { name, rules })
    }

    /// Load and parse a profile file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading balance profiles");

        let contents = fs::read_to_string(path).await?;
        let store = Self::parse(&contents)?;

        debug!(count = store.len(), "Balance profiles loaded");
        Ok(store)
    }

    /// Profiles for one run
    ///
    /// A missing file is accepted only when it is the default location
    /// (`explicit_path` is false) and no profile was asked for; the run then
    /// has the implicit default profile alone.
    pub async fn load_for_run<P: AsRef<Path>>(
        path: P,
        explicit_path: bool,
        profile: Option<&str>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let required = explicit_path || profile.is_some();

        if !required && matches!(fs::try_exists(path).await, Ok(false)) {
            debug!(path = %path.display(), "No profile file, using the default profile only");
            return Ok(Self::new());
        }

        Self::load_from_file(path).await
    }

    /// Default profile file location
    ///
    /// Returns `~/.config/balancer/balance.yml` on Linux,
    /// `~/Library/Application Support/balancer/balance.yml` on macOS.
    pub fn default_config_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("balancer").join("balance.yml"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    /// Look up a profile by name
    pub fn get(&self, name: &str) -> Result<&BalanceProfile> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound(name.to_string()))
    }

    /// The named profile, or the implicit default when no name is given
    pub fn select(&self, name: Option<&str>) -> Result<BalanceProfile> {
        match name {
            Some(name) => self.get(name).cloned(),
            None => Ok(BalanceProfile::default_profile()),
        }
    }

    /// All profiles, sorted by name
    pub fn profiles(&self) -> impl Iterator<Item = &BalanceProfile> {
        self.profiles.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
