//! Pattern compilation for channel rules and sink selection
//!
//! Patterns are regular expressions matched case-insensitively anywhere in
//! the subject; anchor with `^`/`$` to match the whole text.

use crate::domain::config::{BalanceProfile, ConfigError, Result};
use crate::domain::sink::SinkInfo;
use regex::{Regex, RegexBuilder};
use tracing::{debug, trace};

/// Compile a pattern into a case-insensitive matcher
pub fn compile(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

/// A channel rule with its pattern compiled
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub weight: f64,
    pub matcher: Regex,
}

impl CompiledRule {
    /// Negative (or NaN) weights are treated as zero.
    pub fn new(weight: f64, pattern: &str) -> Result<Self> {
        Ok(Self {
            weight: weight.max(0.0),
            matcher: compile(pattern)?,
        })
    }

    pub fn matches(&self, position: &str) -> bool {
        self.matcher.is_match(position)
    }
}

/// A profile ready for resolution
///
/// Compiled once per run and shared read-only by every sink.
#[derive(Debug, Clone)]
pub struct CompiledProfile {
    pub name: String,
    pub rules: Vec<CompiledRule>,
}

impl CompiledProfile {
    /// Weight of channels no rule matches
    pub const UNMATCHED_WEIGHT: f64 = 1.0;

    /// Compile every rule of a profile, failing on the first bad pattern
    pub fn compile(profile: &BalanceProfile) -> Result<Self> {
        let rules = profile
            .rules
            .iter()
            .map(|rule| CompiledRule::new(rule.weight, &rule.pattern))
            .collect::<Result<Vec<_>>>()?;

        debug!(profile = %profile.name, rules = rules.len(), "Compiled balance profile");

        Ok(Self {
            name: profile.name.clone(),
            rules,
        })
    }

    /// Weight for a channel position, see [`weight_for`]
    pub fn weight_for(&self, position: &str) -> f64 {
        weight_for(&self.rules, position)
    }
}

/// Weight of the first rule accepting `position`
///
/// Rules are scanned in order and the first match wins; a channel no rule
/// matches gets [`CompiledProfile::UNMATCHED_WEIGHT`].
pub fn weight_for(rules: &[CompiledRule], position: &str) -> f64 {
    match rules.iter().find(|rule| rule.matches(position)) {
        Some(rule) => {
            trace!(position, weight = rule.weight, pattern = %rule.matcher, "Rule matched");
            rule.weight
        }
        None => {
            trace!(position, "No rule matched, using implicit weight");
            CompiledProfile::UNMATCHED_WEIGHT
        }
    }
}

/// Selects which sinks a run touches
#[derive(Debug, Clone, Default)]
pub struct SinkFilter {
    matcher: Option<Regex>,
}

impl SinkFilter {
    /// Accept every sink
    pub fn all() -> Self {
        Self { matcher: None }
    }

    /// Accept sinks whose descriptor (`#<index> <name> <description>`)
    /// matches `pattern`
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            matcher: Some(compile(pattern)?),
        })
    }

    pub fn accepts(&self, sink: &SinkInfo) -> bool {
        match &self.matcher {
            Some(matcher) => matcher.is_match(&sink.descriptor()),
            None => true,
        }
    }
}
