//! Pool configuration and the equal-priority tie-break policy.

use flag_rules::FlagId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ConfigError;

/// How a pool chooses among eligible candidates of equal priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TieBreakPolicy {
    /// Oldest insertion first.
    #[default]
    Queue,
    /// Newest insertion first.
    Stack,
    /// Uniform among the tied set.
    Random,
}

impl TieBreakPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TieBreakPolicy::Queue => "QUEUE",
            TieBreakPolicy::Stack => "STACK",
            TieBreakPolicy::Random => "RANDOM",
        }
    }

    /// Parse a policy name, falling back to [`TieBreakPolicy::Queue`] with a warning.
    pub fn parse_or_default(value: &str) -> Self {
        value.parse().unwrap_or_else(|err| {
            log::warn!("{}, falling back to QUEUE", err);
            TieBreakPolicy::Queue
        })
    }
}

impl FromStr for TieBreakPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "QUEUE" => Ok(TieBreakPolicy::Queue),
            "STACK" => Ok(TieBreakPolicy::Stack),
            "RANDOM" => Ok(TieBreakPolicy::Random),
            _ => Err(ConfigError::UnknownPolicy {
                kind: "tie-break",
                value: value.to_string(),
            }),
        }
    }
}

impl From<String> for TieBreakPolicy {
    fn from(value: String) -> Self {
        TieBreakPolicy::parse_or_default(&value)
    }
}

impl From<TieBreakPolicy> for String {
    fn from(policy: TieBreakPolicy) -> Self {
        policy.as_str().to_string()
    }
}

/// Behaviour switches for a [`DeliveryPool`](super::DeliveryPool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub tie_break: TieBreakPolicy,

    /// Remove a candidate from the pool once it fires.
    pub discard_after_use: bool,

    /// Refill from the default contents when the pool runs dry.
    pub loops: bool,

    /// Replay the bundle history on a loop refill instead of forgetting it.
    pub include_bundles_in_loop: bool,

    /// Refill priority-tier candidates on a loop, not only the default tier.
    pub include_priority_tier_in_loop: bool,

    /// Requested partitioning flags. Validated on repartition.
    pub partitioning_flags: Vec<FlagId>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            tie_break: TieBreakPolicy::Queue,
            discard_after_use: true,
            loops: false,
            include_bundles_in_loop: false,
            include_priority_tier_in_loop: false,
            partitioning_flags: Vec::new(),
        }
    }
}

impl PoolConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn with_tie_break(mut self, policy: TieBreakPolicy) -> Self {
        self.tie_break = policy;
        self
    }

    pub fn with_discard_after_use(mut self, discard: bool) -> Self {
        self.discard_after_use = discard;
        self
    }

    /// Enable looping with the given refill options.
    pub fn looping(mut self, include_priority_tier: bool, include_bundles: bool) -> Self {
        self.loops = true;
        self.include_priority_tier_in_loop = include_priority_tier;
        self.include_bundles_in_loop = include_bundles;
        self
    }

    pub fn with_partitioning_flags(mut self, flags: impl IntoIterator<Item = FlagId>) -> Self {
        self.partitioning_flags = flags.into_iter().collect();
        self
    }
}
