//! Candidates - the selectable units of content - and the bundles grouping them.

mod bundle;

pub use bundle::*;

use flag_rules::{Conditions, Criterion, FlagBundle, FlagId, FlagRegistry};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ConfigError;

/// Unique identifier for candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateId(pub Uuid);

impl CandidateId {
    /// Create a new random candidate ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CandidateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CandidateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a candidate's effective priority is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PriorityMode {
    /// The base priority as given.
    #[default]
    SetValue,
    /// The number of criteria; more specific content wins.
    Criteria,
    /// Base priority plus the number of criteria.
    Sum,
}

/// What the dispatcher does with a candidate fired while its sink is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BusyPolicy {
    /// Refuse the firing.
    #[default]
    Cancel,
    /// Append to the backlog.
    Queue,
    /// Cut off whatever the sink is doing and send immediately.
    Interrupt,
    /// Interrupt, and hand the whole backlog back to its pools.
    InterruptClearQueue,
    /// Accept the firing and discard it.
    Delete,
    /// Put at the head of the backlog.
    FrontOfQueue,
}

impl BusyPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusyPolicy::Cancel => "CANCEL",
            BusyPolicy::Queue => "QUEUE",
            BusyPolicy::Interrupt => "INTERRUPT",
            BusyPolicy::InterruptClearQueue => "INTERRUPT_CLEAR_QUEUE",
            BusyPolicy::Delete => "DELETE",
            BusyPolicy::FrontOfQueue => "FRONT_OF_QUEUE",
        }
    }

    /// Parse a policy name, falling back to [`BusyPolicy::Cancel`] with a warning.
    pub fn parse_or_default(value: &str) -> Self {
        value.parse().unwrap_or_else(|err| {
            log::warn!("{}, falling back to CANCEL", err);
            BusyPolicy::Cancel
        })
    }
}

impl FromStr for BusyPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().replace('-', "_").as_str() {
            "CANCEL" => Ok(BusyPolicy::Cancel),
            "QUEUE" => Ok(BusyPolicy::Queue),
            "INTERRUPT" => Ok(BusyPolicy::Interrupt),
            "INTERRUPT_CLEAR_QUEUE" => Ok(BusyPolicy::InterruptClearQueue),
            "DELETE" => Ok(BusyPolicy::Delete),
            "FRONT_OF_QUEUE" => Ok(BusyPolicy::FrontOfQueue),
            _ => Err(ConfigError::UnknownPolicy {
                kind: "busy",
                value: value.to_string(),
            }),
        }
    }
}

impl From<String> for BusyPolicy {
    fn from(value: String) -> Self {
        BusyPolicy::parse_or_default(&value)
    }
}

impl From<BusyPolicy> for String {
    fn from(policy: BusyPolicy) -> Self {
        policy.as_str().to_string()
    }
}

/// A piece of deliverable content with its priority and activation conditions.
///
/// Candidates are built by whatever loads content and shared with pools as
/// `Arc<Candidate>`; pools only reference and remove them. Identity is the
/// [`CandidateId`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,

    /// Human-readable name, used in diagnostics.
    pub name: String,

    /// Priority before [`PriorityMode`] is applied. 0 is the default tier.
    pub base_priority: i32,

    #[serde(default)]
    pub priority_mode: PriorityMode,

    #[serde(default)]
    pub conditions: Conditions,

    #[serde(default)]
    pub busy_policy: BusyPolicy,
}

impl Candidate {
    /// Create a default-tier candidate with no conditions.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: CandidateId::new(),
            name: name.into(),
            base_priority: 0,
            priority_mode: PriorityMode::SetValue,
            conditions: Conditions::new(),
            busy_policy: BusyPolicy::Cancel,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.base_priority = priority;
        self
    }

    pub fn with_priority_mode(mut self, mode: PriorityMode) -> Self {
        self.priority_mode = mode;
        self
    }

    /// Add a criterion, replacing any existing criterion on the same flag.
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.conditions.insert(criterion);
        self
    }

    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.busy_policy = policy;
        self
    }

    /// The effective priority.
    pub fn priority(&self) -> i32 {
        let criteria = self.conditions.len() as i32;
        match self.priority_mode {
            PriorityMode::SetValue => self.base_priority,
            PriorityMode::Criteria => criteria,
            PriorityMode::Sum => self.base_priority + criteria,
        }
    }

    /// Whether the candidate sits above the default (priority 0) tier.
    pub fn is_priority_tier(&self) -> bool {
        self.priority() != 0
    }

    /// Evaluate the candidate's conditions against global and imported flags.
    pub fn conditions_met(
        &self,
        registry: &FlagRegistry,
        imported: &[FlagBundle],
        all: &[FlagId],
    ) -> bool {
        self.conditions.is_met(&registry.resolver(imported), all)
    }
}
