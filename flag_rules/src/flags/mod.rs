//! Flag identifiers, value types and resolved flag values.

mod bundle;
mod resolver;

pub use bundle::*;
pub use resolver::*;

use serde::{Deserialize, Serialize};

/// Value substituted for a flag that no bundle resolves.
pub const UNRESOLVED_VALUE: f32 = -1.0;

/// Identifier of a flag known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagId(pub i32);

impl FlagId {
    /// Reserved id that never names a real flag.
    pub const INVALID: FlagId = FlagId(-1);

    pub fn new(raw: i32) -> Self {
        Self(raw)
    }

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl std::fmt::Display for FlagId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of value a flag carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlagValueType {
    /// 0.0 is false, anything else is true.
    Bool,
    /// Continuous numeric value.
    Float,
    /// Index into a closed, enumerable symbol domain.
    Symbol,
}

/// A flag with its current value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    pub id: FlagId,
    pub value: f32,
}

impl Flag {
    /// Create a flag with a raw numeric value.
    pub fn new(id: FlagId, value: f32) -> Self {
        Self { id, value }
    }

    /// Create a boolean flag.
    pub fn boolean(id: FlagId, value: bool) -> Self {
        Self::new(id, if value { 1.0 } else { 0.0 })
    }

    /// Create a symbol flag holding the symbol's index.
    pub fn symbol(id: FlagId, value: i32) -> Self {
        Self::new(id, value as f32)
    }

    pub fn as_bool(&self) -> bool {
        self.value != 0.0
    }

    /// The value truncated to a symbol index.
    pub fn as_symbol(&self) -> i32 {
        self.value as i32
    }
}
