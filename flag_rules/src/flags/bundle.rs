//! Flag bundles - sorted sets of resolved flags.

use serde::{Deserialize, Serialize};

use super::{Flag, FlagId};

/// A named set of flags kept sorted by id.
///
/// Lookups and inserts binary-search the backing vector, so iteration order
/// is always ascending by [`FlagId`] regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawFlagBundle")]
pub struct FlagBundle {
    name: String,
    flags: Vec<Flag>,
}

/// Wire shape of a bundle before its flags are sorted.
#[derive(Deserialize)]
struct RawFlagBundle {
    #[serde(default)]
    name: String,
    #[serde(default)]
    flags: Vec<Flag>,
}

impl From<RawFlagBundle> for FlagBundle {
    fn from(raw: RawFlagBundle) -> Self {
        let mut bundle = FlagBundle::new(raw.name);
        for flag in raw.flags {
            bundle.set(flag.id, flag.value);
        }
        bundle
    }
}

impl FlagBundle {
    /// Create an empty bundle.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: Vec::new(),
        }
    }

    /// Builder form of [`FlagBundle::set`].
    pub fn with_flag(mut self, id: FlagId, value: f32) -> Self {
        self.set(id, value);
        self
    }

    /// Builder form for boolean flags.
    pub fn with_bool(self, id: FlagId, value: bool) -> Self {
        self.with_flag(id, Flag::boolean(id, value).value)
    }

    /// Builder form for symbol flags.
    pub fn with_symbol(self, id: FlagId, value: i32) -> Self {
        self.with_flag(id, value as f32)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set a flag's value, returning the previous value if the flag was present.
    pub fn set(&mut self, id: FlagId, value: f32) -> Option<f32> {
        match self.flags.binary_search_by_key(&id, |f| f.id) {
            Ok(index) => {
                let previous = self.flags[index].value;
                self.flags[index].value = value;
                Some(previous)
            }
            Err(index) => {
                self.flags.insert(index, Flag::new(id, value));
                None
            }
        }
    }

    /// Remove a flag from the bundle.
    pub fn remove(&mut self, id: FlagId) -> Option<Flag> {
        self.flags
            .binary_search_by_key(&id, |f| f.id)
            .ok()
            .map(|index| self.flags.remove(index))
    }

    pub fn get(&self, id: FlagId) -> Option<&Flag> {
        self.flags
            .binary_search_by_key(&id, |f| f.id)
            .ok()
            .map(|index| &self.flags[index])
    }

    pub fn value_of(&self, id: FlagId) -> Option<f32> {
        self.get(id).map(|f| f.value)
    }

    pub fn contains(&self, id: FlagId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Iterate over flags in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.flags.iter()
    }
}
