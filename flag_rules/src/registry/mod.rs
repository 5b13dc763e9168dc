//! Flag registry - value types, symbol domains and globally loaded bundles.
//!
//! The registry is an ordinary value passed by reference to whatever needs flag
//! metadata. Id allocation is the caller's business: flags are defined with an
//! explicit id.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::flags::{FlagBundle, FlagId, FlagResolver, FlagValueType};

/// Errors raised while defining flags.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("flag id {0} is reserved")]
    ReservedId(FlagId),

    #[error("'{0}' is not a valid flag name")]
    InvalidName(String),

    #[error("flag {name} is already defined as {existing:?}, cannot redefine as {requested:?}")]
    TypeConflict {
        name: String,
        existing: FlagValueType,
        requested: FlagValueType,
    },

    #[error("flag id {id} is already bound to {name}")]
    IdInUse { id: FlagId, name: String },

    #[error("symbol flag {0} needs at least one symbol")]
    EmptySymbolDomain(String),
}

/// Lookup of a flag's value type.
pub trait FlagCatalog {
    fn value_type(&self, id: FlagId) -> Option<FlagValueType>;
}

/// Enumeration of every value a symbol flag can take.
pub trait SymbolDomain {
    /// All symbol indices of the flag; empty for unknown or non-symbol flags.
    fn all_values(&self, id: FlagId) -> Vec<i32>;
}

/// Metadata for one defined flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagDefinition {
    pub id: FlagId,
    pub name: String,
    pub value_type: FlagValueType,
    /// Symbol names, indexed by symbol value. Empty unless `value_type` is `Symbol`.
    #[serde(default)]
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FlagRegistry {
    definitions: BTreeMap<FlagId, FlagDefinition>,
    names: BTreeMap<String, FlagId>,
    global_bundles: Vec<FlagBundle>,
}

impl FlagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a boolean or float flag. Returns the flag's id.
    ///
    /// Redefining a name with the same value type is a no-op that returns the
    /// existing id.
    pub fn define(
        &mut self,
        id: FlagId,
        name: &str,
        value_type: FlagValueType,
    ) -> Result<FlagId, RegistryError> {
        self.define_with_symbols(id, name, value_type, Vec::new())
    }

    /// Define a symbol flag whose values are the indices of `symbols`.
    pub fn define_symbol<I, S>(
        &mut self,
        id: FlagId,
        name: &str,
        symbols: I,
    ) -> Result<FlagId, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let symbols: Vec<String> = symbols
            .into_iter()
            .map(|s| s.into().to_uppercase())
            .collect();
        if symbols.is_empty() {
            return Err(RegistryError::EmptySymbolDomain(name.to_uppercase()));
        }
        self.define_with_symbols(id, name, FlagValueType::Symbol, symbols)
    }

    fn define_with_symbols(
        &mut self,
        id: FlagId,
        name: &str,
        value_type: FlagValueType,
        symbols: Vec<String>,
    ) -> Result<FlagId, RegistryError> {
        if !id.is_valid() {
            return Err(RegistryError::ReservedId(id));
        }
        if !is_valid_flag_name(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        let name = name.to_uppercase();

        if let Some(existing) = self.names.get(&name).and_then(|id| self.definitions.get(id)) {
            let existing_id = existing.id;
            if existing.value_type != value_type {
                return Err(RegistryError::TypeConflict {
                    name,
                    existing: existing.value_type,
                    requested: value_type,
                });
            }
            if existing_id != id {
                log::warn!(
                    "flag {} already bound to {}, ignoring requested id {}",
                    name,
                    existing_id,
                    id
                );
            }
            return Ok(existing_id);
        }

        if let Some(existing) = self.definitions.get(&id) {
            return Err(RegistryError::IdInUse {
                id,
                name: existing.name.clone(),
            });
        }

        self.names.insert(name.clone(), id);
        self.definitions.insert(
            id,
            FlagDefinition {
                id,
                name,
                value_type,
                symbols,
            },
        );
        Ok(id)
    }

    /// Remove a flag definition.
    pub fn remove(&mut self, id: FlagId) -> Option<FlagDefinition> {
        let definition = self.definitions.remove(&id)?;
        self.names.remove(&definition.name);
        Some(definition)
    }

    pub fn definition(&self, id: FlagId) -> Option<&FlagDefinition> {
        self.definitions.get(&id)
    }

    /// Look up a flag id by (case-insensitive) name.
    pub fn flag_id(&self, name: &str) -> Option<FlagId> {
        self.names.get(&name.to_uppercase()).copied()
    }

    /// The value of a named symbol of a symbol flag.
    pub fn symbol_value(&self, id: FlagId, symbol: &str) -> Option<i32> {
        let symbol = symbol.to_uppercase();
        self.definitions
            .get(&id)?
            .symbols
            .iter()
            .position(|s| *s == symbol)
            .map(|index| index as i32)
    }

    pub fn symbol_name(&self, id: FlagId, value: i32) -> Option<&str> {
        let index = usize::try_from(value).ok()?;
        self.definitions
            .get(&id)?
            .symbols
            .get(index)
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Bundles consulted before any request's imported bundles.
    pub fn global_bundles(&self) -> &[FlagBundle] {
        &self.global_bundles
    }

    /// Load a global bundle, replacing any loaded bundle with the same name.
    pub fn load_global_bundle(&mut self, bundle: FlagBundle) {
        match self
            .global_bundles
            .iter_mut()
            .find(|b| b.name() == bundle.name())
        {
            Some(slot) => *slot = bundle,
            None => self.global_bundles.push(bundle),
        }
    }

    pub fn unload_global_bundle(&mut self, name: &str) -> Option<FlagBundle> {
        let index = self.global_bundles.iter().position(|b| b.name() == name)?;
        Some(self.global_bundles.remove(index))
    }

    pub fn global_bundle_mut(&mut self, name: &str) -> Option<&mut FlagBundle> {
        self.global_bundles.iter_mut().find(|b| b.name() == name)
    }

    /// A resolver over the global bundles and the given imported bundles.
    pub fn resolver<'a>(&'a self, imported: &'a [FlagBundle]) -> FlagResolver<'a> {
        FlagResolver::new(&self.global_bundles, imported)
    }
}

impl FlagCatalog for FlagRegistry {
    fn value_type(&self, id: FlagId) -> Option<FlagValueType> {
        self.definitions.get(&id).map(|d| d.value_type)
    }
}

impl SymbolDomain for FlagRegistry {
    fn all_values(&self, id: FlagId) -> Vec<i32> {
        match self.definitions.get(&id) {
            Some(d) if d.value_type == FlagValueType::Symbol => {
                (0..d.symbols.len() as i32).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// Flag names start with a letter and contain only letters, digits and `_`.
pub fn is_valid_flag_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() => {
            chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
