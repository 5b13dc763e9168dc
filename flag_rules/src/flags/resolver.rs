//! Flag resolution across global and imported bundles.

use super::{FlagBundle, FlagId, UNRESOLVED_VALUE};

/// Resolves flag values against the globally loaded bundles first and the
/// request's imported bundles second. The first bundle containing the flag wins.
#[derive(Debug, Clone, Copy)]
pub struct FlagResolver<'a> {
    global: &'a [FlagBundle],
    imported: &'a [FlagBundle],
}

impl<'a> FlagResolver<'a> {
    pub fn new(global: &'a [FlagBundle], imported: &'a [FlagBundle]) -> Self {
        Self { global, imported }
    }

    /// Resolver over imported bundles only.
    pub fn imported_only(imported: &'a [FlagBundle]) -> Self {
        Self::new(&[], imported)
    }

    pub fn resolve(&self, id: FlagId) -> Option<f32> {
        self.global
            .iter()
            .chain(self.imported.iter())
            .find_map(|bundle| bundle.value_of(id))
    }

    /// Resolve a flag, substituting [`UNRESOLVED_VALUE`] when no bundle has it.
    pub fn resolve_or_sentinel(&self, id: FlagId) -> f32 {
        self.resolve(id).unwrap_or(UNRESOLVED_VALUE)
    }
}
