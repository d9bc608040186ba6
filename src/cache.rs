use crate::identifier::Identifier;
use crate::types::ResourceLocation;
use std::collections::HashMap;

/// In-memory identifier <-> location mapping.
///
/// Both maps always mirror each other: `by_identifier[u] == l` exactly when
/// `by_location[l] == u`. The cache is never the source of truth and can be
/// cleared at any time.
#[derive(Debug, Default)]
pub struct IdentityCache {
    by_identifier: HashMap<Identifier, ResourceLocation>,
    by_location: HashMap<ResourceLocation, Identifier>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn location(&self, identifier: &str) -> Option<&ResourceLocation> {
        self.by_identifier.get(identifier)
    }

    pub fn identifier(&self, location: &ResourceLocation) -> Option<&Identifier> {
        self.by_location.get(location)
    }

    /// Record a fully-known triple. Returns `false` (and changes nothing)
    /// when the collection name is empty.
    pub fn put(&mut self, identifier: Identifier, location: ResourceLocation) -> bool {
        if location.collection().is_empty() {
            return false;
        }

        // Unpair whatever either key pointed at before.
        if let Some(old_location) = self.by_identifier.remove(&identifier) {
            self.by_location.remove(&old_location);
        }
        if let Some(old_identifier) = self.by_location.remove(&location) {
            self.by_identifier.remove(&old_identifier);
        }

        self.by_location.insert(location.clone(), identifier.clone());
        self.by_identifier.insert(identifier, location);
        true
    }

    /// Drop the pairing of `identifier`, and the pairing of `location` if it
    /// points at `identifier`. A location since re-paired with another
    /// identifier is left alone.
    pub fn evict(&mut self, identifier: &str, location: &ResourceLocation) {
        if let Some(old_location) = self.by_identifier.remove(identifier) {
            self.by_location.remove(&old_location);
        }
        if self
            .by_location
            .get(location)
            .is_some_and(|u| u.as_str() == identifier)
        {
            self.by_location.remove(location);
        }
    }

    pub fn clear(&mut self) {
        self.by_identifier.clear();
        self.by_location.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.by_identifier.is_empty()
    }

    #[cfg(test)]
    fn is_mirrored(&self) -> bool {
        self.by_identifier.len() == self.by_location.len()
            && self
                .by_identifier
                .iter()
                .all(|(u, l)| self.by_location.get(l) == Some(u))
            && self
                .by_location
                .iter()
                .all(|(l, u)| self.by_identifier.get(u) == Some(l))
    }
}
