use crate::error::{IdentityError, Result};
use crate::identifier::Identifier;
use std::collections::BTreeMap;
use std::fmt;

/// One heterogeneous collection record: field name -> value.
pub type Row = BTreeMap<String, String>;

/// A record inside one named collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceLocation {
    collection: String,
    local_id: u64,
}

impl ResourceLocation {
    pub fn new(collection: impl Into<String>, local_id: u64) -> Self {
        Self {
            collection: collection.into(),
            local_id,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn local_id(&self) -> u64 {
        self.local_id
    }

    /// Accept a local id given as text ("42", " 7 ").
    pub fn parse_local_id(raw: &str) -> Result<u64> {
        raw.trim()
            .parse::<u64>()
            .map_err(|_| IdentityError::InvalidLocalId(raw.to_string()))
    }
}

impl fmt::Display for ResourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.collection, self.local_id)
    }
}

/// A durable identifier -> location mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub identifier: Identifier,
    pub location: ResourceLocation,
}

impl RegistryEntry {
    pub fn new(identifier: Identifier, location: ResourceLocation) -> Self {
        Self {
            identifier,
            location,
        }
    }
}

impl TryFrom<RegistryRow> for RegistryEntry {
    type Error = IdentityError;

    fn try_from(row: RegistryRow) -> Result<Self> {
        let identifier = Identifier::parse(&row.identifier)?;
        Ok(Self::new(identifier, row.location))
    }
}

/// An identifier paired with a location as read back from a store.
///
/// The identifier is whatever string the store held; it has not been
/// validated yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryRow {
    pub identifier: String,
    pub location: ResourceLocation,
}

impl RegistryRow {
    pub fn new(identifier: impl Into<String>, location: ResourceLocation) -> Self {
        Self {
            identifier: identifier.into(),
            location,
        }
    }
}

/// A queued insert whose local id may still be unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInsert {
    pub identifier: Identifier,
    pub collection: String,
    pub local_id: Option<u64>,
}

impl PendingInsert {
    pub fn located(identifier: Identifier, location: ResourceLocation) -> Self {
        Self {
            identifier,
            collection: location.collection,
            local_id: Some(location.local_id),
        }
    }

    /// Local id left open, to be filled in just before commit.
    pub fn unlocated(identifier: Identifier, collection: impl Into<String>) -> Self {
        Self {
            identifier,
            collection: collection.into(),
            local_id: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.collection.is_empty() && self.local_id.is_some()
    }

    pub fn to_entry(&self) -> Option<RegistryEntry> {
        if self.collection.is_empty() {
            return None;
        }
        let local_id = self.local_id?;
        Some(RegistryEntry::new(
            self.identifier.clone(),
            ResourceLocation::new(self.collection.clone(), local_id),
        ))
    }
}
