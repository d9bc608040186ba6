use super::IdentityStore;
use crate::error::{StoreError, StoreResult};
use crate::identifier::Identifier;
use crate::types::{RegistryEntry, RegistryRow, ResourceLocation, Row};
use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};

/// An `IdentityStore` held entirely in memory.
///
/// The identity table behaves like a plain relational table: rows are not
/// unique per location, and deletes match by identifier OR location, exactly
/// as a SQL backend would. Reads are counted and writes can be made to fail,
/// which is what the tests use it for.
#[derive(Debug)]
pub struct MemoryStore {
    identity_field: String,
    collections: BTreeMap<String, BTreeMap<u64, Row>>,
    registry: Vec<RegistryRow>,
    next_id: BTreeMap<String, u64>,
    reads: Cell<usize>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new(identity_field: impl Into<String>) -> Self {
        Self {
            identity_field: identity_field.into(),
            collections: BTreeMap::new(),
            registry: Vec::new(),
            next_id: BTreeMap::new(),
            reads: Cell::new(0),
            fail_writes: false,
        }
    }

    /// Insert a record under an auto-generated local id.
    pub fn add_record(&mut self, collection: &str, identifier: &str) -> u64 {
        let next = self.next_id.entry(collection.to_string()).or_insert(1);
        let local_id = *next;
        *next += 1;
        self.put_record(collection, local_id, identifier);
        local_id
    }

    /// Insert or replace the record at `local_id`.
    pub fn put_record(&mut self, collection: &str, local_id: u64, identifier: &str) {
        let mut row = Row::new();
        row.insert(self.identity_field.clone(), identifier.to_string());
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(local_id, row);
        let next = self.next_id.entry(collection.to_string()).or_insert(1);
        *next = (*next).max(local_id + 1);
    }

    pub fn remove_record(&mut self, collection: &str, local_id: u64) -> bool {
        self.collections
            .get_mut(collection)
            .and_then(|rows| rows.remove(&local_id))
            .is_some()
    }

    pub fn record(&self, collection: &str, local_id: u64) -> Option<&Row> {
        self.collections.get(collection)?.get(&local_id)
    }

    /// Append a raw identity-table row, bypassing validation.
    pub fn add_registry_row(&mut self, identifier: &str, collection: &str, local_id: u64) {
        self.registry.push(RegistryRow::new(
            identifier,
            ResourceLocation::new(collection, local_id),
        ));
    }

    pub fn registry_rows(&self) -> &[RegistryRow] {
        &self.registry
    }

    pub fn read_count(&self) -> usize {
        self.reads.get()
    }

    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    fn read(&self) {
        self.reads.set(self.reads.get() + 1);
    }

    fn write(&self) -> StoreResult<()> {
        if self.fail_writes {
            return Err(StoreError::Backend("write rejected".into()));
        }
        Ok(())
    }

    fn field<'a>(&self, row: &'a Row) -> &'a str {
        row.get(&self.identity_field).map(String::as_str).unwrap_or("")
    }

    fn rows(&self, collection: &str) -> impl Iterator<Item = (u64, &Row)> {
        self.collections
            .get(collection)
            .into_iter()
            .flat_map(|rows| rows.iter().map(|(id, row)| (*id, row)))
    }
}

impl IdentityStore for MemoryStore {
    fn location_for_identifier(
        &self,
        identifier: &Identifier,
    ) -> StoreResult<Option<ResourceLocation>> {
        self.read();
        Ok(self
            .registry
            .iter()
            .find(|r| r.identifier == identifier.as_str())
            .map(|r| r.location.clone()))
    }

    fn identifier_for_location(&self, location: &ResourceLocation) -> StoreResult<Option<String>> {
        self.read();
        Ok(self
            .registry
            .iter()
            .find(|r| &r.location == location)
            .map(|r| r.identifier.clone()))
    }

    fn record_identifier(&self, location: &ResourceLocation) -> StoreResult<Option<String>> {
        self.read();
        Ok(self
            .record(location.collection(), location.local_id())
            .map(|row| self.field(row).to_string()))
    }

    fn find_record(&self, collection: &str, identifier: &Identifier) -> StoreResult<Option<u64>> {
        self.read();
        Ok(self
            .rows(collection)
            .find(|(_, row)| self.field(row) == identifier.as_str())
            .map(|(id, _)| id))
    }

    fn records_missing_identifier(&self, collection: &str) -> StoreResult<Vec<u64>> {
        self.read();
        Ok(self
            .rows(collection)
            .filter(|(_, row)| self.field(row).is_empty())
            .map(|(id, _)| id)
            .collect())
    }

    fn unregistered_records(&self, collection: &str) -> StoreResult<Vec<RegistryRow>> {
        self.read();
        Ok(self
            .rows(collection)
            .filter_map(|(id, row)| {
                let ident = self.field(row);
                let registered = self.registry.iter().any(|r| r.identifier == ident);
                (!ident.is_empty() && !registered)
                    .then(|| RegistryRow::new(ident, ResourceLocation::new(collection, id)))
            })
            .collect())
    }

    fn registry_collections(&self) -> StoreResult<BTreeSet<String>> {
        self.read();
        Ok(self
            .registry
            .iter()
            .map(|r| r.location.collection().to_string())
            .collect())
    }

    fn orphaned_entries(&self, collection: &str) -> StoreResult<Vec<RegistryRow>> {
        self.read();
        Ok(self
            .registry
            .iter()
            .filter(|r| r.location.collection() == collection)
            .filter(|r| {
                self.record(collection, r.location.local_id())
                    .is_none_or(|row| self.field(row) != r.identifier)
            })
            .cloned()
            .collect())
    }

    fn registry_entries(&self, collection: &str) -> StoreResult<Vec<RegistryRow>> {
        self.read();
        Ok(self
            .registry
            .iter()
            .filter(|r| r.location.collection() == collection)
            .cloned()
            .collect())
    }

    fn set_record_identifier(
        &mut self,
        location: &ResourceLocation,
        identifier: &Identifier,
    ) -> StoreResult<()> {
        self.write()?;
        let field = self.identity_field.clone();
        if let Some(row) = self
            .collections
            .get_mut(location.collection())
            .and_then(|rows| rows.get_mut(&location.local_id()))
        {
            row.insert(field, identifier.to_string());
        }
        Ok(())
    }

    fn insert_entries(&mut self, entries: &[RegistryEntry]) -> StoreResult<()> {
        self.write()?;
        self.registry.extend(
            entries
                .iter()
                .map(|e| RegistryRow::new(e.identifier.as_str(), e.location.clone())),
        );
        Ok(())
    }

    fn delete_entry(&mut self, entry: &RegistryEntry) -> StoreResult<usize> {
        self.write()?;
        let before = self.registry.len();
        self.registry
            .retain(|r| r.identifier != entry.identifier.as_str() && r.location != entry.location);
        Ok(before - self.registry.len())
    }

    fn delete_identifier(&mut self, identifier: &Identifier) -> StoreResult<usize> {
        self.write()?;
        let before = self.registry.len();
        self.registry.retain(|r| r.identifier != identifier.as_str());
        Ok(before - self.registry.len())
    }
}
