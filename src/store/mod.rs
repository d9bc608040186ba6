//! Persistent store boundary.
//!
//! The core never builds queries itself; every read and write it needs is a
//! method here, with typed arguments. Adapters own the translation to their
//! backend (and any quoting that backend requires).

mod memory;
mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RegistryStore;

use crate::error::StoreResult;
use crate::identifier::Identifier;
use crate::types::{RegistryEntry, RegistryRow, ResourceLocation};
use std::collections::BTreeSet;

pub trait IdentityStore {
    /// Identity-table lookup by identifier.
    fn location_for_identifier(
        &self,
        identifier: &Identifier,
    ) -> StoreResult<Option<ResourceLocation>>;

    /// Identity-table lookup by location. The identifier is returned raw.
    fn identifier_for_location(&self, location: &ResourceLocation) -> StoreResult<Option<String>>;

    /// The identifier field of the record itself. `None` when the record
    /// does not exist, `Some("")` when the field is empty.
    fn record_identifier(&self, location: &ResourceLocation) -> StoreResult<Option<String>>;

    /// Local id of the record in `collection` whose identifier field equals
    /// `identifier`.
    fn find_record(&self, collection: &str, identifier: &Identifier) -> StoreResult<Option<u64>>;

    /// Local ids of records whose identifier field is empty.
    fn records_missing_identifier(&self, collection: &str) -> StoreResult<Vec<u64>>;

    /// Records with a non-empty identifier that has no identity-table row.
    fn unregistered_records(&self, collection: &str) -> StoreResult<Vec<RegistryRow>>;

    /// Every distinct collection name referenced by the identity table.
    fn registry_collections(&self) -> StoreResult<BTreeSet<String>>;

    /// Identity-table rows of `collection` with no record matching both
    /// their local id and their identifier.
    fn orphaned_entries(&self, collection: &str) -> StoreResult<Vec<RegistryRow>>;

    /// Every identity-table row of `collection`.
    fn registry_entries(&self, collection: &str) -> StoreResult<Vec<RegistryRow>>;

    /// Write `identifier` into the record's identifier field.
    fn set_record_identifier(
        &mut self,
        location: &ResourceLocation,
        identifier: &Identifier,
    ) -> StoreResult<()>;

    /// One batched insert into the identity table.
    fn insert_entries(&mut self, entries: &[RegistryEntry]) -> StoreResult<()>;

    /// Delete identity-table rows matching the identifier, or matching both
    /// collection and local id. Returns the number of rows removed.
    fn delete_entry(&mut self, entry: &RegistryEntry) -> StoreResult<usize>;

    /// Delete identity-table rows for `identifier` only. Rows other
    /// identifiers hold at its old location stay.
    fn delete_identifier(&mut self, identifier: &Identifier) -> StoreResult<usize>;
}
