use super::IdentityStore;
use crate::codec;
use crate::db::{open_read, DbHandle};
use crate::error::StoreResult;
use crate::identifier::Identifier;
use crate::schema;
use crate::types::{RegistryEntry, RegistryRow, ResourceLocation};
use redb::ReadableTable;
use std::collections::BTreeSet;

/// `IdentityStore` over a redb database.
///
/// The identity table and its location index are written together in one
/// transaction, so each location maps to at most one identifier and each
/// identifier to at most one location.
pub struct RegistryStore<'db> {
    handle: &'db DbHandle,
    identity_field: String,
    identity_table: String,
    location_index: String,
}

impl<'db> RegistryStore<'db> {
    pub fn new(
        handle: &'db DbHandle,
        identity_field: impl Into<String>,
        identity_table: impl Into<String>,
    ) -> Self {
        let identity_table = identity_table.into();
        Self {
            handle,
            identity_field: identity_field.into(),
            location_index: schema::location_index_name(&identity_table),
            identity_table,
        }
    }

    pub fn identity_table(&self) -> &str {
        &self.identity_table
    }

    fn field_of(&self, blob: &[u8]) -> StoreResult<String> {
        let mut row = codec::decode_row(blob)?;
        Ok(row.remove(&self.identity_field).unwrap_or_default())
    }

    /// Identity-table rows of one collection, from the location index.
    fn rows_of(&self, collection: &str, only_orphans: bool) -> StoreResult<Vec<RegistryRow>> {
        let tx = self.handle.db.begin_read()?;
        let Some(index) = open_read(&tx, schema::location_index(&self.location_index))? else {
            return Ok(Vec::new());
        };
        let table_name = schema::collection_table_name(collection);
        let records = open_read(&tx, schema::rows(&table_name))?;

        let mut out = Vec::new();
        for item in index.range((collection, 0u64)..=(collection, u64::MAX))? {
            let (k, v) = item?;
            let (_, local_id) = k.value();
            let identifier = v.value();

            if only_orphans {
                let current = match &records {
                    Some(rows) => match rows.get(local_id)? {
                        Some(blob) => Some(self.field_of(blob.value())?),
                        None => None,
                    },
                    None => None,
                };
                if current.as_deref() == Some(identifier) {
                    continue;
                }
            }

            out.push(RegistryRow::new(
                identifier,
                ResourceLocation::new(collection, local_id),
            ));
        }
        Ok(out)
    }
}

impl IdentityStore for RegistryStore<'_> {
    fn location_for_identifier(
        &self,
        identifier: &Identifier,
    ) -> StoreResult<Option<ResourceLocation>> {
        let tx = self.handle.db.begin_read()?;
        let Some(identity) = open_read(&tx, schema::identity(&self.identity_table))? else {
            return Ok(None);
        };
        let Some(blob) = identity.get(identifier.as_str())? else {
            return Ok(None);
        };
        let location = codec::decode_location(blob.value())?;
        Ok(Some(location))
    }

    fn identifier_for_location(&self, location: &ResourceLocation) -> StoreResult<Option<String>> {
        let tx = self.handle.db.begin_read()?;
        let Some(index) = open_read(&tx, schema::location_index(&self.location_index))? else {
            return Ok(None);
        };
        let found = index
            .get((location.collection(), location.local_id()))?
            .map(|v| v.value().to_string());
        Ok(found)
    }

    fn record_identifier(&self, location: &ResourceLocation) -> StoreResult<Option<String>> {
        let table_name = schema::collection_table_name(location.collection());
        let tx = self.handle.db.begin_read()?;
        let Some(rows) = open_read(&tx, schema::rows(&table_name))? else {
            return Ok(None);
        };
        let Some(blob) = rows.get(location.local_id())? else {
            return Ok(None);
        };
        let field = self.field_of(blob.value())?;
        Ok(Some(field))
    }

    fn find_record(&self, collection: &str, identifier: &Identifier) -> StoreResult<Option<u64>> {
        let table_name = schema::collection_table_name(collection);
        let tx = self.handle.db.begin_read()?;
        let Some(rows) = open_read(&tx, schema::rows(&table_name))? else {
            return Ok(None);
        };
        for item in rows.iter()? {
            let (k, v) = item?;
            if self.field_of(v.value())? == identifier.as_str() {
                return Ok(Some(k.value()));
            }
        }
        Ok(None)
    }

    fn records_missing_identifier(&self, collection: &str) -> StoreResult<Vec<u64>> {
        let table_name = schema::collection_table_name(collection);
        let tx = self.handle.db.begin_read()?;
        let Some(rows) = open_read(&tx, schema::rows(&table_name))? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for item in rows.iter()? {
            let (k, v) = item?;
            if self.field_of(v.value())?.is_empty() {
                out.push(k.value());
            }
        }
        Ok(out)
    }

    fn unregistered_records(&self, collection: &str) -> StoreResult<Vec<RegistryRow>> {
        let table_name = schema::collection_table_name(collection);
        let tx = self.handle.db.begin_read()?;
        let Some(rows) = open_read(&tx, schema::rows(&table_name))? else {
            return Ok(Vec::new());
        };
        let identity = open_read(&tx, schema::identity(&self.identity_table))?;

        let mut out = Vec::new();
        for item in rows.iter()? {
            let (k, v) = item?;
            let identifier = self.field_of(v.value())?;
            if identifier.is_empty() {
                continue;
            }
            let registered = match &identity {
                Some(t) => t.get(identifier.as_str())?.is_some(),
                None => false,
            };
            if !registered {
                out.push(RegistryRow::new(
                    identifier,
                    ResourceLocation::new(collection, k.value()),
                ));
            }
        }
        Ok(out)
    }

    fn registry_collections(&self) -> StoreResult<BTreeSet<String>> {
        let tx = self.handle.db.begin_read()?;
        let Some(index) = open_read(&tx, schema::location_index(&self.location_index))? else {
            return Ok(BTreeSet::new());
        };
        let mut out = BTreeSet::new();
        for item in index.iter()? {
            let (k, _) = item?;
            let (collection, _) = k.value();
            if !out.contains(collection) {
                out.insert(collection.to_string());
            }
        }
        Ok(out)
    }

    fn orphaned_entries(&self, collection: &str) -> StoreResult<Vec<RegistryRow>> {
        self.rows_of(collection, true)
    }

    fn registry_entries(&self, collection: &str) -> StoreResult<Vec<RegistryRow>> {
        self.rows_of(collection, false)
    }

    fn set_record_identifier(
        &mut self,
        location: &ResourceLocation,
        identifier: &Identifier,
    ) -> StoreResult<()> {
        let table_name = schema::collection_table_name(location.collection());
        let tx = self.handle.db.begin_write()?;
        {
            let mut rows = tx.open_table(schema::rows(&table_name))?;
            let existing = match rows.get(location.local_id())? {
                Some(blob) => Some(codec::decode_row(blob.value())?),
                None => None,
            };
            // Updating a vanished record is a no-op, like an UPDATE matching no rows.
            if let Some(mut row) = existing {
                row.insert(self.identity_field.clone(), identifier.to_string());
                let blob = codec::encode_row(&row);
                rows.insert(location.local_id(), blob.as_slice())?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn insert_entries(&mut self, entries: &[RegistryEntry]) -> StoreResult<()> {
        tracing::trace!(batch_size = entries.len(), table = %self.identity_table, "writing registry batch");

        let tx = self.handle.db.begin_write()?;
        {
            let mut identity = tx.open_table(schema::identity(&self.identity_table))?;
            let mut index = tx.open_table(schema::location_index(&self.location_index))?;

            for entry in entries {
                let id = entry.identifier.as_str();
                let loc = &entry.location;

                // 1) unpair the identifier from a previous location
                let previous = match identity.get(id)? {
                    Some(blob) => Some(codec::decode_location(blob.value())?),
                    None => None,
                };
                if let Some(prev) = previous.filter(|p| p != loc) {
                    index.remove((prev.collection(), prev.local_id()))?;
                }

                // 2) unpair the location from a previous identifier
                let displaced = index
                    .get((loc.collection(), loc.local_id()))?
                    .map(|v| v.value().to_string());
                if let Some(other) = displaced.filter(|o| o != id) {
                    identity.remove(other.as_str())?;
                }

                // 3) write both directions
                let blob = codec::encode_location(loc);
                identity.insert(id, blob.as_slice())?;
                index.insert((loc.collection(), loc.local_id()), id)?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_entry(&mut self, entry: &RegistryEntry) -> StoreResult<usize> {
        let id = entry.identifier.as_str();
        let loc = &entry.location;
        let mut removed = 0usize;

        let tx = self.handle.db.begin_write()?;
        {
            let mut identity = tx.open_table(schema::identity(&self.identity_table))?;
            let mut index = tx.open_table(schema::location_index(&self.location_index))?;

            // identifier matches
            let by_identifier = match identity.remove(id)? {
                Some(blob) => Some(codec::decode_location(blob.value())?),
                None => None,
            };
            if let Some(prev) = by_identifier {
                index.remove((prev.collection(), prev.local_id()))?;
                removed += 1;
            }

            // OR (collection, local id) matches
            let by_location = index
                .remove((loc.collection(), loc.local_id()))?
                .map(|v| v.value().to_string());
            if let Some(other) = by_location.filter(|o| o != id) {
                identity.remove(other.as_str())?;
                removed += 1;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    fn delete_identifier(&mut self, identifier: &Identifier) -> StoreResult<usize> {
        let id = identifier.as_str();
        let tx = self.handle.db.begin_write()?;
        let removed = {
            let mut identity = tx.open_table(schema::identity(&self.identity_table))?;
            let mut index = tx.open_table(schema::location_index(&self.location_index))?;

            let previous = match identity.remove(id)? {
                Some(blob) => Some(codec::decode_location(blob.value())?),
                None => None,
            };
            match previous {
                Some(prev) => {
                    let key = (prev.collection(), prev.local_id());
                    let points_back = index.get(key)?.is_some_and(|v| v.value() == id);
                    if points_back {
                        index.remove(key)?;
                    }
                    1
                }
                None => 0,
            }
        };
        tx.commit()?;
        Ok(removed)
    }
}
