//! The identity provider: lookups in both directions, allocation of new
//! identifiers, and the commit that makes queued mutations durable.
//!
//! A provider instance is single-threaded and short-lived: use one per
//! reconciliation run or per batch of lookups, and call [`commit`] before
//! dropping it, or queued mutations are lost.
//!
//! [`commit`]: IdentityProvider::commit

use crate::cache::IdentityCache;
use crate::catalog::SchemaCatalog;
use crate::config::ProviderConfig;
use crate::error::Result;
use crate::identifier::{self, Identifier, IdentifierSource, UuidV4};
use crate::queue::MutationQueue;
use crate::rebuild::RebuildReport;
use crate::store::IdentityStore;
use crate::types::{PendingInsert, RegistryEntry, RegistryRow, ResourceLocation};
use std::collections::HashMap;

/// What callers, such as a host lifecycle hook, see of a provider.
pub trait IdentityProvider {
    fn validate_identifier(&self, identifier: &str) -> Result<()>;

    fn is_applicable(&mut self, collection: &str) -> bool;

    fn get_resource_location_for_identifier(
        &mut self,
        identifier: &str,
    ) -> Result<Option<ResourceLocation>>;

    fn get_identifier_for_resource_location(
        &mut self,
        collection: &str,
        local_id: u64,
    ) -> Result<Option<Identifier>>;

    fn get_identifier_for_new_resource_location(&mut self, collection: &str)
    -> Option<Identifier>;

    fn rebuild(&mut self) -> Result<RebuildReport>;

    fn commit(&mut self) -> Result<CommitReport>;
}

/// Outcome of one commit.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CommitReport {
    pub inserted: usize,
    /// Delete statements issued (one per queued delete).
    pub deleted: usize,
    /// Identity-table rows those statements removed.
    pub rows_removed: usize,
    /// Queued inserts whose record could not be found.
    pub dropped: usize,
}

pub struct UuidProvider<S, C, G = UuidV4> {
    key: String,
    config: ProviderConfig,
    pub(crate) store: S,
    catalog: C,
    pub(crate) generator: G,
    applicable: HashMap<String, bool>,
    pub(crate) cache: IdentityCache,
    pub(crate) queue: MutationQueue,
    /// Locations registered by the current commit's insert batch. Kept
    /// until the deletes that follow it have all been applied.
    claimed: HashMap<ResourceLocation, Identifier>,
}

impl<S: IdentityStore, C: SchemaCatalog> UuidProvider<S, C, UuidV4> {
    pub fn new(key: impl Into<String>, config: ProviderConfig, store: S, catalog: C) -> Self {
        Self::with_generator(key, config, store, catalog, UuidV4)
    }
}

impl<S, C, G> UuidProvider<S, C, G>
where
    S: IdentityStore,
    C: SchemaCatalog,
    G: IdentifierSource,
{
    pub fn with_generator(
        key: impl Into<String>,
        config: ProviderConfig,
        store: S,
        catalog: C,
        generator: G,
    ) -> Self {
        Self {
            key: key.into(),
            config,
            store,
            catalog,
            generator,
            applicable: HashMap::new(),
            cache: IdentityCache::new(),
            queue: MutationQueue::new(),
            claimed: HashMap::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    pub fn queue(&self) -> &MutationQueue {
        &self.queue
    }

    /// Drop every queued mutation and cached pairing without touching the
    /// store.
    pub fn discard(&mut self) {
        self.queue.clear();
        self.claimed.clear();
        self.cache.clear();
    }

    /// Discard the provider, handing back the store. Uncommitted mutations
    /// are dropped.
    pub fn into_store(self) -> S {
        self.store
    }

    pub(crate) fn applicable_collections(&mut self) -> Vec<String> {
        self.catalog
            .list_collections()
            .into_iter()
            .filter(|c| self.is_applicable(c))
            .collect()
    }

    /// Queue the removal of a registry row and forget it in the cache.
    pub(crate) fn unregister(&mut self, row: RegistryRow) -> Result<()> {
        let entry = RegistryEntry::try_from(row)?;
        self.cache.evict(entry.identifier.as_str(), &entry.location);
        self.queue.queue_delete(entry);
        Ok(())
    }

    /// Queue a fully-located insert and mirror it in the cache.
    pub(crate) fn register(&mut self, identifier: Identifier, location: ResourceLocation) {
        self.cache.put(identifier.clone(), location.clone());
        self.queue.queue_insert(PendingInsert::located(identifier, location));
    }

    /// A stale row goes by identifier or location, unless this commit just
    /// registered another identifier at that location: the location match
    /// would then remove the live row.
    fn apply_delete(&mut self, entry: &RegistryEntry) -> Result<usize> {
        let reclaimed = self
            .claimed
            .get(&entry.location)
            .is_some_and(|owner| *owner != entry.identifier);
        if reclaimed {
            tracing::debug!(
                identifier = %entry.identifier,
                location = %entry.location,
                "location re-registered in this commit, deleting by identifier only"
            );
            return Ok(self.store.delete_identifier(&entry.identifier)?);
        }
        Ok(self.store.delete_entry(entry)?)
    }

    fn complete_insert_queue(&mut self) -> Result<usize> {
        let store = &self.store;
        let dropped = self.queue.complete_inserts(|pending| {
            store.find_record(&pending.collection, &pending.identifier)
        })?;
        Ok(dropped)
    }
}

impl<S, C, G> IdentityProvider for UuidProvider<S, C, G>
where
    S: IdentityStore,
    C: SchemaCatalog,
    G: IdentifierSource,
{
    fn validate_identifier(&self, identifier: &str) -> Result<()> {
        identifier::validate_identifier(identifier)
    }

    fn is_applicable(&mut self, collection: &str) -> bool {
        if let Some(&known) = self.applicable.get(collection) {
            return known;
        }
        let applicable = !self.config.identity_field.is_empty()
            && self.catalog.contains(collection)
            && self.catalog.has_identifier_field_configured(collection);
        self.applicable.insert(collection.to_string(), applicable);
        applicable
    }

    fn get_resource_location_for_identifier(
        &mut self,
        identifier: &str,
    ) -> Result<Option<ResourceLocation>> {
        if let Some(location) = self.cache.location(identifier) {
            return Ok(Some(location.clone()));
        }

        let identifier = Identifier::parse(identifier)?;
        let Some(location) = self.store.location_for_identifier(&identifier)? else {
            return Ok(None);
        };

        tracing::debug!(provider = %self.key, %identifier, %location, "cache fill");
        self.cache.put(identifier, location.clone());
        Ok(Some(location))
    }

    fn get_identifier_for_resource_location(
        &mut self,
        collection: &str,
        local_id: u64,
    ) -> Result<Option<Identifier>> {
        let location = ResourceLocation::new(collection, local_id);
        if let Some(identifier) = self.cache.identifier(&location) {
            return Ok(Some(identifier.clone()));
        }
        if !self.is_applicable(collection) {
            return Ok(None);
        }

        if let Some(raw) = self.store.identifier_for_location(&location)? {
            let identifier = Identifier::parse(&raw)?;
            tracing::debug!(provider = %self.key, %identifier, %location, "cache fill");
            self.cache.put(identifier.clone(), location);
            return Ok(Some(identifier));
        }

        // Fallback: the record may carry an identifier set by some path that
        // never wrote the identity table.
        let raw = match self.store.record_identifier(&location)? {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Ok(None),
        };
        let identifier = Identifier::parse(&raw)?;
        tracing::debug!(
            provider = %self.key,
            %identifier,
            %location,
            "found unregistered identifier on record, queued for registration"
        );
        self.register(identifier.clone(), location);
        Ok(Some(identifier))
    }

    fn get_identifier_for_new_resource_location(
        &mut self,
        collection: &str,
    ) -> Option<Identifier> {
        if !self.catalog.contains(collection) {
            return None;
        }
        let identifier = self.generator.generate();
        self.queue
            .queue_insert(PendingInsert::unlocated(identifier.clone(), collection));
        Some(identifier)
    }

    fn rebuild(&mut self) -> Result<RebuildReport> {
        self.run_rebuild()
    }

    fn commit(&mut self) -> Result<CommitReport> {
        let mut report = CommitReport {
            dropped: self.complete_insert_queue()?,
            ..CommitReport::default()
        };

        let entries = self.queue.complete_entries();
        if !entries.is_empty() {
            self.store.insert_entries(&entries)?;
            report.inserted = entries.len();
            self.queue.clear_inserts();
            self.claimed
                .extend(entries.into_iter().map(|e| (e.location, e.identifier)));
        }

        // Each applied delete leaves the queue as it goes, so a failure
        // keeps only the unapplied ones queued.
        while let Some(entry) = self.queue.first_delete().cloned() {
            report.rows_removed += self.apply_delete(&entry)?;
            self.queue.remove_delete(entry.identifier.as_str());
            report.deleted += 1;
        }

        self.claimed.clear();
        self.cache.clear();

        tracing::info!(
            provider = %self.key,
            inserted = report.inserted,
            deleted = report.deleted,
            rows_removed = report.rows_removed,
            dropped = report.dropped,
            "registry committed"
        );
        Ok(report)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::error::{IdentityError, StoreError};
    use crate::store::MemoryStore;

    /// Deterministic identifiers: ...-000000000001, ...-000000000002, ...
    #[derive(Debug, Default)]
    pub(crate) struct Sequence(pub u64);

    impl IdentifierSource for Sequence {
        fn generate(&mut self) -> Identifier {
            self.0 += 1;
            Identifier::parse(&format!("00000000-0000-4000-8000-{:012x}", self.0)).unwrap()
        }
    }

    pub(crate) const U1: &str = "11111111-1111-4111-8111-111111111111";
    pub(crate) const U2: &str = "22222222-2222-4222-8222-222222222222";

    pub(crate) fn provider(
        store: MemoryStore,
        catalog: StaticCatalog,
    ) -> UuidProvider<MemoryStore, StaticCatalog, Sequence> {
        UuidProvider::with_generator(
            "record_uuid",
            ProviderConfig::default(),
            store,
            catalog,
            Sequence::default(),
        )
    }

    fn catalog() -> StaticCatalog {
        StaticCatalog::new()
            .with_collection("pages", true)
            .with_collection("sessions", false)
    }

    #[test]
    fn applicability_needs_catalog_field_and_config() {
        let mut p = provider(MemoryStore::new("uuid"), catalog());
        assert!(p.is_applicable("pages"));
        assert!(!p.is_applicable("sessions"));
        assert!(!p.is_applicable("unknown"));

        let config = ProviderConfig {
            identity_field: String::new(),
            ..ProviderConfig::default()
        };
        let mut p = UuidProvider::with_generator(
            "off",
            config,
            MemoryStore::new("uuid"),
            catalog(),
            Sequence::default(),
        );
        assert!(!p.is_applicable("pages"));
    }

    #[test]
    fn applicability_is_memoized() {
        // A catalog that counts how often it is asked.
        struct Counting(std::cell::Cell<usize>);
        impl SchemaCatalog for Counting {
            fn list_collections(&self) -> Vec<String> {
                vec!["pages".into()]
            }
            fn contains(&self, _: &str) -> bool {
                self.0.set(self.0.get() + 1);
                true
            }
            fn has_identifier_field_configured(&self, _: &str) -> bool {
                true
            }
        }

        let counting = Counting(std::cell::Cell::new(0));
        let mut p = UuidProvider::with_generator(
            "k",
            ProviderConfig::default(),
            MemoryStore::new("uuid"),
            &counting,
            Sequence::default(),
        );
        assert!(p.is_applicable("pages"));
        assert!(p.is_applicable("pages"));
        assert!(p.is_applicable("pages"));
        assert_eq!(counting.0.get(), 1);
    }

    #[test]
    fn location_lookup_fills_cache_once() {
        let mut store = MemoryStore::new("uuid");
        store.put_record("pages", 7, U1);
        store.add_registry_row(U1, "pages", 7);
        let mut p = provider(store, catalog());

        let first = p.get_resource_location_for_identifier(U1).unwrap();
        let reads = p.store().read_count();
        let second = p.get_resource_location_for_identifier(U1).unwrap();

        assert_eq!(first, Some(ResourceLocation::new("pages", 7)));
        assert_eq!(first, second);
        assert_eq!(p.store().read_count(), reads, "second call must be a cache hit");
    }

    #[test]
    fn unknown_identifier_is_none_and_malformed_is_an_error() {
        let mut p = provider(MemoryStore::new("uuid"), catalog());
        assert_eq!(p.get_resource_location_for_identifier(U2).unwrap(), None);
        assert!(matches!(
            p.get_resource_location_for_identifier("not-a-uuid"),
            Err(IdentityError::InvalidIdentifier { .. })
        ));
        assert!(p.validate_identifier("").is_err());
    }

    #[test]
    fn identifier_lookup_prefers_the_identity_table() {
        let mut store = MemoryStore::new("uuid");
        store.put_record("pages", 3, U2);
        store.add_registry_row(U1, "pages", 3);
        let mut p = provider(store, catalog());

        let id = p.get_identifier_for_resource_location("pages", 3).unwrap().unwrap();
        assert_eq!(id.as_str(), U1);
        assert!(p.queue().is_empty());
    }

    #[test]
    fn identifier_lookup_falls_back_to_the_record() {
        let mut store = MemoryStore::new("uuid");
        store.put_record("pages", 3, U2);
        let mut p = provider(store, catalog());

        let id = p.get_identifier_for_resource_location("pages", 3).unwrap().unwrap();
        assert_eq!(id.as_str(), U2);
        let pending = p.queue().pending_insert(U2).unwrap();
        assert_eq!(pending.local_id, Some(3));
        assert_eq!(
            p.get_resource_location_for_identifier(U2).unwrap(),
            Some(ResourceLocation::new("pages", 3))
        );

        let report = p.commit().unwrap();
        assert_eq!(report.inserted, 1);
        let rows = p.store().registry_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].identifier, U2);
    }

    #[test]
    fn identifier_lookup_edge_cases() {
        let mut store = MemoryStore::new("uuid");
        store.put_record("pages", 1, "");
        store.put_record("pages", 2, "garbage");
        store.put_record("sessions", 1, U1);
        let mut p = provider(store, catalog());

        // Empty field: nothing to find, nothing queued.
        assert_eq!(p.get_identifier_for_resource_location("pages", 1).unwrap(), None);
        // No such record.
        assert_eq!(p.get_identifier_for_resource_location("pages", 9).unwrap(), None);
        // Not applicable, even though the record carries a value.
        assert_eq!(p.get_identifier_for_resource_location("sessions", 1).unwrap(), None);
        assert_eq!(p.get_identifier_for_resource_location("unknown", 1).unwrap(), None);
        // A malformed value on the record is surfaced.
        assert!(matches!(
            p.get_identifier_for_resource_location("pages", 2),
            Err(IdentityError::InvalidIdentifier { .. })
        ));
        assert!(p.queue().is_empty());
    }

    #[test]
    fn allocation_queues_an_unlocated_insert() {
        let mut p = provider(MemoryStore::new("uuid"), catalog());
        let id = p.get_identifier_for_new_resource_location("pages").unwrap();
        assert!(identifier::validate_identifier(id.as_str()).is_ok());

        let pending = p.queue().pending_insert(id.as_str()).unwrap();
        assert_eq!(pending.collection, "pages");
        assert_eq!(pending.local_id, None);
        assert!(p.cache().is_empty());

        assert!(p.get_identifier_for_new_resource_location("unknown").is_none());
        assert_eq!(p.queue().insert_count(), 1);
    }

    #[test]
    fn commit_completes_allocated_inserts() {
        let mut p = provider(MemoryStore::new("uuid"), catalog());
        let kept = p.get_identifier_for_new_resource_location("pages").unwrap();
        let lost = p.get_identifier_for_new_resource_location("pages").unwrap();

        // The host stores the first identifier on a new record; the second
        // record is never created.
        let local_id = p.store_mut().add_record("pages", kept.as_str());

        let report = p.commit().unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.dropped, 1);

        let rows = p.store().registry_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].identifier, kept.as_str());
        assert_eq!(rows[0].location, ResourceLocation::new("pages", local_id));
        assert!(rows.iter().all(|r| r.identifier != lost.as_str()));
    }

    #[test]
    fn commit_clears_queues_and_cache() {
        let mut store = MemoryStore::new("uuid");
        store.put_record("pages", 3, U2);
        store.add_registry_row(U1, "pages", 9);
        let mut p = provider(store, catalog());

        p.get_identifier_for_resource_location("pages", 3).unwrap();
        p.get_identifier_for_new_resource_location("pages");
        p.unregister(RegistryRow::new(U1, ResourceLocation::new("pages", 9)))
            .unwrap();
        assert!(!p.queue().is_empty());
        assert!(!p.cache().is_empty());

        let report = p.commit().unwrap();
        assert_eq!((report.inserted, report.deleted, report.dropped), (1, 1, 1));
        assert_eq!(report.rows_removed, 1);
        assert!(p.queue().is_empty());
        assert!(p.cache().is_empty());
    }

    #[test]
    fn commit_on_empty_state_is_a_noop() {
        let mut p = provider(MemoryStore::new("uuid"), catalog());
        assert_eq!(p.commit().unwrap(), CommitReport::default());
    }

    #[test]
    fn store_failure_propagates_and_keeps_deletes_queued() {
        let mut store = MemoryStore::new("uuid");
        store.add_registry_row(U1, "pages", 9);
        let mut p = provider(store, catalog());
        p.unregister(RegistryRow::new(U1, ResourceLocation::new("pages", 9)))
            .unwrap();

        p.store_mut().set_fail_writes(true);
        let err = p.commit().unwrap_err();
        assert!(matches!(err, IdentityError::Store(StoreError::Backend(_))));
        assert_eq!(p.queue().delete_count(), 1);

        p.store_mut().set_fail_writes(false);
        p.commit().unwrap();
        assert!(p.store().registry_rows().is_empty());
    }

    #[test]
    fn delete_cancels_insert_for_same_identifier() {
        let mut store = MemoryStore::new("uuid");
        store.put_record("pages", 3, U2);
        let mut p = provider(store, catalog());
        p.get_identifier_for_resource_location("pages", 3).unwrap();
        assert!(p.queue().pending_insert(U2).is_some());

        p.unregister(RegistryRow::new(U2, ResourceLocation::new("pages", 3)))
            .unwrap();
        assert!(p.queue().pending_insert(U2).is_none());
        assert!(p.queue().pending_delete(U2).is_some());
        assert!(p.cache().location(U2).is_none());
    }

    #[test]
    fn commit_keeps_a_location_registered_in_the_same_batch() {
        let mut store = MemoryStore::new("uuid");
        store.put_record("pages", 7, U2);
        store.add_registry_row(U1, "pages", 7);
        let mut p = provider(store, catalog());

        p.register(Identifier::parse(U2).unwrap(), ResourceLocation::new("pages", 7));
        p.unregister(RegistryRow::new(U1, ResourceLocation::new("pages", 7)))
            .unwrap();

        let report = p.commit().unwrap();
        assert_eq!((report.inserted, report.deleted, report.rows_removed), (1, 1, 1));
        assert_eq!(
            p.store().registry_rows(),
            &[RegistryRow::new(U2, ResourceLocation::new("pages", 7))]
        );
    }

    #[test]
    fn unclaimed_location_is_still_deleted_by_location() {
        let mut store = MemoryStore::new("uuid");
        store.add_registry_row(U1, "pages", 9);
        store.add_registry_row(U2, "pages", 9);
        let mut p = provider(store, catalog());

        p.unregister(RegistryRow::new(U1, ResourceLocation::new("pages", 9)))
            .unwrap();
        let report = p.commit().unwrap();
        assert_eq!(report.rows_removed, 2);
        assert!(p.store().registry_rows().is_empty());
    }

    #[test]
    fn discard_leaves_the_store_alone() {
        let mut store = MemoryStore::new("uuid");
        store.put_record("pages", 3, U2);
        store.add_registry_row(U1, "pages", 9);
        let mut p = provider(store, catalog());

        p.get_identifier_for_resource_location("pages", 3).unwrap();
        p.unregister(RegistryRow::new(U1, ResourceLocation::new("pages", 9)))
            .unwrap();
        p.discard();
        assert!(p.queue().is_empty());
        assert!(p.cache().is_empty());

        assert_eq!(p.commit().unwrap(), CommitReport::default());
        assert_eq!(p.store().registry_rows().len(), 1);
    }
}
