//! Reconciliation of the identity table against the collections.
//!
//! The three sweeps run in a fixed order. Register-unregistered sees the
//! identifiers insert-missing just wrote back into records, since those are
//! not in the identity table until commit; the queue keys by identifier, so
//! seeing them twice is harmless.

use crate::catalog::SchemaCatalog;
use crate::error::Result;
use crate::identifier::{Identifier, IdentifierSource};
use crate::provider::{IdentityProvider, UuidProvider};
use crate::store::IdentityStore;
use crate::types::ResourceLocation;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RebuildReport {
    /// Records that received a fresh identifier.
    pub assigned: usize,
    /// Records whose existing identifier was queued for registration.
    pub registered: usize,
    /// Identity-table rows queued for removal.
    pub removed: usize,
}

impl RebuildReport {
    pub fn is_clean(&self) -> bool {
        self.assigned == 0 && self.registered == 0 && self.removed == 0
    }
}

impl<S, C, G> UuidProvider<S, C, G>
where
    S: IdentityStore,
    C: SchemaCatalog,
    G: IdentifierSource,
{
    pub(crate) fn run_rebuild(&mut self) -> Result<RebuildReport> {
        let collections = self.applicable_collections();
        let report = RebuildReport {
            assigned: self.insert_missing(&collections)?,
            registered: self.register_unregistered(&collections)?,
            removed: self.remove_needless()?,
        };

        tracing::info!(
            provider = %self.key(),
            assigned = report.assigned,
            registered = report.registered,
            removed = report.removed,
            "rebuild finished"
        );
        Ok(report)
    }

    fn insert_missing(&mut self, collections: &[String]) -> Result<usize> {
        let mut assigned = 0;
        for collection in collections {
            let missing = self.store.records_missing_identifier(collection)?;
            for local_id in missing {
                let location = ResourceLocation::new(collection.as_str(), local_id);
                let identifier = self.generator.generate();
                self.store.set_record_identifier(&location, &identifier)?;
                self.register(identifier, location);
                assigned += 1;
            }
            tracing::debug!(collection = %collection, assigned, "insert-missing sweep");
        }
        Ok(assigned)
    }

    fn register_unregistered(&mut self, collections: &[String]) -> Result<usize> {
        let mut registered = 0;
        for collection in collections {
            for row in self.store.unregistered_records(collection)? {
                let identifier = Identifier::parse(&row.identifier)?;
                let already_queued = self
                    .queue
                    .pending_insert(identifier.as_str())
                    .is_some_and(|p| p.local_id == Some(row.location.local_id()));
                if !already_queued {
                    registered += 1;
                }
                self.register(identifier, row.location);
            }
        }
        Ok(registered)
    }

    fn remove_needless(&mut self) -> Result<usize> {
        let mut removed = 0;
        for collection in self.store.registry_collections()? {
            let rows = if self.is_applicable(&collection) {
                self.store.orphaned_entries(&collection)?
            } else {
                tracing::debug!(collection = %collection, "collection lost its identifier, dropping its registry rows");
                self.store.registry_entries(&collection)?
            };
            for row in rows {
                self.unregister(row)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
