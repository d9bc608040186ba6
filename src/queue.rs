use crate::identifier::Identifier;
use crate::types::{PendingInsert, RegistryEntry};
use std::collections::BTreeMap;

/// Registry mutations waiting for the next commit.
///
/// An identifier is never queued for insert and delete at once: the later
/// request wins and cancels the earlier one.
#[derive(Debug, Default)]
pub struct MutationQueue {
    inserts: BTreeMap<Identifier, PendingInsert>,
    deletes: BTreeMap<Identifier, RegistryEntry>,
}

impl MutationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_insert(&mut self, pending: PendingInsert) {
        self.deletes.remove(&pending.identifier);
        self.inserts.insert(pending.identifier.clone(), pending);
    }

    pub fn queue_delete(&mut self, entry: RegistryEntry) {
        self.inserts.remove(&entry.identifier);
        self.deletes.insert(entry.identifier.clone(), entry);
    }

    pub fn pending_insert(&self, identifier: &str) -> Option<&PendingInsert> {
        self.inserts.get(identifier)
    }

    pub fn pending_delete(&self, identifier: &str) -> Option<&RegistryEntry> {
        self.deletes.get(identifier)
    }

    pub fn insert_count(&self) -> usize {
        self.inserts.len()
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.deletes.is_empty()
    }

    /// Fill in missing local ids with `resolve` and drop every insert that
    /// is still incomplete afterwards. Returns the number dropped.
    pub fn complete_inserts<F, E>(&mut self, mut resolve: F) -> Result<usize, E>
    where
        F: FnMut(&PendingInsert) -> Result<Option<u64>, E>,
    {
        let mut dropped = 0usize;
        let keys: Vec<Identifier> = self.inserts.keys().cloned().collect();

        for key in keys {
            let Some(pending) = self.inserts.get_mut(&key) else {
                continue;
            };
            if pending.local_id.is_none() && !pending.collection.is_empty() {
                let resolved = resolve(pending)?;
                pending.local_id = resolved;
            }
            if !pending.is_complete() {
                tracing::debug!(
                    identifier = %key,
                    collection = %pending.collection,
                    "dropping incomplete registry insert"
                );
                self.inserts.remove(&key);
                dropped += 1;
            }
        }

        Ok(dropped)
    }

    /// Every queued insert that has a full location.
    pub fn complete_entries(&self) -> Vec<RegistryEntry> {
        self.inserts.values().filter_map(PendingInsert::to_entry).collect()
    }

    pub fn clear_inserts(&mut self) {
        self.inserts.clear();
    }

    pub fn first_delete(&self) -> Option<&RegistryEntry> {
        self.deletes.values().next()
    }

    pub fn remove_delete(&mut self, identifier: &str) -> Option<RegistryEntry> {
        self.deletes.remove(identifier)
    }

    pub fn clear(&mut self) {
        self.inserts.clear();
        self.deletes.clear();
    }
}
