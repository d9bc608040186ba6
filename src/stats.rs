use anyhow::{Context, Result};
use identireg::catalog::SchemaCatalog;
use identireg::config::ProviderConfig;
use identireg::db::DbHandle;
use identireg::store::{IdentityStore, RegistryStore};

#[derive(Debug, Default, Clone)]
pub struct Stats {
    pub collections: u64,
    pub identified_collections: u64,

    pub records: u64,
    pub identified_records: u64,
    pub records_with_identifier: u64,

    pub registry_entries: u64,
    pub unregistered_records: u64,
    pub orphaned_entries: u64,
}

impl Stats {
    /// Nothing for a rebuild to do.
    pub fn is_consistent(&self) -> bool {
        self.identified_records == self.records_with_identifier
            && self.unregistered_records == 0
            && self.orphaned_entries == 0
    }
}

pub fn compute(db: &DbHandle, config: &ProviderConfig, catalog: &impl SchemaCatalog) -> Result<Stats> {
    let mut out = Stats::default();
    let store = RegistryStore::new(db, config.identity_field.as_str(), config.identity_table.as_str());

    // 1) Records, per catalog collection
    for collection in catalog.list_collections() {
        out.collections += 1;
        let records = db
            .list_records(&collection)
            .with_context(|| format!("read records of {collection}"))?;
        out.records += records.len() as u64;

        if config.identity_field.is_empty() || !catalog.has_identifier_field_configured(&collection) {
            continue;
        }
        out.identified_collections += 1;
        out.identified_records += records.len() as u64;
        out.records_with_identifier += records
            .iter()
            .filter(|(_, row)| row.get(&config.identity_field).is_some_and(|v| !v.is_empty()))
            .count() as u64;
        out.unregistered_records += store.unregistered_records(&collection)?.len() as u64;
    }

    // 2) Identity table
    for collection in store.registry_collections()? {
        out.registry_entries += store.registry_entries(&collection)?.len() as u64;
        let orphans = if !config.identity_field.is_empty()
            && catalog.contains(&collection)
            && catalog.has_identifier_field_configured(&collection)
        {
            store.orphaned_entries(&collection)?.len()
        } else {
            store.registry_entries(&collection)?.len()
        };
        out.orphaned_entries += orphans as u64;
    }

    Ok(out)
}

pub fn print(s: &Stats) {
    println!("Collections:               {}", s.collections);
    println!("  with identifier field:   {}", s.identified_collections);
    println!();

    println!("Records:                   {}", s.records);
    println!("  identity-enabled:        {}", s.identified_records);
    println!("  carrying an identifier:  {}", s.records_with_identifier);
    println!("  not yet registered:      {}", s.unregistered_records);
    println!();

    println!("Registry entries:          {}", s.registry_entries);
    println!("  orphaned:                {}", s.orphaned_entries);
    println!();

    if s.is_consistent() {
        println!("Registry is consistent.");
    } else {
        println!("Registry needs a rebuild.");
    }
}
