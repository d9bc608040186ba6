use redb::TableDefinition;

// Counters. Per-collection auto-increment keys live under NEXT_LOCAL_ID_PREFIX.
pub const KV_U64: TableDefinition<&str, u64> = TableDefinition::new("kv_u64");
pub const NEXT_LOCAL_ID_PREFIX: &str = "next_local_id:";

// Table names below are derived at runtime, so only the name builders and
// typed definitions live here.

/// Records of one collection: local id -> encoded `Row` blob.
pub fn collection_table_name(collection: &str) -> String {
    format!("collection:{collection}")
}

pub fn rows(name: &str) -> TableDefinition<'_, u64, &'static [u8]> {
    TableDefinition::new(name)
}

/// Identity table: identifier -> encoded location blob.
pub fn identity(name: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(name)
}

/// Reverse index of the identity table: (collection, local id) -> identifier.
pub fn location_index_name(identity_table: &str) -> String {
    format!("{identity_table}.by_location")
}

pub fn location_index(name: &str) -> TableDefinition<'_, (&'static str, u64), &'static str> {
    TableDefinition::new(name)
}

pub fn next_local_id_key(collection: &str) -> String {
    format!("{NEXT_LOCAL_ID_PREFIX}{collection}")
}
