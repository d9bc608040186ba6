use crate::catalog::SchemaCatalog;
use crate::codec;
use crate::dbpath::{self, DbDirState, DB_FILE, LOCK_FILE, META_FILE};
use crate::error::{IdentityError, Result, StoreResult};
use crate::schema;
use crate::types::Row;
use anyhow::{anyhow, Context};
use fs2::FileExt;
use redb::{Database, Key, ReadOnlyTable, ReadTransaction, ReadableTable, TableDefinition, TableError, Value};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct DbHandle {
    pub db_dir: PathBuf,
    pub db: Database,
    // Keep the lock file open for the lifetime of DbHandle, so the lock is held.
    _lock_file: File,
}

/// Open an identireg database directory:
/// - validates directory
/// - initializes if empty (meta + registry.redb)
/// - acquires exclusive lock
/// - opens redb database
pub fn open(db_dir: &Path) -> anyhow::Result<DbHandle> {
    let state = dbpath::ensure_db_dir_is_valid_or_empty(db_dir)?;

    // Acquire lock first (prevents two processes initializing concurrently).
    let lock_file = open_and_lock(db_dir)?;

    if state == DbDirState::Empty {
        init_db_dir(db_dir)
            .with_context(|| format!("Failed to initialize DB in {}", db_dir.display()))?;
    }

    let db_file_path = db_dir.join(DB_FILE);
    let meta_path = db_dir.join(META_FILE);
    if !db_file_path.is_file() || !meta_path.is_file() {
        return Err(anyhow!(
            "Database directory is missing expected files ({} and {})",
            META_FILE,
            DB_FILE
        ));
    }

    let db = Database::create(&db_file_path)
        .with_context(|| format!("Failed to open redb file {}", db_file_path.display()))?;

    let handle = DbHandle {
        db_dir: db_dir.to_path_buf(),
        db,
        _lock_file: lock_file,
    };

    let tx = handle.db.begin_write().context("begin_write() failed")?;
    {
        let _ = tx.open_table(schema::KV_U64)?;
    }
    tx.commit().context("commit() failed")?;

    Ok(handle)
}

impl DbHandle {
    /// Create the identity table and its location index if missing.
    pub fn ensure_identity_tables(&self, identity_table: &str) -> anyhow::Result<()> {
        let index_name = schema::location_index_name(identity_table);
        let tx = self.db.begin_write().context("begin_write() failed")?;
        {
            let _ = tx.open_table(schema::identity(identity_table))?;
            let _ = tx.open_table(schema::location_index(&index_name))?;
        }
        tx.commit().context("commit() failed")?;
        Ok(())
    }

    /// Insert a record under the collection's next auto-increment local id.
    pub fn insert_record(
        &self,
        catalog: &impl SchemaCatalog,
        collection: &str,
        row: &Row,
    ) -> Result<u64> {
        if !catalog.contains(collection) {
            return Err(IdentityError::UnknownCollection(collection.to_string()));
        }

        let table_name = schema::collection_table_name(collection);
        let counter = schema::next_local_id_key(collection);
        let blob = codec::encode_row(row);

        let tx = self.db.begin_write()?;
        let local_id = {
            let mut kv = tx.open_table(schema::KV_U64)?;
            let mut rows = tx.open_table(schema::rows(&table_name))?;

            let next = match kv.get(counter.as_str())? {
                Some(v) => v.value(),
                None => 1,
            };
            kv.insert(counter.as_str(), next + 1)?;
            rows.insert(next, blob.as_slice())?;
            next
        };
        tx.commit()?;

        tracing::trace!(collection, local_id, "record inserted");
        Ok(local_id)
    }

    pub fn remove_record(
        &self,
        catalog: &impl SchemaCatalog,
        collection: &str,
        local_id: u64,
    ) -> Result<bool> {
        if !catalog.contains(collection) {
            return Err(IdentityError::UnknownCollection(collection.to_string()));
        }

        let table_name = schema::collection_table_name(collection);
        let tx = self.db.begin_write()?;
        let removed = {
            let mut rows = tx.open_table(schema::rows(&table_name))?;
            rows.remove(local_id)?.is_some()
        };
        tx.commit()?;
        Ok(removed)
    }

    /// All records of `collection`, ordered by local id.
    pub fn list_records(&self, collection: &str) -> StoreResult<Vec<(u64, Row)>> {
        let table_name = schema::collection_table_name(collection);
        let tx = self.db.begin_read()?;
        let Some(rows) = open_read(&tx, schema::rows(&table_name))? else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        for item in rows.iter()? {
            let (k, v) = item?;
            out.push((k.value(), codec::decode_row(v.value())?));
        }
        Ok(out)
    }
}

/// Open a table for reading; a table never written to reads as absent.
pub(crate) fn open_read<K: Key + 'static, V: Value + 'static>(
    tx: &ReadTransaction,
    def: TableDefinition<'_, K, V>,
) -> StoreResult<Option<ReadOnlyTable<K, V>>> {
    match tx.open_table(def) {
        Ok(t) => Ok(Some(t)),
        Err(TableError::TableDoesNotExist(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn open_and_lock(db_dir: &Path) -> anyhow::Result<File> {
    let lock_path = db_dir.join(LOCK_FILE);
    let f = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&lock_path)
        .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;

    // Exclusive lock: one writer process at a time.
    f.try_lock_exclusive()
        .with_context(|| format!("Database is locked (in use?): {}", db_dir.display()))?;

    Ok(f)
}

fn init_db_dir(db_dir: &Path) -> anyhow::Result<()> {
    let meta_path = db_dir.join(META_FILE);
    if !meta_path.exists() {
        write_meta(&meta_path)?;
    }

    let db_file_path = db_dir.join(DB_FILE);
    if !db_file_path.exists() {
        let _ = Database::create(&db_file_path)
            .with_context(|| format!("Failed to initialize redb at {}", db_file_path.display()))?;
    }

    Ok(())
}

fn write_meta(meta_path: &Path) -> anyhow::Result<()> {
    let mut f = File::create(meta_path)
        .with_context(|| format!("Failed to create {}", meta_path.display()))?;

    let contents = format!(
        r#"# identireg database metadata
format = 1
app = "identireg"
db_kind = "redb"
created = "{}"
"#,
        chrono::Local::now().to_rfc3339()
    );

    f.write_all(contents.as_bytes())
        .with_context(|| format!("Failed to write {}", meta_path.display()))?;

    f.sync_all()
        .with_context(|| format!("Failed to sync {}", meta_path.display()))?;

    Ok(())
}
