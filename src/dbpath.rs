//! Where an identireg database and its config live.
//!
//! `--db` takes either a bare name, stored under the platform data
//! directory, or a path. A database directory holds `registry.redb`,
//! `meta.toml` and the `LOCK` file; anything else in a non-empty directory
//! means it belongs to someone else.

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

pub const DB_FILE: &str = "registry.redb";
pub const META_FILE: &str = "meta.toml";
pub const LOCK_FILE: &str = "LOCK";
pub const CONFIG_FILE: &str = "identireg.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbDirState {
    /// Missing (and now created) or empty: open initializes it.
    Empty,
    /// Holds `meta.toml` and `registry.redb`.
    LooksValid,
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("org", "identireg", "identireg")
        .context("Unable to determine platform directories")
}

pub fn default_db_base_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join(CONFIG_FILE))
}

/// Map a `--db` value to a directory.
///
/// Names may not be empty, `.` or `..`, since those would alias the data
/// directory itself or its parent.
pub fn resolve_db_dir(db: &str) -> Result<PathBuf> {
    if db.contains(['/', '\\']) {
        return Ok(PathBuf::from(db));
    }
    match db.trim() {
        "" => bail!("database name is empty"),
        "." | ".." => bail!("{db:?} is not a database name; use ./{db} for a path"),
        _ => Ok(default_db_base_dir()?.join(db)),
    }
}

/// (database file, metadata file, lock file) inside `db_dir`.
pub fn expected_paths(db_dir: &Path) -> (PathBuf, PathBuf, PathBuf) {
    (
        db_dir.join(DB_FILE),
        db_dir.join(META_FILE),
        db_dir.join(LOCK_FILE),
    )
}

/// Classify `db_dir`, creating it when missing. A file in its place, or a
/// non-empty directory without our files, is refused.
pub fn ensure_db_dir_is_valid_or_empty(db_dir: &Path) -> Result<DbDirState> {
    if !db_dir.exists() {
        fs::create_dir_all(db_dir)
            .with_context(|| format!("Failed to create {}", db_dir.display()))?;
        return Ok(DbDirState::Empty);
    }
    if !db_dir.is_dir() {
        bail!("DB path {} exists but is not a directory", db_dir.display());
    }

    let mut entries = fs::read_dir(db_dir)
        .with_context(|| format!("Failed to read directory {}", db_dir.display()))?;
    if entries.next().transpose()?.is_none() {
        return Ok(DbDirState::Empty);
    }

    let (db_file, meta_file, _) = expected_paths(db_dir);
    if db_file.is_file() && meta_file.is_file() {
        Ok(DbDirState::LooksValid)
    } else {
        bail!(
            "{} is not an identireg database (expected {} and {})",
            db_dir.display(),
            META_FILE,
            DB_FILE
        )
    }
}
