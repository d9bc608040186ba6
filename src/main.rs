use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use identireg::config::Settings;
use identireg::db::{self, DbHandle};
use identireg::{dbpath, IdentityProvider, RegistryStore, ResourceLocation, Row, UuidProvider};
use std::path::PathBuf;

mod check;
mod logging;
mod stats;

#[derive(Parser, Debug)]
#[command(name = "identireg")]
#[command(version, about = "Stable identifiers for records in named collections")]
struct Cli {
    /// Database name (no slashes) or path to a database directory.
    ///
    /// If it contains no path separators, it is treated as a name and placed under
    /// the default identireg data directory (platform-specific).
    #[arg(long, default_value = "default")]
    db: String,

    /// Config file (defaults to identireg.toml in the platform config directory).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Identity provider key from the config (defaults to `default_provider`).
    #[arg(long)]
    provider: Option<String>,

    /// Increase logging verbosity (use together with RUST_LOG for fine control).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check identifier syntax without touching the database
    Validate { identifiers: Vec<String> },

    #[command(flatten)]
    Db(DbCommand),
}

/// Commands that open the database.
#[derive(Subcommand, Debug)]
enum DbCommand {
    /// Reconcile the identity table with the records, then commit
    Rebuild {
        /// Report what would change and discard the queued registry changes.
        /// Identifiers assigned to records are still written.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Find the location of one or more identifiers
    Resolve {
        identifiers: Vec<String>,

        /// Print one token per input (FOUND / NOT_FOUND / INVALID)
        #[arg(short, long, default_value_t = false)]
        quiet: bool,
    },

    /// Find the identifier of records by collection and local id
    Lookup {
        collection: String,
        local_ids: Vec<String>,

        /// Print one token per input (FOUND / NOT_FOUND / INVALID)
        #[arg(short, long, default_value_t = false)]
        quiet: bool,
    },

    /// Add, remove or list records
    #[command(subcommand)]
    Record(RecordCommand),

    /// Registry and record counts
    Stats,

    /// Print basic DB info
    DbInfo,
}

#[derive(Subcommand, Debug)]
enum RecordCommand {
    /// Insert a record under the next local id
    Add {
        collection: String,

        /// Field value as key=value; may be repeated
        #[arg(long = "field", value_name = "KEY=VALUE")]
        fields: Vec<String>,

        /// Allocate an identifier for the record and register it
        #[arg(long, default_value_t = false)]
        assign: bool,
    },

    /// Remove a record (its registry entry goes on the next rebuild)
    Rm { collection: String, local_id: String },

    /// List the records of a collection
    List { collection: String },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref())?;
    logging::init(cli.verbose, settings.log_level.as_deref())?;

    let cmd = match cli.cmd {
        Command::Validate { identifiers } => {
            let invalid = check::run_validate(&identifiers)?;
            if invalid > 0 {
                bail!("{invalid} of {} identifier(s) invalid", identifiers.len());
            }
            return Ok(());
        }
        Command::Db(cmd) => cmd,
    };

    let (key, provider_config) = settings.provider(cli.provider.as_deref())?;
    let catalog = settings.catalog();

    // Resolve the DB directory according to our rules.
    let db_dir = dbpath::resolve_db_dir(&cli.db)
        .with_context(|| format!("Failed to resolve --db {}", cli.db))?;

    let dbh = db::open(&db_dir)
        .with_context(|| format!("Failed to open database in {}", db_dir.display()))?;
    dbh.ensure_identity_tables(&provider_config.identity_table)
        .with_context(|| format!("Failed to prepare identity table {}", provider_config.identity_table))?;

    let store = RegistryStore::new(
        &dbh,
        provider_config.identity_field.as_str(),
        provider_config.identity_table.as_str(),
    );
    let mut provider = UuidProvider::new(key, provider_config.clone(), store, catalog);

    match cmd {
        DbCommand::Rebuild { dry_run } => {
            tracing::info!(db_dir = %dbh.db_dir.display(), provider = key, dry_run, "rebuild starting");

            let report = provider.rebuild()?;
            println!("Assigned identifiers:      {}", report.assigned);
            println!("Registered identifiers:    {}", report.registered);
            println!("Removed registry entries:  {}", report.removed);

            if dry_run {
                println!(
                    "Dry run: discarded {} queued insert(s), {} queued delete(s)",
                    provider.queue().insert_count(),
                    provider.queue().delete_count()
                );
                provider.discard();
                return Ok(());
            }

            let commit = provider.commit()?;
            println!("Committed: {} inserted, {} deleted", commit.inserted, commit.deleted);
            Ok(())
        }

        DbCommand::Resolve { identifiers, quiet } => {
            check::run_resolve(&mut provider, &identifiers, quiet)?;
            Ok(())
        }

        DbCommand::Lookup {
            collection,
            local_ids,
            quiet,
        } => {
            check::run_lookup(&mut provider, &collection, &local_ids, quiet)?;
            // Persist identifiers found on records but missing from the registry.
            provider.commit()?;
            Ok(())
        }

        DbCommand::Record(cmd) => run_record(&dbh, &mut provider, cmd),

        DbCommand::Stats => {
            let s = stats::compute(&dbh, provider.config(), provider.catalog())?;
            stats::print(&s);
            Ok(())
        }

        DbCommand::DbInfo => {
            let (db_file, meta_file, lock_file) = dbpath::expected_paths(&dbh.db_dir);
            println!("DB directory:   {}", dbh.db_dir.display());
            println!("  database:     {}", db_file.display());
            println!("  metadata:     {}", meta_file.display());
            println!("  lock:         {}", lock_file.display());
            println!("Provider:       {}", provider.key());
            println!("  field:        {}", provider.config().identity_field);
            println!("  table:        {}", provider.store().identity_table());
            Ok(())
        }
    }
}

fn run_record<C, G>(
    dbh: &DbHandle,
    provider: &mut UuidProvider<RegistryStore<'_>, C, G>,
    cmd: RecordCommand,
) -> Result<()>
where
    C: identireg::SchemaCatalog,
    G: identireg::IdentifierSource,
{
    match cmd {
        RecordCommand::Add {
            collection,
            fields,
            assign,
        } => {
            let mut row = parse_fields(&fields)?;

            let identifier = if assign {
                let field = provider.config().identity_field.clone();
                if field.is_empty() {
                    bail!("provider {} has no identity field; cannot --assign", provider.key());
                }
                let id = provider
                    .get_identifier_for_new_resource_location(&collection)
                    .ok_or_else(|| anyhow!("collection {collection:?} is not configured"))?;
                row.insert(field, id.to_string());
                Some(id)
            } else {
                None
            };

            let local_id = dbh.insert_record(provider.catalog(), &collection, &row)?;
            println!("Inserted {}", ResourceLocation::new(collection.as_str(), local_id));

            if let Some(id) = identifier {
                let report = provider.commit()?;
                if report.inserted == 0 {
                    bail!("identifier {id} could not be registered");
                }
                println!("  identifier: {id}");
            }
            Ok(())
        }

        RecordCommand::Rm {
            collection,
            local_id,
        } => {
            let local_id = ResourceLocation::parse_local_id(&local_id)?;
            if dbh.remove_record(provider.catalog(), &collection, local_id)? {
                println!("Removed {collection}:{local_id}");
            } else {
                println!("No record {collection}:{local_id}");
            }
            Ok(())
        }

        RecordCommand::List { collection } => {
            if !provider.catalog().contains(&collection) {
                return Err(identireg::IdentityError::UnknownCollection(collection).into());
            }
            for (local_id, row) in dbh.list_records(&collection)? {
                let fields: Vec<String> = row.iter().map(|(k, v)| format!("{k}={v}")).collect();
                println!("{local_id:>8}  {}", fields.join(" "));
            }
            Ok(())
        }
    }
}

fn parse_fields(fields: &[String]) -> Result<Row> {
    let mut row = Row::new();
    for f in fields {
        let (k, v) = f
            .split_once('=')
            .ok_or_else(|| anyhow!("--field expects KEY=VALUE, got {f:?}"))?;
        if k.is_empty() {
            bail!("--field key must not be empty in {f:?}");
        }
        row.insert(k.to_string(), v.to_string());
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn db_commands_sit_beside_validate() {
        let cli = Cli::try_parse_from(["identireg", "validate", "x"]).unwrap();
        assert!(matches!(cli.cmd, Command::Validate { ref identifiers } if identifiers == &["x"]));

        let cli = Cli::try_parse_from(["identireg", "rebuild", "--dry-run"]).unwrap();
        assert!(matches!(cli.cmd, Command::Db(DbCommand::Rebuild { dry_run: true })));

        let cli = Cli::try_parse_from(["identireg", "record", "rm", "pages", "3"]).unwrap();
        assert!(matches!(cli.cmd, Command::Db(DbCommand::Record(RecordCommand::Rm { .. }))));
    }
}
