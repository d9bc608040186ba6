//! Stable resource identifiers for records spread over named collections.
//!
//! A provider maps each identifier to exactly one `(collection, local id)`
//! location and back, allocates identifiers for new records, and reconciles
//! the persistent identity table with the records it describes.

pub mod cache;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod db;
pub mod dbpath;
pub mod error;
pub mod identifier;
pub mod provider;
pub mod queue;
pub mod rebuild;
pub mod schema;
pub mod store;
pub mod types;

pub use catalog::{SchemaCatalog, StaticCatalog};
pub use error::{IdentityError, InvalidReason, Result, StoreError};
pub use identifier::{Identifier, IdentifierSource, UuidV4};
pub use provider::{CommitReport, IdentityProvider, UuidProvider};
pub use rebuild::RebuildReport;
pub use store::{IdentityStore, MemoryStore, RegistryStore};
pub use types::{RegistryEntry, ResourceLocation, Row};
