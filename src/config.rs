use crate::catalog::StaticCatalog;
use crate::dbpath;
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

pub const DEFAULT_PROVIDER: &str = "record_uuid";
pub const DEFAULT_IDENTITY_FIELD: &str = "uuid";
pub const DEFAULT_IDENTITY_TABLE: &str = "sys_identity";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Name of the record field that carries the identifier. Empty disables
    /// the provider for every collection.
    pub identity_field: String,
    pub identity_table: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            identity_field: DEFAULT_IDENTITY_FIELD.to_string(),
            identity_table: DEFAULT_IDENTITY_TABLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub identity: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub log_level: Option<String>,
    pub default_provider: String,
    pub providers: BTreeMap<String, ProviderConfig>,
    pub collections: Vec<CollectionConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: None,
            default_provider: DEFAULT_PROVIDER.to_string(),
            providers: BTreeMap::from([(DEFAULT_PROVIDER.to_string(), ProviderConfig::default())]),
            collections: Vec::new(),
        }
    }
}

impl Settings {
    /// Load from `path`, or from the platform config file when `path` is
    /// `None`. Only the implicit file may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let p = dbpath::default_config_path()?;
                if p.is_file() {
                    Self::from_file(&p)
                } else {
                    tracing::debug!(path = %p.display(), "no config file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            bail!("at least one provider must be configured");
        }
        for (key, provider) in &self.providers {
            if key.is_empty() {
                bail!("provider key must not be empty");
            }
            if provider.identity_table.is_empty() {
                bail!("provider {key:?}: identity_table must not be empty");
            }
        }
        if !self.providers.contains_key(&self.default_provider) {
            bail!("default_provider {:?} is not configured", self.default_provider);
        }

        let mut seen = BTreeSet::new();
        for c in &self.collections {
            if c.name.is_empty() {
                bail!("collection name must not be empty");
            }
            if !seen.insert(c.name.as_str()) {
                bail!("collection {:?} is listed twice", c.name);
            }
        }
        Ok(())
    }

    /// The provider named `key`, or the default provider.
    pub fn provider<'a>(&'a self, key: Option<&'a str>) -> Result<(&'a str, &'a ProviderConfig)> {
        let key = key.unwrap_or(self.default_provider.as_str());
        self.providers
            .get_key_value(key)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| anyhow!("provider {key:?} is not configured"))
    }

    pub fn catalog(&self) -> StaticCatalog {
        let mut catalog = StaticCatalog::new();
        for c in &self.collections {
            catalog.add(c.name.clone(), c.identity);
        }
        catalog
    }
}
