use std::collections::BTreeMap;

/// What the core needs to know about the host's collections.
pub trait SchemaCatalog {
    fn list_collections(&self) -> Vec<String>;

    fn contains(&self, collection: &str) -> bool;

    /// True when records of `collection` carry an identifier field.
    fn has_identifier_field_configured(&self, collection: &str) -> bool;
}

/// A fixed catalog, typically built from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    // collection name -> carries the identifier field
    collections: BTreeMap<String, bool>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, name: impl Into<String>, has_identifier: bool) -> Self {
        self.add(name, has_identifier);
        self
    }

    pub fn add(&mut self, name: impl Into<String>, has_identifier: bool) {
        self.collections.insert(name.into(), has_identifier);
    }

}

impl SchemaCatalog for StaticCatalog {
    fn list_collections(&self) -> Vec<String> {
        self.collections.keys().cloned().collect()
    }

    fn contains(&self, collection: &str) -> bool {
        self.collections.contains_key(collection)
    }

    fn has_identifier_field_configured(&self, collection: &str) -> bool {
        self.collections.get(collection).copied().unwrap_or(false)
    }
}

impl<C: SchemaCatalog + ?Sized> SchemaCatalog for &C {
    fn list_collections(&self) -> Vec<String> {
        (**self).list_collections()
    }

    fn contains(&self, collection: &str) -> bool {
        (**self).contains(collection)
    }

    fn has_identifier_field_configured(&self, collection: &str) -> bool {
        (**self).has_identifier_field_configured(collection)
    }
}
