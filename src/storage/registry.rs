//! Store registry
//!
//! Maps store ids to opened stores. Construct a [`StoreRegistry`] and pass it
//! to whatever builds stores; [`global`] is the one process-wide instance for
//! top-level wiring and can be emptied with [`StoreRegistry::clear`].

use crate::error::{Result, StoreError};
use crate::storage::files::FileStore;
use crate::storage::metadata_store::MetadataStore;
use crate::storage::versioning::VersioningMetadataStore;
use crate::storage::store::Store;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Any store kind the registry can hold.
#[derive(Debug, Clone)]
pub enum RegisteredStore {
    Metadata(Arc<MetadataStore>),
    VersioningMetadata(Arc<VersioningMetadataStore>),
    Files(Arc<FileStore>),
}

impl RegisteredStore {
    pub fn id(&self) -> &str {
        self.store().id()
    }

    /// The underlying slot store.
    pub fn store(&self) -> &Store {
        match self {
            RegisteredStore::Metadata(store) => store.store(),
            RegisteredStore::VersioningMetadata(store) => store.metadata().store(),
            RegisteredStore::Files(store) => store.store(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RegisteredStore::Metadata(_) => "metadata",
            RegisteredStore::VersioningMetadata(_) => "versioning_metadata",
            RegisteredStore::Files(_) => "files",
        }
    }

    pub fn as_metadata(&self) -> Option<&Arc<MetadataStore>> {
        match self {
            RegisteredStore::Metadata(store) => Some(store),
            _ => None,
        }
    }

    pub fn as_versioning(&self) -> Option<&Arc<VersioningMetadataStore>> {
        match self {
            RegisteredStore::VersioningMetadata(store) => Some(store),
            _ => None,
        }
    }

    pub fn as_files(&self) -> Option<&Arc<FileStore>> {
        match self {
            RegisteredStore::Files(store) => Some(store),
            _ => None,
        }
    }
}

impl From<MetadataStore> for RegisteredStore {
    fn from(store: MetadataStore) -> Self {
        RegisteredStore::Metadata(Arc::new(store))
    }
}

impl From<VersioningMetadataStore> for RegisteredStore {
    fn from(store: VersioningMetadataStore) -> Self {
        RegisteredStore::VersioningMetadata(Arc::new(store))
    }
}

impl From<FileStore> for RegisteredStore {
    fn from(store: FileStore) -> Self {
        RegisteredStore::Files(Arc::new(store))
    }
}

#[derive(Default)]
pub struct StoreRegistry {
    stores: DashMap<String, RegisteredStore>,
}

impl fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("stores", &self.ids())
            .finish()
    }
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `store`; an id can only be registered once.
    pub fn register(&self, store: impl Into<RegisteredStore>) -> Result<RegisteredStore> {
        let store = store.into();
        let id = store.id().to_string();
        match self.stores.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Err(StoreError::configuration(format!(
                "Store {} is already registered",
                entry.key()
            ))),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                info!(store = %entry.key(), kind = store.kind(), "Registered store");
                entry.insert(store.clone());
                Ok(store)
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<RegisteredStore> {
        let found = self.stores.get(id).map(|entry| entry.value().clone());
        debug!(store = %id, found = found.is_some(), "Store lookup");
        found
    }

    pub fn metadata(&self, id: &str) -> Option<Arc<MetadataStore>> {
        self.get(id).and_then(|store| store.as_metadata().cloned())
    }

    pub fn versioning(&self, id: &str) -> Option<Arc<VersioningMetadataStore>> {
        self.get(id).and_then(|store| store.as_versioning().cloned())
    }

    pub fn files(&self, id: &str) -> Option<Arc<FileStore>> {
        self.get(id).and_then(|store| store.as_files().cloned())
    }

    pub fn remove(&self, id: &str) -> Option<RegisteredStore> {
        let removed = self.stores.remove(id).map(|(_, store)| store);
        if removed.is_some() {
            info!(store = %id, "Unregistered store");
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.stores.contains_key(id)
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.stores.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Snapshot of all registered stores, sorted by id.
    pub fn list(&self) -> Vec<RegisteredStore> {
        let mut stores: Vec<RegisteredStore> =
            self.stores.iter().map(|entry| entry.value().clone()).collect();
        stores.sort_by(|a, b| a.id().cmp(b.id()));
        stores
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    pub fn clear(&self) {
        self.stores.clear();
        debug!("Cleared store registry");
    }
}

static GLOBAL_REGISTRY: Lazy<StoreRegistry> = Lazy::new(StoreRegistry::new);

/// Process-wide registry.
pub fn global() -> &'static StoreRegistry {
    &GLOBAL_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::metadata_store::MetadataOptions;
    use tempfile::TempDir;

    fn metadata_store(temp_dir: &TempDir, id: &str) -> MetadataStore {
        let store = Store::new(
            id,
            temp_dir.path().join(id),
            "2-2".parse().unwrap(),
            format!("{}_", id),
            ".xml",
        )
        .unwrap();
        MetadataStore::new(store, MetadataOptions::default())
    }

    #[test]
    fn test_register_and_lookup() {
        let temp_dir = TempDir::new().unwrap();
        let registry = StoreRegistry::new();

        registry.register(metadata_store(&temp_dir, "mods")).unwrap();
        let files = Store::new("derivates", temp_dir.path().join("d"), "2-2".parse().unwrap(), "", "")
            .unwrap();
        registry.register(FileStore::new(files)).unwrap();

        assert_eq!(registry.ids(), vec!["derivates", "mods"]);
        assert!(registry.metadata("mods").is_some());
        assert!(registry.files("mods").is_none());
        assert!(registry.files("derivates").is_some());
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let registry = StoreRegistry::new();

        registry.register(metadata_store(&temp_dir, "mods")).unwrap();
        let result = registry.register(metadata_store(&temp_dir, "mods"));
        assert!(matches!(result, Err(StoreError::Configuration(_))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let registry = StoreRegistry::new();
        registry.register(metadata_store(&temp_dir, "a")).unwrap();
        registry.register(metadata_store(&temp_dir, "b")).unwrap();

        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert!(!registry.contains("a"));

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_global_registry_is_shared() {
        let temp_dir = TempDir::new().unwrap();
        global()
            .register(metadata_store(&temp_dir, "global_registry_test"))
            .unwrap();
        assert!(global().contains("global_registry_test"));
        global().remove("global_registry_test");
    }
}
