//! Metadata Store
//!
//! Stores one document per numeric id as a plain file at its slot path:
//!
//! ```text
//! <base_dir>/0001/04/<prefix>00010485.xml
//! ```
//!
//! With `force_xml` enabled (the default) every document must be well-formed
//! XML and is written in canonical UTF-8 form; otherwise bytes are stored as
//! given and `force_doc_type` can declare what they are.

use crate::error::{Result, StoreError};
use crate::storage::store::{write_file_atomically, SortOrder, Store, StoredIds};
use crate::storage::xml;
use chrono::{DateTime, Utc};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};

/// Behaviour switches of a metadata store.
#[derive(Debug, Clone)]
pub struct MetadataOptions {
    pub force_xml: bool,
    pub force_doc_type: Option<String>,
    pub pretty: bool,
}

impl Default for MetadataOptions {
    fn default() -> Self {
        Self {
            force_xml: true,
            force_doc_type: None,
            pretty: true,
        }
    }
}

#[derive(Debug)]
pub struct MetadataStore {
    store: Store,
    options: MetadataOptions,
}

impl MetadataStore {
    pub fn new(store: Store, options: MetadataOptions) -> Self {
        Self { store, options }
    }

    pub fn id(&self) -> &str {
        self.store.id()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn options(&self) -> &MetadataOptions {
        &self.options
    }

    /// Validates and canonicalises `content` according to the store options.
    pub(crate) fn prepare_content(&self, content: &[u8]) -> Result<Vec<u8>> {
        if self.options.force_xml {
            xml::normalize(content, self.options.pretty)
        } else {
            Ok(content.to_vec())
        }
    }

    /// Stores `content` under `id`, or under a freshly allocated id.
    pub fn create(&self, content: &[u8], id: Option<u64>) -> Result<StoredMetadata<'_>> {
        let content = self.prepare_content(content)?;
        let id = match id {
            Some(id) => id,
            None => self.store.next_free_id()?,
        };
        let path = self.store.slot_path(id)?;
        if path.exists() {
            return Err(StoreError::already_exists(self.id(), id));
        }

        write_new_slot(&path, &content).map_err(|e| match e {
            StoreError::Io(io) if io.kind() == std::io::ErrorKind::AlreadyExists => {
                StoreError::already_exists(self.id(), id)
            }
            other => other,
        })?;

        info!(store = %self.id(), id, size = content.len(), "Created metadata");
        Ok(StoredMetadata::new(self, id, Some(&content)))
    }

    /// Handle for `id`, or `None` if nothing is stored there.
    pub fn retrieve(&self, id: u64) -> Result<Option<StoredMetadata<'_>>> {
        if !self.store.exists(id) {
            debug!(store = %self.id(), id, "Metadata not found");
            return Ok(None);
        }
        Ok(Some(StoredMetadata::new(self, id, None)))
    }

    pub(crate) fn read_slot(&self, id: u64) -> Result<Vec<u8>> {
        let path = self.store.slot_path(id)?;
        fs::read(&path).map_err(|e| StoreError::io_error("Failed to read metadata", path, e))
    }

    /// Overwrites the document of an existing record.
    pub fn update(&self, record: &mut StoredMetadata<'_>, content: &[u8]) -> Result<()> {
        if record.deleted {
            return Err(StoreError::usage(format!(
                "Metadata {} in store {} was deleted and cannot be updated",
                record.id,
                self.id()
            )));
        }
        let content = self.prepare_content(content)?;
        let path = self.store.slot_path(record.id)?;
        if !path.exists() {
            return Err(StoreError::usage(format!(
                "Metadata {} does not exist in store {}",
                record.id,
                self.id()
            )));
        }

        write_file_atomically(&path, &content)?;
        record.refresh(Some(&content));
        info!(store = %self.id(), id = record.id, size = content.len(), "Updated metadata");
        Ok(())
    }

    pub fn delete(&self, id: u64) -> Result<()> {
        if !self.store.exists(id) {
            return Err(StoreError::usage(format!(
                "Metadata {} does not exist in store {}",
                id,
                self.id()
            )));
        }
        self.store.delete(id)
    }

    pub fn exists(&self, id: u64) -> bool {
        self.store.exists(id)
    }

    pub fn list_ids(&self, order: SortOrder) -> StoredIds<'_> {
        self.store.list_ids(order)
    }

    pub fn next_free_id(&self) -> Result<u64> {
        self.store.next_free_id()
    }

    pub(crate) fn doc_type_of(&self, content: &[u8]) -> Option<String> {
        self.options
            .force_doc_type
            .clone()
            .or_else(|| xml::root_element_name(content))
    }
}

/// Writes a slot that must not exist yet; a partial file is removed on failure.
pub(crate) fn write_new_slot(path: &std::path::Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| StoreError::io_error("Failed to create slot directory", parent, e))?;
    }

    // O_EXCL: two writers racing for the same id cannot both succeed
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;

    let cleanup = scopeguard::guard(path.to_path_buf(), |path| {
        let _ = fs::remove_file(path);
    });
    file.write_all(content)
        .and_then(|_| file.sync_all())
        .map_err(|e| StoreError::io_error("Failed to write slot", path, e))?;
    scopeguard::ScopeGuard::into_inner(cleanup);
    Ok(())
}

pub(crate) fn modified_time(path: &std::path::Path) -> Option<DateTime<Utc>> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

/// Transient handle on one stored document.
///
/// It caches nothing but what the last operation reported; the file on disk
/// stays the source of truth.
#[derive(Debug)]
pub struct StoredMetadata<'a> {
    store: &'a MetadataStore,
    id: u64,
    doc_type: Option<String>,
    last_modified: Option<DateTime<Utc>>,
    deleted: bool,
}

impl<'a> StoredMetadata<'a> {
    fn new(store: &'a MetadataStore, id: u64, content: Option<&[u8]>) -> Self {
        let mut record = Self {
            store,
            id,
            doc_type: store.options.force_doc_type.clone(),
            last_modified: None,
            deleted: false,
        };
        record.refresh(content);
        record
    }

    fn refresh(&mut self, content: Option<&[u8]>) {
        if let Some(content) = content {
            self.doc_type = self.store.doc_type_of(content);
        }
        self.last_modified = self.path().ok().and_then(|p| modified_time(&p));
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn store(&self) -> &'a MetadataStore {
        self.store
    }

    /// Prefixed, zero-padded id, e.g. `docs_00000042`.
    pub fn full_id(&self) -> String {
        format!(
            "{}{}",
            self.store.store.prefix(),
            self.store.store.layout().pad(self.id)
        )
    }

    pub fn path(&self) -> Result<PathBuf> {
        self.store.store.slot_path(self.id)
    }

    /// Forced doc type, or the root element of the content last seen.
    pub fn doc_type(&self) -> Option<&str> {
        self.doc_type.as_deref()
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn read(&mut self) -> Result<Vec<u8>> {
        if self.deleted {
            return Err(StoreError::usage(format!(
                "Metadata {} was deleted",
                self.id
            )));
        }
        let content = self.store.read_slot(self.id)?;
        self.refresh(Some(&content));
        Ok(content)
    }

    pub fn update(&mut self, content: &[u8]) -> Result<()> {
        let store = self.store;
        store.update(self, content)
    }

    pub fn delete(&mut self) -> Result<()> {
        if self.deleted {
            return Err(StoreError::usage(format!(
                "Metadata {} was already deleted",
                self.id
            )));
        }
        self.store.delete(self.id)?;
        self.deleted = true;
        self.last_modified = Some(Utc::now());
        Ok(())
    }
}
