//! Versioning metadata store
//!
//! A [`VersioningMetadataStore`] is a [`MetadataStore`] whose every write is
//! first committed to a [`VersionRepository`] and only then applied to the
//! local mirror. A failed commit leaves the mirror exactly as it was.
//!
//! Record lifecycle:
//!
//! ```text
//! Created ──update──▶ Updated ──update──▶ Updated
//!    │                   │
//!    └──────delete───────┴──▶ Deleted ──create──▶ Created
//! ```

pub mod blob_store;
pub mod repository;

use crate::error::{Result, StoreError};
use crate::storage::metadata_store::{modified_time, write_new_slot, MetadataStore};
use crate::storage::store::{write_file_atomically, SortOrder, StoredIds};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

pub use repository::{ChangeKind, CommitInfo, LocalHistoryRepository, LogEntry, VersionRepository};

/// What a single version did to its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionKind {
    Created,
    Updated,
    Deleted,
}

impl From<ChangeKind> for VersionKind {
    fn from(change: ChangeKind) -> Self {
        match change {
            ChangeKind::Added => VersionKind::Created,
            ChangeKind::Modified => VersionKind::Updated,
            ChangeKind::Deleted => VersionKind::Deleted,
        }
    }
}

impl fmt::Display for VersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionKind::Created => write!(f, "Created"),
            VersionKind::Updated => write!(f, "Updated"),
            VersionKind::Deleted => write!(f, "Deleted"),
        }
    }
}

#[derive(Debug)]
pub struct VersioningMetadataStore {
    metadata: MetadataStore,
    repository: Arc<dyn VersionRepository>,
}

impl VersioningMetadataStore {
    pub fn new(metadata: MetadataStore, repository: Arc<dyn VersionRepository>) -> Self {
        info!(store = %metadata.id(), "Opened versioning metadata store");
        Self {
            metadata,
            repository,
        }
    }

    pub fn id(&self) -> &str {
        self.metadata.id()
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn repository(&self) -> &Arc<dyn VersionRepository> {
        &self.repository
    }

    /// `/`-separated path of the slot of `id` inside the repository.
    pub fn repository_path(&self, id: u64) -> Result<String> {
        Ok(self.metadata.store().slot_segments(id)?.join("/"))
    }

    /// Every directory on the way to the slot of `id`, outermost first.
    fn slot_directories(&self, id: u64) -> Result<Vec<String>> {
        let segments = self.metadata.store().slot_segments(id)?;
        let dirs = segments.len().saturating_sub(1);
        Ok((1..=dirs).map(|n| segments[..n].join("/")).collect())
    }

    fn full_id(&self, id: u64) -> String {
        let store = self.metadata.store();
        format!("{}{}", store.prefix(), store.layout().pad(id))
    }

    fn commit_message(&self, kind: VersionKind, id: u64) -> String {
        format!(
            "{} metadata object {} in store {}",
            kind,
            self.full_id(id),
            self.id()
        )
    }

    /// All changes of the slot of `id`, oldest first.
    fn history_of(&self, id: u64) -> Result<Vec<LogEntry>> {
        let path = self.repository_path(id)?;
        match self.repository.latest_revision()? {
            Some(head) => self.repository.log_entries(&path, 1, head),
            None => Ok(Vec::new()),
        }
    }

    fn failed_commit(&self, id: u64, kind: VersionKind, e: StoreError) -> StoreError {
        error!(store = %self.id(), id, operation = %kind, error = %e, "Commit failed, local mirror untouched");
        e.with_context(format!("{} of {} not committed", kind, self.full_id(id)))
    }

    /// Commits `content` as a new record and then writes the mirror.
    pub fn create(&self, content: &[u8], id: Option<u64>) -> Result<VersionedMetadata<'_>> {
        let content = self.metadata.prepare_content(content)?;
        let id = match id {
            Some(id) => id,
            None => self.metadata.next_free_id()?,
        };
        let path = self.metadata.store().slot_path(id)?;
        if path.exists() {
            return Err(StoreError::already_exists(self.id(), id));
        }
        let present_in_history = self
            .history_of(id)?
            .last()
            .is_some_and(|entry| entry.change != ChangeKind::Deleted);
        if present_in_history {
            return Err(StoreError::already_exists(self.id(), id));
        }

        let commit = self
            .repository
            .commit_write(
                &self.slot_directories(id)?,
                &self.repository_path(id)?,
                &content,
                &self.commit_message(VersionKind::Created, id),
            )
            .map_err(|e| self.failed_commit(id, VersionKind::Created, e))?;

        write_new_slot(&path, &content)?;
        info!(store = %self.id(), id, revision = commit.revision, "Created versioned metadata");

        Ok(VersionedMetadata {
            store: self,
            id,
            revision: Some(commit.revision),
            last_modified: Some(commit.timestamp),
            doc_type: self.metadata.doc_type_of(&content),
            deleted: false,
        })
    }

    /// The record of `id`; a deleted record comes back as a tombstone, an id
    /// that never existed as `None`.
    pub fn retrieve(&self, id: u64) -> Result<Option<VersionedMetadata<'_>>> {
        let last = self.history_of(id)?.pop();
        let path = self.metadata.store().slot_path(id)?;

        if path.exists() {
            let mut record = VersionedMetadata {
                store: self,
                id,
                revision: last.as_ref().map(|entry| entry.revision),
                last_modified: last.as_ref().map(|entry| entry.timestamp),
                doc_type: self.metadata.options().force_doc_type.clone(),
                deleted: false,
            };
            if record.last_modified.is_none() {
                record.last_modified = modified_time(&path);
            }
            return Ok(Some(record));
        }

        match last {
            Some(entry) if entry.change == ChangeKind::Deleted => {
                debug!(store = %self.id(), id, revision = entry.revision, "Retrieved deleted metadata");
                Ok(Some(VersionedMetadata {
                    store: self,
                    id,
                    revision: Some(entry.revision),
                    last_modified: Some(entry.timestamp),
                    doc_type: self.metadata.options().force_doc_type.clone(),
                    deleted: true,
                }))
            }
            _ => Ok(None),
        }
    }

    pub fn update(&self, record: &mut VersionedMetadata<'_>, content: &[u8]) -> Result<()> {
        if record.deleted {
            return Err(StoreError::usage(format!(
                "Metadata {} in store {} was deleted and cannot be updated",
                record.id,
                self.id()
            )));
        }
        let content = self.metadata.prepare_content(content)?;
        let path = self.metadata.store().slot_path(record.id)?;
        if !path.exists() {
            return Err(StoreError::usage(format!(
                "Metadata {} does not exist in store {}",
                record.id,
                self.id()
            )));
        }

        let commit = self
            .repository
            .commit_write(
                &self.slot_directories(record.id)?,
                &self.repository_path(record.id)?,
                &content,
                &self.commit_message(VersionKind::Updated, record.id),
            )
            .map_err(|e| self.failed_commit(record.id, VersionKind::Updated, e))?;

        write_file_atomically(&path, &content)?;
        record.revision = Some(commit.revision);
        record.last_modified = Some(commit.timestamp);
        record.doc_type = self.metadata.doc_type_of(&content);
        info!(store = %self.id(), id = record.id, revision = commit.revision, "Updated versioned metadata");
        Ok(())
    }

    /// Deletes the record of `id`; the history keeps every earlier version.
    pub fn delete(&self, id: u64) -> Result<()> {
        match self.retrieve(id)? {
            Some(mut record) => record.delete(),
            None => Err(StoreError::usage(format!(
                "Metadata {} does not exist in store {}",
                id,
                self.id()
            ))),
        }
    }

    fn delete_record(&self, record: &mut VersionedMetadata<'_>) -> Result<()> {
        if record.deleted {
            return Err(StoreError::usage(format!(
                "Metadata {} was already deleted",
                record.id
            )));
        }
        if !self.metadata.exists(record.id) {
            return Err(StoreError::usage(format!(
                "Metadata {} does not exist in store {}",
                record.id,
                self.id()
            )));
        }

        let commit = self
            .repository
            .commit_delete(
                &self.repository_path(record.id)?,
                &self.commit_message(VersionKind::Deleted, record.id),
            )
            .map_err(|e| self.failed_commit(record.id, VersionKind::Deleted, e))?;

        self.metadata.store().delete(record.id)?;
        record.deleted = true;
        record.revision = Some(commit.revision);
        record.last_modified = Some(commit.timestamp);
        info!(store = %self.id(), id = record.id, revision = commit.revision, "Deleted versioned metadata");
        Ok(())
    }

    pub fn exists(&self, id: u64) -> bool {
        self.metadata.exists(id)
    }

    pub fn list_ids(&self, order: SortOrder) -> StoredIds<'_> {
        self.metadata.list_ids(order)
    }

    pub fn next_free_id(&self) -> Result<u64> {
        self.metadata.next_free_id()
    }
}

/// A versioned record whose local mirror reflects `revision`.
#[derive(Debug)]
pub struct VersionedMetadata<'a> {
    store: &'a VersioningMetadataStore,
    id: u64,
    revision: Option<u64>,
    last_modified: Option<DateTime<Utc>>,
    doc_type: Option<String>,
    deleted: bool,
}

impl<'a> VersionedMetadata<'a> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn store(&self) -> &'a VersioningMetadataStore {
        self.store
    }

    pub fn full_id(&self) -> String {
        self.store.full_id(self.id)
    }

    pub fn path(&self) -> Result<PathBuf> {
        self.store.metadata.store().slot_path(self.id)
    }

    /// Revision currently mirrored locally, `None` if the history knows
    /// nothing about this record.
    pub fn revision(&self) -> Option<u64> {
        self.revision
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn doc_type(&self) -> Option<&str> {
        self.doc_type.as_deref()
    }

    /// Content of the local mirror.
    pub fn read(&mut self) -> Result<Vec<u8>> {
        if self.deleted {
            return Err(StoreError::usage(format!(
                "Metadata {} was deleted",
                self.id
            )));
        }
        let content = self.store.metadata.read_slot(self.id)?;
        self.doc_type = self.store.metadata.doc_type_of(&content);
        Ok(content)
    }

    pub fn update(&mut self, content: &[u8]) -> Result<()> {
        let store = self.store;
        store.update(self, content)
    }

    pub fn delete(&mut self) -> Result<()> {
        let store = self.store;
        store.delete_record(self)
    }

    /// Every version of this record, oldest first.
    pub fn versions(&self) -> Result<Vec<MetadataVersion<'a>>> {
        Ok(self
            .store
            .history_of(self.id)?
            .into_iter()
            .map(|entry| MetadataVersion::new(self.store, self.id, entry))
            .collect())
    }

    /// The version created at exactly `revision`, if this record changed there.
    pub fn version_at(&self, revision: u64) -> Result<Option<MetadataVersion<'a>>> {
        let path = self.store.repository_path(self.id)?;
        Ok(self
            .store
            .repository
            .log_entries(&path, revision, revision)?
            .into_iter()
            .next()
            .map(|entry| MetadataVersion::new(self.store, self.id, entry)))
    }

    /// The version in effect at `revision`: the newest one not after it.
    pub fn version_as_of(&self, revision: u64) -> Result<Option<MetadataVersion<'a>>> {
        Ok(self
            .versions()?
            .into_iter()
            .rev()
            .find(|version| version.revision <= revision))
    }

    /// Newest revision that changed this record, optionally skipping deletions.
    pub fn last_revision(&self, include_deleted: bool) -> Result<Option<u64>> {
        Ok(self
            .store
            .history_of(self.id)?
            .iter()
            .rev()
            .find(|entry| include_deleted || entry.change != ChangeKind::Deleted)
            .map(|entry| entry.revision))
    }

    /// Newest revision at which the record had content.
    pub fn last_present_revision(&self) -> Result<Option<u64>> {
        self.last_revision(false)
    }

    pub fn is_up_to_date(&self) -> Result<bool> {
        let head = self.last_revision(true)?;
        Ok(match (head, self.revision) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(head), Some(mirrored)) => head <= mirrored,
        })
    }

    /// Replaces the local mirror with the content as of `revision`, or with
    /// the newest content when `revision` is `None`. Nothing is committed.
    pub fn checkout(&mut self, revision: Option<u64>) -> Result<()> {
        let version = match revision {
            Some(revision) => self.version_as_of(revision)?,
            None => self.versions()?.pop(),
        };
        let version = version.ok_or_else(|| {
            StoreError::usage(format!(
                "Metadata {} has no version to check out",
                self.full_id()
            ))
        })?;
        let content = version.retrieve()?;

        let path = self.path()?;
        write_file_atomically(&path, &content)?;
        self.revision = Some(version.revision);
        self.last_modified = Some(version.timestamp);
        self.doc_type = self.store.metadata.doc_type_of(&content);
        self.deleted = false;
        info!(
            store = %self.store.id(),
            id = self.id,
            revision = version.revision,
            "Checked out metadata revision"
        );
        Ok(())
    }

    /// Commits the content of `version` as a new version of this record.
    pub fn restore(&mut self, version: &MetadataVersion<'_>) -> Result<()> {
        if version.id != self.id {
            return Err(StoreError::usage(format!(
                "Version of metadata {} cannot restore metadata {}",
                version.id, self.id
            )));
        }
        let content = version.retrieve()?;
        self.update(&content)
    }
}

/// One entry of a record's history.
#[derive(Debug, Clone)]
pub struct MetadataVersion<'a> {
    store: &'a VersioningMetadataStore,
    id: u64,
    revision: u64,
    author: String,
    timestamp: DateTime<Utc>,
    kind: VersionKind,
    message: String,
}

impl<'a> MetadataVersion<'a> {
    fn new(store: &'a VersioningMetadataStore, id: u64, entry: LogEntry) -> Self {
        Self {
            store,
            id,
            revision: entry.revision,
            author: entry.author,
            timestamp: entry.timestamp,
            kind: entry.change.into(),
            message: entry.message,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn kind(&self) -> VersionKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Content committed by this version.
    pub fn retrieve(&self) -> Result<Vec<u8>> {
        if self.kind == VersionKind::Deleted {
            return Err(StoreError::usage(format!(
                "Revision {} of metadata {} is a deletion and has no content",
                self.revision, self.id
            )));
        }
        let path = self.store.repository_path(self.id)?;
        self.store.repository.file_at_revision(&path, self.revision)
    }

    /// Makes this version's content the newest version of the record.
    pub fn restore(&self) -> Result<()> {
        match self.store.retrieve(self.id)? {
            Some(mut record) => record.restore(self),
            None => Err(StoreError::usage(format!(
                "Metadata {} does not exist in store {}",
                self.id,
                self.store.id()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::metadata_store::MetadataOptions;
    use crate::storage::store::Store;
    use tempfile::TempDir;

    fn create_versioning_store(temp_dir: &TempDir) -> VersioningMetadataStore {
        let store = Store::new(
            "docs",
            temp_dir.path().join("docs"),
            "4-2-2".parse().unwrap(),
            "docs_",
            ".xml",
        )
        .unwrap();
        let repository =
            LocalHistoryRepository::open(temp_dir.path().join("history"), "tester").unwrap();
        VersioningMetadataStore::new(
            MetadataStore::new(store, MetadataOptions::default()),
            Arc::new(repository),
        )
    }

    fn text(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_round_trip_across_revisions() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_versioning_store(&temp_dir);

        let mut record = store.create(b"<doc>X</doc>", Some(10485)).unwrap();
        let r1 = record.revision().unwrap();
        record.update(b"<doc>Y</doc>").unwrap();
        let r2 = record.revision().unwrap();
        assert!(r2 > r1);

        let old = record.version_at(r1).unwrap().unwrap();
        assert_eq!(old.kind(), VersionKind::Created);
        assert!(text(old.retrieve().unwrap()).contains("<doc>X</doc>"));
        assert!(text(record.read().unwrap()).contains("<doc>Y</doc>"));
        assert!(record.is_up_to_date().unwrap());
    }

    #[test]
    fn test_commit_message_names_operation_and_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_versioning_store(&temp_dir);

        let record = store.create(b"<a/>", Some(42)).unwrap();
        let versions = record.versions().unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(
            versions[0].message(),
            "Created metadata object docs_00000042 in store docs"
        );
        assert_eq!(versions[0].author(), "tester");
    }

    #[test]
    fn test_delete_leaves_tombstone_and_allows_recreation() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_versioning_store(&temp_dir);

        store.create(b"<a/>", Some(7)).unwrap();
        store.delete(7).unwrap();
        assert!(!store.exists(7));

        let mut tombstone = store.retrieve(7).unwrap().unwrap();
        assert!(tombstone.is_deleted());
        assert!(matches!(tombstone.read(), Err(StoreError::Usage(_))));
        assert!(matches!(tombstone.update(b"<b/>"), Err(StoreError::Usage(_))));
        assert!(matches!(tombstone.delete(), Err(StoreError::Usage(_))));

        let deletion = tombstone.versions().unwrap().pop().unwrap();
        assert_eq!(deletion.kind(), VersionKind::Deleted);
        assert!(matches!(deletion.retrieve(), Err(StoreError::Usage(_))));

        let recreated = store.create(b"<again/>", Some(7)).unwrap();
        assert!(!recreated.is_deleted());
        let kinds: Vec<VersionKind> = recreated
            .versions()
            .unwrap()
            .iter()
            .map(|v| v.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![VersionKind::Created, VersionKind::Deleted, VersionKind::Created]
        );
    }

    #[test]
    fn test_create_on_live_id_fails() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_versioning_store(&temp_dir);

        store.create(b"<a/>", Some(3)).unwrap();
        assert!(matches!(
            store.create(b"<b/>", Some(3)),
            Err(StoreError::AlreadyExists { id: 3, .. })
        ));
    }

    #[test]
    fn test_never_created_id_is_absent() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_versioning_store(&temp_dir);
        assert!(store.retrieve(99).unwrap().is_none());
    }

    #[test]
    fn test_last_revisions() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_versioning_store(&temp_dir);

        let mut record = store.create(b"<a/>", Some(1)).unwrap();
        assert_eq!(record.last_present_revision().unwrap(), Some(1));
        record.update(b"<b/>").unwrap();
        record.delete().unwrap();

        assert_eq!(record.last_revision(true).unwrap(), Some(3));
        assert_eq!(record.last_present_revision().unwrap(), Some(2));
    }

    #[test]
    fn test_checkout_and_restore() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_versioning_store(&temp_dir);

        let mut record = store.create(b"<v>1</v>", Some(5)).unwrap();
        record.update(b"<v>2</v>").unwrap();

        record.checkout(Some(1)).unwrap();
        assert_eq!(record.revision(), Some(1));
        assert!(!record.is_up_to_date().unwrap());
        assert!(text(record.read().unwrap()).contains("<v>1</v>"));

        record.checkout(None).unwrap();
        assert!(record.is_up_to_date().unwrap());
        assert!(text(record.read().unwrap()).contains("<v>2</v>"));

        let first = record.version_as_of(1).unwrap().unwrap();
        record.restore(&first).unwrap();
        assert_eq!(record.revision(), Some(3));
        assert_eq!(record.versions().unwrap().len(), 3);
        assert!(text(record.read().unwrap()).contains("<v>1</v>"));
    }

    #[test]
    fn test_version_as_of_between_changes() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_versioning_store(&temp_dir);

        store.create(b"<other/>", Some(2)).unwrap();
        let mut record = store.create(b"<v>1</v>", Some(8)).unwrap();
        store.create(b"<other/>", Some(9)).unwrap();
        record.update(b"<v>2</v>").unwrap();

        assert!(record.version_at(3).unwrap().is_none());
        let as_of = record.version_as_of(3).unwrap().unwrap();
        assert_eq!(as_of.revision(), 2);
        assert!(record.version_as_of(1).unwrap().is_none());
    }
}
