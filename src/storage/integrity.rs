//! Administrative maintenance operations
//!
//! - describe every registered store with its configuration
//! - checksum manifests of file stores
//! - structural verification of versioning metadata stores: every local
//!   mirror must hold the content of a live newest history entry
//! - checksum repair of one collection or a whole file store

use crate::error::{Result, StoreError};
use crate::storage::files::{ChecksumEntry, FileStore, RepairSummary};
use crate::storage::registry::{RegisteredStore, StoreRegistry};
use crate::storage::store::SortOrder;
use crate::storage::versioning::{VersionKind, VersioningMetadataStore};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

/// Summary of one registered store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreDescription {
    pub id: String,
    pub kind: String,
    pub base_dir: PathBuf,
    pub slot_layout: String,
    pub prefix: String,
    pub suffix: String,
    /// Number of occupied slots
    pub stored: usize,
    pub force_xml: Option<bool>,
    pub force_doc_type: Option<String>,
}

pub fn describe_store(store: &RegisteredStore) -> Result<StoreDescription> {
    let slots = store.store();
    let options = match store {
        RegisteredStore::Metadata(metadata) => Some(metadata.options().clone()),
        RegisteredStore::VersioningMetadata(versioning) => Some(versioning.metadata().options().clone()),
        RegisteredStore::Files(_) => None,
    };
    Ok(StoreDescription {
        id: slots.id().to_string(),
        kind: store.kind().to_string(),
        base_dir: slots.base_dir().to_path_buf(),
        slot_layout: slots.layout().to_string(),
        prefix: slots.prefix().to_string(),
        suffix: slots.suffix().to_string(),
        stored: slots.count()?,
        force_xml: options.as_ref().map(|o| o.force_xml),
        force_doc_type: options.and_then(|o| o.force_doc_type),
    })
}

/// Descriptions of all stores in `registry`, sorted by id.
pub fn describe_stores(registry: &StoreRegistry) -> Result<Vec<StoreDescription>> {
    registry.list().iter().map(describe_store).collect()
}

pub fn checksum_manifest(store: &FileStore) -> Result<Vec<ChecksumEntry>> {
    let manifest = store.checksum_manifest()?;
    info!(store = %store.id(), files = manifest.len(), "Generated checksum manifest");
    Ok(manifest)
}

/// Writes `entries` in `md5sum` format: `<md5>  <collection>/<path>`.
pub fn write_manifest<W: Write>(entries: &[ChecksumEntry], mut out: W) -> Result<()> {
    for entry in entries {
        writeln!(out, "{}  {}{}", entry.md5, entry.collection, entry.path)?;
    }
    out.flush()?;
    Ok(())
}

/// Information about a record that failed verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidRecordInfo {
    pub id: u64,
    /// Path inside the history repository
    pub path: String,
    pub reason: String,
}

/// Verification report of a versioning metadata store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub store: String,
    /// Mirrored records checked
    pub total_records: usize,
    pub valid_records: usize,
    pub invalid_records: Vec<InvalidRecordInfo>,
    pub warnings: Vec<String>,
    pub timestamp: i64,
}

impl ValidationReport {
    pub fn new(store: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            total_records: 0,
            valid_records: 0,
            invalid_records: Vec::new(),
            warnings: Vec::new(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.invalid_records.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.invalid_records.len()
    }
}

/// Checks that every local mirror is backed by history: its slot has a log
/// entry, the newest entry is not a deletion and the mirror holds the bytes
/// of the newest version.
/// Document content is not re-validated.
pub fn verify_versioning_store(store: &VersioningMetadataStore) -> Result<ValidationReport> {
    info!(store = %store.id(), "Starting versioning store verification");
    let mut report = ValidationReport::new(store.id());

    for id in store.list_ids(SortOrder::Ascending) {
        let id = id?;
        report.total_records += 1;
        let path = store.repository_path(id)?;
        let invalid = |reason: &str| InvalidRecordInfo {
            id,
            path: path.clone(),
            reason: reason.to_string(),
        };

        let mut record = match store.retrieve(id) {
            Ok(Some(record)) => record,
            Ok(None) => {
                report.warnings.push(format!("Metadata {} vanished during verification", id));
                continue;
            }
            Err(e) => {
                report.warnings.push(format!("Failed to inspect metadata {}: {}", id, e));
                continue;
            }
        };

        match record.versions() {
            Ok(versions) => match versions.last() {
                None => {
                    report.invalid_records.push(invalid("Local mirror has no history"));
                }
                Some(newest) if newest.kind() == VersionKind::Deleted => {
                    report
                        .invalid_records
                        .push(invalid("Local mirror exists but history records a deletion"));
                }
                Some(newest) => {
                    if record.read()? == newest.retrieve()? {
                        report.valid_records += 1;
                    } else {
                        report
                            .invalid_records
                            .push(invalid("Local mirror differs from the newest version in history"));
                    }
                }
            },
            Err(e) => {
                report.warnings.push(format!("Failed to read history of {}: {}", id, e));
            }
        }
    }

    if report.is_valid() {
        info!(
            store = %report.store,
            total = report.total_records,
            "Versioning store verification passed"
        );
    } else {
        warn!(
            store = %report.store,
            errors = report.error_count(),
            "Versioning store verification found issues"
        );
    }
    Ok(report)
}

/// Recomputes the checksums of one collection.
pub fn repair_collection(store: &FileStore, id: u64) -> Result<RepairSummary> {
    let collection = store.retrieve(id)?.ok_or_else(|| {
        StoreError::usage(format!(
            "File collection {} does not exist in store {}",
            id,
            store.id()
        ))
    })?;
    collection.repair_metadata()
}

/// Recomputes the checksums of every collection in `store`.
pub fn repair_store(store: &FileStore) -> Result<RepairSummary> {
    store.repair_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::metadata_store::{MetadataOptions, MetadataStore};
    use crate::storage::store::Store;
    use crate::storage::versioning::LocalHistoryRepository;
    use std::fs;
    use std::io::Cursor;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn versioning_store(temp_dir: &TempDir) -> VersioningMetadataStore {
        let store = Store::new(
            "mods",
            temp_dir.path().join("mods"),
            "2-2".parse().unwrap(),
            "mods_",
            ".xml",
        )
        .unwrap();
        let repository =
            LocalHistoryRepository::open(temp_dir.path().join("history"), "admin").unwrap();
        VersioningMetadataStore::new(
            MetadataStore::new(store, MetadataOptions::default()),
            Arc::new(repository),
        )
    }

    #[test]
    fn test_verify_consistent_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = versioning_store(&temp_dir);
        store.create(b"<a/>", Some(1)).unwrap();
        store.create(b"<b/>", Some(2)).unwrap();

        let report = verify_versioning_store(&store).unwrap();
        assert_eq!(report.total_records, 2);
        assert_eq!(report.valid_records, 2);
        assert!(report.is_valid());
    }

    #[test]
    fn test_verify_detects_unversioned_mirror() {
        let temp_dir = TempDir::new().unwrap();
        let store = versioning_store(&temp_dir);
        store.create(b"<a/>", Some(1)).unwrap();

        let stray = store.metadata().store().slot_path(5).unwrap();
        fs::create_dir_all(stray.parent().unwrap()).unwrap();
        fs::write(&stray, b"<stray/>").unwrap();

        let report = verify_versioning_store(&store).unwrap();
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.invalid_records[0].id, 5);
        assert_eq!(report.invalid_records[0].path, "00/mods_0005.xml");
    }

    #[test]
    fn test_describe_and_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let registry = StoreRegistry::new();
        let files = Store::new("derivate", temp_dir.path().join("files"), "2-2".parse().unwrap(), "", "")
            .unwrap();
        registry.register(FileStore::new(files)).unwrap();
        registry.register(versioning_store(&temp_dir)).unwrap();

        let file_store = registry.files("derivate").unwrap();
        let collection = file_store.create(Some(3)).unwrap();
        collection
            .create_file("page.txt")
            .unwrap()
            .set_content(Cursor::new(b"hello world".to_vec()))
            .unwrap();

        let descriptions = describe_stores(&registry).unwrap();
        assert_eq!(descriptions.len(), 2);
        assert_eq!(descriptions[0].id, "derivate");
        assert_eq!(descriptions[0].stored, 1);
        assert_eq!(descriptions[0].force_xml, None);
        assert_eq!(descriptions[1].kind, "versioning_metadata");
        assert_eq!(descriptions[1].force_xml, Some(true));

        let manifest = checksum_manifest(&file_store).unwrap();
        let mut out = Vec::new();
        write_manifest(&manifest, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3  3/page.txt\n"
        );
    }

    #[test]
    fn test_repair_missing_collection_is_usage_error() {
        let temp_dir = TempDir::new().unwrap();
        let files = Store::new("f", temp_dir.path().join("f"), "2-2".parse().unwrap(), "", "").unwrap();
        let store = FileStore::new(files);
        assert!(matches!(repair_collection(&store, 9), Err(StoreError::Usage(_))));
        assert!(repair_store(&store).unwrap().is_clean());
    }
}
