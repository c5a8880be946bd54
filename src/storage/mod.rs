//! Slot-sharded storage
//!
//! Numeric ids are mapped onto a fixed-width directory hierarchy (the slot
//! layout) below a store's base directory. On top of that slot store sit:
//!
//! - metadata stores: one document per slot
//! - versioning metadata stores: every write committed to a history
//!   repository before the local mirror is touched
//! - file stores: one directory tree per slot with an `mcrdata.xml` sidecar
//!
//! ## Layout
//!
//! ```text
//! base_dir/
//! └── 0001/                 # layout 4-2-2, id 10485
//!     └── 04/
//!         ├── mods_00010485.xml          # metadata store slot
//!         └── 00010485/                  # file store slot
//!             ├── mcrdata.xml
//!             └── ...
//! ```

pub mod files;
pub mod ingest;
pub mod integrity;
pub mod metadata_store;
pub mod registry;
pub mod slot;
pub mod store;
pub mod versioning;
pub mod xml;

#[cfg(test)]
mod integration_tests;

pub use files::{
    ChecksumEntry, Directory, File, FileCollection, FileStore, Node, NodeKind, RepairSummary,
    StoredNode, SIDECAR_FILE_NAME,
};
pub use ingest::{md5_hex, sniff_content_type, ContentIngestStream, DigestAlgorithm};
pub use integrity::{
    checksum_manifest, describe_store, describe_stores, repair_collection, repair_store,
    verify_versioning_store, write_manifest, InvalidRecordInfo, StoreDescription,
    ValidationReport,
};
pub use metadata_store::{MetadataOptions, MetadataStore, StoredMetadata};
pub use registry::{RegisteredStore, StoreRegistry};
pub use slot::{compute_slot_path, id_from_slot_name, SlotLayout};
pub use store::{SortOrder, Store, StoredIds};
pub use versioning::{
    ChangeKind, CommitInfo, LocalHistoryRepository, LogEntry, MetadataVersion, VersionKind,
    VersionRepository, VersionedMetadata, VersioningMetadataStore,
};
