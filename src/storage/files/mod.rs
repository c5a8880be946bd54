//! File collection store
//!
//! Every slot of a [`FileStore`] is a directory holding one [`FileCollection`]:
//! a plain filesystem tree mirroring the logical directory/file tree, plus the
//! `mcrdata.xml` sidecar at the collection root.
//!
//! ```text
//! <base_dir>/0001/04/00010485/
//! ├── mcrdata.xml
//! └── a/
//!     └── b.txt
//! ```
//!
//! The sidecar is shared by all nodes of a collection and guarded by a single
//! collection-wide read/write lock: readers run concurrently, every mutation
//! is exclusive and persists the whole document before the lock is released.

pub mod node;
pub mod sidecar;

use crate::error::{Result, StoreError};
use crate::storage::ingest::md5_hex_of_reader;
use crate::storage::store::{prune_empty_dirs_until, write_file_atomically, SortOrder, Store, StoredIds};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub use node::{Directory, File, Node, NodeHandle, StoredNode};
pub use sidecar::{NodeKind, Sidecar, SidecarEntry, SIDECAR_FILE_NAME};

/// Outcome of a checksum and sidecar repair run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairSummary {
    /// Collections visited
    pub collections: usize,
    /// Files whose checksum was recomputed
    pub files_checked: usize,
    /// Sidecar checksums that disagreed with the bytes on disk
    pub checksums_corrected: usize,
    /// On-disk nodes that had no sidecar entry
    pub entries_added: usize,
    /// Sidecar entries without an on-disk node
    pub entries_removed: usize,
    /// Entries whose recorded type contradicted the filesystem
    pub types_normalized: usize,
}

impl RepairSummary {
    /// True if nothing had to be corrected.
    pub fn is_clean(&self) -> bool {
        self.checksums_corrected == 0
            && self.entries_added == 0
            && self.entries_removed == 0
            && self.types_normalized == 0
    }

    pub fn merge(&mut self, other: &RepairSummary) {
        self.collections += other.collections;
        self.files_checked += other.files_checked;
        self.checksums_corrected += other.checksums_corrected;
        self.entries_added += other.entries_added;
        self.entries_removed += other.entries_removed;
        self.types_normalized += other.types_normalized;
    }
}

/// One line of a checksum manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumEntry {
    pub collection: u64,
    /// Path inside the collection, starting with `/`
    pub path: String,
    pub md5: String,
}

#[derive(Debug)]
pub struct FileStore {
    store: Store,
}

impl FileStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn id(&self) -> &str {
        self.store.id()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Creates an empty collection under `id`, or under a freshly allocated id.
    pub fn create(&self, id: Option<u64>) -> Result<FileCollection> {
        let id = match id {
            Some(id) => id,
            None => self.store.next_free_id()?,
        };
        let root = self.store.slot_path(id)?;
        if root.exists() {
            return Err(StoreError::already_exists(self.id(), id));
        }
        if let Some(parent) = root.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::io_error("Failed to create slot directory", parent, e))?;
        }
        fs::create_dir(&root).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                StoreError::already_exists(self.id(), id)
            } else {
                StoreError::io_error("Failed to create collection", &root, e)
            }
        })?;

        let collection = FileCollection::new(self, id, root, Sidecar::default());
        if let Err(e) = collection.persist(&Sidecar::default()) {
            let _ = fs::remove_dir_all(&collection.root);
            return Err(e);
        }
        info!(store = %self.id(), id, "Created file collection");
        Ok(collection)
    }

    pub fn retrieve(&self, id: u64) -> Result<Option<FileCollection>> {
        let root = self.store.slot_path(id)?;
        if !root.is_dir() {
            debug!(store = %self.id(), id, "File collection not found");
            return Ok(None);
        }

        let sidecar_path = root.join(SIDECAR_FILE_NAME);
        let sidecar = match fs::read(&sidecar_path) {
            Ok(content) => Sidecar::parse(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(store = %self.id(), id, "Sidecar missing, starting with an empty one");
                Sidecar::default()
            }
            Err(e) => return Err(StoreError::io_error("Failed to read sidecar", sidecar_path, e)),
        };
        Ok(Some(FileCollection::new(self, id, root, sidecar)))
    }

    pub fn delete(&self, id: u64) -> Result<()> {
        match self.retrieve(id)? {
            Some(collection) => collection.delete(),
            None => Err(StoreError::usage(format!(
                "File collection {} does not exist in store {}",
                id,
                self.id()
            ))),
        }
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

    /// Recomputes checksums and repairs the sidecar of every collection.
    pub fn repair_all(&self) -> Result<RepairSummary> {
        let mut summary = RepairSummary::default();
        for id in self.list_ids(SortOrder::Ascending) {
            if let Some(collection) = self.retrieve(id?)? {
                summary.merge(&collection.repair_metadata()?);
            }
        }
        info!(
            store = %self.id(),
            collections = summary.collections,
            corrected = summary.checksums_corrected,
            "Repaired file store"
        );
        Ok(summary)
    }

    /// (collection, path, md5) of every file in the store, as recorded in the sidecars.
    pub fn checksum_manifest(&self) -> Result<Vec<ChecksumEntry>> {
        let mut manifest = Vec::new();
        for id in self.list_ids(SortOrder::Ascending) {
            if let Some(collection) = self.retrieve(id?)? {
                manifest.extend(collection.checksums()?);
            }
        }
        Ok(manifest)
    }
}

#[derive(Debug)]
pub struct FileCollection {
    id: u64,
    store_id: String,
    store_base: PathBuf,
    root: PathBuf,
    sidecar: RwLock<Sidecar>,
}

impl FileCollection {
    fn new(store: &FileStore, id: u64, root: PathBuf, sidecar: Sidecar) -> Self {
        Self {
            id,
            store_id: store.id().to_string(),
            store_base: store.store.base_dir().to_path_buf(),
            root,
            sidecar: RwLock::new(sidecar),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    /// Directory holding the collection on disk.
    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn root(&self) -> Directory<'_> {
        Directory::new(self, Vec::new())
    }

    pub fn node_by_path(&self, path: &str) -> Result<Option<Node<'_>>> {
        self.root().node_by_path(path)
    }

    pub fn create_dir(&self, name: &str) -> Result<Directory<'_>> {
        self.root().create_dir(name)
    }

    pub fn create_file(&self, name: &str) -> Result<File<'_>> {
        self.root().create_file(name)
    }

    pub fn children(&self) -> Result<Vec<Node<'_>>> {
        self.root().children()
    }

    /// Every file of the collection, depth first.
    pub fn files(&self) -> Result<Vec<File<'_>>> {
        let mut files = Vec::new();
        let mut pending = vec![self.root()];
        while let Some(dir) = pending.pop() {
            for child in dir.children()? {
                match child {
                    Node::Directory(dir) => pending.push(dir),
                    Node::File(file) => files.push(file),
                }
            }
        }
        files.sort_by_key(|file| file.path());
        Ok(files)
    }

    pub fn checksums(&self) -> Result<Vec<ChecksumEntry>> {
        let mut entries = Vec::new();
        for file in self.files()? {
            if let Some(md5) = file.md5()? {
                entries.push(ChecksumEntry {
                    collection: self.id,
                    path: file.path(),
                    md5,
                });
            }
        }
        Ok(entries)
    }

    pub fn repair_metadata(&self) -> Result<RepairSummary> {
        let mut summary = self.root().repair_metadata()?;
        summary.collections = 1;
        Ok(summary)
    }

    /// Removes the whole collection from disk.
    pub fn delete(self) -> Result<()> {
        self.delete_tree()
    }

    pub(crate) fn delete_tree(&self) -> Result<()> {
        let mut sidecar = self.sidecar.write();
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io_error("Failed to delete collection", &self.root, e)),
        }
        sidecar.clear();
        if let Some(parent) = self.root.parent() {
            prune_empty_dirs_until(parent, &self.store_base);
        }
        info!(store = %self.store_id, id = self.id, "Deleted file collection");
        Ok(())
    }

    pub(crate) fn sidecar(&self) -> &RwLock<Sidecar> {
        &self.sidecar
    }

    /// Writes `sidecar` to disk; callers hold the write lock.
    pub(crate) fn persist(&self, sidecar: &Sidecar) -> Result<()> {
        let path = self.root.join(SIDECAR_FILE_NAME);
        write_file_atomically(&path, &sidecar.to_xml()?)?;
        debug!(store = %self.store_id, id = self.id, "Persisted sidecar");
        Ok(())
    }

    pub(crate) fn fs_path(&self, path: &[String]) -> PathBuf {
        let mut fs_path = self.root.clone();
        fs_path.extend(path);
        fs_path
    }

    /// Kind of the on-disk node at `path`; the sidecar itself is not a node.
    pub(crate) fn disk_kind(&self, path: &[String]) -> Option<NodeKind> {
        if path.len() == 1 && path[0] == SIDECAR_FILE_NAME {
            return None;
        }
        let metadata = fs::metadata(self.fs_path(path)).ok()?;
        if metadata.is_dir() {
            Some(NodeKind::Directory)
        } else if metadata.is_file() {
            Some(NodeKind::File)
        } else {
            None
        }
    }

    /// Sorted names of the on-disk children of the directory at `path`.
    pub(crate) fn disk_children(&self, path: &[String]) -> Result<Vec<String>> {
        let dir = self.fs_path(path);
        let read = match fs::read_dir(&dir) {
            Ok(read) => read,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io_error("Failed to list directory", &dir, e)),
        };
        let mut names = Vec::new();
        for entry in read {
            let entry = entry.map_err(|e| StoreError::io_error("Failed to read directory", &dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if path.is_empty() && name == SIDECAR_FILE_NAME {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    pub(crate) fn disk_md5(&self, path: &[String]) -> Result<String> {
        let fs_path = self.fs_path(path);
        let file = fs::File::open(&fs_path)
            .map_err(|e| StoreError::io_error("Failed to open file", &fs_path, e))?;
        md5_hex_of_reader(file).map_err(|e| StoreError::io_error("Failed to checksum file", &fs_path, e))
    }

    /// Returns the on-disk kind of `path`, synthesising missing sidecar
    /// entries for it and its ancestors on the way.
    pub(crate) fn ensure_registered(&self, path: &[String]) -> Result<Option<NodeKind>> {
        let Some(kind) = self.disk_kind(path) else {
            return Ok(None);
        };
        if path.is_empty() {
            return Ok(Some(kind));
        }
        {
            let sidecar = self.sidecar.read();
            if sidecar.entry(path).is_some_and(|entry| entry.kind == kind) {
                return Ok(Some(kind));
            }
        }

        let mut sidecar = self.sidecar.write();
        let mut changed = false;
        for depth in 1..=path.len() {
            let prefix = &path[..depth];
            let Some(kind) = self.disk_kind(prefix) else {
                return Ok(None);
            };
            if sidecar.entry(prefix).is_some_and(|entry| entry.kind == kind) {
                continue;
            }
            let entry = match kind {
                NodeKind::Directory => SidecarEntry::directory(),
                NodeKind::File => SidecarEntry::file(self.disk_md5(prefix)?),
            };
            warn!(
                store = %self.store_id,
                id = self.id,
                path = %format!("/{}", prefix.join("/")),
                kind = %kind,
                "Node had no sidecar entry, registering it"
            );
            sidecar.insert(prefix, entry)?;
            changed = true;
        }
        if changed {
            self.persist(&sidecar)?;
        }
        Ok(Some(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn create_file_store(temp_dir: &TempDir) -> FileStore {
        let store = Store::new(
            "files",
            temp_dir.path().join("files"),
            "4-2-2".parse().unwrap(),
            "",
            "",
        )
        .unwrap();
        FileStore::new(store)
    }

    #[test]
    fn test_create_writes_empty_sidecar() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_file_store(&temp_dir);

        let collection = store.create(Some(10485)).unwrap();
        let expected = temp_dir.path().join("files/0001/04/00010485");
        assert_eq!(collection.path(), expected);
        assert!(expected.join(SIDECAR_FILE_NAME).is_file());
        assert!(collection.children().unwrap().is_empty());

        assert!(matches!(
            store.create(Some(10485)),
            Err(StoreError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_retrieve_and_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_file_store(&temp_dir);
        assert!(store.retrieve(1).unwrap().is_none());

        let id = store.create(None).unwrap().id();
        assert_eq!(id, 1);
        assert!(store.retrieve(id).unwrap().is_some());

        store.delete(id).unwrap();
        assert!(store.retrieve(id).unwrap().is_none());
        assert!(!temp_dir.path().join("files/0000").exists());
        assert!(matches!(store.delete(id), Err(StoreError::Usage(_))));
    }

    #[test]
    fn test_ids_increase_across_deletions() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_file_store(&temp_dir);

        let mut last = 0;
        for round in 0..4 {
            let collection = store.create(None).unwrap();
            assert!(collection.id() > last);
            last = collection.id();
            if round % 2 == 1 {
                collection.delete().unwrap();
            }
        }
        let highest = store.store().highest_stored_id().unwrap();
        assert!(highest <= last);
    }

    #[test]
    fn test_orphan_nodes_are_registered_lazily() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_file_store(&temp_dir);
        let collection = store.create(Some(2)).unwrap();

        fs::create_dir(collection.path().join("scans")).unwrap();
        fs::write(collection.path().join("scans/page.txt"), b"hello world").unwrap();

        let node = collection.node_by_path("/scans/page.txt").unwrap().unwrap();
        let file = node.into_file().unwrap();
        assert_eq!(
            file.md5().unwrap().as_deref(),
            Some("5eb63bbbe01eeed093cb22bb8f5acdc3")
        );

        let reloaded = store.retrieve(2).unwrap().unwrap();
        let sidecar = reloaded.sidecar().read();
        assert!(sidecar
            .entry(&["scans".to_string(), "page.txt".to_string()])
            .is_some());
    }

    #[test]
    fn test_checksum_manifest_and_repair_all() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_file_store(&temp_dir);

        let first = store.create(Some(1)).unwrap();
        first
            .create_file("a.txt")
            .unwrap()
            .set_content(Cursor::new(b"hello world".to_vec()))
            .unwrap();
        let second = store.create(Some(2)).unwrap();
        second.create_dir("d").unwrap().create_file("e.txt").unwrap();

        let manifest = store.checksum_manifest().unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest[0].collection, 1);
        assert_eq!(manifest[0].path, "/a.txt");
        assert_eq!(manifest[0].md5, "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(manifest[1].path, "/d/e.txt");
        assert_eq!(manifest[1].md5, "d41d8cd98f00b204e9800998ecf8427e");

        fs::write(first.path().join("a.txt"), b"rotted").unwrap();
        let summary = store.repair_all().unwrap();
        assert_eq!(summary.collections, 2);
        assert_eq!(summary.checksums_corrected, 1);
        assert!(store.repair_all().unwrap().is_clean());
    }
}
