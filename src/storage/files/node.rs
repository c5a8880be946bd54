//! Nodes of a file collection
//!
//! [`Directory`] and [`File`] are lightweight handles: a borrowed reference to
//! the owning [`FileCollection`] plus the node's path from the collection
//! root. The filesystem decides whether a node exists; the sidecar adds
//! checksums and labels. Behaviour shared by both kinds lives in
//! [`NodeHandle`] and is exposed through the [`StoredNode`] trait.

use super::sidecar::{NodeKind, SidecarEntry, SIDECAR_FILE_NAME};
use super::{FileCollection, RepairSummary};
use crate::error::{Result, StoreError};
use crate::storage::ingest::{md5_hex, ContentIngestStream};
use crate::storage::metadata_store::modified_time;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

fn validate_name(name: &str, at_root: bool) -> Result<()> {
    let has_separator = name.contains(|c: char| matches!(c, '/' | '\\' | '\0'));
    if name.is_empty() || name == "." || name == ".." || has_separator {
        return Err(StoreError::usage(format!("'{}' is not a valid node name", name)));
    }
    if at_root && name == SIDECAR_FILE_NAME {
        return Err(StoreError::usage(format!(
            "'{}' is reserved for the collection sidecar",
            name
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct NodeHandle<'c> {
    collection: &'c FileCollection,
    path: Vec<String>,
}

impl<'c> NodeHandle<'c> {
    fn new(collection: &'c FileCollection, path: Vec<String>) -> Self {
        Self { collection, path }
    }

    pub fn collection(&self) -> &'c FileCollection {
        self.collection
    }

    /// Names from the collection root down to this node.
    pub fn segments(&self) -> &[String] {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Last path segment; the collection root has the empty name.
    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or("")
    }

    /// Absolute path inside the collection, e.g. `/a/b.txt`.
    pub fn path(&self) -> String {
        format!("/{}", self.path.join("/"))
    }

    pub fn fs_path(&self) -> PathBuf {
        self.collection.fs_path(&self.path)
    }

    pub fn parent(&self) -> Option<Directory<'c>> {
        let (_, parent) = self.path.split_last()?;
        Some(Directory::new(self.collection, parent.to_vec()))
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        modified_time(&self.fs_path())
    }

    fn ensure_exists(&self) -> Result<NodeKind> {
        self.collection.ensure_registered(&self.path)?.ok_or_else(|| {
            StoreError::usage(format!(
                "Node {} no longer exists in collection {}",
                self.path(),
                self.collection.id()
            ))
        })
    }

    fn child(&self, name: &str) -> Vec<String> {
        let mut path = self.path.clone();
        path.push(name.to_string());
        path
    }

    pub fn label(&self, lang: &str) -> Option<String> {
        self.labels().remove(lang)
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        self.collection
            .sidecar()
            .read()
            .entry(&self.path)
            .map(|entry| entry.labels.clone())
            .unwrap_or_default()
    }

    fn edit_labels<T>(&self, edit: impl FnOnce(&mut BTreeMap<String, String>) -> T) -> Result<T> {
        self.ensure_exists()?;
        let mut sidecar = self.collection.sidecar().write();
        let entry = sidecar.entry_mut(&self.path).ok_or_else(|| {
            StoreError::usage(format!("Node {} is not registered", self.path()))
        })?;
        let result = edit(&mut entry.labels);
        self.collection.persist(&sidecar)?;
        Ok(result)
    }

    pub fn set_label(&self, lang: &str, text: &str) -> Result<()> {
        self.edit_labels(|labels| {
            labels.insert(lang.to_string(), text.to_string());
        })
    }

    /// Returns whether a label was present.
    pub fn remove_label(&self, lang: &str) -> Result<bool> {
        self.edit_labels(|labels| labels.remove(lang).is_some())
    }

    pub fn clear_labels(&self) -> Result<()> {
        self.edit_labels(|labels| labels.clear())
    }

    pub fn rename(&mut self, new_name: &str) -> Result<()> {
        if self.is_root() {
            return Err(StoreError::usage("The root of a file collection cannot be renamed"));
        }
        validate_name(new_name, self.path.len() == 1)?;
        if new_name == self.name() {
            return Ok(());
        }
        self.ensure_exists()?;

        let mut target = self.path.clone();
        if let Some(last) = target.last_mut() {
            *last = new_name.to_string();
        }

        let mut sidecar = self.collection.sidecar().write();
        if self.collection.disk_kind(&target).is_some() || sidecar.entry(&target).is_some() {
            return Err(StoreError::usage(format!(
                "Cannot rename {}: /{} already exists",
                self.path(),
                target.join("/")
            )));
        }

        let from = self.fs_path();
        let to = self.collection.fs_path(&target);
        fs::rename(&from, &to).map_err(|e| StoreError::io_error("Failed to rename node", &from, e))?;

        if let Some(entry) = sidecar.remove(&self.path) {
            sidecar.insert(&target, entry)?;
        }
        self.collection.persist(&sidecar)?;
        info!(
            id = self.collection.id(),
            from = %self.path(),
            to = %format!("/{}", target.join("/")),
            "Renamed node"
        );
        self.path = target;
        Ok(())
    }

    /// Removes this node; a root node takes the whole collection with it.
    fn delete(self) -> Result<()> {
        if self.is_root() {
            return self.collection.delete_tree();
        }

        let mut sidecar = self.collection.sidecar().write();
        let fs_path = self.fs_path();
        let removal = match self.collection.disk_kind(&self.path) {
            Some(NodeKind::Directory) => fs::remove_dir_all(&fs_path),
            Some(NodeKind::File) => fs::remove_file(&fs_path),
            None => Ok(()),
        };
        removal.map_err(|e| StoreError::io_error("Failed to delete node", &fs_path, e))?;
        sidecar.remove(&self.path);

        // Empty ancestors go too, the collection root stays
        let mut ancestor = self.path[..self.path.len() - 1].to_vec();
        while !ancestor.is_empty() {
            let dir = self.collection.fs_path(&ancestor);
            let is_empty = fs::read_dir(&dir)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !is_empty {
                break;
            }
            if let Err(e) = fs::remove_dir(&dir) {
                warn!(dir = %dir.display(), error = %e, "Failed to prune empty directory");
                break;
            }
            sidecar.remove(&ancestor);
            debug!(dir = %dir.display(), "Pruned empty directory");
            ancestor.pop();
        }

        self.collection.persist(&sidecar)?;
        info!(id = self.collection.id(), path = %self.path(), "Deleted node");
        Ok(())
    }
}

/// Behaviour common to directories and files.
pub trait StoredNode<'c> {
    fn handle(&self) -> &NodeHandle<'c>;

    fn handle_mut(&mut self) -> &mut NodeHandle<'c>;

    fn name(&self) -> String {
        self.handle().name().to_string()
    }

    fn path(&self) -> String {
        self.handle().path()
    }

    fn fs_path(&self) -> PathBuf {
        self.handle().fs_path()
    }

    fn collection(&self) -> &'c FileCollection {
        self.handle().collection()
    }

    fn parent(&self) -> Option<Directory<'c>> {
        self.handle().parent()
    }

    fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.handle().last_modified()
    }

    fn label(&self, lang: &str) -> Option<String> {
        self.handle().label(lang)
    }

    fn labels(&self) -> BTreeMap<String, String> {
        self.handle().labels()
    }

    fn set_label(&self, lang: &str, text: &str) -> Result<()> {
        self.handle().set_label(lang, text)
    }

    fn remove_label(&self, lang: &str) -> Result<bool> {
        self.handle().remove_label(lang)
    }

    fn clear_labels(&self) -> Result<()> {
        self.handle().clear_labels()
    }

    fn rename(&mut self, new_name: &str) -> Result<()> {
        self.handle_mut().rename(new_name)
    }
}

#[derive(Debug, Clone)]
pub enum Node<'c> {
    Directory(Directory<'c>),
    File(File<'c>),
}

impl<'c> Node<'c> {
    fn new(collection: &'c FileCollection, path: Vec<String>, kind: NodeKind) -> Self {
        match kind {
            NodeKind::Directory => Node::Directory(Directory::new(collection, path)),
            NodeKind::File => Node::File(File::new(collection, path)),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Directory(_) => NodeKind::Directory,
            Node::File(_) => NodeKind::File,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Node::Directory(_))
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Node::File(_))
    }

    pub fn as_directory(&self) -> Option<&Directory<'c>> {
        match self {
            Node::Directory(dir) => Some(dir),
            Node::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&File<'c>> {
        match self {
            Node::File(file) => Some(file),
            Node::Directory(_) => None,
        }
    }

    pub fn into_directory(self) -> Option<Directory<'c>> {
        match self {
            Node::Directory(dir) => Some(dir),
            Node::File(_) => None,
        }
    }

    pub fn into_file(self) -> Option<File<'c>> {
        match self {
            Node::File(file) => Some(file),
            Node::Directory(_) => None,
        }
    }

    pub fn size(&self) -> Result<u64> {
        match self {
            Node::Directory(dir) => dir.size(),
            Node::File(file) => file.size(),
        }
    }

    pub fn repair_metadata(&self) -> Result<RepairSummary> {
        match self {
            Node::Directory(dir) => dir.repair_metadata(),
            Node::File(file) => file.repair_metadata(),
        }
    }

    pub fn delete(self) -> Result<()> {
        match self {
            Node::Directory(dir) => dir.delete(),
            Node::File(file) => file.delete(),
        }
    }
}

impl<'c> StoredNode<'c> for Node<'c> {
    fn handle(&self) -> &NodeHandle<'c> {
        match self {
            Node::Directory(dir) => &dir.handle,
            Node::File(file) => &file.handle,
        }
    }

    fn handle_mut(&mut self) -> &mut NodeHandle<'c> {
        match self {
            Node::Directory(dir) => &mut dir.handle,
            Node::File(file) => &mut file.handle,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Directory<'c> {
    handle: NodeHandle<'c>,
}

impl<'c> StoredNode<'c> for Directory<'c> {
    fn handle(&self) -> &NodeHandle<'c> {
        &self.handle
    }

    fn handle_mut(&mut self) -> &mut NodeHandle<'c> {
        &mut self.handle
    }
}

impl<'c> Directory<'c> {
    pub(crate) fn new(collection: &'c FileCollection, path: Vec<String>) -> Self {
        Self {
            handle: NodeHandle::new(collection, path),
        }
    }

    pub fn is_root(&self) -> bool {
        self.handle.is_root()
    }

    /// On-disk children in name order; nodes missing from the sidecar are
    /// registered on the way.
    pub fn children(&self) -> Result<Vec<Node<'c>>> {
        let collection = self.handle.collection;
        let mut children = Vec::new();
        for name in collection.disk_children(&self.handle.path)? {
            let path = self.handle.child(&name);
            if let Some(kind) = collection.ensure_registered(&path)? {
                children.push(Node::new(collection, path, kind));
            }
        }
        Ok(children)
    }

    pub fn has_children(&self) -> Result<bool> {
        Ok(!self
            .handle
            .collection
            .disk_children(&self.handle.path)?
            .is_empty())
    }

    pub fn child(&self, name: &str) -> Result<Option<Node<'c>>> {
        if validate_name(name, self.is_root()).is_err() {
            return Ok(None);
        }
        let path = self.handle.child(name);
        let kind = self.handle.collection.ensure_registered(&path)?;
        Ok(kind.map(|kind| Node::new(self.handle.collection, path, kind)))
    }

    /// Resolves a `/`-separated path: `.` stays, `..` climbs, a leading `/`
    /// starts at the collection root. Any unresolved segment yields `None`.
    pub fn node_by_path(&self, path: &str) -> Result<Option<Node<'c>>> {
        let collection = self.handle.collection;
        let mut current = if path.starts_with('/') {
            Vec::new()
        } else {
            self.handle.path.clone()
        };

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for (index, segment) in segments.iter().enumerate() {
            match *segment {
                "." => {}
                ".." => {
                    if current.pop().is_none() {
                        return Ok(None);
                    }
                }
                name => {
                    if validate_name(name, current.is_empty()).is_err() {
                        return Ok(None);
                    }
                    current.push(name.to_string());
                    let is_last = index + 1 == segments.len();
                    match collection.ensure_registered(&current)? {
                        None => return Ok(None),
                        Some(NodeKind::File) if !is_last => return Ok(None),
                        Some(_) => {}
                    }
                }
            }
        }

        let kind = collection.ensure_registered(&current)?;
        Ok(kind.map(|kind| Node::new(collection, current, kind)))
    }

    pub fn create_dir(&self, name: &str) -> Result<Directory<'c>> {
        validate_name(name, self.is_root())?;
        self.require_directory()?;
        let collection = self.handle.collection;
        let path = self.handle.child(name);
        let fs_path = collection.fs_path(&path);

        let mut sidecar = collection.sidecar().write();
        let on_disk = collection.disk_kind(&path);
        let registered = sidecar.entry(&path).map(|entry| entry.kind);
        if on_disk == Some(NodeKind::File) || registered == Some(NodeKind::File) {
            return Err(StoreError::usage(format!(
                "/{} already exists as a file",
                path.join("/")
            )));
        }
        if registered.is_none() {
            sidecar.insert(&path, SidecarEntry::directory())?;
        }
        if on_disk.is_none() {
            if let Err(e) = fs::create_dir(&fs_path) {
                sidecar.remove(&path);
                return Err(StoreError::io_error("Failed to create directory", &fs_path, e));
            }
        }
        if registered.is_none() {
            collection.persist(&sidecar)?;
        }
        info!(id = collection.id(), path = %format!("/{}", path.join("/")), "Created directory");
        Ok(Directory::new(collection, path))
    }

    pub fn create_file(&self, name: &str) -> Result<File<'c>> {
        validate_name(name, self.is_root())?;
        self.require_directory()?;
        let collection = self.handle.collection;
        let path = self.handle.child(name);
        let fs_path = collection.fs_path(&path);

        let mut sidecar = collection.sidecar().write();
        let on_disk = collection.disk_kind(&path);
        let registered = sidecar.entry(&path).map(|entry| entry.kind);
        if on_disk == Some(NodeKind::Directory) || registered == Some(NodeKind::Directory) {
            return Err(StoreError::usage(format!(
                "/{} already exists as a directory",
                path.join("/")
            )));
        }

        if registered.is_none() {
            let md5 = match on_disk {
                Some(_) => collection.disk_md5(&path)?,
                None => md5_hex(b""),
            };
            sidecar.insert(&path, SidecarEntry::file(md5))?;
        }
        if on_disk.is_none() {
            if let Err(e) = fs::File::create(&fs_path) {
                sidecar.remove(&path);
                return Err(StoreError::io_error("Failed to create file", &fs_path, e));
            }
        }
        if registered.is_none() {
            collection.persist(&sidecar)?;
        }
        info!(id = collection.id(), path = %format!("/{}", path.join("/")), "Created file");
        Ok(File::new(collection, path))
    }

    fn require_directory(&self) -> Result<()> {
        match self.handle.ensure_exists()? {
            NodeKind::Directory => Ok(()),
            NodeKind::File => Err(StoreError::usage(format!(
                "{} is not a directory",
                self.handle.path()
            ))),
        }
    }

    /// Total size of all files below this directory.
    pub fn size(&self) -> Result<u64> {
        let root = self.handle.fs_path();
        let sidecar = self.handle.collection.path().join(SIDECAR_FILE_NAME);
        let mut total = 0;
        for entry in WalkDir::new(&root).follow_links(false) {
            let entry = entry.map_err(|e| {
                StoreError::persistence(format!("Failed to walk directory: {}", e), Some(root.clone()))
            })?;
            if entry.file_type().is_file() && entry.path() != sidecar {
                let metadata = entry.metadata().map_err(|e| {
                    StoreError::persistence(
                        format!("Failed to stat file: {}", e),
                        Some(entry.path().to_path_buf()),
                    )
                })?;
                total += metadata.len();
            }
        }
        Ok(total)
    }

    /// Rebuilds the sidecar entries below this directory from the filesystem:
    /// checksums are recomputed, node types normalised, stale entries dropped
    /// and unregistered nodes added. Labels are kept.
    pub fn repair_metadata(&self) -> Result<RepairSummary> {
        let collection = self.handle.collection;
        let path = &self.handle.path;
        let mut summary = RepairSummary::default();

        let mut sidecar = collection.sidecar().write();
        let existing = sidecar.entry(path).cloned();
        let rebuilt = rebuild(collection, path, existing.as_ref(), &mut summary)?;

        match rebuilt {
            Some(entry) if path.is_empty() => *sidecar.root_mut() = entry,
            Some(entry) => sidecar.insert(path, entry)?,
            None => {
                sidecar.remove(path);
            }
        }
        if !summary.is_clean() || sidecar.entry(path) != existing.as_ref() {
            collection.persist(&sidecar)?;
        }
        debug!(id = collection.id(), path = %self.handle.path(), ?summary, "Repaired metadata");
        Ok(summary)
    }

    pub fn delete(self) -> Result<()> {
        self.handle.delete()
    }
}

/// Fresh sidecar entry for `path` built from the filesystem, `None` if the
/// node is gone.
fn rebuild(
    collection: &FileCollection,
    path: &[String],
    existing: Option<&SidecarEntry>,
    summary: &mut RepairSummary,
) -> Result<Option<SidecarEntry>> {
    let node_path = format!("/{}", path.join("/"));
    let Some(kind) = collection.disk_kind(path) else {
        if existing.is_some() && !path.is_empty() {
            warn!(id = collection.id(), path = %node_path, "Removing stale sidecar entry");
            summary.entries_removed += 1;
        }
        return Ok(None);
    };

    match existing {
        None if !path.is_empty() => {
            warn!(id = collection.id(), path = %node_path, kind = %kind, "Adding missing sidecar entry");
            summary.entries_added += 1;
        }
        Some(entry) if entry.kind != kind => {
            warn!(
                id = collection.id(),
                path = %node_path,
                recorded = %entry.kind,
                actual = %kind,
                "Normalising node type"
            );
            summary.types_normalized += 1;
        }
        _ => {}
    }

    let labels = existing.map(|entry| entry.labels.clone()).unwrap_or_default();
    let entry = match kind {
        NodeKind::File => {
            let md5 = collection.disk_md5(path)?;
            summary.files_checked += 1;
            let recorded = existing.and_then(|entry| entry.md5.as_deref());
            if existing.is_some_and(|entry| entry.kind == NodeKind::File) && recorded != Some(md5.as_str()) {
                warn!(
                    id = collection.id(),
                    path = %node_path,
                    recorded = recorded.unwrap_or("-"),
                    actual = %md5,
                    "Correcting checksum"
                );
                summary.checksums_corrected += 1;
            }
            let mut entry = SidecarEntry::file(md5);
            entry.labels = labels;
            entry
        }
        NodeKind::Directory => {
            let mut entry = SidecarEntry::directory();
            entry.labels = labels;

            let mut names = collection.disk_children(path)?;
            if let Some(existing) = existing {
                for name in existing.children.keys() {
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                }
            }

            for name in names {
                let mut child_path = path.to_vec();
                child_path.push(name.clone());
                let child_existing = existing.and_then(|entry| entry.children.get(&name));
                if let Some(child) = rebuild(collection, &child_path, child_existing, summary)? {
                    entry.children.insert(name, child);
                }
            }
            entry
        }
    };
    Ok(Some(entry))
}

#[derive(Debug, Clone)]
pub struct File<'c> {
    handle: NodeHandle<'c>,
}

impl<'c> StoredNode<'c> for File<'c> {
    fn handle(&self) -> &NodeHandle<'c> {
        &self.handle
    }

    fn handle_mut(&mut self) -> &mut NodeHandle<'c> {
        &mut self.handle
    }
}

impl<'c> File<'c> {
    pub(crate) fn new(collection: &'c FileCollection, path: Vec<String>) -> Self {
        Self {
            handle: NodeHandle::new(collection, path),
        }
    }

    pub fn size(&self) -> Result<u64> {
        let path = self.handle.fs_path();
        fs::metadata(&path)
            .map(|m| m.len())
            .map_err(|e| StoreError::io_error("Failed to stat file", path, e))
    }

    /// Checksum recorded in the sidecar.
    pub fn md5(&self) -> Result<Option<String>> {
        self.handle.ensure_exists()?;
        Ok(self
            .handle
            .collection
            .sidecar()
            .read()
            .entry(&self.handle.path)
            .and_then(|entry| entry.md5.clone()))
    }

    pub fn open_content(&self) -> Result<fs::File> {
        let path = self.handle.fs_path();
        fs::File::open(&path).map_err(|e| StoreError::io_error("Failed to open file", path, e))
    }

    pub fn content(&self) -> Result<Vec<u8>> {
        let path = self.handle.fs_path();
        fs::read(&path).map_err(|e| StoreError::io_error("Failed to read file", path, e))
    }

    /// MIME type sniffed from the first bytes, falling back to the extension.
    pub fn content_type(&self) -> Result<String> {
        let path = self.handle.fs_path();
        let stream = ContentIngestStream::new(self.open_content()?)
            .map_err(|e| StoreError::io_error("Failed to read file header", path, e))?;
        Ok(stream.sniff_content_type(self.handle.name()))
    }

    /// Replaces the content with everything `source` yields and records its
    /// MD5. Swapping the bytes in and recording the checksum happen under the
    /// collection write lock, so the sidecar always matches the file on disk.
    pub fn set_content<R: Read>(&self, source: R) -> Result<String> {
        if self.handle.ensure_exists()? != NodeKind::File {
            return Err(StoreError::usage(format!(
                "{} is not a file",
                self.handle.path()
            )));
        }
        let collection = self.handle.collection;
        let fs_path = self.handle.fs_path();
        let parent = fs_path
            .parent()
            .ok_or_else(|| StoreError::persistence("File has no parent directory", Some(fs_path.clone())))?;

        let mut stream = ContentIngestStream::new(source)
            .map_err(|e| StoreError::io_error("Failed to read content", &fs_path, e))?;
        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| StoreError::io_error("Failed to create temporary file", parent, e))?;
        io::copy(&mut stream, &mut temp)
            .and_then(|_| temp.flush())
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| StoreError::io_error("Failed to write content", &fs_path, e))?;
        let md5 = stream.digest_hex();

        {
            let mut sidecar = collection.sidecar().write();
            temp.persist(&fs_path)
                .map_err(|e| StoreError::io_error("Failed to replace content", &fs_path, e.error))?;
            match sidecar.entry_mut(&self.handle.path) {
                Some(entry) => entry.md5 = Some(md5.clone()),
                None => sidecar.insert(&self.handle.path, SidecarEntry::file(md5.clone()))?,
            }
            collection.persist(&sidecar)?;
        }

        info!(
            id = collection.id(),
            path = %self.handle.path(),
            size = stream.length(),
            md5 = %md5,
            "Stored file content"
        );
        Ok(md5)
    }

    /// Recomputes the checksum from disk and corrects the sidecar if needed.
    pub fn repair_metadata(&self) -> Result<RepairSummary> {
        let collection = self.handle.collection;
        let mut summary = RepairSummary::default();
        let mut sidecar = collection.sidecar().write();
        let existing = sidecar.entry(&self.handle.path).cloned();

        match rebuild(collection, &self.handle.path, existing.as_ref(), &mut summary)? {
            Some(entry) => sidecar.insert(&self.handle.path, entry)?,
            None => {
                sidecar.remove(&self.handle.path);
            }
        }
        if !summary.is_clean() {
            collection.persist(&sidecar)?;
        }
        Ok(summary)
    }

    pub fn delete(self) -> Result<()> {
        self.handle.delete()
    }
}
