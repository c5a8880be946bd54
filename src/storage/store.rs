//! Numbered slot store
//!
//! A [`Store`] owns a base directory and a [`SlotLayout`]. It allocates ids,
//! answers existence checks, lists stored ids in numeric order and deletes
//! slots, pruning directories that become empty. It does not know what a slot
//! contains: metadata stores keep one file per slot, file stores keep a
//! directory tree per slot.

use crate::error::{Result, StoreError};
use crate::storage::slot::SlotLayout;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Safety margin added to the first id allocated in a process session, so a
/// restarted process does not hand out ids another process just took.
const INITIAL_ALLOCATION_OFFSET: u64 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug)]
struct Allocation {
    last_id: u64,
    offset: u64,
}

#[derive(Debug)]
pub struct Store {
    id: String,
    base_dir: PathBuf,
    layout: SlotLayout,
    prefix: String,
    suffix: String,
    allocation: Mutex<Allocation>,
}

impl Store {
    /// Opens (and creates, if needed) the store rooted at `base_dir`.
    pub fn new(
        id: impl Into<String>,
        base_dir: impl Into<PathBuf>,
        layout: SlotLayout,
        prefix: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Result<Self> {
        let id = id.into();
        let base_dir = base_dir.into();
        if id.is_empty() {
            return Err(StoreError::configuration("Store id must not be empty"));
        }

        fs::create_dir_all(&base_dir).map_err(|e| {
            StoreError::io_error("Failed to create store base directory", &base_dir, e)
        })?;

        info!(
            store = %id,
            base_dir = %base_dir.display(),
            layout = %layout,
            "Opened store"
        );

        Ok(Self {
            id,
            base_dir,
            layout,
            prefix: prefix.into(),
            suffix: suffix.into(),
            allocation: Mutex::new(Allocation {
                last_id: 0,
                offset: INITIAL_ALLOCATION_OFFSET,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn layout(&self) -> &SlotLayout {
        &self.layout
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Slot path segments for `id`, relative to the base directory.
    pub fn slot_segments(&self, id: u64) -> Result<Vec<String>> {
        self.layout.slot_path(id, &self.prefix, &self.suffix)
    }

    pub fn slot_path(&self, id: u64) -> Result<PathBuf> {
        let mut path = self.base_dir.clone();
        path.extend(self.slot_segments(id)?);
        Ok(path)
    }

    pub fn exists(&self, id: u64) -> bool {
        self.slot_path(id).map(|p| p.exists()).unwrap_or(false)
    }

    /// Hands out an id that is not stored yet.
    ///
    /// Not safe across processes: callers must occupy the slot right away and
    /// treat [`StoreError::AlreadyExists`] as a reason to allocate again.
    pub fn next_free_id(&self) -> Result<u64> {
        let mut allocation = self.allocation.lock();
        let highest = self.highest_stored_id()?;
        let base = highest.max(allocation.last_id);
        let next = if base == 0 { 1 } else { base + allocation.offset };

        if next > self.layout.max_id() {
            return Err(StoreError::configuration(format!(
                "Store {} is full: next id {} exceeds layout {}",
                self.id, next, self.layout
            )));
        }

        allocation.offset = 1;
        allocation.last_id = next;
        debug!(store = %self.id, id = next, highest, "Allocated id");
        Ok(next)
    }

    /// Highest id currently stored, 0 when the store is empty.
    ///
    /// Zero-padded names sort lexicographically in numeric order, so only the
    /// greatest populated directory of each level has to be visited.
    pub fn highest_stored_id(&self) -> Result<u64> {
        Ok(self.highest_below(&self.base_dir, 0)?.unwrap_or(0))
    }

    fn highest_below(&self, dir: &Path, level: usize) -> Result<Option<u64>> {
        let entries = self.entries_at(dir, level, SortOrder::Descending)?;
        if level == self.layout.depth() {
            return Ok(entries.first().and_then(|path| self.leaf_id_of(path)));
        }
        for child in entries {
            if let Some(id) = self.highest_below(&child, level + 1)? {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Sorted slot entries of `dir`, which sits at directory `level`.
    fn entries_at(&self, dir: &Path, level: usize, order: SortOrder) -> Result<Vec<PathBuf>> {
        let read = match fs::read_dir(dir) {
            Ok(read) => read,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io_error("Failed to list slot directory", dir, e)),
        };

        let leaf_level = level == self.layout.depth();
        let mut names = Vec::new();
        for entry in read {
            let entry =
                entry.map_err(|e| StoreError::io_error("Failed to read slot entry", dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let accepted = if leaf_level {
                self.leaf_id(&name).is_some()
            } else {
                self.layout.is_level_name(level, &name) && entry.path().is_dir()
            };
            if accepted {
                names.push(name);
            }
        }

        names.sort();
        if order == SortOrder::Descending {
            names.reverse();
        }
        Ok(names.into_iter().map(|name| dir.join(name)).collect())
    }

    /// Id carried by a leaf name, if it matches `prefix + digits + suffix`.
    fn leaf_id(&self, name: &str) -> Option<u64> {
        let digits = name
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.suffix.as_str())?;
        if digits.len() != self.layout.id_width() {
            return None;
        }
        self.layout.id_from_slot_name(name, &self.prefix).ok()
    }

    fn leaf_id_of(&self, path: &Path) -> Option<u64> {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| self.leaf_id(name))
    }

    /// Removes the slot of `id` and every parent directory left empty by it.
    pub fn delete(&self, id: u64) -> Result<()> {
        let path = self.slot_path(id)?;
        let removal = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match removal {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(store = %self.id, id, "Slot already absent");
                return Ok(());
            }
            Err(e) => return Err(StoreError::io_error("Failed to delete slot", &path, e)),
        }

        if let Some(parent) = path.parent() {
            self.prune_empty_dirs(parent);
        }
        info!(store = %self.id, id, "Deleted slot");
        Ok(())
    }

    /// Walks upward from `dir`, removing empty directories until the base
    /// directory or a non-empty directory is reached.
    pub(crate) fn prune_empty_dirs(&self, dir: &Path) {
        prune_empty_dirs_until(dir, &self.base_dir);
    }

    /// Lazy cursor over the stored ids in the requested order.
    ///
    /// A directory that cannot be read ends up as an `Err` item; the walk
    /// carries on with its siblings afterwards.
    pub fn list_ids(&self, order: SortOrder) -> StoredIds<'_> {
        let (stack, pending) = match self.entries_at(&self.base_dir, 0, order) {
            Ok(entries) => (vec![entries.into_iter()], None),
            Err(e) => (Vec::new(), Some(e)),
        };
        StoredIds {
            store: self,
            order,
            stack,
            pending,
            last: None,
        }
    }

    pub fn count(&self) -> Result<usize> {
        self.list_ids(SortOrder::Ascending)
            .try_fold(0, |count, id| id.map(|_| count + 1))
    }
}

/// Replaces `path` with `bytes` via a temporary sibling, so readers never see
/// a half-written file.
pub(crate) fn write_file_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    let parent = path
        .parent()
        .ok_or_else(|| StoreError::persistence("Slot path has no parent", Some(path.to_path_buf())))?;
    fs::create_dir_all(parent)
        .map_err(|e| StoreError::io_error("Failed to create slot directory", parent, e))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| StoreError::io_error("Failed to create temporary file", parent, e))?;
    temp.write_all(bytes)
        .and_then(|_| temp.flush())
        .map_err(|e| StoreError::io_error("Failed to write temporary file", temp.path(), e))?;
    temp.persist(path)
        .map_err(|e| StoreError::io_error("Failed to replace file", path, e.error))?;
    Ok(())
}

/// Removes empty directories from `dir` upward, stopping at `stop` (exclusive).
pub(crate) fn prune_empty_dirs_until(dir: &Path, stop: &Path) {
    let mut current = Some(dir);
    while let Some(dir) = current {
        if dir == stop || !dir.starts_with(stop) {
            break;
        }
        let is_empty = fs::read_dir(dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !is_empty {
            break;
        }
        if let Err(e) = fs::remove_dir(dir) {
            warn!(dir = %dir.display(), error = %e, "Failed to prune empty directory");
            break;
        }
        debug!(dir = %dir.display(), "Pruned empty directory");
        current = dir.parent();
    }
}

/// Single-pass cursor returned by [`Store::list_ids`].
///
/// Each directory level is read and sorted when the walk first enters it.
/// [`StoredIds::remove`] deletes the slot of the id returned last; the walk
/// keeps going in order because pruning only ever removes directories that no
/// longer hold anything the cursor has yet to visit.
pub struct StoredIds<'a> {
    store: &'a Store,
    order: SortOrder,
    stack: Vec<std::vec::IntoIter<PathBuf>>,
    pending: Option<StoreError>,
    last: Option<u64>,
}

impl StoredIds<'_> {
    pub fn remove(&mut self) -> Result<()> {
        let id = self
            .last
            .take()
            .ok_or_else(|| StoreError::usage("remove() called without a preceding next()"))?;
        self.store.delete(id)
    }
}

impl Iterator for StoredIds<'_> {
    type Item = Result<u64>;

    fn next(&mut self) -> Option<Result<u64>> {
        if let Some(e) = self.pending.take() {
            return Some(Err(e));
        }
        loop {
            let level = self.stack.len().checked_sub(1)?;
            let entry = match self.stack[level].next() {
                Some(entry) => entry,
                None => {
                    self.stack.pop();
                    continue;
                }
            };

            if level == self.store.layout.depth() {
                if let Some(id) = self.store.leaf_id_of(&entry) {
                    self.last = Some(id);
                    return Some(Ok(id));
                }
                continue;
            }

            match self.store.entries_at(&entry, level + 1, self.order) {
                Ok(children) => self.stack.push(children.into_iter()),
                Err(e) => {
                    warn!(
                        store = %self.store.id,
                        dir = %entry.display(),
                        error = %e,
                        "Failed to read slot directory"
                    );
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_store(temp_dir: &TempDir, layout: &str) -> Store {
        Store::new(
            "test",
            temp_dir.path().join("store"),
            layout.parse().unwrap(),
            "test_",
            ".xml",
        )
        .unwrap()
    }

    fn occupy(store: &Store, id: u64) {
        let path = store.slot_path(id).unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"<x/>").unwrap();
    }

    #[test]
    fn test_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir, "4-2-2");
        assert_eq!(store.highest_stored_id().unwrap(), 0);
        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(store.next_free_id().unwrap(), 1);
    }

    #[test]
    fn test_allocation_offset_applies_once() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir, "4-2-2");
        occupy(&store, 5);

        assert_eq!(store.next_free_id().unwrap(), 16);
        assert_eq!(store.next_free_id().unwrap(), 17);
    }

    #[test]
    fn test_allocation_never_reuses_deleted_ids() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir, "2-2");

        let first = store.next_free_id().unwrap();
        occupy(&store, first);
        let second = store.next_free_id().unwrap();
        occupy(&store, second);
        store.delete(second).unwrap();

        let third = store.next_free_id().unwrap();
        assert!(third > second);
    }

    #[test]
    fn test_highest_stored_id_ignores_foreign_entries() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir, "4-2-2");
        occupy(&store, 10485);
        occupy(&store, 3);
        fs::create_dir_all(store.base_dir().join("9999").join("zz")).unwrap();
        fs::write(store.base_dir().join("README"), b"ignore").unwrap();

        assert_eq!(store.highest_stored_id().unwrap(), 10485);
    }

    #[test]
    fn test_list_ids_in_both_orders() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir, "2-2");
        for id in [42, 7, 1234, 100] {
            occupy(&store, id);
        }

        let ascending: Vec<u64> = store
            .list_ids(SortOrder::Ascending)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(ascending, vec![7, 42, 100, 1234]);

        let descending: Vec<u64> = store
            .list_ids(SortOrder::Descending)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(descending, vec![1234, 100, 42, 7]);
    }

    #[test]
    fn test_cursor_remove_deletes_last_yielded() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir, "2-2");
        for id in [1, 2, 305, 306] {
            occupy(&store, id);
        }

        let mut cursor = store.list_ids(SortOrder::Ascending);
        assert!(cursor.remove().is_err());

        let mut seen = Vec::new();
        while let Some(id) = cursor.next() {
            let id = id.unwrap();
            seen.push(id);
            if id % 2 == 0 {
                cursor.remove().unwrap();
            }
        }

        assert_eq!(seen, vec![1, 2, 305, 306]);
        let remaining: Vec<u64> = store
            .list_ids(SortOrder::Ascending)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(remaining, vec![1, 305]);
    }

    #[test]
    fn test_unreadable_root_is_reported_not_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir, "2-2");
        occupy(&store, 7);

        // A plain file where the base directory should be cannot be listed
        fs::remove_dir_all(store.base_dir()).unwrap();
        fs::write(store.base_dir(), b"not a directory").unwrap();

        let mut cursor = store.list_ids(SortOrder::Ascending);
        assert!(matches!(cursor.next(), Some(Err(StoreError::Persistence { .. }))));
        assert!(cursor.next().is_none());
        assert!(store.count().is_err());
    }

    #[test]
    fn test_delete_prunes_empty_parents() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir, "4-2-2");
        occupy(&store, 10485);
        occupy(&store, 20000);

        store.delete(10485).unwrap();
        assert!(!store.base_dir().join("0001").exists());
        assert!(store.base_dir().join("0002").join("00").exists());
        assert!(store.base_dir().exists());

        store.delete(20000).unwrap();
        assert!(store.base_dir().exists());
        assert_eq!(fs::read_dir(store.base_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_delete_missing_slot_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir, "4-2-2");
        store.delete(99).unwrap();
        assert!(!store.exists(99));
    }

    #[test]
    fn test_full_store_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir, "1");
        occupy(&store, 9);
        assert!(matches!(
            store.next_free_id(),
            Err(StoreError::Configuration(_))
        ));
    }
}
