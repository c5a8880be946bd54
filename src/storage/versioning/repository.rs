//! Version repository protocol
//!
//! [`VersionRepository`] is everything the versioning store needs from a
//! history backend: commit a write or a delete, fetch a file as of a
//! revision, list the changes of one path, and report the newest revision.
//! Any backend satisfying it can be plugged in.
//!
//! [`LocalHistoryRepository`] is the bundled backend: an append-only
//! revision log (`revisions.jsonl`, one JSON record per revision) next to a
//! content-addressed blob store.
//!
//! ```text
//! <repository_dir>/
//! ├── revisions.jsonl
//! └── blobs/
//!     └── a3/f2e1d4...
//! ```

use crate::error::{Result, StoreError};
use crate::storage::versioning::blob_store::BlobStore;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const LOG_FILE: &str = "revisions.jsonl";
const BLOB_DIR: &str = "blobs";

/// Kind of change a revision made to one file path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub revision: u64,
    pub timestamp: DateTime<Utc>,
}

/// One change of one path, as reported by the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub revision: u64,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub change: ChangeKind,
    pub message: String,
}

/// History backend used by the versioning metadata store.
///
/// Paths are `/`-separated and relative to the store's base directory. A
/// commit either happens completely or not at all; a failed or cancelled
/// commit must report an error and leave no revision behind.
pub trait VersionRepository: Send + Sync + fmt::Debug {
    /// Commits `content` to `path`, creating `directories` first (entries that
    /// already exist are skipped).
    fn commit_write(
        &self,
        directories: &[String],
        path: &str,
        content: &[u8],
        message: &str,
    ) -> Result<CommitInfo>;

    fn commit_delete(&self, path: &str, message: &str) -> Result<CommitInfo>;

    /// Content of `path` as of `revision`.
    fn file_at_revision(&self, path: &str, revision: u64) -> Result<Vec<u8>>;

    /// Changes of `path` within `from..=to`, oldest first.
    fn log_entries(&self, path: &str, from: u64, to: u64) -> Result<Vec<LogEntry>>;

    /// Newest revision of the whole repository, `None` while it has no history.
    fn latest_revision(&self) -> Result<Option<u64>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Action {
    AddDirectory,
    Add,
    Modify,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Change {
    path: String,
    action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    blob: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RevisionRecord {
    revision: u64,
    author: String,
    timestamp: DateTime<Utc>,
    message: String,
    changes: Vec<Change>,
}

#[derive(Debug, Default)]
struct History {
    revisions: Vec<RevisionRecord>,
    /// path -> blob of the HEAD version, for files present at HEAD
    live_files: HashMap<String, String>,
    directories: HashSet<String>,
}

impl History {
    fn apply(&mut self, record: RevisionRecord) {
        for change in &record.changes {
            match change.action {
                Action::AddDirectory => {
                    self.directories.insert(change.path.clone());
                }
                Action::Add | Action::Modify => {
                    if let Some(blob) = &change.blob {
                        self.live_files.insert(change.path.clone(), blob.clone());
                    }
                }
                Action::Delete => {
                    self.live_files.remove(&change.path);
                }
            }
        }
        self.revisions.push(record);
    }

    fn head(&self) -> u64 {
        self.revisions.last().map(|r| r.revision).unwrap_or(0)
    }

    fn parent_known(&self, path: &str, pending: &[String]) -> bool {
        match path.rsplit_once('/') {
            None => true,
            Some((parent, _)) => {
                self.directories.contains(parent) || pending.iter().any(|d| d == parent)
            }
        }
    }
}

/// Integrity report of a [`LocalHistoryRepository`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryReport {
    pub revisions: u64,
    pub blobs_checked: usize,
    pub missing_blobs: Vec<String>,
    pub corrupted_blobs: Vec<String>,
}

impl RepositoryReport {
    pub fn is_valid(&self) -> bool {
        self.missing_blobs.is_empty() && self.corrupted_blobs.is_empty()
    }
}

#[derive(Debug)]
pub struct LocalHistoryRepository {
    dir: PathBuf,
    author: String,
    blobs: BlobStore,
    history: RwLock<History>,
}

impl LocalHistoryRepository {
    /// Opens the repository in `dir`, creating it if needed, and replays its log.
    pub fn open(dir: impl Into<PathBuf>, author: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(dir.join(BLOB_DIR))
            .map_err(|e| StoreError::io_error("Failed to create repository", &dir, e))?;

        let mut history = History::default();
        let log_path = dir.join(LOG_FILE);
        if log_path.exists() {
            let file = fs::File::open(&log_path)
                .map_err(|e| StoreError::io_error("Failed to open revision log", &log_path, e))?;
            for (line_no, line) in BufReader::new(file).lines().enumerate() {
                let line = line
                    .map_err(|e| StoreError::io_error("Failed to read revision log", &log_path, e))?;
                if line.trim().is_empty() {
                    continue;
                }
                let record: RevisionRecord = serde_json::from_str(&line).map_err(|e| {
                    StoreError::persistence(
                        format!("Corrupt revision log entry at line {}: {}", line_no + 1, e),
                        Some(log_path.clone()),
                    )
                })?;
                history.apply(record);
            }
        }

        info!(
            repository = %dir.display(),
            head = history.head(),
            "Opened history repository"
        );

        Ok(Self {
            blobs: BlobStore::new(dir.join(BLOB_DIR)),
            dir,
            author: author.into(),
            history: RwLock::new(history),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    /// Paths of all files present at HEAD.
    pub fn live_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.history.read().live_files.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Appends one revision; the in-memory history only changes once the log
    /// line is durable.
    fn append(&self, message: &str, build: impl FnOnce(&History) -> Result<Vec<Change>>) -> Result<CommitInfo> {
        let mut history = self.history.write();
        let changes = build(&history)?;

        let record = RevisionRecord {
            revision: history.head() + 1,
            author: self.author.clone(),
            timestamp: Utc::now(),
            message: message.to_string(),
            changes,
        };
        let line = serde_json::to_string(&record).map_err(|e| {
            StoreError::persistence(format!("Failed to encode revision: {}", e), None)
        })?;

        let log_path = self.dir.join(LOG_FILE);
        let mut log = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| StoreError::io_error("Failed to open revision log", &log_path, e))?;
        writeln!(log, "{}", line)
            .and_then(|_| log.sync_data())
            .map_err(|e| StoreError::io_error("Failed to append revision", &log_path, e))?;

        let info = CommitInfo {
            revision: record.revision,
            timestamp: record.timestamp,
        };
        debug!(revision = info.revision, message, "Committed revision");
        history.apply(record);
        Ok(info)
    }

    /// Re-hashes every blob referenced by the log.
    pub fn verify(&self) -> RepositoryReport {
        let history = self.history.read();
        let mut report = RepositoryReport {
            revisions: history.head(),
            ..Default::default()
        };

        let referenced: HashSet<&String> = history
            .revisions
            .iter()
            .flat_map(|r| r.changes.iter())
            .filter_map(|c| c.blob.as_ref())
            .collect();

        for hash in referenced {
            report.blobs_checked += 1;
            if !self.blobs.exists(hash) {
                report.missing_blobs.push(hash.clone());
                continue;
            }
            match self.blobs.verify_integrity(hash) {
                Ok(true) => {}
                Ok(false) => report.corrupted_blobs.push(hash.clone()),
                Err(e) => {
                    warn!(hash = %hash, error = %e, "Failed to verify blob");
                    report.corrupted_blobs.push(hash.clone());
                }
            }
        }
        report.missing_blobs.sort();
        report.corrupted_blobs.sort();
        report
    }
}

impl VersionRepository for LocalHistoryRepository {
    fn commit_write(
        &self,
        directories: &[String],
        path: &str,
        content: &[u8],
        message: &str,
    ) -> Result<CommitInfo> {
        // Blobs are immutable and deduplicated, so an orphan left by a failed
        // log append is harmless.
        let blob = self.blobs.store(content)?;

        self.append(message, |history| {
            for dir in directories {
                if !history.directories.contains(dir) && !history.parent_known(dir, directories) {
                    return Err(StoreError::persistence(
                        format!("Parent of directory {} is not under version control", dir),
                        None,
                    ));
                }
            }
            if !history.parent_known(path, directories) {
                return Err(StoreError::persistence(
                    format!("Parent of {} is not under version control", path),
                    None,
                ));
            }

            let mut changes: Vec<Change> = directories
                .iter()
                .filter(|dir| !history.directories.contains(*dir))
                .map(|dir| Change {
                    path: dir.clone(),
                    action: Action::AddDirectory,
                    blob: None,
                })
                .collect();
            let action = if history.live_files.contains_key(path) {
                Action::Modify
            } else {
                Action::Add
            };
            changes.push(Change {
                path: path.to_string(),
                action,
                blob: Some(blob),
            });
            Ok(changes)
        })
    }

    fn commit_delete(&self, path: &str, message: &str) -> Result<CommitInfo> {
        self.append(message, |history| {
            if !history.live_files.contains_key(path) {
                return Err(StoreError::persistence(
                    format!("{} is not present at HEAD and cannot be deleted", path),
                    None,
                ));
            }
            Ok(vec![Change {
                path: path.to_string(),
                action: Action::Delete,
                blob: None,
            }])
        })
    }

    fn file_at_revision(&self, path: &str, revision: u64) -> Result<Vec<u8>> {
        let blob = {
            let history = self.history.read();
            if revision == 0 || revision > history.head() {
                return Err(StoreError::persistence(
                    format!("Revision {} does not exist (HEAD is {})", revision, history.head()),
                    None,
                ));
            }

            let change = history
                .revisions
                .iter()
                .rev()
                .skip_while(|r| r.revision > revision)
                .flat_map(|r| r.changes.iter().rev())
                .find(|c| c.path == path && c.action != Action::AddDirectory);

            match change {
                Some(Change {
                    blob: Some(blob), ..
                }) => blob.clone(),
                Some(_) => {
                    return Err(StoreError::persistence(
                        format!("{} is deleted as of revision {}", path, revision),
                        None,
                    ))
                }
                None => {
                    return Err(StoreError::persistence(
                        format!("{} does not exist as of revision {}", path, revision),
                        None,
                    ))
                }
            }
        };
        self.blobs.read(&blob)
    }

    fn log_entries(&self, path: &str, from: u64, to: u64) -> Result<Vec<LogEntry>> {
        let history = self.history.read();
        let entries = history
            .revisions
            .iter()
            .filter(|r| r.revision >= from && r.revision <= to)
            .filter_map(|r| {
                r.changes
                    .iter()
                    .find(|c| c.path == path && c.action != Action::AddDirectory)
                    .map(|c| LogEntry {
                        revision: r.revision,
                        author: r.author.clone(),
                        timestamp: r.timestamp,
                        change: match c.action {
                            Action::Add | Action::AddDirectory => ChangeKind::Added,
                            Action::Modify => ChangeKind::Modified,
                            Action::Delete => ChangeKind::Deleted,
                        },
                        message: r.message.clone(),
                    })
            })
            .collect();
        Ok(entries)
    }

    fn latest_revision(&self) -> Result<Option<u64>> {
        let head = self.history.read().head();
        Ok(if head == 0 { None } else { Some(head) })
    }
}
