//! Content-addressed blob storage for the local history repository.
//!
//! Every committed file version is stored once under its SHA-256 hash, using
//! Git-style sharding (first two hex characters as directory):
//!
//! ```text
//! blobs/
//!   a3/
//!     f2e1d4c5b6a7...
//! ```

use crate::error::{Result, StoreError};
use dashmap::DashSet;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
    /// Hashes known to exist on disk
    existence_cache: Arc<DashSet<String>>,
}

impl BlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            existence_cache: Arc::new(DashSet::new()),
        }
    }

    pub fn compute_hash(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        format!("{:x}", hasher.finalize())
    }

    /// Stores `content` unless an identical blob already exists.
    pub fn store(&self, content: &[u8]) -> Result<String> {
        let hash = Self::compute_hash(content);
        if self.exists(&hash) {
            debug!(hash = %hash, "Blob already stored (deduplication)");
            return Ok(hash);
        }

        let object_path = self.object_path(&hash);
        if let Some(parent) = object_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::io_error("Failed to create blob directory", parent, e))?;
        }

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&object_path)
        {
            Ok(mut file) => {
                let written = file.write_all(content).and_then(|_| file.sync_all());
                if let Err(e) = written {
                    let _ = fs::remove_file(&object_path);
                    return Err(StoreError::io_error("Failed to write blob", &object_path, e));
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!(hash = %hash, "Blob written concurrently, skipping");
            }
            Err(e) => {
                return Err(StoreError::io_error("Failed to create blob", &object_path, e));
            }
        }

        self.existence_cache.insert(hash.clone());
        debug!(hash = %hash, size = content.len(), "Stored blob");
        Ok(hash)
    }

    pub fn object_path(&self, hash: &str) -> PathBuf {
        let (prefix, suffix) = if hash.len() >= 2 {
            hash.split_at(2)
        } else {
            warn!(hash = %hash, "Invalid hash length, using full hash as filename");
            ("00", hash)
        };
        self.root.join(prefix).join(suffix)
    }

    pub fn read(&self, hash: &str) -> Result<Vec<u8>> {
        let object_path = self.object_path(hash);
        fs::read(&object_path).map_err(|e| StoreError::io_error("Failed to read blob", object_path, e))
    }

    pub fn exists(&self, hash: &str) -> bool {
        if self.existence_cache.contains(hash) {
            return true;
        }
        let found = self.object_path(hash).is_file();
        if found {
            self.existence_cache.insert(hash.to_string());
        }
        found
    }

    /// Re-hashes a blob; `false` means the bytes no longer match their name.
    pub fn verify_integrity(&self, hash: &str) -> Result<bool> {
        let content = self.read(hash)?;
        Ok(Self::compute_hash(&content) == hash)
    }
}
