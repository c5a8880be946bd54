//! ifs-store
//!
//! Slot-sharded persistent stores for XML metadata documents and file
//! collections, with optional version history.
//!
//! All operations are synchronous and blocking; run them on worker threads of
//! your choosing.
//!
//! ```no_run
//! use ifs_store::storage::{MetadataOptions, MetadataStore, Store};
//!
//! # fn main() -> ifs_store::Result<()> {
//! let store = Store::new("mods", "/data/mods", "4-2-2".parse()?, "mods_", ".xml")?;
//! let metadata = MetadataStore::new(store, MetadataOptions::default());
//! let record = metadata.create(b"<mods><title>A</title></mods>", None)?;
//! println!("stored {}", record.full_id());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod storage;

pub use config::{StoreConfig, StoreKind, StoresConfig};
pub use error::{Result, StoreError};
pub use storage::registry::global as global_registry;
