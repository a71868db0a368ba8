//! Sled backed [`DurableStore`] so drafts survive a process restart.

mod error;

pub use error::SledStoreError;

use std::path::PathBuf;

use sled::{Config, Db, Tree};
use tether_core::error::StorageError;
use tether_core::store::DurableStore;
use tracing::debug;

/// Name of the tree holding draft snapshots
pub const DRAFTS_TREE: &str = "tether_drafts";

pub struct SledStore {
    pub db: Db,
    drafts: Tree,
}

impl SledStore {
    pub fn with_homedir_folder(folder_name: &str) -> anyhow::Result<Self> {
        let dir = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Failed to get home directory"))?.join(folder_name);

        Self::with_path(dir)
    }

    pub fn with_path(path: PathBuf) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&path)?;
        let db = sled::open(path.join("sled"))?;
        Ok(Self::from_db(db)?)
    }

    pub fn new() -> anyhow::Result<Self> { Self::with_homedir_folder(".tether") }

    /// Temporary database that is deleted when dropped
    pub fn new_test() -> anyhow::Result<Self> {
        let db = Config::new().temporary(true).flush_every_ms(None).open()?;
        Ok(Self::from_db(db)?)
    }

    pub fn from_db(db: Db) -> Result<Self, SledStoreError> {
        let drafts = db.open_tree(DRAFTS_TREE)?;
        Ok(Self { db, drafts })
    }

    /// Keys of every stored draft, in byte order
    pub fn keys(&self) -> Result<Vec<String>, SledStoreError> {
        self.drafts.iter().keys().map(|key| -> Result<String, SledStoreError> { Ok(String::from_utf8(key?.to_vec())?) }).collect()
    }

    pub fn flush(&self) -> Result<usize, SledStoreError> { Ok(self.drafts.flush()?) }
}

impl DurableStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let Some(bytes) = self.drafts.get(key).map_err(SledStoreError::from)? else { return Ok(None) };
        Ok(Some(String::from_utf8(bytes.to_vec()).map_err(SledStoreError::from)?))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.drafts.insert(key, value.as_bytes()).map_err(SledStoreError::from)?;
        // a draft only helps crash recovery once it is on disk
        self.drafts.flush().map_err(SledStoreError::from)?;
        debug!("stored draft {key} ({} bytes)", value.len());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.drafts.remove(key).map_err(SledStoreError::from)?;
        self.drafts.flush().map_err(SledStoreError::from)?;
        Ok(())
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.debug_struct("SledStore").field("drafts", &self.drafts.len()).finish() }
}
