use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::error::StorageError;

/// Synchronous, reload-surviving key-value storage.
///
/// Best effort: implementations may fail at any call, and callers must treat
/// failure as "no crash recovery" rather than as fatal.
pub trait DurableStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl<S: DurableStore + ?Sized> DurableStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> { (**self).get(key) }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> { (**self).set(key, value) }

    fn remove(&self, key: &str) -> Result<(), StorageError> { (**self).remove(key) }
}

/// Process-local store. Survives scheduler re-creation but not process exit.
#[derive(Debug, Default)]
pub struct MemoryStore(RwLock<HashMap<String, String>>);

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.0.read().expect("memory store poisoned").len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> { Ok(self.0.read().expect("memory store poisoned").get(key).cloned()) }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.0.write().expect("memory store poisoned").insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.0.write().expect("memory store poisoned").remove(key);
        Ok(())
    }
}

/// One scheduler's view of the durable store: a fixed key, switched off for
/// the rest of the session at the first storage failure.
pub(crate) struct Mirror {
    target: Option<(String, Arc<dyn DurableStore>)>,
    enabled: AtomicBool,
}

impl Mirror {
    pub fn new(key: Option<String>, store: Option<Arc<dyn DurableStore>>) -> Self {
        let target = match (key, store) {
            (Some(key), Some(store)) => Some((key, store)),
            (Some(key), None) => {
                debug!("no durable store supplied for key {key}; autosave runs without crash recovery");
                None
            }
            _ => None,
        };
        let enabled = AtomicBool::new(target.is_some());
        Self { target, enabled }
    }

    pub fn key(&self) -> Option<&str> { self.target.as_ref().map(|(key, _)| key.as_str()) }

    pub fn is_enabled(&self) -> bool { self.enabled.load(Ordering::Acquire) }

    pub fn load(&self) -> Result<Option<String>, StorageError> { self.with_store(|key, store| store.get(key)).map(Option::flatten) }

    pub fn write(&self, value: &str) -> Result<(), StorageError> { self.with_store(|key, store| store.set(key, value)).map(|_| ()) }

    pub fn remove(&self) -> Result<(), StorageError> { self.with_store(|key, store| store.remove(key)).map(|_| ()) }

    fn with_store<R>(&self, f: impl FnOnce(&str, &dyn DurableStore) -> Result<R, StorageError>) -> Result<Option<R>, StorageError> {
        let Some((key, store)) = &self.target else { return Ok(None) };
        if !self.is_enabled() {
            return Ok(None);
        }
        match f(key, store.as_ref()) {
            Ok(result) => Ok(Some(result)),
            Err(e) => {
                warn!("durable store failed for key {key}, disabling mirror for this session: {e}");
                self.enabled.store(false, Ordering::Release);
                Err(e)
            }
        }
    }
}
