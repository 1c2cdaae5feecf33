//! In-memory stores.
//!
//! These back native builds and tests. Values are kept as serialized JSON so
//! a stored response is a snapshot, independent of the copy handed back to
//! the caller.

use super::{CacheHandle, CacheStore, KeyValueStore, StorageError};
use crate::worker::{CachedEntry, FetchRequest, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A simple in-memory key-value store. Data is not persisted.
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    async fn put<T: Serialize + 'static>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_string(value)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        self.data
            .write()
            .map_err(|e| StorageError::Other(e.to_string()))?
            .insert(key.to_string(), json);
        Ok(())
    }

    async fn get<T: DeserializeOwned + 'static>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        let data = self
            .data
            .read()
            .map_err(|e| StorageError::Other(e.to_string()))?;
        match data.get(key) {
            Some(json) => {
                let value = serde_json::from_str(json)
                    .map_err(|e| StorageError::SerializationError(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.data
            .write()
            .map_err(|e| StorageError::Other(e.to_string()))?
            .remove(key);
        Ok(())
    }
}

type NamedCaches = Vec<(String, HashMap<String, String>)>;

/// In-memory cache storage keyed by cache name, then request URL.
#[derive(Clone, Default)]
pub struct MemoryCacheStore {
    caches: Arc<RwLock<NamedCaches>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in the named cache, or `None` if it does not exist.
    pub fn entry_count(&self, name: &str) -> Option<usize> {
        let caches = self.caches.read().ok()?;
        caches
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, entries)| entries.len())
    }
}

fn decode(json: &str) -> Result<Response, StorageError> {
    let entry: CachedEntry = serde_json::from_str(json)
        .map_err(|e| StorageError::SerializationError(e.to_string()))?;
    Ok(entry.into_response())
}

impl CacheStore for MemoryCacheStore {
    type Handle = MemoryCacheHandle;

    async fn open(&self, name: &str) -> Result<MemoryCacheHandle, StorageError> {
        let mut caches = self
            .caches
            .write()
            .map_err(|e| StorageError::OpenFailed(e.to_string()))?;
        if !caches.iter().any(|(n, _)| n == name) {
            caches.push((name.to_string(), HashMap::new()));
        }
        Ok(MemoryCacheHandle {
            caches: self.caches.clone(),
            name: name.to_string(),
        })
    }

    async fn match_any(&self, request: &FetchRequest) -> Result<Option<Response>, StorageError> {
        let caches = self
            .caches
            .read()
            .map_err(|e| StorageError::Other(e.to_string()))?;
        caches
            .iter()
            .find_map(|(_, entries)| entries.get(request.cache_key()))
            .map(|json| decode(json))
            .transpose()
    }

    async fn list_names(&self) -> Result<Vec<String>, StorageError> {
        let caches = self
            .caches
            .read()
            .map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(caches.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let mut caches = self
            .caches
            .write()
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let before = caches.len();
        caches.retain(|(n, _)| n != name);
        Ok(caches.len() != before)
    }
}

/// Handle to one cache inside a [`MemoryCacheStore`].
#[derive(Clone)]
pub struct MemoryCacheHandle {
    caches: Arc<RwLock<NamedCaches>>,
    name: String,
}

impl CacheHandle for MemoryCacheHandle {
    async fn match_request(
        &self,
        request: &FetchRequest,
    ) -> Result<Option<Response>, StorageError> {
        let caches = self
            .caches
            .read()
            .map_err(|e| StorageError::Other(e.to_string()))?;
        caches
            .iter()
            .find(|(n, _)| *n == self.name)
            .and_then(|(_, entries)| entries.get(request.cache_key()))
            .map(|json| decode(json))
            .transpose()
    }

    async fn put(&self, request: &FetchRequest, response: Response) -> Result<(), StorageError> {
        let json = serde_json::to_string(&CachedEntry::new(request, &response))
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        let mut caches = self
            .caches
            .write()
            .map_err(|e| StorageError::OperationFailed(e.to_string()))?;
        match caches.iter_mut().find(|(n, _)| *n == self.name) {
            Some((_, entries)) => {
                entries.insert(request.cache_key().to_string(), json);
            }
            None => {
                // Deleted while the handle was held; writes recreate it.
                let mut entries = HashMap::new();
                entries.insert(request.cache_key().to_string(), json);
                caches.push((self.name.clone(), entries));
            }
        }
        Ok(())
    }
}
