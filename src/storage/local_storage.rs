//! `localStorage`-backed key-value store for the document side.
//!
//! Values are JSON strings under a namespaced key, so they survive reloads
//! and can be inspected from the developer console.

use super::{KeyValueStore, StorageError};
use serde::{de::DeserializeOwned, Serialize};
use web_sys::Storage;

/// Key-value store persisted in the window's `localStorage`.
#[derive(Clone)]
pub struct LocalStorageStore {
    prefix: String,
}

impl LocalStorageStore {
    /// Creates a store whose keys are prefixed with `prefix` and a dash.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}-{}", self.prefix, key)
    }

    fn storage(&self) -> Result<Storage, StorageError> {
        let window = web_sys::window()
            .ok_or_else(|| StorageError::OpenFailed("No window object".to_string()))?;
        window
            .local_storage()
            .map_err(|e| StorageError::OpenFailed(format!("{:?}", e)))?
            .ok_or_else(|| StorageError::OpenFailed("localStorage not available".to_string()))
    }
}

impl KeyValueStore for LocalStorageStore {
    async fn put<T: Serialize + 'static>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_string(value)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        self.storage()?
            .set_item(&self.key(key), &json)
            .map_err(|e| StorageError::OperationFailed(format!("{:?}", e)))
    }

    async fn get<T: DeserializeOwned + 'static>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        let json = self
            .storage()?
            .get_item(&self.key(key))
            .map_err(|e| StorageError::OperationFailed(format!("{:?}", e)))?;

        match json {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StorageError::SerializationError(e.to_string())),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.storage()?
            .remove_item(&self.key(key))
            .map_err(|e| StorageError::OperationFailed(format!("{:?}", e)))
    }
}
