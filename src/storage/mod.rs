//! Persistent storage abstractions.
//!
//! Two contracts live here:
//! - [`CacheStore`]: named request→response caches (the host's Cache Storage
//!   on WASM), used by the service worker.
//! - [`KeyValueStore`]: a JSON key-value store (`localStorage` on WASM), used
//!   by the document to remember the last known position.
//!
//! In-memory implementations of both are always available and back the tests.

mod cache_store;
mod memory;

#[cfg(target_arch = "wasm32")]
mod cache_api;
#[cfg(target_arch = "wasm32")]
mod local_storage;

pub use cache_store::{CacheHandle, CacheStore};
pub use memory::{MemoryCacheStore, MemoryStore};

#[cfg(target_arch = "wasm32")]
pub use cache_api::BrowserCacheStorage;
#[cfg(target_arch = "wasm32")]
pub use local_storage::LocalStorageStore;

use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;

/// Errors that can occur during storage operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The store or a named cache could not be opened.
    OpenFailed(String),
    /// A read, write or delete failed.
    OperationFailed(String),
    /// Serialization or deserialization failed.
    SerializationError(String),
    /// An unexpected error occurred.
    Other(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::OpenFailed(msg) => write!(f, "Open failed: {}", msg),
            StorageError::OperationFailed(msg) => write!(f, "Storage operation failed: {}", msg),
            StorageError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            StorageError::Other(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

/// A generic key-value storage interface.
///
/// Note: This trait does not require `Send` bounds since WASM is single-threaded
/// and JS types cannot be sent between threads.
pub trait KeyValueStore {
    /// Stores a value under the given key, overwriting any previous value.
    fn put<T: Serialize + 'static>(
        &self,
        key: &str,
        value: &T,
    ) -> impl Future<Output = Result<(), StorageError>>;

    /// Retrieves a value by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    fn get<T: DeserializeOwned + 'static>(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<T>, StorageError>>;

    /// Deletes a value by key.
    ///
    /// Returns `Ok(())` even if the key didn't exist.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), StorageError>>;
}
