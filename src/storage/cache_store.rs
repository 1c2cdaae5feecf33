//! Named response caches.

use super::StorageError;
use crate::worker::{FetchRequest, Response};
use std::future::Future;

/// A set of named caches, persisted by the host across reloads.
///
/// Individual writes are atomic; sequences of calls are not transactional.
/// Two writers racing on one key leave the last write in place.
pub trait CacheStore {
    type Handle: CacheHandle;

    /// Opens the named cache, creating it if needed.
    fn open(&self, name: &str) -> impl Future<Output = Result<Self::Handle, StorageError>>;

    /// Looks the request up in every cache, oldest cache first.
    fn match_any(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<Option<Response>, StorageError>>;

    /// Names of all existing caches, in creation order.
    fn list_names(&self) -> impl Future<Output = Result<Vec<String>, StorageError>>;

    /// Deletes a cache. Returns false if it did not exist.
    fn delete(&self, name: &str) -> impl Future<Output = Result<bool, StorageError>>;
}

/// One opened cache.
pub trait CacheHandle {
    fn match_request(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<Option<Response>, StorageError>>;

    /// Stores a response. The caller passes its own copy; the original
    /// stays with whoever is answering the request.
    fn put(
        &self,
        request: &FetchRequest,
        response: Response,
    ) -> impl Future<Output = Result<(), StorageError>>;
}
