//! Cache Storage-backed [`CacheStore`] for the service worker.

use super::{CacheHandle, CacheStore, StorageError};
use crate::worker::js::{fresh_response_to_js, js_error, response_from_js};
use crate::worker::{FetchRequest, Response};
use js_sys::Array;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Cache, CacheStorage};

/// The worker scope's `caches` object.
#[derive(Clone)]
pub struct BrowserCacheStorage {
    caches: CacheStorage,
}

impl BrowserCacheStorage {
    pub fn new(caches: CacheStorage) -> Self {
        Self { caches }
    }
}

async fn read_match(value: JsValue) -> Result<Option<Response>, StorageError> {
    if value.is_undefined() || value.is_null() {
        return Ok(None);
    }

    let native: web_sys::Response = value.dyn_into().map_err(|_| {
        StorageError::OperationFailed("Failed to cast match to Response".to_string())
    })?;

    response_from_js(native)
        .await
        .map(Some)
        .map_err(|e| StorageError::OperationFailed(e.to_string()))
}

impl CacheStore for BrowserCacheStorage {
    type Handle = BrowserCache;

    async fn open(&self, name: &str) -> Result<BrowserCache, StorageError> {
        let value = JsFuture::from(self.caches.open(name))
            .await
            .map_err(|e| StorageError::OpenFailed(js_error(&e)))?;

        let cache: Cache = value
            .dyn_into()
            .map_err(|_| StorageError::OpenFailed("Failed to cast to Cache".to_string()))?;

        Ok(BrowserCache { cache })
    }

    async fn match_any(&self, request: &FetchRequest) -> Result<Option<Response>, StorageError> {
        let value = JsFuture::from(self.caches.match_with_str(request.cache_key()))
            .await
            .map_err(|e| StorageError::OperationFailed(js_error(&e)))?;
        read_match(value).await
    }

    async fn list_names(&self) -> Result<Vec<String>, StorageError> {
        let value = JsFuture::from(self.caches.keys())
            .await
            .map_err(|e| StorageError::OperationFailed(js_error(&e)))?;

        let array = Array::from(&value);
        let mut names = Vec::with_capacity(array.length() as usize);
        for i in 0..array.length() {
            if let Some(name) = array.get(i).as_string() {
                names.push(name);
            }
        }
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let value = JsFuture::from(self.caches.delete(name))
            .await
            .map_err(|e| StorageError::OperationFailed(js_error(&e)))?;
        Ok(value.as_bool().unwrap_or(false))
    }
}

/// One opened host cache.
#[derive(Clone)]
pub struct BrowserCache {
    cache: Cache,
}

impl CacheHandle for BrowserCache {
    async fn match_request(
        &self,
        request: &FetchRequest,
    ) -> Result<Option<Response>, StorageError> {
        let value = JsFuture::from(self.cache.match_with_str(request.cache_key()))
            .await
            .map_err(|e| StorageError::OperationFailed(js_error(&e)))?;
        read_match(value).await
    }

    async fn put(&self, request: &FetchRequest, response: Response) -> Result<(), StorageError> {
        let native = fresh_response_to_js(&response)
            .map_err(|e| StorageError::SerializationError(js_error(&e)))?;

        JsFuture::from(self.cache.put_with_str(request.cache_key(), &native))
            .await
            .map_err(|e| StorageError::OperationFailed(js_error(&e)))?;
        Ok(())
    }
}
