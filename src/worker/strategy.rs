//! Caching strategies.
//!
//! Each strategy resolves a request against the network and one named cache.
//! None of them synthesizes a response: when neither source has anything,
//! they return `None` and the router applies the per-class fallback.
//!
//! Fallback lookups go through [`CacheStore::match_any`], so a request can be
//! answered from any live cache, not only the one the strategy writes to.

use super::http::{FetchRequest, Network, Response};
use crate::storage::{CacheHandle, CacheStore};
use futures_util::future::{FutureExt, LocalBoxFuture};

/// A fixed recipe for resolving a request against cache and network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    NetworkFirst,
    CacheFirst,
    StaleWhileRevalidate,
}

/// Result of running a strategy.
pub struct StrategyOutcome {
    /// Response for the caller, if any source produced one.
    pub response: Option<Response>,
    /// Background refresh that must be driven to completion but must not
    /// delay the response.
    pub revalidation: Option<LocalBoxFuture<'static, ()>>,
}

impl StrategyOutcome {
    fn immediate(response: Option<Response>) -> Self {
        Self {
            response,
            revalidation: None,
        }
    }
}

impl std::fmt::Debug for StrategyOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyOutcome")
            .field("response", &self.response)
            .field("revalidation", &self.revalidation.is_some())
            .finish()
    }
}

/// Runs `strategy` for `request`, writing into `cache_name`.
pub async fn run<S, N>(
    strategy: Strategy,
    store: &S,
    network: &N,
    request: &FetchRequest,
    cache_name: &str,
) -> StrategyOutcome
where
    S: CacheStore + Clone + 'static,
    N: Network + Clone + 'static,
{
    match strategy {
        Strategy::NetworkFirst => {
            StrategyOutcome::immediate(network_first(store, network, request, cache_name).await)
        }
        Strategy::CacheFirst => {
            StrategyOutcome::immediate(cache_first(store, network, request, cache_name).await)
        }
        Strategy::StaleWhileRevalidate => {
            stale_while_revalidate(store, network, request, cache_name).await
        }
    }
}

/// Stores a copy of `response` if it is cacheable. Failures are logged only.
///
/// Only GET requests are stored: entries are keyed by URL alone, so any other
/// method would later answer a GET for the same URL.
pub async fn store_copy<S: CacheStore>(
    store: &S,
    cache_name: &str,
    request: &FetchRequest,
    response: &Response,
) {
    if !request.is_get() || !response.is_cacheable() {
        return;
    }

    let result = match store.open(cache_name).await {
        Ok(cache) => cache.put(request, response.clone()).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        log::warn!("Failed to cache {} in {}: {}", request.url, cache_name, e);
    }
}

/// Looks the request up in any cache. Lookup failures and non-GET requests
/// count as a miss.
pub async fn cached<S: CacheStore>(store: &S, request: &FetchRequest) -> Option<Response> {
    if !request.is_get() {
        return None;
    }
    match store.match_any(request).await {
        Ok(found) => found,
        Err(e) => {
            log::warn!("Cache lookup failed for {}: {}", request.url, e);
            None
        }
    }
}

/// Network first, cache on failure.
///
/// Any network response is returned as-is; only cacheable ones are stored.
pub async fn network_first<S: CacheStore, N: Network>(
    store: &S,
    network: &N,
    request: &FetchRequest,
    cache_name: &str,
) -> Option<Response> {
    match network.fetch(request).await {
        Ok(response) => {
            store_copy(store, cache_name, request, &response).await;
            Some(response)
        }
        Err(e) => {
            log::info!("Network unavailable for {} ({}), trying cache", request.url, e);
            cached(store, request).await
        }
    }
}

/// Cache first; the network is only consulted on a miss.
pub async fn cache_first<S: CacheStore, N: Network>(
    store: &S,
    network: &N,
    request: &FetchRequest,
    cache_name: &str,
) -> Option<Response> {
    if let Some(hit) = cached(store, request).await {
        return Some(hit);
    }

    match network.fetch(request).await {
        Ok(response) => {
            store_copy(store, cache_name, request, &response).await;
            Some(response)
        }
        Err(e) => {
            log::info!("Network unavailable for {}: {}", request.url, e);
            None
        }
    }
}

/// Serve the cached copy at once and refresh it in the background; without
/// a cached copy, wait for the network.
pub async fn stale_while_revalidate<S, N>(
    store: &S,
    network: &N,
    request: &FetchRequest,
    cache_name: &str,
) -> StrategyOutcome
where
    S: CacheStore + Clone + 'static,
    N: Network + Clone + 'static,
{
    let Some(hit) = cached(store, request).await else {
        let response = match network.fetch(request).await {
            Ok(response) => {
                store_copy(store, cache_name, request, &response).await;
                Some(response)
            }
            Err(e) => {
                log::info!("Network unavailable for {}: {}", request.url, e);
                None
            }
        };
        return StrategyOutcome::immediate(response);
    };

    let store = store.clone();
    let network = network.clone();
    let request = request.clone();
    let cache_name = cache_name.to_string();

    let revalidation = async move {
        match network.fetch(&request).await {
            Ok(fresh) => store_copy(&store, &cache_name, &request, &fresh).await,
            Err(e) => log::debug!("Revalidation of {} skipped: {}", request.url, e),
        }
    }
    .boxed_local();

    StrategyOutcome {
        response: Some(hit),
        revalidation: Some(revalidation),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted network used by the worker tests.

    use super::super::http::{FetchRequest, Network, NetworkError, Response};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    pub struct MockNetwork {
        responses: Rc<RefCell<HashMap<String, Response>>>,
        offline: Rc<RefCell<bool>>,
        calls: Rc<RefCell<Vec<String>>>,
    }

    impl MockNetwork {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn serve(&self, url: &str, response: Response) {
            self.responses.borrow_mut().insert(url.to_string(), response);
        }

        pub fn set_offline(&self, offline: bool) {
            *self.offline.borrow_mut() = offline;
        }

        pub fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl Network for MockNetwork {
        async fn fetch(&self, request: &FetchRequest) -> Result<Response, NetworkError> {
            self.calls.borrow_mut().push(request.url.clone());
            if *self.offline.borrow() {
                return Err(NetworkError::Transport("offline".to_string()));
            }
            Ok(self
                .responses
                .borrow()
                .get(&request.url)
                .cloned()
                .unwrap_or_else(|| Response::new(404, "")))
        }
    }
}
