//! Install, activation and cache retirement.
//!
//! ```text
//! Installing -> Installed (waiting) -> Activating -> Active
//! ```
//!
//! Install pre-populates the dated main cache with the essential files and
//! asks the host to skip the waiting state. Activation deletes every cache
//! whose name does not carry the current version tag, then claims the open
//! documents and tells them a new version is in charge.

use super::http::{FetchRequest, Network, Response};
use super::messages::ClientMessage;
use crate::config::{CacheNames, WorkerConfig};
use crate::storage::{CacheHandle, CacheStore, StorageError};
use futures_util::future::join_all;
use std::cell::Cell;
use std::fmt;
use std::future::Future;

/// Where the worker is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    /// Installed and waiting for older instances to let go.
    Installed,
    Activating,
    Active,
}

/// A host-level operation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostError(pub String);

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Host error: {}", self.0)
    }
}

impl std::error::Error for HostError {}

/// Worker-scope operations provided by the host.
pub trait WorkerHost {
    /// Activate without waiting for older instances to close.
    fn skip_waiting(&self) -> impl Future<Output = Result<(), HostError>>;

    /// Take control of every open document without a reload.
    fn claim_clients(&self) -> impl Future<Output = Result<(), HostError>>;

    /// Post a message to every controlled document.
    fn notify_clients(&self, message: ClientMessage)
        -> impl Future<Output = Result<(), HostError>>;
}

/// Outcome of pre-populating the main cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub cached: Vec<String>,
    pub failed: Vec<String>,
}

impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Drives install and activation for one deployed version.
pub struct LifecycleManager<S, N, H> {
    config: WorkerConfig,
    names: CacheNames,
    store: S,
    network: N,
    host: H,
    state: Cell<WorkerState>,
}

impl<S, N, H> LifecycleManager<S, N, H>
where
    S: CacheStore,
    N: Network,
    H: WorkerHost,
{
    pub fn new(config: WorkerConfig, store: S, network: N, host: H) -> Self {
        let names = config.cache_names();
        Self {
            config,
            names,
            store,
            network,
            host,
            state: Cell::new(WorkerState::Installing),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    pub fn cache_names(&self) -> &CacheNames {
        &self.names
    }

    fn transition(&self, state: WorkerState) {
        log::info!("Worker {}: {:?} -> {:?}", self.names.version(), self.state.get(), state);
        self.state.set(state);
    }

    /// Caches the essential files, then asks to skip the waiting state.
    ///
    /// A failing file never aborts the install: when the all-or-nothing add
    /// fails, every file is retried on its own and failures are reported.
    pub async fn install(&self) -> Result<InstallReport, StorageError> {
        self.transition(WorkerState::Installing);
        let cache = self.store.open(&self.names.main).await?;

        let report = match self.add_all(&cache).await {
            Ok(report) => report,
            Err(e) => {
                log::warn!("Bulk cache of essential files failed ({}), adding one by one", e);
                self.add_each(&cache).await
            }
        };
        log::info!(
            "Cached {} of {} essential files in {}",
            report.cached.len(),
            self.config.essential_files.len(),
            self.names.main
        );

        self.transition(WorkerState::Installed);
        self.skip_waiting().await;
        Ok(report)
    }

    /// Fetches every essential file and stores them only if all succeeded.
    async fn add_all(&self, cache: &S::Handle) -> Result<InstallReport, StorageError> {
        let requests: Vec<FetchRequest> = self
            .config
            .essential_files
            .iter()
            .map(FetchRequest::get)
            .collect();

        let fetched = join_all(requests.iter().map(|request| self.network.fetch(request))).await;

        let mut responses = Vec::with_capacity(fetched.len());
        for (request, result) in requests.iter().zip(fetched) {
            match result {
                Ok(response) if response.is_ok() => responses.push(response),
                Ok(response) => {
                    return Err(StorageError::OperationFailed(format!(
                        "{} answered {}",
                        request.url, response.status
                    )))
                }
                Err(e) => {
                    return Err(StorageError::OperationFailed(format!(
                        "{}: {}",
                        request.url, e
                    )))
                }
            }
        }

        for (request, response) in requests.iter().zip(responses) {
            cache.put(request, response).await?;
        }

        Ok(InstallReport {
            cached: self.config.essential_files.clone(),
            failed: Vec::new(),
        })
    }

    async fn add_each(&self, cache: &S::Handle) -> InstallReport {
        let results = join_all(
            self.config
                .essential_files
                .iter()
                .map(|file| self.add_one(cache, file)),
        )
        .await;

        let mut report = InstallReport::default();
        for (file, result) in self.config.essential_files.iter().zip(results) {
            match result {
                Ok(()) => report.cached.push(file.clone()),
                Err(e) => {
                    log::warn!("Failed to cache {}: {}", file, e);
                    report.failed.push(file.clone());
                }
            }
        }
        report
    }

    async fn add_one(&self, cache: &S::Handle, file: &str) -> Result<(), StorageError> {
        let request = FetchRequest::get(file);
        let response: Response = self
            .network
            .fetch(&request)
            .await
            .map_err(|e| StorageError::OperationFailed(e.to_string()))?;
        if !response.is_ok() {
            return Err(StorageError::OperationFailed(format!(
                "status {}",
                response.status
            )));
        }
        cache.put(&request, response).await
    }

    /// Retires stale caches, claims open documents and announces the update.
    ///
    /// Returns the names of the deleted caches.
    pub async fn activate(&self) -> Result<Vec<String>, StorageError> {
        self.transition(WorkerState::Activating);

        let mut deleted = Vec::new();
        for name in self.store.list_names().await? {
            if self.names.is_live(&name) {
                continue;
            }
            log::info!("Deleting stale cache {}", name);
            if self.store.delete(&name).await? {
                deleted.push(name);
            }
        }

        if let Err(e) = self.host.claim_clients().await {
            log::warn!("Failed to claim clients: {}", e);
        }
        if let Err(e) = self.host.notify_clients(ClientMessage::SwUpdated).await {
            log::warn!("Failed to notify clients: {}", e);
        }

        self.transition(WorkerState::Active);
        Ok(deleted)
    }

    /// Leaves the waiting state immediately.
    pub async fn skip_waiting(&self) {
        if let Err(e) = self.host.skip_waiting().await {
            log::warn!("Skip waiting failed: {}", e);
        }
    }

    /// Deletes every cache, live or not. Returns how many were removed.
    pub async fn clear_all(&self) -> Result<usize, StorageError> {
        let names = self.store.list_names().await?;
        let mut removed = 0;
        for name in &names {
            if self.store.delete(name).await? {
                removed += 1;
            }
        }
        log::info!("Cleared {} caches", removed);
        Ok(removed)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records host calls in order.
    #[derive(Clone, Default)]
    pub struct RecordingHost {
        pub calls: Rc<RefCell<Vec<String>>>,
    }

    impl RecordingHost {
        pub fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl WorkerHost for RecordingHost {
        async fn skip_waiting(&self) -> Result<(), HostError> {
            self.calls.borrow_mut().push("skip_waiting".to_string());
            Ok(())
        }

        async fn claim_clients(&self) -> Result<(), HostError> {
            self.calls.borrow_mut().push("claim".to_string());
            Ok(())
        }

        async fn notify_clients(&self, message: ClientMessage) -> Result<(), HostError> {
            self.calls.borrow_mut().push(format!("notify {:?}", message));
            Ok(())
        }
    }
}
