//! The service worker's event handlers, independent of the host bindings.

use super::http::{FetchRequest, Network, Response};
use super::lifecycle::{InstallReport, LifecycleManager, WorkerHost};
use super::messages::{ClearCacheAck, ReplyPort, WorkerMessage};
use super::notification::NotificationTemplate;
use super::router::{FetchRouter, HandledFetch};
use crate::config::WorkerConfig;
use crate::geolocation::PositionRecord;
use crate::storage::{CacheHandle, CacheStore, StorageError};

/// Background sync tag that reads the last position back.
pub const SYNC_GEOLOCATION_TAG: &str = "sync-geolocation";

/// One running service worker instance.
pub struct ServiceWorker<S, N, H> {
    config: WorkerConfig,
    store: S,
    lifecycle: LifecycleManager<S, N, H>,
    router: FetchRouter<S, N>,
    notification: NotificationTemplate,
}

impl<S, N, H> ServiceWorker<S, N, H>
where
    S: CacheStore + Clone + 'static,
    N: Network + Clone + 'static,
    H: WorkerHost,
{
    pub fn new(config: WorkerConfig, store: S, network: N, host: H) -> Self {
        log::info!("Service worker {} loaded", config.version);
        Self {
            lifecycle: LifecycleManager::new(config.clone(), store.clone(), network.clone(), host),
            router: FetchRouter::new(config.clone(), store.clone(), network),
            config,
            store,
            notification: NotificationTemplate::default(),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> &LifecycleManager<S, N, H> {
        &self.lifecycle
    }

    pub fn router(&self) -> &FetchRouter<S, N> {
        &self.router
    }

    pub async fn on_install(&self) -> Result<InstallReport, StorageError> {
        self.lifecycle.install().await
    }

    pub async fn on_activate(&self) -> Result<Vec<String>, StorageError> {
        self.lifecycle.activate().await
    }

    /// `None` lets the request through untouched.
    pub async fn on_fetch(&self, request: &FetchRequest) -> Option<HandledFetch> {
        self.router.handle(request).await
    }

    /// Handles a document command. A missing reply port drops the ack.
    pub async fn on_message(
        &self,
        message: WorkerMessage,
        reply: Option<&dyn ReplyPort>,
    ) -> Result<(), StorageError> {
        log::info!("Message received: {:?}", message);
        match message {
            WorkerMessage::SkipWaiting => {
                self.lifecycle.skip_waiting().await;
                Ok(())
            }
            WorkerMessage::ClearCache => {
                let result = self.lifecycle.clear_all().await;
                match reply {
                    Some(port) => port.post_ack(ClearCacheAck {
                        success: result.is_ok(),
                    }),
                    None => log::debug!("No reply port for CLEAR_CACHE"),
                }
                result.map(|_| ())
            }
            WorkerMessage::SyncGeolocation { payload } => self.store_position(&payload).await,
            WorkerMessage::Unknown => {
                log::debug!("Ignoring unknown message");
                Ok(())
            }
        }
    }

    /// Handles a background sync event; only the geolocation tag does work.
    pub async fn on_sync(&self, tag: &str) -> Option<PositionRecord> {
        if tag != SYNC_GEOLOCATION_TAG {
            log::debug!("Ignoring sync tag {}", tag);
            return None;
        }

        match self.last_position().await {
            Ok(Some(position)) => {
                log::info!("Cached position found ({}, {})", position.lat, position.lng);
                Some(position)
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!("Geolocation sync failed: {}", e);
                None
            }
        }
    }

    pub fn push_notification(&self) -> &NotificationTemplate {
        log::info!("Push received");
        &self.notification
    }

    /// Keeps the position in the geo cache under the synthetic key.
    pub async fn store_position(&self, position: &PositionRecord) -> Result<(), StorageError> {
        let response = Response::json(position)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        let cache = self.store.open(&self.config.cache_names().geo).await?;
        cache
            .put(&FetchRequest::get(self.config.geolocation_key.as_str()), response)
            .await?;
        log::info!("Position synced to the geolocation cache");
        Ok(())
    }

    /// Reads the position kept by [`ServiceWorker::store_position`].
    pub async fn last_position(&self) -> Result<Option<PositionRecord>, StorageError> {
        let cache = self.store.open(&self.config.cache_names().geo).await?;
        let request = FetchRequest::get(self.config.geolocation_key.as_str());
        match cache.match_request(&request).await? {
            Some(response) => serde_json::from_slice(&response.body)
                .map(Some)
                .map_err(|e| StorageError::SerializationError(e.to_string())),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geolocation::UnixMillis;
    use crate::storage::MemoryCacheStore;
    use crate::worker::lifecycle::testing::RecordingHost;
    use crate::worker::strategy::testing::MockNetwork;
    use chrono::NaiveDate;
    use pollster::block_on;
    use std::cell::RefCell;

    #[derive(Default)]
    struct CapturedPort {
        acks: RefCell<Vec<ClearCacheAck>>,
    }

    impl ReplyPort for CapturedPort {
        fn post_ack(&self, ack: ClearCacheAck) {
            self.acks.borrow_mut().push(ack);
        }
    }

    fn worker() -> (
        ServiceWorker<MemoryCacheStore, MockNetwork, RecordingHost>,
        MemoryCacheStore,
        MockNetwork,
    ) {
        let store = MemoryCacheStore::new();
        let network = MockNetwork::new();
        let config = WorkerConfig::new("sig-louga-v2")
            .with_deployed_on(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())
            .with_essential_files(["./index.html"]);
        let worker = ServiceWorker::new(
            config,
            store.clone(),
            network.clone(),
            RecordingHost::default(),
        );
        (worker, store, network)
    }

    fn position() -> PositionRecord {
        PositionRecord::new(15.6144, -16.2286, 10.0, UnixMillis(1714550400000))
    }

    #[test]
    fn test_clear_cache_empties_store_and_acks() {
        let (worker, store, network) = worker();
        network.serve("./index.html", Response::new(200, "<html></html>"));
        block_on(worker.on_install()).unwrap();
        block_on(store.open("sig-louga-v2-runtime")).unwrap();

        let port = CapturedPort::default();
        let reply: &dyn ReplyPort = &port;
        block_on(worker.on_message(WorkerMessage::ClearCache, Some(reply))).unwrap();

        assert!(block_on(store.list_names()).unwrap().is_empty());
        assert_eq!(*port.acks.borrow(), vec![ClearCacheAck { success: true }]);
    }

    #[test]
    fn test_clear_cache_without_port_is_not_an_error() {
        let (worker, store, _) = worker();
        block_on(store.open("sig-louga-v2-api")).unwrap();

        block_on(worker.on_message(WorkerMessage::ClearCache, None)).unwrap();
        assert!(block_on(store.list_names()).unwrap().is_empty());
    }

    #[test]
    fn test_synced_position_is_readable_offline() {
        let (worker, store, network) = worker();
        network.set_offline(true);

        let message = WorkerMessage::SyncGeolocation {
            payload: position(),
        };
        block_on(worker.on_message(message, None)).unwrap();
        assert_eq!(store.entry_count("sig-louga-v2-geolocation"), Some(1));

        assert_eq!(block_on(worker.on_sync("sync-geolocation")), Some(position()));
        assert_eq!(block_on(worker.on_sync("other-tag")), None);
    }

    #[test]
    fn test_sync_without_position_is_none() {
        let (worker, _, _) = worker();
        assert_eq!(block_on(worker.on_sync(SYNC_GEOLOCATION_TAG)), None);
    }

    #[test]
    fn test_unknown_message_is_ignored() {
        let (worker, store, _) = worker();
        block_on(worker.on_message(WorkerMessage::Unknown, None)).unwrap();
        assert!(block_on(store.list_names()).unwrap().is_empty());
    }

    #[test]
    fn test_install_then_activate_then_serve_offline() {
        let (worker, _, network) = worker();
        network.serve("./index.html", Response::new(200, "<html>app</html>"));
        block_on(worker.on_install()).unwrap();
        block_on(worker.on_activate()).unwrap();

        network.set_offline(true);
        let handled =
            block_on(worker.on_fetch(&FetchRequest::navigate("https://sig.example.sn/"))).unwrap();
        assert_eq!(handled.response.unwrap().body_text(), "<html>app</html>");
    }

    #[test]
    fn test_push_template() {
        let (worker, _, _) = worker();
        let template = worker.push_notification();
        assert_eq!(template.title, "SIG Louga");
        assert_eq!(template.tag, "sig-louga-notification");
        assert!(!template.require_interaction);
    }
}
