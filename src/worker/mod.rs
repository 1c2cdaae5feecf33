//! Offline caching service worker.
//!
//! The worker intercepts the map's network requests and answers them from a
//! set of versioned caches when the network is unreachable:
//!
//! - [`classify`] maps each request to a [`RequestClass`] (or leaves it alone)
//! - [`strategy`] resolves a request with network-first, cache-first or
//!   stale-while-revalidate
//! - [`FetchRouter`] picks strategy, cache and offline fallback per class
//! - [`LifecycleManager`] pre-populates caches on install and retires stale
//!   versions on activation
//! - [`ServiceWorker`] ties these to the install, activate, fetch, message,
//!   sync and push events
//!
//! All of this runs natively against [`crate::storage::MemoryCacheStore`];
//! the browser bindings live in `web` and are only built for WASM.

pub mod classify;
pub mod http;
pub mod lifecycle;
pub mod messages;
pub mod notification;
pub mod router;
pub mod service;
pub mod strategy;

#[cfg(target_arch = "wasm32")]
pub(crate) mod js;
#[cfg(target_arch = "wasm32")]
mod web;

pub use classify::{classify, RequestClass};
pub use http::{
    CachedEntry, FetchRequest, Network, NetworkError, RequestMode, Response, ResponseType,
};
pub use lifecycle::{HostError, InstallReport, LifecycleManager, WorkerHost, WorkerState};
pub use messages::{ClearCacheAck, ClientMessage, ReplyPort, WorkerMessage};
pub use notification::NotificationTemplate;
pub use router::{Fallback, FetchRouter, HandledFetch, Route};
pub use service::{ServiceWorker, SYNC_GEOLOCATION_TAG};
pub use strategy::{Strategy, StrategyOutcome};

#[cfg(target_arch = "wasm32")]
pub use web::{start_service_worker, BrowserHost, BrowserNetwork};
