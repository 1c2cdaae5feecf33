//! Offline support and feature queries for the SIG Louga web map.
//!
//! The crate compiles to two WASM entry points sharing one library:
//!
//! - the service worker ([`worker`]), started with `start_service_worker`,
//!   which keeps the map usable without a network by caching the app shell,
//!   tiles, API responses and GeoJSON data
//! - page-side helpers: [`query`] for attribute and bounding-box queries over
//!   loaded layers, and [`geolocation`] for position tracking
//!
//! Everything except the browser bindings also builds natively, where the
//! in-memory stores in [`storage`] stand in for Cache Storage and
//! `localStorage`.

pub mod config;
pub mod geolocation;
pub mod logging;
pub mod query;
pub mod storage;
pub mod worker;

pub use config::WorkerConfig;
pub use worker::ServiceWorker;
