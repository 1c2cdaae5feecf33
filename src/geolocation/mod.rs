//! User position tracking for the map page.
//!
//! [`GeolocationTracker`] keeps the last fix and a bounded track history,
//! persists the last fix through a [`KeyValueStore`](crate::storage::KeyValueStore)
//! and forwards each fix to the service worker. On wasm32 the browser's
//! `watchPosition` drives it through [`GeolocationSession`].

pub mod position;
pub mod tracker;

#[cfg(target_arch = "wasm32")]
mod watch;

pub use position::{
    haversine_distance, GeolocationError, GeolocationOptions, PositionRecord, UnixMillis,
};
pub use tracker::{
    FixAction, GeolocationTracker, HistoryEntry, PositionCache, TrackStats, WorkerChannel,
    FIRST_FIX_ZOOM, LAST_POSITION_KEY,
};

#[cfg(target_arch = "wasm32")]
pub use watch::{
    current_position, GeolocationSession, GeolocationWatch, ServiceWorkerChannel, STORAGE_PREFIX,
};
