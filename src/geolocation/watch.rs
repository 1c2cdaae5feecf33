//! Browser geolocation bindings for the map page.

use super::position::{GeolocationError, GeolocationOptions, PositionRecord, UnixMillis};
use super::tracker::{FixAction, GeolocationTracker, WorkerChannel};
use crate::storage::LocalStorageStore;
use crate::worker::WorkerMessage;
use futures_channel::oneshot;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use serde::Serialize;
use wasm_bindgen::JsCast;

/// Prefix of the page's `localStorage` keys.
pub const STORAGE_PREFIX: &str = "sig-louga";

fn geolocation() -> Result<web_sys::Geolocation, GeolocationError> {
    web_sys::window()
        .ok_or(GeolocationError::Unsupported)?
        .navigator()
        .geolocation()
        .map_err(|_| GeolocationError::Unsupported)
}

fn position_options(options: &GeolocationOptions) -> web_sys::PositionOptions {
    let js = web_sys::PositionOptions::new();
    js.set_enable_high_accuracy(options.enable_high_accuracy);
    js.set_timeout(options.timeout_ms);
    js.set_maximum_age(options.maximum_age_ms);
    js
}

fn record_from_js(position: &web_sys::Position) -> PositionRecord {
    let coords = position.coords();
    PositionRecord {
        lat: coords.latitude(),
        lng: coords.longitude(),
        accuracy: coords.accuracy(),
        altitude: coords.altitude(),
        heading: coords.heading(),
        speed: coords.speed(),
        timestamp: UnixMillis(position.timestamp() as i64),
    }
}

type FixCallback = Box<dyn FnMut(Result<PositionRecord, GeolocationError>)>;

/// A running `watchPosition`.
///
/// The watch is cleared when [`GeolocationWatch::cancel`] is called or the
/// value is dropped; either way the cancellation sender goes away and the
/// clearing task wakes up.
pub struct GeolocationWatch {
    cancel: Option<oneshot::Sender<()>>,
}

impl GeolocationWatch {
    pub fn start<F>(options: &GeolocationOptions, on_fix: F) -> Result<Self, GeolocationError>
    where
        F: FnMut(Result<PositionRecord, GeolocationError>) + 'static,
    {
        let geolocation = geolocation()?;
        let on_fix: Rc<RefCell<FixCallback>> = Rc::new(RefCell::new(Box::new(on_fix)));

        let on_success = on_fix.clone();
        let success = Closure::wrap(Box::new(move |position: web_sys::Position| {
            (on_success.borrow_mut())(Ok(record_from_js(&position)));
        }) as Box<dyn FnMut(_)>);

        let failure = Closure::wrap(Box::new(move |error: web_sys::PositionError| {
            (on_fix.borrow_mut())(Err(GeolocationError::from_code(error.code())));
        }) as Box<dyn FnMut(_)>);

        let id = geolocation
            .watch_position_with_error_callback_and_options(
                success.as_ref().unchecked_ref(),
                Some(failure.as_ref().unchecked_ref()),
                &position_options(options),
            )
            .map_err(|_| GeolocationError::Unsupported)?;
        log::info!("Geolocation watch {} started", id);

        let (tx, rx) = oneshot::channel::<()>();
        wasm_bindgen_futures::spawn_local(async move {
            // resolves on send and on sender drop alike
            let _ = rx.await;
            geolocation.clear_watch(id);
            drop(success);
            drop(failure);
            log::info!("Geolocation watch {} cleared", id);
        });

        Ok(Self { cancel: Some(tx) })
    }

    pub fn cancel(mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }
}

/// A single fix.
pub async fn current_position(
    options: &GeolocationOptions,
) -> Result<PositionRecord, GeolocationError> {
    let geolocation = geolocation()?;
    let (tx, rx) = oneshot::channel::<Result<PositionRecord, GeolocationError>>();
    let tx = Rc::new(RefCell::new(Some(tx)));

    let tx_success = tx.clone();
    let success = Closure::wrap(Box::new(move |position: web_sys::Position| {
        if let Some(tx) = tx_success.borrow_mut().take() {
            let _ = tx.send(Ok(record_from_js(&position)));
        }
    }) as Box<dyn FnMut(_)>);

    let tx_error = tx;
    let failure = Closure::wrap(Box::new(move |error: web_sys::PositionError| {
        if let Some(tx) = tx_error.borrow_mut().take() {
            let _ = tx.send(Err(GeolocationError::from_code(error.code())));
        }
    }) as Box<dyn FnMut(_)>);

    geolocation
        .get_current_position_with_error_callback_and_options(
            success.as_ref().unchecked_ref(),
            Some(failure.as_ref().unchecked_ref()),
            &position_options(options),
        )
        .map_err(|_| GeolocationError::Unsupported)?;

    let result = rx
        .await
        .unwrap_or(Err(GeolocationError::PositionUnavailable));

    drop(success);
    drop(failure);
    result
}

/// Posts to the page's controlling service worker; dropped when there is none.
#[derive(Clone, Default)]
pub struct ServiceWorkerChannel;

impl WorkerChannel for ServiceWorkerChannel {
    fn post(&self, message: &WorkerMessage) {
        let Some(controller) = web_sys::window()
            .map(|w| w.navigator().service_worker())
            .and_then(|container| container.controller())
        else {
            log::debug!("No service worker controls this page");
            return;
        };

        let result = serde_wasm_bindgen::to_value(message)
            .map_err(|e| e.to_string())
            .and_then(|value| {
                controller
                    .post_message(&value)
                    .map_err(|e| format!("{:?}", e))
            });
        if let Err(e) = result {
            log::warn!("Failed to post to the service worker: {}", e);
        }
    }
}

type PageTracker = GeolocationTracker<LocalStorageStore, ServiceWorkerChannel>;

/// Geolocation controls exposed to the map page.
///
/// Fixes are reported to `on_fix` as `{lat, lng, accuracy, center, zoom}`;
/// failures are reported to `on_error` as the user-facing message.
#[wasm_bindgen]
pub struct GeolocationSession {
    tracker: Rc<RefCell<PageTracker>>,
    watch: Option<GeolocationWatch>,
    on_fix: js_sys::Function,
    on_error: js_sys::Function,
}

#[derive(serde::Serialize)]
struct FixReport {
    lat: f64,
    lng: f64,
    accuracy: f64,
    center: bool,
    zoom: Option<u8>,
}

#[wasm_bindgen]
impl GeolocationSession {
    #[wasm_bindgen(constructor)]
    pub fn new(on_fix: js_sys::Function, on_error: js_sys::Function) -> Self {
        crate::logging::init();
        let tracker = GeolocationTracker::new(
            LocalStorageStore::new(STORAGE_PREFIX),
            ServiceWorkerChannel,
            GeolocationOptions::default(),
        );
        Self {
            tracker: Rc::new(RefCell::new(tracker)),
            watch: None,
            on_fix,
            on_error,
        }
    }

    #[wasm_bindgen(js_name = isTracking)]
    pub fn is_tracking(&self) -> bool {
        self.watch.is_some()
    }

    /// Starts continuous tracking. Does nothing if already tracking.
    pub fn start(&mut self) -> Result<(), JsValue> {
        if self.watch.is_some() {
            log::warn!("Tracking already active");
            return Ok(());
        }

        let options = self.tracker.borrow().options().clone();
        let tracker = self.tracker.clone();
        let on_fix = self.on_fix.clone();
        let on_error = self.on_error.clone();

        let watch = GeolocationWatch::start(&options, move |result| match result {
            Ok(position) => {
                let tracker = tracker.clone();
                let on_fix = on_fix.clone();
                wasm_bindgen_futures::spawn_local(async move {
                    report_fix(&tracker, &on_fix, position).await;
                });
            }
            Err(error) => report_error(&tracker, &on_error, error),
        });

        match watch {
            Ok(watch) => {
                self.watch = Some(watch);
                self.tracker.borrow_mut().set_tracking(true);
                Ok(())
            }
            Err(error) => {
                report_error(&self.tracker, &self.on_error, error);
                Err(JsValue::from_str(error.user_message()))
            }
        }
    }

    pub fn stop(&mut self) {
        if let Some(watch) = self.watch.take() {
            watch.cancel();
        }
        self.tracker.borrow_mut().set_tracking(false);
    }

    /// Resolves to the position saved by an earlier visit, or `null`.
    #[wasm_bindgen(js_name = loadCachedPosition)]
    pub fn load_cached_position(&self) -> js_sys::Promise {
        let cache = self.tracker.borrow().position_cache().clone();
        wasm_bindgen_futures::future_to_promise(async move {
            let position = cache.load().await;
            serde_wasm_bindgen::to_value(&position).map_err(|e| JsValue::from_str(&e.to_string()))
        })
    }

    /// Track statistics as `{distance, duration, pointCount, averageSpeed}`.
    #[wasm_bindgen(js_name = trackStats)]
    pub fn track_stats(&self) -> Result<JsValue, JsValue> {
        let stats = self.tracker.borrow().track_stats();
        let value = serde_json::json!({
            "distance": stats.distance,
            "duration": stats.duration,
            "pointCount": stats.point_count,
            "averageSpeed": stats.average_speed_kmh,
        });
        value
            .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// The track history as a GeoJSON string.
    #[wasm_bindgen(js_name = exportHistory)]
    pub fn export_history(&self) -> String {
        self.tracker
            .borrow()
            .export_history(chrono::Utc::now())
            .to_string()
    }
}

async fn report_fix(
    tracker: &Rc<RefCell<PageTracker>>,
    on_fix: &js_sys::Function,
    position: PositionRecord,
) {
    let (action, cache) = {
        let mut tracker = tracker.borrow_mut();
        (tracker.record_fix(position.clone()), tracker.position_cache().clone())
    };
    if let Err(e) = cache.save(&position).await {
        log::warn!("Could not cache position: {}", e);
    }

    let (center, zoom) = match action {
        FixAction::CenterOn { zoom, .. } => (true, Some(zoom)),
        FixAction::UpdateMarker => (false, None),
    };
    let report = FixReport {
        lat: position.lat,
        lng: position.lng,
        accuracy: position.accuracy,
        center,
        zoom,
    };

    match serde_wasm_bindgen::to_value(&report) {
        Ok(value) => {
            if let Err(e) = on_fix.call1(&JsValue::NULL, &value) {
                log::warn!("Fix callback failed: {:?}", e);
            }
        }
        Err(e) => log::warn!("Could not encode fix: {}", e),
    }
}

fn report_error(
    tracker: &Rc<RefCell<PageTracker>>,
    on_error: &js_sys::Function,
    error: GeolocationError,
) {
    let message = tracker.borrow().on_error(error);
    if let Err(e) = on_error.call1(&JsValue::NULL, &JsValue::from_str(message)) {
        log::warn!("Error callback failed: {:?}", e);
    }
}
