//! Position tracking state kept by the map page.

use super::position::{
    haversine_distance, GeolocationError, GeolocationOptions, PositionRecord, UnixMillis,
};
use crate::storage::{KeyValueStore, StorageError};
use crate::worker::WorkerMessage;
use chrono::{DateTime, Utc};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;

/// Key of the last known position in the page's key-value store.
pub const LAST_POSITION_KEY: &str = "last-position";

/// Zoom used to frame the map on the first fix.
pub const FIRST_FIX_ZOOM: u8 = 15;

/// Delivers messages to the active service worker, if there is one.
pub trait WorkerChannel {
    fn post(&self, message: &WorkerMessage);
}

/// A fix as kept in the track history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub position: PositionRecord,
    pub added_at: UnixMillis,
}

/// What the map should do after a fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FixAction {
    /// First fix: center on it at the given zoom.
    CenterOn { lat: f64, lng: f64, zoom: u8 },
    /// Move the marker only.
    UpdateMarker,
}

/// Summary of the recorded track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackStats {
    /// Meters along the recorded fixes.
    pub distance: f64,
    /// Seconds between the first and last fix.
    pub duration: f64,
    pub point_count: usize,
    /// `None` until two fixes at different times exist.
    pub average_speed_kmh: Option<f64>,
}

/// Where the last fix is kept between visits, and who hears about it.
///
/// Cloned out of the tracker so the write can be awaited without holding
/// the tracker.
#[derive(Clone)]
pub struct PositionCache<K, C> {
    store: K,
    channel: C,
}

impl<K: KeyValueStore, C: WorkerChannel> PositionCache<K, C> {
    pub fn new(store: K, channel: C) -> Self {
        Self { store, channel }
    }

    /// Persists the position and forwards it to the service worker.
    pub async fn save(&self, position: &PositionRecord) -> Result<(), StorageError> {
        self.store.put(LAST_POSITION_KEY, position).await?;
        self.channel.post(&WorkerMessage::SyncGeolocation {
            payload: position.clone(),
        });
        Ok(())
    }

    /// The position saved by an earlier session, if readable.
    pub async fn load(&self) -> Option<PositionRecord> {
        match self.store.get::<PositionRecord>(LAST_POSITION_KEY).await {
            Ok(Some(position)) => {
                log::info!("Cached position restored");
                Some(position)
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!("Could not load cached position: {}", e);
                None
            }
        }
    }
}

pub struct GeolocationTracker<K, C> {
    cache: PositionCache<K, C>,
    options: GeolocationOptions,
    history: VecDeque<HistoryEntry>,
    last_position: Option<PositionRecord>,
    first_fix_seen: bool,
    tracking: bool,
}

impl<K: KeyValueStore, C: WorkerChannel> GeolocationTracker<K, C> {
    pub fn new(store: K, channel: C, options: GeolocationOptions) -> Self {
        Self {
            cache: PositionCache::new(store, channel),
            history: VecDeque::with_capacity(options.max_history),
            options,
            last_position: None,
            first_fix_seen: false,
            tracking: false,
        }
    }

    pub fn options(&self) -> &GeolocationOptions {
        &self.options
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn set_tracking(&mut self, tracking: bool) {
        if self.tracking != tracking {
            log::info!("Geolocation tracking {}", if tracking { "started" } else { "stopped" });
        }
        self.tracking = tracking;
    }

    pub fn last_position(&self) -> Option<&PositionRecord> {
        self.last_position.as_ref()
    }

    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    pub fn position_cache(&self) -> &PositionCache<K, C> {
        &self.cache
    }

    /// Records a new fix, persists it and tells the map what to do.
    pub async fn on_position(&mut self, position: PositionRecord) -> FixAction {
        let action = self.record_fix(position.clone());
        if let Err(e) = self.cache_position(&position).await {
            log::warn!("Could not cache position: {}", e);
        }
        action
    }

    /// Updates history and the first-fix state without persisting anything.
    pub fn record_fix(&mut self, position: PositionRecord) -> FixAction {
        log::info!(
            "Position: {:.5}, {:.5} (±{:.0}m)",
            position.lat,
            position.lng,
            position.accuracy
        );

        self.push_history(position.clone());
        self.last_position = Some(position.clone());

        if self.first_fix_seen {
            FixAction::UpdateMarker
        } else {
            self.first_fix_seen = true;
            FixAction::CenterOn {
                lat: position.lat,
                lng: position.lng,
                zoom: FIRST_FIX_ZOOM,
            }
        }
    }

    /// Logs a failed fix and returns the message for the user.
    pub fn on_error(&self, error: GeolocationError) -> &'static str {
        log::warn!("Geolocation error: {}", error);
        error.user_message()
    }

    fn push_history(&mut self, position: PositionRecord) {
        self.history.push_back(HistoryEntry {
            position,
            added_at: UnixMillis::now(),
        });
        while self.history.len() > self.options.max_history {
            self.history.pop_front();
        }
    }

    /// Persists the position and forwards it to the service worker.
    pub async fn cache_position(&self, position: &PositionRecord) -> Result<(), StorageError> {
        self.cache.save(position).await
    }

    /// The position saved by an earlier session, if readable.
    pub async fn load_cached_position(&self) -> Option<PositionRecord> {
        self.cache.load().await
    }

    pub fn track_stats(&self) -> TrackStats {
        let point_count = self.history.len();
        let (Some(first), Some(last)) = (self.history.front(), self.history.back()) else {
            return TrackStats {
                distance: 0.0,
                duration: 0.0,
                point_count,
                average_speed_kmh: None,
            };
        };

        let distance: f64 = self
            .history
            .iter()
            .zip(self.history.iter().skip(1))
            .map(|(a, b)| {
                haversine_distance(a.position.lat, a.position.lng, b.position.lat, b.position.lng)
            })
            .sum();
        let duration = last.position.timestamp.seconds_since(first.position.timestamp);
        let average_speed_kmh = (duration > 0.0).then(|| (distance / 1000.0) / (duration / 3600.0));

        TrackStats {
            distance,
            duration,
            point_count,
            average_speed_kmh,
        }
    }

    /// The track history as GeoJSON points, oldest first.
    pub fn export_history(&self, created_at: DateTime<Utc>) -> FeatureCollection {
        let features = self
            .history
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let p = &entry.position;
                let mut properties = JsonObject::new();
                properties.insert("index".to_string(), json!(index));
                properties.insert("accuracy".to_string(), json!(p.accuracy));
                properties.insert("altitude".to_string(), json!(p.altitude));
                properties.insert("timestamp".to_string(), json!(p.timestamp));
                properties.insert("speed".to_string(), json!(p.speed));
                Feature {
                    bbox: None,
                    geometry: Some(Geometry::new(Value::Point(vec![p.lng, p.lat]))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        let mut foreign_members = JsonObject::new();
        foreign_members.insert(
            "properties".to_string(),
            json!({
                "name": "Historique de géolocalisation SIG Louga",
                "createdAt": created_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            }),
        );

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(foreign_members),
        }
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use pollster::block_on;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct RecordingChannel {
        posted: Rc<RefCell<Vec<WorkerMessage>>>,
    }

    impl WorkerChannel for RecordingChannel {
        fn post(&self, message: &WorkerMessage) {
            self.posted.borrow_mut().push(message.clone());
        }
    }

    type TestTracker = GeolocationTracker<MemoryStore, RecordingChannel>;

    fn tracker(max_history: usize) -> (TestTracker, MemoryStore, RecordingChannel) {
        let store = MemoryStore::new();
        let channel = RecordingChannel::default();
        let options = GeolocationOptions {
            max_history,
            ..Default::default()
        };
        (
            GeolocationTracker::new(store.clone(), channel.clone(), options),
            store,
            channel,
        )
    }

    fn fix(lat: f64, seconds: i64) -> PositionRecord {
        PositionRecord::new(lat, -16.2286, 5.0, UnixMillis(1_714_550_400_000 + seconds * 1000))
    }

    #[test]
    fn test_only_first_fix_centers_map() {
        let (mut tracker, _, _) = tracker(100);
        assert_eq!(
            block_on(tracker.on_position(fix(15.6, 0))),
            FixAction::CenterOn {
                lat: 15.6,
                lng: -16.2286,
                zoom: 15
            }
        );
        assert_eq!(block_on(tracker.on_position(fix(15.7, 10))), FixAction::UpdateMarker);
        assert_eq!(tracker.last_position().unwrap().lat, 15.7);
    }

    #[test]
    fn test_fix_is_persisted_and_posted() {
        let (mut tracker, store, channel) = tracker(100);
        block_on(tracker.on_position(fix(15.6, 0)));

        let saved: PositionRecord = block_on(store.get(LAST_POSITION_KEY)).unwrap().unwrap();
        assert_eq!(saved, fix(15.6, 0));
        assert_eq!(
            *channel.posted.borrow(),
            vec![WorkerMessage::SyncGeolocation {
                payload: fix(15.6, 0)
            }]
        );
        assert_eq!(block_on(tracker.load_cached_position()), Some(fix(15.6, 0)));
    }

    #[test]
    fn test_history_is_bounded() {
        let (mut tracker, _, _) = tracker(3);
        for i in 0..5 {
            block_on(tracker.on_position(fix(15.0 + i as f64, i)));
        }
        let lats: Vec<f64> = tracker.history().map(|e| e.position.lat).collect();
        assert_eq!(lats, vec![17.0, 18.0, 19.0]);
    }

    #[test]
    fn test_track_stats() {
        let (mut tracker, _, _) = tracker(100);
        assert_eq!(tracker.track_stats().point_count, 0);
        assert_eq!(tracker.track_stats().average_speed_kmh, None);

        block_on(tracker.on_position(fix(15.0, 0)));
        block_on(tracker.on_position(fix(15.01, 3600)));
        let stats = tracker.track_stats();
        assert_eq!(stats.point_count, 2);
        assert_eq!(stats.duration, 3600.0);
        assert!((stats.distance - 1112.0).abs() < 1.0);
        assert!((stats.average_speed_kmh.unwrap() - 1.112).abs() < 0.001);
    }

    #[test]
    fn test_export_history_geojson() {
        let (mut tracker, _, _) = tracker(100);
        block_on(tracker.on_position(fix(15.6, 0)));
        let created = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let collection = tracker.export_history(created);
        assert_eq!(collection.features.len(), 1);
        let json = serde_json::to_value(&collection).unwrap();
        assert_eq!(json["features"][0]["geometry"]["coordinates"][0], -16.2286);
        assert_eq!(json["features"][0]["properties"]["index"], 0);
        assert_eq!(json["properties"]["createdAt"], "2024-05-01T12:00:00.000Z");
    }

    #[test]
    fn test_errors_are_reported_not_fatal() {
        let (tracker, _, _) = tracker(100);
        assert_eq!(
            tracker.on_error(GeolocationError::Timeout),
            "Délai dépassé pour obtenir la position."
        );
    }

    #[test]
    fn test_fix_recorded_before_persisting() {
        let (mut tracker, store, channel) = tracker(100);
        let action = tracker.record_fix(fix(15.6, 0));
        assert!(matches!(action, FixAction::CenterOn { .. }));
        assert_eq!(tracker.history().count(), 1);
        assert!(channel.posted.borrow().is_empty());

        // The cache is usable while the tracker keeps taking fixes.
        let cache = tracker.position_cache().clone();
        assert_eq!(tracker.record_fix(fix(15.7, 10)), FixAction::UpdateMarker);
        block_on(cache.save(&fix(15.7, 10))).unwrap();

        let saved: PositionRecord = block_on(store.get(LAST_POSITION_KEY)).unwrap().unwrap();
        assert_eq!(saved.lat, 15.7);
        assert_eq!(channel.posted.borrow().len(), 1);
        assert_eq!(block_on(cache.load()), Some(fix(15.7, 10)));
    }
}
