//! Position records, watch options and geolocation errors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix timestamp in milliseconds.
///
/// Milliseconds match the host's position timestamps and `Date.now()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnixMillis(pub i64);

impl UnixMillis {
    pub fn now() -> Self {
        use web_time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as i64)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Seconds elapsed from `earlier` to `self`.
    pub fn seconds_since(&self, earlier: UnixMillis) -> f64 {
        (self.0 - earlier.0) as f64 / 1000.0
    }
}

impl fmt::Display for UnixMillis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One position fix, in the JSON shape persisted and posted to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub lat: f64,
    pub lng: f64,
    /// Horizontal accuracy radius in meters.
    pub accuracy: f64,
    pub altitude: Option<f64>,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub timestamp: UnixMillis,
}

impl PositionRecord {
    pub fn new(lat: f64, lng: f64, accuracy: f64, timestamp: UnixMillis) -> Self {
        Self {
            lat,
            lng,
            accuracy,
            altitude: None,
            heading: None,
            speed: None,
            timestamp,
        }
    }
}

/// Options for acquiring positions.
#[derive(Debug, Clone, PartialEq)]
pub struct GeolocationOptions {
    pub enable_high_accuracy: bool,
    /// Milliseconds before a fix attempt reports [`GeolocationError::Timeout`].
    pub timeout_ms: u32,
    /// Maximum age of a cached fix the host may return, in milliseconds.
    pub maximum_age_ms: u32,
    /// Number of fixes kept in the track history.
    pub max_history: usize,
}

impl Default for GeolocationOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout_ms: 10_000,
            maximum_age_ms: 0,
            max_history: 100,
        }
    }
}

/// Why a position could not be obtained. None of these are fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeolocationError {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
    /// The platform has no location API.
    Unsupported,
}

impl GeolocationError {
    /// Maps a host `PositionError.code`.
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => Self::PermissionDenied,
            3 => Self::Timeout,
            _ => Self::PositionUnavailable,
        }
    }

    /// Message shown to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied => {
                "Géolocalisation refusée. Autorisez l'accès dans les paramètres."
            }
            Self::PositionUnavailable => "Position non disponible. Vérifiez votre connexion GPS.",
            Self::Timeout => "Délai dépassé pour obtenir la position.",
            Self::Unsupported => "Géolocalisation non supportée",
        }
    }
}

impl fmt::Display for GeolocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::PositionUnavailable => write!(f, "position unavailable"),
            Self::Timeout => write!(f, "timeout"),
            Self::Unsupported => write!(f, "geolocation unsupported"),
        }
    }
}

impl std::error::Error for GeolocationError {}

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two lat/lng pairs (haversine).
pub fn haversine_distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_json_shape() {
        let record = PositionRecord::new(15.6144, -16.2286, 12.0, UnixMillis(1700000000000));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["lat"], 15.6144);
        assert_eq!(json["lng"], -16.2286);
        assert_eq!(json["timestamp"], 1700000000000i64);
        assert!(json["altitude"].is_null());
    }

    #[test]
    fn test_error_codes_have_distinct_messages() {
        let denied = GeolocationError::from_code(1);
        let unavailable = GeolocationError::from_code(2);
        let timeout = GeolocationError::from_code(3);

        assert_eq!(denied, GeolocationError::PermissionDenied);
        assert_eq!(unavailable, GeolocationError::PositionUnavailable);
        assert_eq!(timeout, GeolocationError::Timeout);
        assert_ne!(denied.user_message(), unavailable.user_message());
        assert_ne!(unavailable.user_message(), timeout.user_message());
    }

    #[test]
    fn test_haversine_one_degree_of_latitude() {
        let d = haversine_distance(15.0, -16.0, 16.0, -16.0);
        assert!((d - 111_195.0).abs() < 10.0);
        assert_eq!(haversine_distance(15.6, -16.2, 15.6, -16.2), 0.0);
    }
}
