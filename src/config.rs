//! Service worker configuration.
//!
//! Every name the worker derives (cache names, fallback texts, the synthetic
//! geolocation key) comes from a single [`WorkerConfig`] handed to the worker
//! at construction, so two deployments can run side by side in tests.

use chrono::NaiveDate;

/// Deployment configuration for the offline service worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Version tag prefixed to every cache name (e.g. "sig-louga-v2").
    pub version: String,
    /// Deployment date, used to name the main cache.
    pub deployed_on: NaiveDate,
    /// Root-relative files cached at install time, in order.
    pub essential_files: Vec<String>,
    /// Host name fragments whose requests are never intercepted.
    pub bypass_hosts: Vec<String>,
    /// Path of the document shell served when a navigation fails offline.
    pub offline_page: String,
    /// Key under which the last known position is kept in the geo cache.
    pub geolocation_key: String,
    /// Body of the 503 returned when no page can be served.
    pub page_unavailable_text: String,
    /// Body of the 503 returned for tile and API requests.
    pub resource_unavailable_text: String,
    /// Body of the 503 returned for every other request.
    pub offline_text: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            version: "sig-louga-v2".to_string(),
            deployed_on: chrono::Utc::now().date_naive(),
            essential_files: [
                "./",
                "./index.html",
                "./manifest.json",
                "./css/custom.css",
                "./css/leaflet.css",
                "./js/leaflet.js",
                "./sw.js",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            bypass_hosts: vec!["google-analytics".to_string(), "tracking".to_string()],
            offline_page: "./index.html".to_string(),
            geolocation_key: "./offline/last-geolocation.json".to_string(),
            page_unavailable_text: "Page non disponible. Vérifiez votre connexion.".to_string(),
            resource_unavailable_text: "Ressource non disponible hors-ligne".to_string(),
            offline_text: "Offline".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Creates a configuration for the given version tag with default values.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Default::default()
        }
    }

    /// Sets the deployment date.
    pub fn with_deployed_on(mut self, date: NaiveDate) -> Self {
        self.deployed_on = date;
        self
    }

    /// Replaces the essential file manifest.
    pub fn with_essential_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.essential_files = files.into_iter().map(Into::into).collect();
        self
    }

    /// Derives the cache names for this deployment.
    pub fn cache_names(&self) -> CacheNames {
        CacheNames::new(&self.version, self.deployed_on)
    }
}

/// The named caches owned by one deployed version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    version: String,
    /// Dated cache holding the essential files.
    pub main: String,
    /// Pages and uncategorised responses.
    pub runtime: String,
    /// Stylesheets, scripts, fonts and images.
    pub resources: String,
    /// Tiles and third-party API responses.
    pub api: String,
    /// GeoJSON data and the last known position.
    pub geo: String,
}

impl CacheNames {
    pub fn new(version: &str, deployed_on: NaiveDate) -> Self {
        Self {
            version: version.to_string(),
            main: format!("{}-{}", version, deployed_on.format("%Y-%m-%d")),
            runtime: format!("{}-runtime", version),
            resources: format!("{}-resources", version),
            api: format!("{}-api", version),
            geo: format!("{}-geolocation", version),
        }
    }

    /// The version tag shared by every live cache.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns true if `name` belongs to this deployment.
    ///
    /// Anything else is stale and is removed on activation.
    pub fn is_live(&self, name: &str) -> bool {
        name.starts_with(&self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[test]
    fn test_cache_names_share_version_prefix() {
        let names = WorkerConfig::new("sig-louga-v2")
            .with_deployed_on(date())
            .cache_names();

        assert_eq!(names.main, "sig-louga-v2-2024-05-01");
        assert_eq!(names.runtime, "sig-louga-v2-runtime");
        assert_eq!(names.resources, "sig-louga-v2-resources");
        assert_eq!(names.api, "sig-louga-v2-api");
        assert_eq!(names.geo, "sig-louga-v2-geolocation");

        for name in [&names.main, &names.runtime, &names.api, &names.geo] {
            assert!(names.is_live(name));
        }
    }

    #[test]
    fn test_old_version_is_stale() {
        let names = CacheNames::new("sig-louga-v2", date());
        assert!(!names.is_live("sig-louga-v1-runtime"));
        assert!(!names.is_live("other-app-cache"));
    }

    #[test]
    fn test_default_manifest_includes_worker_script() {
        let config = WorkerConfig::default();
        assert_eq!(config.essential_files.first().map(String::as_str), Some("./"));
        assert!(config.essential_files.iter().any(|f| f == "./sw.js"));
    }
}
