//! Request classification.
//!
//! Every intercepted request maps to exactly one [`RequestClass`], or to
//! `None` when the worker must stay out of the way entirely. The checks run
//! in a fixed order; the first match wins.

use super::http::{FetchRequest, RequestMode};
use url::Url;

/// Bucket that decides the caching strategy for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestClass {
    /// Document navigation or anything asking for HTML.
    NavigateHtml,
    /// Stylesheets, scripts and fonts.
    StaticAsset,
    Image,
    /// GeoJSON layers and files under a `data/` directory.
    GeoData,
    /// Map tiles, geocoding and other APIs.
    TileOrApi,
    Default,
}

impl RequestClass {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NavigateHtml => "navigate-html",
            Self::StaticAsset => "static-asset",
            Self::Image => "image",
            Self::GeoData => "geo-data",
            Self::TileOrApi => "tile-or-api",
            Self::Default => "default",
        }
    }
}

impl std::fmt::Display for RequestClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

const STATIC_EXTENSIONS: &[&str] = &["css", "js", "mjs", "woff", "woff2", "ttf", "otf", "eot"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp", "ico"];
const GEO_EXTENSIONS: &[&str] = &["geojson"];
const TILE_MARKERS: &[&str] = &["tile.", "tiles", "nominatim", "api"];

/// Classifies a request.
///
/// Returns `None` for requests the worker must not intercept: non-HTTP(S)
/// schemes, unparseable URLs and hosts matching `bypass_hosts`.
///
/// Extensions are read from the last path segment, so the query string and
/// host never affect the static-asset, image or geo-data decision. Only GET
/// requests are eligible for those classes and for tile-or-api; other
/// methods fall through to `Default`.
pub fn classify(request: &FetchRequest, bypass_hosts: &[String]) -> Option<RequestClass> {
    let url = Url::parse(&request.url).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let host = url.host_str().unwrap_or("").to_ascii_lowercase();
    if bypass_hosts.iter().any(|fragment| host.contains(fragment.as_str())) {
        return None;
    }

    if request.mode == RequestMode::Navigate
        || request
            .header("accept")
            .is_some_and(|accept| accept.contains("text/html"))
    {
        return Some(RequestClass::NavigateHtml);
    }

    if !request.is_get() {
        return Some(RequestClass::Default);
    }

    let path = url.path().to_ascii_lowercase();
    let extension = path_extension(&path);

    if extension.is_some_and(|ext| STATIC_EXTENSIONS.contains(&ext)) {
        return Some(RequestClass::StaticAsset);
    }

    if extension.is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext)) {
        return Some(RequestClass::Image);
    }

    if extension.is_some_and(|ext| GEO_EXTENSIONS.contains(&ext))
        || path.split('/').any(|segment| segment == "data")
    {
        return Some(RequestClass::GeoData);
    }

    let location = format!("{}{}", host, path);
    if TILE_MARKERS.iter().any(|marker| location.contains(marker)) {
        return Some(RequestClass::TileOrApi);
    }

    Some(RequestClass::Default)
}

/// Extension of the last path segment, without the dot.
fn path_extension(path: &str) -> Option<&str> {
    let segment = path.rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bypass() -> Vec<String> {
        vec!["google-analytics".to_string(), "tracking".to_string()]
    }

    fn class_of(url: &str) -> Option<RequestClass> {
        classify(&FetchRequest::get(url), &bypass())
    }

    #[test]
    fn test_non_http_schemes_are_bypassed() {
        assert_eq!(class_of("chrome-extension://abc/script.js"), None);
        assert_eq!(class_of("data:text/plain,hello"), None);
        assert_eq!(class_of("not a url"), None);
    }

    #[test]
    fn test_tracking_hosts_are_bypassed() {
        assert_eq!(class_of("https://www.google-analytics.com/collect"), None);
        assert_eq!(class_of("https://tracking.example.com/pixel.gif"), None);
    }

    #[test]
    fn test_navigation_wins_over_extension() {
        let request = FetchRequest::navigate("https://sig.example.sn/app.js");
        assert_eq!(
            classify(&request, &bypass()),
            Some(RequestClass::NavigateHtml)
        );

        let request = FetchRequest::get("https://sig.example.sn/data/page")
            .with_header("Accept", "text/html,application/xhtml+xml");
        assert_eq!(
            classify(&request, &bypass()),
            Some(RequestClass::NavigateHtml)
        );
    }

    #[test]
    fn test_static_assets_ignore_query_and_host() {
        for url in [
            "https://sig.example.sn/css/custom.css",
            "https://sig.example.sn/js/leaflet.js?v=1.9.4",
            "https://api.tiles.example.com/fonts/roboto.woff2",
            "https://cdn.example.com/data/qgis2web.js#hash",
            "https://sig.example.sn/fonts/icons.TTF?x=image.png",
        ] {
            assert_eq!(class_of(url), Some(RequestClass::StaticAsset), "{}", url);
        }
    }

    #[test]
    fn test_json_is_not_mistaken_for_script() {
        assert_eq!(
            class_of("https://sig.example.sn/manifest.json"),
            Some(RequestClass::Default)
        );
    }

    #[test]
    fn test_images_before_tiles() {
        assert_eq!(
            class_of("https://tile.openstreetmap.org/12/1900/1700.png"),
            Some(RequestClass::Image)
        );
        assert_eq!(
            class_of("https://sig.example.sn/icons/icon-192.svg"),
            Some(RequestClass::Image)
        );
    }

    #[test]
    fn test_geo_data() {
        assert_eq!(
            class_of("https://sig.example.sn/layers/routes.geojson"),
            Some(RequestClass::GeoData)
        );
        assert_eq!(
            class_of("https://sig.example.sn/data/quartiers"),
            Some(RequestClass::GeoData)
        );
        // "metadata" is not a data/ directory
        assert_eq!(
            class_of("https://sig.example.sn/metadata/info"),
            Some(RequestClass::Default)
        );
    }

    #[test]
    fn test_tiles_and_apis() {
        assert_eq!(
            class_of("https://nominatim.openstreetmap.org/search?q=Louga"),
            Some(RequestClass::TileOrApi)
        );
        assert_eq!(
            class_of("https://server.example.com/tiles/3/4/5"),
            Some(RequestClass::TileOrApi)
        );
        assert_eq!(
            class_of("https://sig.example.sn/api/v1/communes"),
            Some(RequestClass::TileOrApi)
        );
    }

    #[test]
    fn test_markers_in_query_are_ignored() {
        assert_eq!(
            class_of("https://sig.example.sn/search?source=api"),
            Some(RequestClass::Default)
        );
    }

    #[test]
    fn test_non_get_falls_back_to_default() {
        let request = FetchRequest::new("POST", "https://sig.example.sn/api/report.js");
        assert_eq!(classify(&request, &bypass()), Some(RequestClass::Default));
    }
}
