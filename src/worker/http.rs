//! Request and response model shared by the router, the strategies and the
//! cache store.
//!
//! Responses are plain values: copying one for the cache is an explicit
//! `clone()` taken before the caller consumes the original.

use std::future::Future;

/// Request mode as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level document navigation.
    Navigate,
    SameOrigin,
    NoCors,
    #[default]
    Cors,
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    pub mode: RequestMode,
    /// Header names are stored lower-cased.
    pub headers: Vec<(String, String)>,
    /// The host request this value was read from, replayed on fetch.
    #[cfg(target_arch = "wasm32")]
    pub native: Option<web_sys::Request>,
}

impl FetchRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            mode: RequestMode::default(),
            headers: Vec::new(),
            #[cfg(target_arch = "wasm32")]
            native: None,
        }
    }

    /// A plain GET request, as used for manifest entries and synthetic keys.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// A navigation request for a document.
    pub fn navigate(url: impl Into<String>) -> Self {
        Self::get(url).with_mode(RequestMode::Navigate)
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    /// Identity under which the response is cached.
    ///
    /// The fragment never reaches the server, so it is not part of the key.
    pub fn cache_key(&self) -> &str {
        match self.url.find('#') {
            Some(idx) => &self.url[..idx],
            None => &self.url,
        }
    }
}

/// Response classification as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum ResponseType {
    #[default]
    Basic,
    Cors,
    Default,
    /// Cross-origin no-cors response; status and body are hidden.
    Opaque,
    /// Network error placeholder.
    Error,
}

/// A complete response.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub response_type: ResponseType,
    /// The host response this value was read from, returned untouched when
    /// the response is handed back to the document.
    #[cfg(target_arch = "wasm32")]
    pub native: Option<web_sys::Response>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: default_status_text(status).to_string(),
            body: body.into(),
            ..Default::default()
        }
    }

    /// A synthesized UTF-8 plain-text response.
    pub fn text(status: u16, body: &str) -> Self {
        Self::new(status, body.as_bytes().to_vec())
            .with_header("content-type", "text/plain; charset=utf-8")
    }

    /// A synthesized JSON response.
    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new(200, body).with_header("content-type", "application/json"))
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True for any 2xx status.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Only complete 200 responses with a readable body are cached.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200
            && !matches!(
                self.response_type,
                ResponseType::Opaque | ResponseType::Error
            )
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn default_status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        503 => "Service Unavailable",
        _ => "",
    }
}

/// Errors from the network transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// The request never produced a response (offline, DNS, CORS).
    Transport(String),
    /// The response could not be read.
    Body(String),
}

impl std::fmt::Display for NetworkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkError::Transport(msg) => write!(f, "Network request failed: {}", msg),
            NetworkError::Body(msg) => write!(f, "Failed to read response body: {}", msg),
        }
    }
}

impl std::error::Error for NetworkError {}

/// Network transport consumed by the strategies.
///
/// Like the storage traits this carries no `Send` bound: the worker is
/// single-threaded.
pub trait Network {
    fn fetch(&self, request: &FetchRequest)
        -> impl Future<Output = Result<Response, NetworkError>>;
}

/// Serializable snapshot of a cached response.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CachedEntry {
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,
    pub response_type: ResponseType,
}

impl CachedEntry {
    pub fn new(request: &FetchRequest, response: &Response) -> Self {
        Self {
            url: request.cache_key().to_string(),
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
            body: response.body.clone(),
            response_type: response.response_type,
        }
    }

    pub fn into_response(self) -> Response {
        Response {
            status: self.status,
            status_text: self.status_text,
            headers: self.headers,
            body: self.body,
            response_type: self.response_type,
            ..Default::default()
        }
    }
}

mod body_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
