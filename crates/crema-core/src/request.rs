//! Intercepted requests and the responses handed back to clients.

use bytes::Bytes;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

/// Fetch mode of an intercepted request (`Sec-Fetch-Mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Top-level page navigation.
    Navigate,
    SameOrigin,
    #[default]
    Cors,
    NoCors,
}

impl RequestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMode::Navigate => "navigate",
            RequestMode::SameOrigin => "same-origin",
            RequestMode::Cors => "cors",
            RequestMode::NoCors => "no-cors",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "navigate" => Some(RequestMode::Navigate),
            "same-origin" => Some(RequestMode::SameOrigin),
            "cors" => Some(RequestMode::Cors),
            "no-cors" => Some(RequestMode::NoCors),
            _ => None,
        }
    }
}

/// Destination of an intercepted request (`Sec-Fetch-Dest`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestDestination {
    Document,
    Script,
    Style,
    Image,
    Font,
    Manifest,
    #[default]
    Empty,
    Other,
}

impl RequestDestination {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "document" | "iframe" | "frame" => RequestDestination::Document,
            "script" | "worker" | "sharedworker" => RequestDestination::Script,
            "style" => RequestDestination::Style,
            "image" => RequestDestination::Image,
            "font" => RequestDestination::Font,
            "manifest" => RequestDestination::Manifest,
            "" | "empty" => RequestDestination::Empty,
            _ => RequestDestination::Other,
        }
    }
}

/// A request seen by the fetch handler.
#[derive(Debug, Clone)]
pub struct WorkerRequest {
    pub method: Method,
    pub url: Url,
    /// Routing and the offline fallback key off this, not `destination`.
    pub mode: RequestMode,
    /// As reported by the runtime; carried for logging only.
    pub destination: RequestDestination,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl WorkerRequest {
    /// A plain `GET` subresource request.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            mode: RequestMode::default(),
            destination: RequestDestination::default(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// A top-level page navigation.
    pub fn navigate(url: Url) -> Self {
        Self {
            mode: RequestMode::Navigate,
            destination: RequestDestination::Document,
            ..Self::get(url)
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_destination(mut self, destination: RequestDestination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Only `GET` requests are stored in or matched from cache buckets.
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET
    }

    /// Bucket key: the absolute URL without its fragment.
    pub fn cache_key(&self) -> String {
        cache_key_for(&self.url)
    }
}

/// Bucket key for an absolute URL.
pub fn cache_key_for(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

/// Response body plus the metadata needed to replay it.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerResponse {
    /// URL the response was fetched from.
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl WorkerResponse {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Status 200 exactly; network-first stores nothing else.
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value with the given name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_and_destination_parsing() {
        assert_eq!(RequestMode::parse("navigate"), Some(RequestMode::Navigate));
        assert_eq!(RequestMode::parse("NO-CORS"), Some(RequestMode::NoCors));
        assert_eq!(RequestMode::parse("websocket"), None);
        assert_eq!(RequestDestination::parse("iframe"), RequestDestination::Document);
        assert_eq!(RequestDestination::parse("font"), RequestDestination::Font);
        assert_eq!(RequestDestination::parse("audio"), RequestDestination::Other);
    }

    #[test]
    fn test_cache_key_drops_fragment_keeps_query() {
        let request =
            WorkerRequest::get(Url::parse("https://portal.example/api/announcements?page=2#top").unwrap());
        assert_eq!(
            request.cache_key(),
            "https://portal.example/api/announcements?page=2"
        );
    }

    #[test]
    fn test_only_get_is_cacheable() {
        let url = Url::parse("https://portal.example/api/announcements").unwrap();
        assert!(WorkerRequest::get(url.clone()).is_cacheable());
        assert!(!WorkerRequest::get(url).with_method(Method::POST).is_cacheable());
    }

    #[test]
    fn test_navigate_sets_document_destination() {
        let request = WorkerRequest::navigate(Url::parse("https://portal.example/").unwrap());
        assert!(request.is_navigation());
        assert_eq!(request.destination, RequestDestination::Document);
    }

    #[test]
    fn test_response_header_lookup() {
        let response = WorkerResponse::new("https://portal.example/", 200, "ok")
            .with_header("Content-Type", "text/html");
        assert_eq!(response.header("content-type"), Some("text/html"));
        assert!(response.is_ok());
        assert!(!WorkerResponse::new("x", 204, "").is_ok());
    }
}
