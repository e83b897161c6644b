use reqwest::Method;
use url::Url;

/// What the requester intends to do with the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Top-level navigation to an HTML document.
    Document,
    Image,
    Script,
    Style,
    Other,
}

/// An outbound request as seen by the proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyRequest {
    pub method: Method,
    pub url: Url,
    pub destination: Destination,
}

impl ProxyRequest {
    pub fn new(method: Method, url: Url, destination: Destination) -> Self {
        Self {
            method,
            url,
            destination,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url, Destination::Other)
    }

    pub fn navigate(url: Url) -> Self {
        Self::new(Method::GET, url, Destination::Document)
    }

    pub fn image(url: Url) -> Self {
        Self::new(Method::GET, url, Destination::Image)
    }

    pub fn is_navigation(&self) -> bool {
        self.destination == Destination::Document
    }

    /// Cache lookup key: the URL without its fragment.
    pub fn cache_key(&self) -> String {
        cache_key(&self.url)
    }
}

pub(crate) fn cache_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

/// Fetch response type, mirroring what a page can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Same-origin response.
    Basic,
    /// Cross-origin response readable through CORS.
    Cors,
    /// Cross-origin response the page cannot inspect.
    Opaque,
    /// Network-level failure materialized as a response.
    Error,
}

/// Where the proxy got a response from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    /// The pre-cached dashboard shell served in place of a failed navigation.
    Shell,
    /// Generated by the proxy when neither network nor cache could answer.
    Synthetic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProxyResponse {
    pub status: u16,
    pub kind: ResponseKind,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub source: ResponseSource,
}

impl ProxyResponse {
    pub fn new(status: u16, kind: ResponseKind, content_type: Option<String>, body: Vec<u8>) -> Self {
        Self {
            status,
            kind,
            content_type,
            body,
            source: ResponseSource::Network,
        }
    }

    pub fn from_source(mut self, source: ResponseSource) -> Self {
        self.source = source;
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status) && matches!(self.kind, ResponseKind::Basic | ResponseKind::Cors)
    }

    /// Plain 200 that is neither opaque nor an error, the only kind the
    /// cache-then-network policy stores.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && matches!(self.kind, ResponseKind::Basic | ResponseKind::Cors)
    }

    /// Minimal page returned for a navigation when nothing else can answer.
    pub fn offline_page() -> Self {
        Self {
            status: 503,
            kind: ResponseKind::Basic,
            content_type: Some("text/html; charset=utf-8".to_string()),
            body: b"<!doctype html><title>Offline</title><h1>You're offline</h1>\
<p>Reconnect to load this page.</p>"
                .to_vec(),
            source: ResponseSource::Synthetic,
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_drops_fragment() {
        let req = ProxyRequest::navigate(Url::parse("https://gym.example/dashboard#today").unwrap());
        assert_eq!(req.cache_key(), "https://gym.example/dashboard");
        assert!(req.is_navigation());
    }

    #[test]
    fn test_cacheable_responses() {
        let ok = ProxyResponse::new(200, ResponseKind::Basic, None, vec![]);
        assert!(ok.is_cacheable());

        let opaque = ProxyResponse::new(200, ResponseKind::Opaque, None, vec![]);
        assert!(!opaque.is_cacheable());
        assert!(!opaque.is_success());

        let created = ProxyResponse::new(201, ResponseKind::Cors, None, vec![]);
        assert!(created.is_success());
        assert!(!created.is_cacheable());

        assert!(!ProxyResponse::new(404, ResponseKind::Basic, None, vec![]).is_cacheable());
    }
}
