//! Per-request routing policy.

use reqwest::Method;
use url::Url;

use super::{CacheVersionTag, Destination, ProxyRequest};

/// File extensions treated as image assets even when the request does not
/// declare an image destination.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "avif", "svg", "ico"];

/// How the proxy answers a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Not intercepted, straight to the network.
    PassThrough,
    /// Serve the cached copy now, refresh it in the background.
    StaleWhileRevalidate,
    /// Serve from cache when present, otherwise fetch and cache.
    CacheFirst,
    /// Fetch and cache, fall back to the cached copy.
    NetworkFirst,
}

/// Deployment-time configuration of one proxy build.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub version: CacheVersionTag,
    pub app_origin: Url,
    pub backend_origin: Option<Url>,
    /// Routes pre-cached at install, relative to `app_origin`.
    pub shell_routes: Vec<String>,
    /// Shell route served when a navigation fails offline.
    pub fallback_route: String,
    /// Route prefix whose navigations are served cache-first.
    pub dashboard_prefix: String,
    /// App route prefixes that are never intercepted.
    pub bypass_prefixes: Vec<String>,
    /// Backend path prefixes that are never intercepted (auth, functions).
    pub backend_bypass_prefixes: Vec<String>,
}

impl ProxyConfig {
    pub fn new(version: CacheVersionTag, app_origin: Url) -> Self {
        Self {
            version,
            app_origin,
            backend_origin: None,
            shell_routes: default_shell_routes(),
            fallback_route: "/dashboard".to_string(),
            dashboard_prefix: "/dashboard".to_string(),
            bypass_prefixes: vec!["/api/".to_string(), "/admin".to_string()],
            backend_bypass_prefixes: vec!["/auth/".to_string()],
        }
    }

    pub fn with_backend(mut self, backend_origin: Url) -> Self {
        self.backend_origin = Some(backend_origin);
        self
    }

    pub fn with_shell_routes(mut self, routes: Vec<String>, fallback_route: impl Into<String>) -> Self {
        self.shell_routes = routes;
        self.fallback_route = fallback_route.into();
        self
    }

    pub fn shell_urls(&self) -> Vec<Url> {
        self.shell_routes
            .iter()
            .filter_map(|route| self.app_origin.join(route).ok())
            .collect()
    }

    pub fn fallback_url(&self) -> Option<Url> {
        self.app_origin.join(&self.fallback_route).ok()
    }

    fn is_app_origin(&self, url: &Url) -> bool {
        url.origin() == self.app_origin.origin()
    }

    fn is_backend_origin(&self, url: &Url) -> bool {
        self.backend_origin
            .as_ref()
            .map(|backend| url.origin() == backend.origin())
            .unwrap_or(false)
    }

    /// Pick the strategy for a request.
    pub fn classify(&self, request: &ProxyRequest) -> Strategy {
        if request.method != Method::GET {
            return Strategy::PassThrough;
        }

        let url = &request.url;
        let path = url.path();
        let same_origin = self.is_app_origin(url);
        let backend = self.is_backend_origin(url);

        if !same_origin && !backend {
            return Strategy::PassThrough;
        }
        if same_origin && self.bypass_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            return Strategy::PassThrough;
        }
        if backend && self.backend_bypass_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            return Strategy::PassThrough;
        }

        if is_image(request) {
            return Strategy::CacheFirst;
        }
        if backend {
            return Strategy::StaleWhileRevalidate;
        }
        if request.is_navigation() && path.starts_with(self.dashboard_prefix.as_str()) {
            return Strategy::CacheFirst;
        }
        Strategy::NetworkFirst
    }
}

/// Home, dashboard, catalog, auth and favicon.
pub fn default_shell_routes() -> Vec<String> {
    ["/", "/dashboard", "/exercises", "/routines", "/login", "/favicon.ico"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn is_image(request: &ProxyRequest) -> bool {
    if request.destination == Destination::Image {
        return true;
    }
    request
        .url
        .path()
        .rsplit_once('.')
        .map(|(_, ext)| IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProxyConfig {
        ProxyConfig::new(CacheVersionTag::new("v2"), Url::parse("https://gym.example").unwrap())
            .with_backend(Url::parse("https://db.example.co").unwrap())
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_non_get_and_foreign_origins_pass_through() {
        let config = config();
        let post = ProxyRequest::new(Method::POST, url("https://gym.example/routines"), Destination::Other);
        assert_eq!(config.classify(&post), Strategy::PassThrough);

        let foreign = ProxyRequest::get(url("https://fonts.example/font.woff2"));
        assert_eq!(config.classify(&foreign), Strategy::PassThrough);
    }

    #[test]
    fn test_api_and_admin_routes_bypass() {
        let config = config();
        assert_eq!(
            config.classify(&ProxyRequest::get(url("https://gym.example/api/members"))),
            Strategy::PassThrough
        );
        assert_eq!(
            config.classify(&ProxyRequest::navigate(url("https://gym.example/admin/users"))),
            Strategy::PassThrough
        );
        assert_eq!(
            config.classify(&ProxyRequest::get(url("https://db.example.co/auth/v1/token"))),
            Strategy::PassThrough
        );
    }

    #[test]
    fn test_backend_data_is_stale_while_revalidate() {
        let req = ProxyRequest::get(url("https://db.example.co/rest/v1/routines?select=*"));
        assert_eq!(config().classify(&req), Strategy::StaleWhileRevalidate);
    }

    #[test]
    fn test_images_and_dashboard_are_cache_first() {
        let config = config();
        let photo = ProxyRequest::get(url("https://db.example.co/storage/v1/object/public/squat.JPG"));
        assert_eq!(config.classify(&photo), Strategy::CacheFirst);
        assert_eq!(
            config.classify(&ProxyRequest::image(url("https://gym.example/_next/image?w=640"))),
            Strategy::CacheFirst
        );
        assert_eq!(
            config.classify(&ProxyRequest::navigate(url("https://gym.example/dashboard/routines"))),
            Strategy::CacheFirst
        );
    }

    #[test]
    fn test_other_same_origin_requests_are_network_first() {
        let config = config();
        assert_eq!(
            config.classify(&ProxyRequest::navigate(url("https://gym.example/exercises"))),
            Strategy::NetworkFirst
        );
        assert_eq!(
            config.classify(&ProxyRequest::get(url("https://gym.example/_next/static/app.js"))),
            Strategy::NetworkFirst
        );
    }

    #[test]
    fn test_shell_urls_resolve_against_origin() {
        let urls = config().shell_urls();
        assert_eq!(urls.len(), 6);
        assert_eq!(urls[1].as_str(), "https://gym.example/dashboard");
        assert_eq!(config().fallback_url().unwrap().as_str(), "https://gym.example/dashboard");
    }
}
