use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use thiserror::Error;
use tracing::debug;
use url::{Origin, Url};

use super::{ProxyRequest, ProxyResponse, ResponseKind};

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// The proxy's only way out to the network.
#[async_trait]
pub trait Network: Send + Sync {
    /// Resolves with any HTTP response, including error statuses. Only
    /// failing to get a response at all is an `Err`.
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, NetworkError>;
}

/// `Network` backed by reqwest.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
    app_origin: Origin,
}

impl HttpNetwork {
    pub fn new(app_origin: &Url, timeout: Duration) -> Result<Self, NetworkError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            app_origin: app_origin.origin(),
        })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, NetworkError> {
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    NetworkError::Unreachable(e.to_string())
                } else {
                    NetworkError::Request(e)
                }
            })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let kind = if request.url.origin() == self.app_origin {
            ResponseKind::Basic
        } else {
            ResponseKind::Cors
        };
        let body = response.bytes().await?.to_vec();

        debug!(url = %request.url, status, "Network response");
        Ok(ProxyResponse::new(status, kind, content_type, body))
    }
}
