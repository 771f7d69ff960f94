//! HTTP client abstraction for testability

use std::future::Future;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{info, trace};

use super::types::ProviderError;
use crate::config::TransportConfig;

/// Trait for async HTTP GET requests.
///
/// This abstraction allows the fetcher to be driven by a mock client in
/// tests. Implementations are shared across fetch tasks, hence the
/// `Send + Sync + 'static` bound and the `Send` future.
pub trait AsyncHttpClient: Send + Sync + 'static {
    /// Performs an HTTP GET request.
    ///
    /// # Returns
    ///
    /// The response body on a 2xx status, [`ProviderError::Status`] on any
    /// other status, [`ProviderError::HttpError`] if no response arrived.
    fn get(&self, url: &str) -> impl Future<Output = Result<Bytes, ProviderError>> + Send;
}

/// Real async HTTP client implementation using reqwest.
#[derive(Debug, Clone)]
pub struct AsyncReqwestClient {
    client: reqwest::Client,
    verbose: bool,
}

impl AsyncReqwestClient {
    /// Creates a client with the default transport settings.
    pub fn new() -> Result<Self, ProviderError> {
        Self::from_transport(&TransportConfig::default())
    }

    /// Creates a client with the given timeout, verbosity and headers.
    pub fn from_transport(transport: &TransportConfig) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &transport.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ProviderError::InvalidTransport(format!("header name '{}': {}", name, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                ProviderError::InvalidTransport(format!("header value for '{}': {}", name, e))
            })?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(transport.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| {
                ProviderError::InvalidTransport(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            verbose: transport.verbose,
        })
    }
}

impl AsyncHttpClient for AsyncReqwestClient {
    async fn get(&self, url: &str) -> Result<Bytes, ProviderError> {
        if self.verbose {
            info!(url = %url, "GET");
        } else {
            trace!(url = %url, "GET");
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::HttpError(format!("Request failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                url: url.split('?').next().unwrap_or(url).to_string(),
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| ProviderError::HttpError(format!("Failed to read response: {}", e.without_url())))
    }
}
