//! HTTP transport seam for the MangaDex client.
//!
//! The client talks to the network through the [`Transport`] trait so tests
//! can script responses without sockets. [`ReqwestTransport`] is the real
//! implementation.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::HeaderMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS, USER_AGENT};
use super::error::ApiError;

/// A fully buffered HTTP response.
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Returns a header value as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues GET requests on behalf of the API client.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Sends a GET request and buffers the whole response.
    ///
    /// Non-2xx statuses are returned as responses, not errors.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Timeout`], [`ApiError::Network`] or
    /// [`ApiError::ConnectionInterrupted`] for transport failures and
    /// [`ApiError::Cancelled`] when `cancel` fires first.
    async fn get(
        &self,
        url: &Url,
        cancel: Option<&CancellationToken>,
    ) -> Result<TransportResponse, ApiError>;
}

/// [`Transport`] backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport with the default connect and request timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, ApiError> {
        Self::with_timeouts(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        )
    }

    /// Creates a transport with explicit timeouts.
    ///
    /// `request_timeout` bounds the whole request, body included.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::ClientBuild`] if the HTTP client cannot be built.
    #[instrument(level = "debug")]
    pub fn with_timeouts(
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .gzip(true)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|source| ApiError::ClientBuild { source })?;
        Ok(Self { client })
    }

    async fn fetch(&self, url: &Url) -> Result<TransportResponse, ApiError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|error| map_reqwest_error(url, error))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|error| map_reqwest_error(url, error))?
            .to_vec();

        debug!(status, bytes = body.len(), "response received");

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(level = "debug", skip(self, cancel), fields(url = %url))]
    async fn get(
        &self,
        url: &Url,
        cancel: Option<&CancellationToken>,
    ) -> Result<TransportResponse, ApiError> {
        match cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    () = token.cancelled() => Err(ApiError::cancelled(url.as_str())),
                    result = self.fetch(url) => result,
                }
            }
            None => self.fetch(url).await,
        }
    }
}

fn map_reqwest_error(url: &Url, error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::timeout(url.as_str())
    } else if error.is_body() || error.is_decode() {
        ApiError::connection_interrupted(url.as_str(), error.to_string())
    } else {
        ApiError::network(url.as_str(), error)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    #[tokio::test]
    async fn test_cancelled_token_short_circuits_request() {
        let transport = ReqwestTransport::new().unwrap();
        let url = Url::parse("http://127.0.0.1:9/manga").unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let error = transport.get(&url, Some(&token)).await.unwrap_err();
        assert!(matches!(error, ApiError::Cancelled { .. }), "got {error:?}");
    }

    #[test]
    fn test_transport_response_header_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("2"));
        let response = TransportResponse {
            status: 429,
            headers,
            body: Vec::new(),
        };

        assert_eq!(response.header("retry-after"), Some("2"));
        assert_eq!(response.header("x-missing"), None);
        assert!(!response.is_success());
    }
}
