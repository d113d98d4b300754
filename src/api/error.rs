//! Error types for the MangaDex API layer.
//!
//! Every variant carries the URL that failed so log lines and progress
//! messages can point at the exact request.

use thiserror::Error;

use super::rate_limiter::EndpointClass;

/// Errors that can occur while talking to the remote catalog API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level error (DNS resolution, connection reset/refused, TLS, etc.)
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Connection was dropped before a full response arrived
    /// (reset by peer, aborted, hang-up while reading the body).
    #[error("connection interrupted requesting {url}: {reason}")]
    ConnectionInterrupted {
        /// The URL that failed.
        url: String,
        /// Short description of the interruption.
        reason: String,
    },

    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The caller cancelled the request.
    #[error("request to {url} was cancelled")]
    Cancelled {
        /// The URL whose request was cancelled.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} requesting {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present (for 429 responses).
        retry_after: Option<String>,
    },

    /// The API answered 2xx but reported `"result": "error"` in the body.
    #[error("MangaDex API error for {url}: {detail}")]
    Api {
        /// The URL that produced the error.
        url: String,
        /// First error detail reported by the API.
        detail: String,
    },

    /// Response body could not be decoded into the expected shape.
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        /// The URL whose body failed to decode.
        url: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },

    /// The limiter for an endpoint class was shut down.
    #[error("rate limiter for {class} endpoints is closed")]
    LimiterClosed {
        /// Endpoint class whose limiter refused the permit.
        class: EndpointClass,
    },
}

impl ApiError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a connection-interrupted error.
    pub fn connection_interrupted(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionInterrupted {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates an API semantic error.
    pub fn api(url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Api {
            url: url.into(),
            detail: detail.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(url: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            url: url.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Returns the HTTP status code for status errors.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
