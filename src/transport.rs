// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! HTTP transport used by the integration client.
//!
//! The transport only moves bytes: it performs one GET and reports what
//! happened. Retry, classification and metrics live in
//! [`crate::http_client`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use thiserror::Error;

/// A single base-URL-relative GET.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl TransportRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A successful (2xx) response with a decoded JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// The request timed out or the connection was aborted mid-flight.
    #[error("request timed out: {message}")]
    Timeout { message: String },

    /// No response was received.
    #[error("network error: {message}")]
    Network { message: String },

    /// The provider answered with a non-2xx status.
    #[error("provider returned status {status}")]
    Status { status: u16, body: String },

    /// A 2xx response whose body was not valid JSON.
    #[error("failed to decode response body: {message}")]
    Decode { status: u16, message: String },
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } | TransportError::Decode { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Metric label describing the outcome.
    pub fn outcome_label(&self) -> String {
        match self {
            TransportError::Timeout { .. } => "timeout".to_string(),
            TransportError::Network { .. } => "network".to_string(),
            TransportError::Status { status, .. } => status.to_string(),
            TransportError::Decode { .. } => "decode".to_string(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// reqwest-backed transport bound to the provider base URL.
#[derive(Clone)]
pub struct ReqwestTransport {
    base_url: String,
    client: Client,
}

impl ReqwestTransport {
    /// Construct a transport whose client enforces `default_timeout`.
    pub fn try_new(base_url: &str, default_timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(default_timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build provider client: {}", e))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url_for(&self, path: &str) -> Result<Url, TransportError> {
        let raw = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        Url::parse(&raw).map_err(|e| TransportError::Network {
            message: format!("invalid request URL {raw}: {e}"),
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let url = self.url_for(&request.path)?;

        let mut builder = self
            .client
            .get(url)
            .query(&request.query)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(map_send_error)?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(map_send_error)?;
        let body = serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode {
            status: status.as_u16(),
            message: e.to_string(),
        })?;

        Ok(TransportResponse {
            status: status.as_u16(),
            body,
        })
    }
}

fn map_send_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            message: err.to_string(),
        }
    } else {
        TransportError::Network {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let request = TransportRequest {
            path: "/cosmetics".to_string(),
            query: vec![],
            headers: vec![("X-Request-ID".to_string(), "abc".to_string())],
            timeout: Duration::from_secs(1),
        };
        assert_eq!(request.header("x-request-id"), Some("abc"));
        assert_eq!(request.header("accept"), None);
    }

    #[test]
    fn outcome_labels_distinguish_failures() {
        let status = TransportError::Status {
            status: 503,
            body: String::new(),
        };
        assert_eq!(status.outcome_label(), "503");
        assert_eq!(status.status(), Some(503));
        let timeout = TransportError::Timeout {
            message: "deadline".to_string(),
        };
        assert_eq!(timeout.outcome_label(), "timeout");
        assert_eq!(timeout.status(), None);
    }

    #[test]
    fn urls_join_base_and_path() {
        let transport =
            ReqwestTransport::try_new("https://catalog.example.com/v2/", Duration::from_secs(1))
                .unwrap();
        let url = transport.url_for("/cosmetics/new").unwrap();
        assert_eq!(url.as_str(), "https://catalog.example.com/v2/cosmetics/new");
    }
}
