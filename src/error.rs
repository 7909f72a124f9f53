// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the catalog integration layer.
//!
//! [`IntegrationError`] is the only error type that crosses the integration
//! boundary. The HTTP client translates transport failures into it; every
//! other component propagates it unchanged. [`AppError`] adapts it to the
//! operator HTTP surface.

use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Result alias used throughout the integration layer.
pub type Result<T> = std::result::Result<T, IntegrationError>;

/// Stable machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ProviderUnavailable,
    ProviderTimeout,
    #[serde(rename = "SCHEMA_VALIDATION_ERROR")]
    SchemaValidation,
    #[serde(rename = "RATE_LIMIT_EXCEEDED")]
    RateLimitExceeded,
    ClientError,
    UnknownError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            ErrorCode::ProviderTimeout => "PROVIDER_TIMEOUT",
            ErrorCode::SchemaValidation => "SCHEMA_VALIDATION_ERROR",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::ClientError => "CLIENT_ERROR",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the catalog integration layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntegrationError {
    /// Upstream down, circuit open, 5xx, 429 or network failure.
    #[error("{message}")]
    ProviderUnavailable { message: String },

    /// Connection or read timeout.
    #[error("{message}")]
    ProviderTimeout { message: String },

    /// Upstream payload did not have the expected shape. Never retried.
    #[error("{path} is missing or invalid")]
    SchemaValidation { path: String },

    /// Local throttling rejection.
    #[error("Rate limit exceeded for {key}, retry in {}ms", wait.as_millis())]
    RateLimited { key: String, wait: Duration },

    /// Uncategorised 4xx response.
    #[error("{message}")]
    Client { message: String },

    /// Anything the client could not classify.
    #[error("{message}")]
    Unknown { message: String },
}

impl IntegrationError {
    pub fn provider_unavailable<T: Into<String>>(message: T) -> Self {
        Self::ProviderUnavailable {
            message: message.into(),
        }
    }

    pub fn provider_timeout<T: Into<String>>(message: T) -> Self {
        Self::ProviderTimeout {
            message: message.into(),
        }
    }

    pub fn schema<T: Into<String>>(path: T) -> Self {
        Self::SchemaValidation { path: path.into() }
    }

    pub fn client<T: Into<String>>(message: T) -> Self {
        Self::Client {
            message: message.into(),
        }
    }

    pub fn unknown<T: Into<String>>(message: T) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            IntegrationError::ProviderUnavailable { .. } => ErrorCode::ProviderUnavailable,
            IntegrationError::ProviderTimeout { .. } => ErrorCode::ProviderTimeout,
            IntegrationError::SchemaValidation { .. } => ErrorCode::SchemaValidation,
            IntegrationError::RateLimited { .. } => ErrorCode::RateLimitExceeded,
            IntegrationError::Client { .. } => ErrorCode::ClientError,
            IntegrationError::Unknown { .. } => ErrorCode::UnknownError,
        }
    }

    /// Suggested wait before retrying, for local rate-limit rejections.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            IntegrationError::RateLimited { wait, .. } => Some(*wait),
            _ => None,
        }
    }
}

/// Errors returned by the operator HTTP surface.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Integration(#[from] IntegrationError),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<ErrorCode>,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Integration(err) => match err.code() {
                ErrorCode::ProviderUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::ProviderTimeout => StatusCode::GATEWAY_TIMEOUT,
                ErrorCode::SchemaValidation | ErrorCode::ClientError => StatusCode::BAD_GATEWAY,
                ErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
                ErrorCode::UnknownError => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = match &self {
            AppError::Integration(err) => err.retry_after(),
            _ => None,
        };

        if let AppError::Internal(err) = &self {
            tracing::error!(error = %err, "internal error while serving request");
        }

        let body = ErrorBody {
            error: self.to_string(),
            code: match &self {
                AppError::Integration(err) => Some(err.code()),
                _ => None,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(wait) = retry_after {
            let seconds = wait.as_millis().div_ceil(1000).max(1);
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_wire_strings() {
        assert_eq!(
            IntegrationError::provider_unavailable("x").code().as_str(),
            "PROVIDER_UNAVAILABLE"
        );
        assert_eq!(
            IntegrationError::schema("data").code().as_str(),
            "SCHEMA_VALIDATION_ERROR"
        );
        let limited = IntegrationError::RateLimited {
            key: "catalog_provider".to_string(),
            wait: Duration::from_millis(200),
        };
        assert_eq!(limited.code().as_str(), "RATE_LIMIT_EXCEEDED");
        assert_eq!(
            serde_json::to_value(ErrorCode::RateLimitExceeded).unwrap(),
            "RATE_LIMIT_EXCEEDED"
        );
        assert_eq!(
            serde_json::to_value(ErrorCode::ClientError).unwrap(),
            "CLIENT_ERROR"
        );
    }

    #[test]
    fn rate_limited_message_carries_wait_time() {
        let err = IntegrationError::RateLimited {
            key: "catalog_provider".to_string(),
            wait: Duration::from_millis(200),
        };
        assert!(err.to_string().contains("200ms"));
        assert_eq!(err.retry_after(), Some(Duration::from_millis(200)));
    }

    #[test]
    fn schema_message_names_path() {
        let err = IntegrationError::schema("data.pt-BR[2].images.smallIcon");
        assert_eq!(
            err.to_string(),
            "data.pt-BR[2].images.smallIcon is missing or invalid"
        );
    }

    #[test]
    fn integration_errors_map_to_http_statuses() {
        let response =
            AppError::from(IntegrationError::provider_timeout("slow")).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

        let response = AppError::from(IntegrationError::RateLimited {
            key: "k".to_string(),
            wait: Duration::from_millis(1500),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "2");
    }

    #[test]
    fn every_app_error_maps_to_a_server_side_status() {
        let cases = [
            (
                AppError::from(IntegrationError::provider_unavailable("down")),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::from(IntegrationError::schema("data")),
                StatusCode::BAD_GATEWAY,
            ),
            (
                AppError::from(IntegrationError::client("404")),
                StatusCode::BAD_GATEWAY,
            ),
            (
                AppError::from(IntegrationError::unknown("?")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AppError::from(anyhow::anyhow!("registry failure")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = err.into_response();
            assert_eq!(response.status(), expected);
            assert!(response.headers().get(header::RETRY_AFTER).is_none());
        }
    }
}
