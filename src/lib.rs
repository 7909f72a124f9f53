// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Resilient integration core for an upstream cosmetics catalog.
//!
//! Outbound calls go through a token-bucket limiter, a keyed circuit
//! breaker and a retrying HTTP client; responses are schema-checked and
//! normalized into [`IntegrationCosmetic`] records.

pub mod adapter;
pub mod api;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod http_client;
pub mod mapper;
pub mod metrics;
pub mod model;
pub mod rate_limit;
pub mod schema;
pub mod transport;

pub use adapter::{AdapterSettings, CatalogAdapter};
pub use circuit_breaker::{BreakerStatus, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::RelayConfig;
pub use error::{AppError, ErrorCode, IntegrationError, Result};
pub use http_client::{IntegrationHttpClient, RequestOptions, RetryPolicy};
pub use metrics::{MetricsSink, MetricsSnapshot};
pub use model::{FetchOptions, IntegrationCosmetic, PingReport, PingStatus};
pub use rate_limit::RateLimiter;
pub use transport::{
    HttpTransport, ReqwestTransport, TransportError, TransportRequest, TransportResponse,
};
