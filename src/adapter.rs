// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Catalog provider adapter.
//!
//! Each fetch runs the same pipeline: rate-limit gate, breaker-guarded GET,
//! sampled schema validation, per-item filtering and mapping. Errors from
//! any stage are returned unchanged.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;

use crate::circuit_breaker::{BreakerStatus, CircuitBreaker, CircuitBreakerConfig};
use crate::config::RelayConfig;
use crate::error::{IntegrationError, Result};
use crate::http_client::{IntegrationHttpClient, RequestOptions, RetryPolicy};
use crate::mapper::{is_valid_cosmetic, map_cosmetic, map_shop_cosmetic};
use crate::metrics::MetricsSink;
use crate::model::{FetchOptions, IntegrationCosmetic, PingReport, PingStatus, ShopPrice};
use crate::rate_limit::RateLimiter;
use crate::schema;
use crate::transport::HttpTransport;

pub const RATE_LIMIT_KEY: &str = "catalog_provider";
pub const ALL_COSMETICS_KEY: &str = "cosmetics_all";
pub const NEW_COSMETICS_KEY: &str = "cosmetics_new";
pub const SHOP_KEY: &str = "cosmetics_shop";

const ALL_COSMETICS_PATH: &str = "/cosmetics";
const NEW_COSMETICS_PATH: &str = "/cosmetics/new";
const SHOP_PATH: &str = "/shop";

#[derive(Debug, Clone)]
pub struct AdapterSettings {
    /// Bucket capacity and refill rate for provider calls.
    pub rate_limit_rps: u32,
    pub breaker: CircuitBreakerConfig,
    pub ping_path: String,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            rate_limit_rps: 10,
            breaker: CircuitBreakerConfig::default(),
            ping_path: NEW_COSMETICS_PATH.to_string(),
        }
    }
}

impl AdapterSettings {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            rate_limit_rps: config.rate_limit_rps,
            breaker: config.breaker.clone(),
            ping_path: config.ping_path.clone(),
        }
    }
}

/// Owns the limiter, breaker and client state for one provider.
#[derive(Clone)]
pub struct CatalogAdapter {
    http: IntegrationHttpClient,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    settings: Arc<AdapterSettings>,
}

impl CatalogAdapter {
    pub fn new(http: IntegrationHttpClient, settings: AdapterSettings) -> Self {
        Self {
            http,
            limiter: RateLimiter::new(),
            breaker: CircuitBreaker::new(settings.breaker.clone()),
            settings: Arc::new(settings),
        }
    }

    /// Wire an adapter from configuration around the given transport.
    pub fn from_config(
        config: &RelayConfig,
        transport: Arc<dyn HttpTransport>,
        metrics: MetricsSink,
    ) -> Self {
        let http = IntegrationHttpClient::new(
            transport,
            metrics,
            RetryPolicy::from_config(config),
            config.request_timeout,
        );
        Self::new(http, AdapterSettings::from_config(config))
    }

    pub fn metrics(&self) -> &MetricsSink {
        self.http.metrics()
    }

    pub async fn breaker_statuses(&self) -> Vec<BreakerStatus> {
        self.breaker.statuses().await
    }

    /// Cosmetics of `GET /cosmetics` in the requested language.
    ///
    /// Falls back to the first bucket in payload order when the provider
    /// answers without the requested language.
    pub async fn fetch_all_cosmetics(
        &self,
        options: &FetchOptions,
    ) -> Result<Vec<IntegrationCosmetic>> {
        self.instrumented(ALL_COSMETICS_KEY, async {
            let payload = self
                .guarded_get(ALL_COSMETICS_KEY, ALL_COSMETICS_PATH, options)
                .await?;
            schema::validate_all_cosmetics(&payload)?;

            let items = payload
                .get("data")
                .and_then(Value::as_object)
                .and_then(|data| {
                    data.get(&options.language)
                        .or_else(|| data.values().next())
                })
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();

            Ok(map_items(items.iter(), ALL_COSMETICS_KEY))
        })
        .await
    }

    /// Cosmetics from every type bucket of `GET /cosmetics/new`.
    pub async fn fetch_new_cosmetics(
        &self,
        options: &FetchOptions,
    ) -> Result<Vec<IntegrationCosmetic>> {
        self.instrumented(NEW_COSMETICS_KEY, async {
            let payload = self
                .guarded_get(NEW_COSMETICS_KEY, NEW_COSMETICS_PATH, options)
                .await?;
            schema::validate_new_cosmetics(&payload)?;

            let items: Vec<&Value> = match payload.pointer("/data/items") {
                Some(Value::Array(items)) => items.iter().collect(),
                Some(Value::Object(buckets)) => buckets
                    .values()
                    .filter_map(Value::as_array)
                    .flatten()
                    .collect(),
                _ => Vec::new(),
            };

            Ok(map_items(items.into_iter(), NEW_COSMETICS_KEY))
        })
        .await
    }

    /// Items of every shop entry, each carrying its entry's prices.
    pub async fn fetch_shop_cosmetics(
        &self,
        options: &FetchOptions,
    ) -> Result<Vec<IntegrationCosmetic>> {
        self.instrumented(SHOP_KEY, async {
            let payload = self.guarded_get(SHOP_KEY, SHOP_PATH, options).await?;
            schema::validate_shop(&payload)?;

            let entries = payload
                .pointer("/data/entries")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();

            let mut cosmetics = Vec::new();
            let mut dropped = 0usize;
            for entry in entries {
                let price = ShopPrice {
                    regular: price_at(entry, "regularPrice"),
                    final_price: price_at(entry, "finalPrice"),
                };
                let Some(items) = entry.get("brItems").and_then(Value::as_array) else {
                    continue;
                };
                for item in items {
                    if is_valid_cosmetic(item) {
                        cosmetics.push(map_shop_cosmetic(item, price));
                    } else {
                        dropped += 1;
                    }
                }
            }

            if dropped > 0 {
                tracing::warn!(operation = SHOP_KEY, dropped, "dropped malformed shop items");
            }
            Ok(cosmetics)
        })
        .await
    }

    /// Single unguarded request to the ping path. Never fails.
    pub async fn ping_cosmetics(&self) -> PingReport {
        let started = Instant::now();
        let result = self
            .http
            .get::<Value>(&self.settings.ping_path, RequestOptions::new().retry_attempts(0))
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let status = match result {
            Ok(_) => PingStatus::Healthy,
            Err(err) => {
                tracing::warn!(error = %err, code = %err.code(), "provider ping failed");
                PingStatus::Unhealthy
            }
        };

        PingReport { latency_ms, status }
    }

    async fn guarded_get(
        &self,
        operation: &str,
        path: &str,
        options: &FetchOptions,
    ) -> Result<Value> {
        let rps = self.settings.rate_limit_rps;
        self.limiter.acquire(RATE_LIMIT_KEY, rps, rps).await?;

        let request = RequestOptions::new().query("language", options.language.as_str());
        self.breaker
            .execute(operation, || self.http.get::<Value>(path, request), None)
            .await
    }

    async fn instrumented<F>(&self, operation: &str, fetch: F) -> Result<Vec<IntegrationCosmetic>>
    where
        F: Future<Output = Result<Vec<IntegrationCosmetic>>>,
    {
        match fetch.await {
            Ok(cosmetics) => {
                tracing::info!(operation, count = cosmetics.len(), "fetched cosmetics");
                Ok(cosmetics)
            }
            Err(err) => {
                self.metrics().record_fetch_error(operation, err.code().as_str());
                log_fetch_error(operation, &err);
                Err(err)
            }
        }
    }
}

fn map_items<'a, I>(items: I, operation: &str) -> Vec<IntegrationCosmetic>
where
    I: Iterator<Item = &'a Value>,
{
    let mut dropped = 0usize;
    let cosmetics: Vec<IntegrationCosmetic> = items
        .filter(|item| {
            let valid = is_valid_cosmetic(item);
            if !valid {
                dropped += 1;
            }
            valid
        })
        .map(map_cosmetic)
        .collect();

    if dropped > 0 {
        tracing::warn!(operation, dropped, "dropped malformed cosmetics");
    }
    cosmetics
}

fn price_at(entry: &Value, key: &str) -> Option<u32> {
    entry
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|price| u32::try_from(price).ok())
}

fn log_fetch_error(operation: &str, err: &IntegrationError) {
    match err {
        IntegrationError::RateLimited { .. } | IntegrationError::ProviderUnavailable { .. } => {
            tracing::warn!(operation, code = %err.code(), error = %err, "cosmetics fetch rejected");
        }
        _ => tracing::error!(operation, code = %err.code(), error = %err, "cosmetics fetch failed"),
    }
}
