// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! HTTP API handlers for the catalog relay.
//!
//! - `GET /healthz` - provider ping, 503 when unhealthy
//! - `GET /metrics` - Prometheus text exposition
//! - `GET /metrics/summary` - JSON metrics snapshot
//! - `GET /breakers` - circuit breaker states
//! - `GET /cosmetics`, `GET /cosmetics/new`, `GET /shop` - catalog fetches

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::adapter::CatalogAdapter;
use crate::circuit_breaker::BreakerStatus;
use crate::error::AppError;
use crate::metrics::MetricsSnapshot;
use crate::model::{FetchOptions, IntegrationCosmetic, LanguageQuery, PingReport};

#[derive(Clone)]
pub struct AppState {
    pub adapter: CatalogAdapter,
    pub default_language: String,
}

impl AppState {
    fn fetch_options(&self, query: LanguageQuery) -> FetchOptions {
        let language = query
            .language
            .map(|language| language.trim().to_string())
            .filter(|language| !language.is_empty())
            .unwrap_or_else(|| self.default_language.clone());
        FetchOptions::language(language)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics))
        .route("/metrics/summary", get(metrics_summary))
        .route("/breakers", get(breakers))
        .route("/cosmetics", get(all_cosmetics))
        .route("/cosmetics/new", get(new_cosmetics))
        .route("/shop", get(shop_cosmetics))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<PingReport>) {
    let report = state.adapter.ping_cosmetics().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

/// Metrics endpoint
pub async fn metrics(State(state): State<AppState>) -> Result<String, AppError> {
    state.adapter.metrics().export()
}

pub async fn metrics_summary(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.adapter.metrics().snapshot())
}

pub async fn breakers(State(state): State<AppState>) -> Json<Vec<BreakerStatus>> {
    Json(state.adapter.breaker_statuses().await)
}

pub async fn all_cosmetics(
    State(state): State<AppState>,
    Query(query): Query<LanguageQuery>,
) -> Result<Json<Vec<IntegrationCosmetic>>, AppError> {
    let options = state.fetch_options(query);
    Ok(Json(state.adapter.fetch_all_cosmetics(&options).await?))
}

pub async fn new_cosmetics(
    State(state): State<AppState>,
    Query(query): Query<LanguageQuery>,
) -> Result<Json<Vec<IntegrationCosmetic>>, AppError> {
    let options = state.fetch_options(query);
    Ok(Json(state.adapter.fetch_new_cosmetics(&options).await?))
}

pub async fn shop_cosmetics(
    State(state): State<AppState>,
    Query(query): Query<LanguageQuery>,
) -> Result<Json<Vec<IntegrationCosmetic>>, AppError> {
    let options = state.fetch_options(query);
    Ok(Json(state.adapter.fetch_shop_cosmetics(&options).await?))
}
