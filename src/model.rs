// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Normalized catalog records produced by the integration layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cosmetic as seen by the rest of the platform.
///
/// Only the mapper constructs these, and only from a record that passed the
/// per-item validity filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationCosmetic {
    pub external_id: String,
    pub name: String,
    pub description: String,
    /// Lowercased, trimmed `type.value`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Lowercased, trimmed `rarity.value`.
    pub rarity: String,
    pub image_url: String,
    pub added_at: DateTime<Utc>,
    /// External ids of set/bundle members.
    pub children: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    /// Shop entry regular price; only set by shop fetches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_price: Option<u32>,
    /// Shop entry final price; only set by shop fetches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_price: Option<u32>,
}

/// Prices attached to every item of a shop entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShopPrice {
    pub regular: Option<u32>,
    pub final_price: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchOptions {
    pub language: String,
}

impl FetchOptions {
    pub fn language<T: Into<String>>(language: T) -> Self {
        Self {
            language: language.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PingStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingReport {
    pub latency_ms: u64,
    pub status: PingStatus,
}

impl PingReport {
    pub fn is_healthy(&self) -> bool {
        self.status == PingStatus::Healthy
    }
}

#[derive(Debug, Deserialize)]
pub struct LanguageQuery {
    #[serde(default)]
    pub language: Option<String>,
}
