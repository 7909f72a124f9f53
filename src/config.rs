// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::circuit_breaker::CircuitBreakerConfig;

pub const DEFAULT_BOOTING_MARKER: &str = "booting up";

pub struct RelayConfig {
    pub listen_addr: SocketAddr,
    pub provider_url: String,
    pub request_timeout: Duration,
    pub retry_attempts: u32,
    pub backoff_base: Duration,
    pub rate_limit_rps: u32,
    pub breaker: CircuitBreakerConfig,
    pub booting_marker: String,
    pub ping_path: String,
    pub default_language: String,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Parse and validate configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr: SocketAddr = lookup("RELAY_ADDR")
            .unwrap_or_else(|| "0.0.0.0:9090".to_string())
            .parse()
            .context("invalid RELAY_ADDR")?;

        let provider_url = lookup("RELAY_PROVIDER_URL")
            .map(|raw| raw.trim().trim_end_matches('/').to_string())
            .filter(|raw| !raw.is_empty())
            .context("RELAY_PROVIDER_URL is required")?;
        let parsed = reqwest::Url::parse(&provider_url)
            .with_context(|| format!("RELAY_PROVIDER_URL is not a valid URL: {provider_url}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("RELAY_PROVIDER_URL must use http or https");
        }

        let request_timeout = parse_millis(&lookup, "RELAY_TIMEOUT_MS", 10_000)?;
        let retry_attempts = parse_positive(&lookup, "RELAY_RETRY_ATTEMPTS", 3)?;
        let backoff_base = parse_millis(&lookup, "RELAY_BACKOFF_BASE_MS", 1_000)?;
        let rate_limit_rps = parse_positive(&lookup, "RELAY_RATE_LIMIT_RPS", 10)?;

        let breaker = CircuitBreakerConfig {
            failure_threshold: parse_positive(&lookup, "RELAY_BREAKER_FAILURE_THRESHOLD", 5)?,
            success_threshold: parse_positive(&lookup, "RELAY_BREAKER_SUCCESS_THRESHOLD", 2)?,
            open_timeout: parse_millis(&lookup, "RELAY_BREAKER_OPEN_TIMEOUT_MS", 60_000)?,
        };

        let booting_marker = lookup("RELAY_BOOTING_MARKER")
            .unwrap_or_else(|| DEFAULT_BOOTING_MARKER.to_string());
        if booting_marker.trim().is_empty() {
            bail!("RELAY_BOOTING_MARKER cannot be empty");
        }

        let ping_path = lookup("RELAY_PING_PATH").unwrap_or_else(|| "/cosmetics/new".to_string());
        if !ping_path.starts_with('/') {
            bail!("RELAY_PING_PATH must start with '/'");
        }

        let default_language =
            lookup("RELAY_DEFAULT_LANGUAGE").unwrap_or_else(|| "pt-BR".to_string());
        if default_language.trim().is_empty() {
            bail!("RELAY_DEFAULT_LANGUAGE cannot be empty");
        }

        Ok(Self {
            listen_addr,
            provider_url,
            request_timeout,
            retry_attempts,
            backoff_base,
            rate_limit_rps,
            breaker,
            booting_marker,
            ping_path,
            default_language,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }
}

fn parse_positive<F>(lookup: &F, env_key: &str, default: u32) -> Result<u32>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(env_key).unwrap_or_else(|| default.to_string());
    let value: u32 = raw
        .trim()
        .parse()
        .with_context(|| format!("{env_key} must be a positive integer"))?;

    if value == 0 {
        bail!("{env_key} must be a positive integer");
    }

    Ok(value)
}

fn parse_millis<F>(lookup: &F, env_key: &str, default_ms: u32) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let millis = parse_positive(lookup, env_key, default_ms)?;
    Ok(Duration::from_millis(u64::from(millis)))
}
