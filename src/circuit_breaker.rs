// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Keyed circuit breaker guarding calls to the catalog provider.
//!
//! Each logical operation gets its own breaker entry. The wrapped call's own
//! error is returned unchanged; the only error this module creates is the
//! open-circuit short-circuit.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{IntegrationError, Result};

/// Thresholds for a breaker entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in `Closed` before opening.
    pub failure_threshold: u32,
    /// Consecutive successes in `HalfOpen` before closing.
    pub success_threshold: u32,
    /// How long the circuit stays open before a probe is allowed.
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
struct BreakerEntry {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    next_attempt_at: Instant,
}

impl BreakerEntry {
    fn closed(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            next_attempt_at: now,
        }
    }
}

/// Point-in-time view of one breaker entry.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub key: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    /// Milliseconds until an open circuit admits a probe; zero otherwise.
    pub retry_in_ms: u64,
}

#[derive(Clone)]
pub struct CircuitBreaker {
    entries: Arc<Mutex<HashMap<String, BreakerEntry>>>,
    defaults: CircuitBreakerConfig,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(defaults: CircuitBreakerConfig) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            defaults,
        }
    }

    /// Run `operation` under the breaker for `key`.
    ///
    /// `config` overrides the breaker defaults for this call. When the
    /// circuit is open the operation is not invoked and
    /// [`IntegrationError::ProviderUnavailable`] is returned.
    pub async fn execute<F, Fut, T>(
        &self,
        key: &str,
        operation: F,
        config: Option<&CircuitBreakerConfig>,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let config = config.unwrap_or(&self.defaults);
        self.admit(key).await?;

        match operation().await {
            Ok(value) => {
                self.on_success(key, config).await;
                Ok(value)
            }
            Err(err) => {
                self.on_failure(key, config).await;
                Err(err)
            }
        }
    }

    pub async fn state(&self, key: &str) -> Option<CircuitState> {
        let entries = self.entries.lock().await;
        entries.get(key).map(|entry| entry.state)
    }

    /// Status of every breaker entry, sorted by key.
    pub async fn statuses(&self) -> Vec<BreakerStatus> {
        let entries = self.entries.lock().await;
        let now = Instant::now();
        let mut statuses: Vec<BreakerStatus> = entries
            .iter()
            .map(|(key, entry)| BreakerStatus {
                key: key.clone(),
                state: entry.state,
                consecutive_failures: entry.consecutive_failures,
                consecutive_successes: entry.consecutive_successes,
                retry_in_ms: match entry.state {
                    CircuitState::Open => {
                        entry.next_attempt_at.saturating_duration_since(now).as_millis() as u64
                    }
                    _ => 0,
                },
            })
            .collect();
        statuses.sort_by(|a, b| a.key.cmp(&b.key));
        statuses
    }

    async fn admit(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| BreakerEntry::closed(now));

        if entry.state == CircuitState::Open {
            if now < entry.next_attempt_at {
                tracing::debug!(key, "circuit open, rejecting call");
                return Err(IntegrationError::provider_unavailable(
                    "Circuit breaker is open",
                ));
            }

            entry.state = CircuitState::HalfOpen;
            entry.consecutive_successes = 0;
            tracing::info!(key, "circuit half-open, probing provider");
        }

        Ok(())
    }

    async fn on_success(&self, key: &str, config: &CircuitBreakerConfig) {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| BreakerEntry::closed(now));

        match entry.state {
            CircuitState::HalfOpen => {
                entry.consecutive_successes += 1;
                if entry.consecutive_successes >= config.success_threshold {
                    entry.state = CircuitState::Closed;
                    entry.consecutive_failures = 0;
                    entry.consecutive_successes = 0;
                    tracing::info!(key, "circuit closed after successful probes");
                }
            }
            CircuitState::Closed => entry.consecutive_failures = 0,
            // Success from a call admitted before the circuit opened.
            CircuitState::Open => {}
        }
    }

    async fn on_failure(&self, key: &str, config: &CircuitBreakerConfig) {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| BreakerEntry::closed(now));

        entry.consecutive_failures += 1;

        let should_open = match entry.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => entry.consecutive_failures >= config.failure_threshold,
            CircuitState::Open => false,
        };

        if should_open {
            entry.state = CircuitState::Open;
            entry.consecutive_successes = 0;
            entry.next_attempt_at = now + config.open_timeout;
            tracing::warn!(
                key,
                failures = entry.consecutive_failures,
                open_for_ms = config.open_timeout.as_millis() as u64,
                "circuit opened"
            );
        }
    }
}
