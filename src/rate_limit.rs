// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Keyed token-bucket rate limiter for outbound provider calls.
//!
//! Rejection is immediate: `acquire` never sleeps, it reports how long the
//! caller should wait and leaves the decision to retry with them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{IntegrationError, Result};

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(max_tokens: f64, now: Instant) -> Self {
        Self {
            tokens: max_tokens,
            last_refill: now,
        }
    }

    /// Adds whole tokens earned since the last refill. The timestamp only
    /// advances when something was added, so fractional progress is kept.
    fn refill(&mut self, now: Instant, max_tokens: f64, refill_rate: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let earned = (elapsed.as_secs_f64() * refill_rate).floor();
        if earned > 0.0 {
            self.tokens = (self.tokens + earned).min(max_tokens);
            self.last_refill = now;
        }
    }
}

/// Process-lifetime token buckets, created lazily per key.
#[derive(Clone, Default)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<String, TokenBucket>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take one token from the bucket for `key`, or fail with
    /// [`IntegrationError::RateLimited`] carrying the suggested wait.
    pub async fn acquire(
        &self,
        key: &str,
        max_tokens: u32,
        refill_rate_per_sec: u32,
    ) -> Result<()> {
        let max_tokens = f64::from(max_tokens.max(1));
        let refill_rate = f64::from(refill_rate_per_sec.max(1));
        let now = Instant::now();

        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::full(max_tokens, now));

        bucket.refill(now, max_tokens, refill_rate);

        if bucket.tokens < 1.0 {
            let wait_ms = ((1.0 - bucket.tokens) / refill_rate * 1000.0).ceil() as u64;
            let wait = Duration::from_millis(wait_ms);
            tracing::warn!(key, wait_ms, "rate limit exceeded for provider calls");
            return Err(IntegrationError::RateLimited {
                key: key.to_string(),
                wait,
            });
        }

        bucket.tokens -= 1.0;
        Ok(())
    }

    /// Tokens currently held for `key`, without refilling.
    pub async fn available(&self, key: &str) -> Option<f64> {
        let buckets = self.buckets.lock().await;
        buckets.get(key).map(|bucket| bucket.tokens)
    }
}
