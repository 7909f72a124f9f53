// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Outbound HTTP client for the catalog provider.
//!
//! Every request is tagged with a correlation id, retried according to
//! [`RetryPolicy`], recorded in the [`MetricsSink`] attempt by attempt, and
//! finally translated into an [`IntegrationError`]. This is the only place
//! transport failures become integration errors.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::{RelayConfig, DEFAULT_BOOTING_MARKER};
use crate::error::{IntegrationError, Result};
use crate::metrics::MetricsSink;
use crate::transport::{HttpTransport, TransportError, TransportRequest};

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Operator-facing message for a provider that is still starting.
pub const BOOTING_UP_MESSAGE: &str =
    "O provedor de cosméticos está inicializando. Tente novamente em alguns instantes.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry(Duration),
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub retry_attempts: u32,
    pub backoff_base: Duration,
    /// Body substring that marks a 503 as "provider still booting".
    pub booting_marker: String,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            backoff_base: Duration::from_secs(1),
            booting_marker: DEFAULT_BOOTING_MARKER.to_string(),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            retry_attempts: config.retry_attempts,
            backoff_base: config.backoff_base,
            booting_marker: config.booting_marker.clone(),
        }
    }

    pub fn is_booting_up(&self, error: &TransportError) -> bool {
        match error {
            TransportError::Status { status: 503, body } => body
                .to_lowercase()
                .contains(&self.booting_marker.to_lowercase()),
            _ => false,
        }
    }

    /// Decide what to do after a failed attempt, given how many retries
    /// have already been spent on this request.
    ///
    /// A booting provider gets one retry at the base delay. Other 5xx
    /// responses get at most two retries. Everything else may use the whole
    /// budget with exponential backoff.
    pub fn decide(&self, error: &TransportError, retries_done: u32) -> RetryDecision {
        let booting = self.is_booting_up(error);
        if booting && retries_done >= 1 {
            return RetryDecision::GiveUp;
        }

        let server_error = matches!(
            error,
            TransportError::Status { status, .. } if (500..600).contains(status)
        );
        if server_error && retries_done >= 2 {
            return RetryDecision::GiveUp;
        }

        if retries_done >= self.retry_attempts {
            return RetryDecision::GiveUp;
        }

        let delay = if booting {
            self.backoff_base
        } else {
            self.backoff_base
                .saturating_mul(2u32.saturating_pow(retries_done))
        };
        RetryDecision::Retry(delay)
    }
}

/// Per-call overrides for [`IntegrationHttpClient::get`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub retry_attempts: Option<u32>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }
}

#[derive(Clone)]
pub struct IntegrationHttpClient {
    transport: Arc<dyn HttpTransport>,
    metrics: MetricsSink,
    policy: RetryPolicy,
    timeout: Duration,
}

impl IntegrationHttpClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        metrics: MetricsSink,
        policy: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            metrics,
            policy,
            timeout,
        }
    }

    pub fn metrics(&self) -> &MetricsSink {
        &self.metrics
    }

    /// GET `path` and decode the JSON body as `T`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, options: RequestOptions) -> Result<T> {
        let request_id = Uuid::new_v4().to_string();
        let endpoint = path.split('?').next().unwrap_or(path);
        let policy = match options.retry_attempts {
            Some(retry_attempts) => RetryPolicy {
                retry_attempts,
                ..self.policy.clone()
            },
            None => self.policy.clone(),
        };

        let mut headers = options.headers;
        headers.push((REQUEST_ID_HEADER.to_string(), request_id.clone()));
        let request = TransportRequest {
            path: path.to_string(),
            query: options.query,
            headers,
            timeout: options.timeout.unwrap_or(self.timeout),
        };

        self.metrics.begin_request(&request_id, endpoint, "GET");

        let mut retries_done = 0u32;
        let outcome = loop {
            let started = Instant::now();
            let result = self.transport.get(request.clone()).await;
            let elapsed = started.elapsed();

            match result {
                Ok(response) => {
                    self.metrics
                        .record_attempt(&request_id, &response.status.to_string(), elapsed);
                    break Ok(response);
                }
                Err(err) => {
                    self.metrics
                        .record_attempt(&request_id, &err.outcome_label(), elapsed);

                    match policy.decide(&err, retries_done) {
                        RetryDecision::Retry(delay) => {
                            tracing::warn!(
                                request_id = %request_id,
                                endpoint,
                                status = err.status(),
                                attempt = retries_done + 1,
                                delay_ms = delay.as_millis() as u64,
                                error = %err,
                                "retrying provider request"
                            );
                            tokio::time::sleep(delay).await;
                            retries_done += 1;
                        }
                        RetryDecision::GiveUp => break Err(err),
                    }
                }
            }
        };

        self.metrics.finish_request(&request_id);

        match outcome {
            Ok(response) => serde_json::from_value(response.body).map_err(|e| {
                IntegrationError::unknown(format!(
                    "Unexpected response body from {endpoint}: {e}"
                ))
            }),
            Err(err) => Err(self.classify(&err, endpoint, &request_id)),
        }
    }

    fn classify(&self, err: &TransportError, endpoint: &str, request_id: &str) -> IntegrationError {
        if self.policy.is_booting_up(err) {
            tracing::debug!(request_id, endpoint, "provider is booting up");
            return IntegrationError::provider_unavailable(BOOTING_UP_MESSAGE);
        }

        let status = err.status();
        tracing::error!(request_id, endpoint, status, error = %err, "provider request failed");

        match err {
            TransportError::Timeout { .. } => {
                IntegrationError::provider_timeout(format!("Request to {endpoint} timed out"))
            }
            TransportError::Network { .. } => {
                IntegrationError::provider_unavailable("Network error")
            }
            TransportError::Status { .. } => match status {
                Some(status) if status >= 500 => IntegrationError::provider_unavailable(
                    format!("Provider unavailable (status {status})"),
                ),
                Some(429) => IntegrationError::provider_unavailable("Rate limit exceeded"),
                Some(status) if (400..500).contains(&status) => IntegrationError::client(
                    format!("Provider rejected request (status {status})"),
                ),
                _ => IntegrationError::unknown(err.to_string()),
            },
            TransportError::Decode { .. } => IntegrationError::unknown(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::metrics::{HTTP_REQUESTS_TOTAL, HTTP_RETRIES_TOTAL};
    use crate::transport::{MockHttpTransport, TransportResponse};

    fn policy(retry_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            retry_attempts,
            backoff_base: Duration::from_millis(100),
            booting_marker: "booting up".to_string(),
        }
    }

    fn client(mock: MockHttpTransport, retry_attempts: u32) -> IntegrationHttpClient {
        IntegrationHttpClient::new(
            Arc::new(mock),
            MetricsSink::new().unwrap(),
            policy(retry_attempts),
            Duration::from_secs(5),
        )
    }

    fn status(code: u16, body: &str) -> TransportError {
        TransportError::Status {
            status: code,
            body: body.to_string(),
        }
    }

    #[test]
    fn backoff_doubles_per_retry() {
        let policy = policy(3);
        let err = status(502, "bad gateway");
        assert_eq!(policy.decide(&err, 0), RetryDecision::Retry(Duration::from_millis(100)));
        assert_eq!(policy.decide(&err, 1), RetryDecision::Retry(Duration::from_millis(200)));
        assert_eq!(policy.decide(&err, 2), RetryDecision::GiveUp);

        let err = status(404, "missing");
        assert_eq!(policy.decide(&err, 2), RetryDecision::Retry(Duration::from_millis(400)));
        assert_eq!(policy.decide(&err, 3), RetryDecision::GiveUp);
    }

    #[test]
    fn booting_up_uses_base_delay_and_one_retry() {
        let policy = policy(3);
        let err = status(503, "Service is Booting Up, please wait");
        assert!(policy.is_booting_up(&err));
        assert_eq!(policy.decide(&err, 0), RetryDecision::Retry(Duration::from_millis(100)));
        assert_eq!(policy.decide(&err, 1), RetryDecision::GiveUp);
        assert!(!policy.is_booting_up(&status(500, "booting up")));
    }

    #[test]
    fn booting_marker_is_configurable() {
        let policy = RetryPolicy {
            booting_marker: "warming".to_string(),
            ..policy(3)
        };
        assert!(policy.is_booting_up(&status(503, "cache warming")));
        assert!(!policy.is_booting_up(&status(503, "booting up")));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_server_errors_with_exponential_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let mut mock = MockHttpTransport::new();
        mock.expect_get().times(3).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(status(500, "internal"))
            } else {
                Ok(TransportResponse {
                    status: 200,
                    body: json!({ "status": 200 }),
                })
            }
        });
        let client = client(mock, 3);

        let started = Instant::now();
        let body: serde_json::Value = client
            .get("/cosmetics", RequestOptions::new())
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(body["status"], 200);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(400));

        let snapshot = client.metrics().snapshot();
        assert_eq!(
            snapshot.counter(HTTP_REQUESTS_TOTAL, &[("endpoint", "/cosmetics"), ("status", "500")]),
            Some(2)
        );
        assert_eq!(
            snapshot.counter(HTTP_REQUESTS_TOTAL, &[("endpoint", "/cosmetics"), ("status", "200")]),
            Some(1)
        );
        assert_eq!(snapshot.counter(HTTP_RETRIES_TOTAL, &[("endpoint", "/cosmetics")]), Some(2));
        assert_eq!(snapshot.in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn booting_up_short_circuits_after_two_calls() {
        let mut mock = MockHttpTransport::new();
        mock.expect_get()
            .times(2)
            .returning(|_| Err(status(503, "API is booting up")));
        let client = client(mock, 3);

        let err = client
            .get::<serde_json::Value>("/cosmetics", RequestOptions::new())
            .await
            .unwrap_err();

        assert_eq!(err, IntegrationError::provider_unavailable(BOOTING_UP_MESSAGE));
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_stop_after_three_calls_despite_larger_budget() {
        let mut mock = MockHttpTransport::new();
        mock.expect_get()
            .times(3)
            .returning(|_| Err(status(502, "bad gateway")));
        let client = client(mock, 6);

        let err = client
            .get::<serde_json::Value>("/shop", RequestOptions::new())
            .await
            .unwrap_err();

        assert!(matches!(err, IntegrationError::ProviderUnavailable { .. }));
        assert!(err.to_string().contains("502"));
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_exhaust_budget_then_classify() {
        let mut mock = MockHttpTransport::new();
        mock.expect_get()
            .times(3)
            .returning(|_| Err(status(404, "not found")));
        let client = client(mock, 2);

        let err = client
            .get::<serde_json::Value>("/cosmetics/new", RequestOptions::new())
            .await
            .unwrap_err();

        assert_eq!(err.code().as_str(), "CLIENT_ERROR");
    }

    #[tokio::test(start_paused = true)]
    async fn too_many_requests_maps_to_provider_unavailable() {
        let mut mock = MockHttpTransport::new();
        mock.expect_get()
            .times(2)
            .returning(|_| Err(status(429, "slow down")));
        let client = client(mock, 1);

        let err = client
            .get::<serde_json::Value>("/shop", RequestOptions::new())
            .await
            .unwrap_err();

        assert_eq!(err, IntegrationError::provider_unavailable("Rate limit exceeded"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_and_network_failures_are_classified() {
        let mut mock = MockHttpTransport::new();
        mock.expect_get().times(1).returning(|_| {
            Err(TransportError::Timeout {
                message: "deadline elapsed".to_string(),
            })
        });
        let err = client(mock, 0)
            .get::<serde_json::Value>("/cosmetics", RequestOptions::new().retry_attempts(0))
            .await
            .unwrap_err();
        assert_eq!(err.code().as_str(), "PROVIDER_TIMEOUT");

        let mut mock = MockHttpTransport::new();
        mock.expect_get().times(1).returning(|_| {
            Err(TransportError::Network {
                message: "connection refused".to_string(),
            })
        });
        let err = client(mock, 3)
            .get::<serde_json::Value>("/cosmetics", RequestOptions::new().retry_attempts(0))
            .await
            .unwrap_err();
        assert_eq!(err, IntegrationError::provider_unavailable("Network error"));
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_success_body_is_unknown_error() {
        let mut mock = MockHttpTransport::new();
        mock.expect_get().times(1).returning(|_| {
            Err(TransportError::Decode {
                status: 200,
                message: "expected value".to_string(),
            })
        });
        let err = client(mock, 0)
            .get::<serde_json::Value>("/cosmetics", RequestOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.code().as_str(), "UNKNOWN_ERROR");
    }

    #[tokio::test(start_paused = true)]
    async fn non_error_status_outside_known_ranges_is_unknown() {
        let mut mock = MockHttpTransport::new();
        mock.expect_get()
            .times(1)
            .returning(|_| Err(status(304, "")));
        let err = client(mock, 0)
            .get::<serde_json::Value>("/shop", RequestOptions::new())
            .await
            .unwrap_err();

        assert_eq!(err.code().as_str(), "UNKNOWN_ERROR");
        assert!(err.to_string().contains("304"));
    }

    #[tokio::test(start_paused = true)]
    async fn request_id_is_stable_across_retries() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let recorder = Arc::clone(&seen);
        let mut mock = MockHttpTransport::new();
        mock.expect_get().times(2).returning(move |request| {
            let mut seen = recorder.lock().unwrap();
            seen.push(request.header(REQUEST_ID_HEADER).unwrap().to_string());
            assert_eq!(request.query, vec![("language".to_string(), "pt-BR".to_string())]);
            if seen.len() == 1 {
                Err(status(500, "oops"))
            } else {
                Ok(TransportResponse {
                    status: 200,
                    body: json!({}),
                })
            }
        });

        let _: serde_json::Value = client(mock, 3)
            .get("/cosmetics", RequestOptions::new().query("language", "pt-BR"))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], seen[1]);
        assert!(Uuid::parse_str(&seen[0]).is_ok());
    }
}
