// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Prometheus metrics for outbound catalog traffic.
//!
//! Tracks per-attempt latency and outcome, in-flight requests, retries and
//! failed fetches. Everything accumulates for the process lifetime.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use prometheus::proto::MetricType;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use serde::Serialize;
use tokio::time::Instant;

use crate::error::AppError;

/// Per-attempt HTTP latency in milliseconds.
///
/// Labels: `endpoint`, `method`, `status`.
pub const HTTP_REQUEST_DURATION_MS: &str = "catalog_relay_http_request_duration_ms";

/// HTTP attempts dispatched to the provider.
///
/// Labels: `endpoint`, `method`, `status`.
pub const HTTP_REQUESTS_TOTAL: &str = "catalog_relay_http_requests_total";

/// Retries performed (attempts beyond the first).
///
/// Labels: `endpoint`.
pub const HTTP_RETRIES_TOTAL: &str = "catalog_relay_http_retries_total";

/// Fetch operations that ended in an error.
///
/// Labels: `operation`, `code`.
pub const FETCH_ERRORS_TOTAL: &str = "catalog_relay_fetch_errors_total";

/// Upper bounds of the latency buckets; `+Inf` is implicit.
pub const LATENCY_BUCKETS_MS: [f64; 7] = [10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 10000.0];

/// A dispatched request that has not resolved yet.
#[derive(Debug, Clone)]
pub struct InFlightRequest {
    pub endpoint: String,
    pub method: String,
    pub started_at: Instant,
    pub attempt_count: u32,
}

#[derive(Debug, Clone, Copy)]
struct Extremes {
    min: f64,
    max: f64,
}

#[derive(Clone)]
pub struct MetricsSink {
    registry: Arc<Registry>,
    request_duration: HistogramVec,
    requests_total: IntCounterVec,
    retries_total: IntCounterVec,
    fetch_errors: IntCounterVec,
    extremes: Arc<Mutex<HashMap<String, Extremes>>>,
    in_flight: Arc<Mutex<HashMap<String, InFlightRequest>>>,
}

impl MetricsSink {
    pub fn new() -> Result<Self, AppError> {
        let registry = Registry::new();

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                HTTP_REQUEST_DURATION_MS,
                "Duration of HTTP attempts against the catalog provider in milliseconds",
            )
            .buckets(LATENCY_BUCKETS_MS.to_vec()),
            &["endpoint", "method", "status"],
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create metric: {}", e)))?;

        let requests_total = IntCounterVec::new(
            Opts::new(
                HTTP_REQUESTS_TOTAL,
                "Total number of HTTP attempts against the catalog provider",
            ),
            &["endpoint", "method", "status"],
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create metric: {}", e)))?;

        let retries_total = IntCounterVec::new(
            Opts::new(
                HTTP_RETRIES_TOTAL,
                "Total number of retried HTTP attempts against the catalog provider",
            ),
            &["endpoint"],
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create metric: {}", e)))?;

        let fetch_errors = IntCounterVec::new(
            Opts::new(
                FETCH_ERRORS_TOTAL,
                "Total number of catalog fetch operations that failed",
            ),
            &["operation", "code"],
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create metric: {}", e)))?;

        registry
            .register(Box::new(request_duration.clone()))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to register metric: {}", e)))?;
        registry
            .register(Box::new(requests_total.clone()))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to register metric: {}", e)))?;
        registry
            .register(Box::new(retries_total.clone()))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to register metric: {}", e)))?;
        registry
            .register(Box::new(fetch_errors.clone()))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to register metric: {}", e)))?;

        Ok(Self {
            registry: Arc::new(registry),
            request_duration,
            requests_total,
            retries_total,
            fetch_errors,
            extremes: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Start tracking a logical request under `request_id`.
    pub fn begin_request(&self, request_id: &str, endpoint: &str, method: &str) {
        let entry = InFlightRequest {
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            started_at: Instant::now(),
            attempt_count: 0,
        };
        lock(&self.in_flight).insert(request_id.to_string(), entry);
    }

    /// Record the outcome of one HTTP attempt for a tracked request.
    ///
    /// `status` is the HTTP status code or a failure label such as `timeout`.
    pub fn record_attempt(&self, request_id: &str, status: &str, elapsed: Duration) {
        let (endpoint, method) = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get_mut(request_id) {
                Some(entry) => {
                    entry.attempt_count += 1;
                    (entry.endpoint.clone(), entry.method.clone())
                }
                None => {
                    tracing::debug!(request_id, "attempt recorded for untracked request");
                    return;
                }
            }
        };

        let millis = elapsed.as_secs_f64() * 1000.0;
        let labels = [
            ("endpoint", endpoint.as_str()),
            ("method", method.as_str()),
            ("status", status),
        ];
        let values = [endpoint.as_str(), method.as_str(), status];

        self.request_duration.with_label_values(&values).observe(millis);
        self.requests_total.with_label_values(&values).inc();

        let key = series_key(HTTP_REQUEST_DURATION_MS, &labels);
        lock(&self.extremes)
            .entry(key)
            .and_modify(|ext| {
                ext.min = ext.min.min(millis);
                ext.max = ext.max.max(millis);
            })
            .or_insert(Extremes {
                min: millis,
                max: millis,
            });
    }

    /// Stop tracking a request, counting any retries it took.
    pub fn finish_request(&self, request_id: &str) -> Option<InFlightRequest> {
        let entry = lock(&self.in_flight).remove(request_id)?;
        if entry.attempt_count > 1 {
            self.retries_total
                .with_label_values(&[entry.endpoint.as_str()])
                .inc_by(u64::from(entry.attempt_count - 1));
        }
        Some(entry)
    }

    pub fn record_fetch_error(&self, operation: &str, code: &str) {
        self.fetch_errors.with_label_values(&[operation, code]).inc();
    }

    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Aggregate view of every recorded series.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let extremes = lock(&self.extremes).clone();
        let mut histograms = Vec::new();
        let mut counters = Vec::new();

        for family in self.registry.gather() {
            let name = family.get_name();
            for metric in family.get_metric() {
                let labels: BTreeMap<String, String> = metric
                    .get_label()
                    .iter()
                    .map(|pair| (pair.get_name().to_string(), pair.get_value().to_string()))
                    .collect();

                match family.get_field_type() {
                    MetricType::HISTOGRAM => {
                        let histogram = metric.get_histogram();
                        let count = histogram.get_sample_count();
                        let sum = histogram.get_sample_sum();
                        let pairs: Vec<(&str, &str)> = labels
                            .iter()
                            .map(|(k, v)| (k.as_str(), v.as_str()))
                            .collect();
                        let ext = extremes.get(&series_key(name, &pairs)).copied();

                        let mut buckets: Vec<BucketCount> = histogram
                            .get_bucket()
                            .iter()
                            .map(|bucket| BucketCount {
                                le: format_bound(bucket.get_upper_bound()),
                                count: bucket.get_cumulative_count(),
                            })
                            .collect();
                        buckets.push(BucketCount {
                            le: "+Inf".to_string(),
                            count,
                        });

                        histograms.push(HistogramSummary {
                            name: name.to_string(),
                            labels,
                            count,
                            sum,
                            min: ext.map_or(0.0, |e| e.min),
                            max: ext.map_or(0.0, |e| e.max),
                            mean: if count > 0 { sum / count as f64 } else { 0.0 },
                            buckets,
                        });
                    }
                    MetricType::COUNTER => counters.push(CounterSummary {
                        name: name.to_string(),
                        labels,
                        value: metric.get_counter().get_value() as u64,
                    }),
                    _ => {}
                }
            }
        }

        MetricsSnapshot {
            histograms,
            counters,
            in_flight: self.in_flight_count(),
        }
    }

    /// Export metrics in Prometheus format
    pub fn export(&self) -> Result<String, AppError> {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode metrics: {}", e)))?;

        String::from_utf8(buffer).map_err(|e| {
            AppError::Internal(anyhow::anyhow!(
                "Failed to convert metrics to string: {}",
                e
            ))
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub histograms: Vec<HistogramSummary>,
    pub counters: Vec<CounterSummary>,
    pub in_flight: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistogramSummary {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub buckets: Vec<BucketCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketCount {
    pub le: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CounterSummary {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: u64,
}

impl MetricsSnapshot {
    /// Counter value of the first series whose labels include `labels`.
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> Option<u64> {
        self.counters
            .iter()
            .find(|c| c.name == name && labels_match(&c.labels, labels))
            .map(|c| c.value)
    }

    pub fn histogram(&self, name: &str, labels: &[(&str, &str)]) -> Option<&HistogramSummary> {
        self.histograms
            .iter()
            .find(|h| h.name == name && labels_match(&h.labels, labels))
    }
}

fn labels_match(series: &BTreeMap<String, String>, wanted: &[(&str, &str)]) -> bool {
    wanted
        .iter()
        .all(|(k, v)| series.get(*k).map(String::as_str) == Some(*v))
}

fn series_key(name: &str, labels: &[(&str, &str)]) -> String {
    let mut sorted = labels.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let rendered: Vec<String> = sorted
        .iter()
        .map(|(k, v)| format!("{k}=\"{v}\""))
        .collect();
    format!("{name}{{{}}}", rendered.join(","))
}

fn format_bound(bound: f64) -> String {
    if bound.fract() == 0.0 {
        format!("{}", bound as i64)
    } else {
        bound.to_string()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
