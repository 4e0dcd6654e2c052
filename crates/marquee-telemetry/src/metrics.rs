//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters and gauges the bot's queue, search and timers update.

use std::sync::Arc;

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across the bot.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    queue_depth: IntGauge,
    status_subscriptions: IntGauge,
    admissions_total: IntCounterVec,
    searches_total: IntCounterVec,
    evictions_total: IntCounterVec,
    timer_tick_failures_total: IntCounterVec,
}

/// Snapshot of selected gauges for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Downloads currently in the queue.
    pub queue_depth: i64,
    /// Status messages currently refreshed.
    pub status_subscriptions: i64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any collector cannot be built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let queue_depth = gauge("queue_depth", "Downloads currently held in the queue")?;
        let status_subscriptions = gauge(
            "status_subscriptions",
            "Status messages refreshed on a timer",
        )?;
        let admissions_total = counter_vec(
            "admissions_total",
            "Admission attempts by outcome",
            &["outcome"],
        )?;
        let searches_total =
            counter_vec("searches_total", "Search requests by outcome", &["outcome"])?;
        let evictions_total = counter_vec(
            "evictions_total",
            "Downloads removed from the queue by reason",
            &["reason"],
        )?;
        let timer_tick_failures_total = counter_vec(
            "timer_tick_failures_total",
            "Recurring task ticks that returned an error",
            &["task"],
        )?;

        register(&registry, "queue_depth", Box::new(queue_depth.clone()))?;
        register(
            &registry,
            "status_subscriptions",
            Box::new(status_subscriptions.clone()),
        )?;
        register(
            &registry,
            "admissions_total",
            Box::new(admissions_total.clone()),
        )?;
        register(&registry, "searches_total", Box::new(searches_total.clone()))?;
        register(
            &registry,
            "evictions_total",
            Box::new(evictions_total.clone()),
        )?;
        register(
            &registry,
            "timer_tick_failures_total",
            Box::new(timer_tick_failures_total.clone()),
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                queue_depth,
                status_subscriptions,
                admissions_total,
                searches_total,
                evictions_total,
                timer_tick_failures_total,
            }),
        })
    }

    /// Set the queue depth gauge.
    pub fn set_queue_depth(&self, depth: usize) {
        self.inner.queue_depth.set(saturating_i64(depth));
    }

    /// Set the status subscription gauge.
    pub fn set_status_subscriptions(&self, count: usize) {
        self.inner.status_subscriptions.set(saturating_i64(count));
    }

    /// Count an admission attempt.
    pub fn inc_admission(&self, outcome: &str) {
        self.inner
            .admissions_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Count a search request.
    pub fn inc_search(&self, outcome: &str) {
        self.inner
            .searches_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Count a download leaving the queue.
    pub fn inc_eviction(&self, reason: &str) {
        self.inner
            .evictions_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Count a failed recurring task tick.
    pub fn inc_timer_tick_failure(&self, task: &str) {
        self.inner
            .timer_tick_failures_total
            .with_label_values(&[task])
            .inc();
    }

    /// Current value of a labelled counter, mainly for assertions.
    #[must_use]
    pub fn admissions(&self, outcome: &str) -> u64 {
        self.inner
            .admissions_total
            .with_label_values(&[outcome])
            .get()
    }

    /// Current eviction count for `reason`.
    #[must_use]
    pub fn evictions(&self, reason: &str) -> u64 {
        self.inner
            .evictions_total
            .with_label_values(&[reason])
            .get()
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::DumpEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::DumpUtf8 { source })
    }

    /// Take a point-in-time snapshot of the gauges.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_depth: self.inner.queue_depth.get(),
            status_subscriptions: self.inner.status_subscriptions.get(),
        }
    }
}

fn gauge(name: &'static str, help: &str) -> Result<IntGauge> {
    IntGauge::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::MetricBuild { metric: name, source })
}

fn counter_vec(name: &'static str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::MetricBuild { metric: name, source })
}

fn register(
    registry: &Registry,
    name: &'static str,
    collector: Box<dyn prometheus::core::Collector>,
) -> Result<()> {
    registry
        .register(collector)
        .map_err(|source| TelemetryError::MetricRegister { metric: name, source })
}

fn saturating_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_updates() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.set_queue_depth(2);
        metrics.set_status_subscriptions(4);
        metrics.inc_admission("admitted");
        metrics.inc_admission("queue_full");
        metrics.inc_admission("queue_full");
        metrics.inc_search("results");
        metrics.inc_eviction("expired");
        metrics.inc_timer_tick_failure("status");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.queue_depth, 2);
        assert_eq!(snapshot.status_subscriptions, 4);
        assert_eq!(metrics.admissions("queue_full"), 2);
        assert_eq!(metrics.evictions("expired"), 1);

        let rendered = metrics.render()?;
        assert!(rendered.contains("admissions_total"));
        assert!(rendered.contains("timer_tick_failures_total"));
        Ok(())
    }

    #[test]
    fn registries_are_independent() -> Result<()> {
        let first = Metrics::new()?;
        let second = Metrics::new()?;
        first.inc_eviction("completed");
        assert_eq!(second.evictions("completed"), 0);
        Ok(())
    }

    #[test]
    fn saturating_conversion_caps_large_values() {
        assert_eq!(saturating_i64(7), 7);
    }
}
