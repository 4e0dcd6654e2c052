//! Failures raised while installing logging or building the bot's metrics.

use prometheus::Error as PrometheusError;
use thiserror::Error;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Telemetry failures. Every one of them is fatal at startup.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global tracing subscriber was already installed.
    #[error("failed to install tracing subscriber")]
    SubscriberInstall {
        /// Underlying tracing subscriber error.
        #[source]
        source: tracing_subscriber::util::TryInitError,
    },
    /// A queue, search or timer collector could not be built.
    #[error("failed to build bot metric")]
    MetricBuild {
        /// Metric name, e.g. `queue_depth`.
        metric: &'static str,
        /// Underlying Prometheus error.
        #[source]
        source: PrometheusError,
    },
    /// A collector clashed with one already in the bot registry.
    #[error("failed to register bot metric")]
    MetricRegister {
        /// Metric name, e.g. `admissions_total`.
        metric: &'static str,
        /// Underlying Prometheus error.
        #[source]
        source: PrometheusError,
    },
    /// The shutdown metrics dump could not be encoded.
    #[error("failed to encode metrics dump")]
    DumpEncode {
        /// Underlying Prometheus error.
        #[source]
        source: PrometheusError,
    },
    /// The encoded dump was not UTF-8.
    #[error("metrics dump was not valid utf-8")]
    DumpUtf8 {
        /// Underlying UTF-8 conversion error.
        #[source]
        source: std::string::FromUtf8Error,
    },
}
