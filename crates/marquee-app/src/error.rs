//! # Design
//!
//! - Centralize application-level errors for bootstrap and wiring.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use std::error::Error;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration operations failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: marquee_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: marquee_telemetry::TelemetryError,
    },
    /// IO operations failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Optional path involved in the failure.
        path: Option<PathBuf>,
        /// Source IO error.
        source: io::Error,
    },
    /// A search provider could not acquire its resources.
    #[error("search provider operation failed")]
    Provider {
        /// Operation identifier.
        operation: &'static str,
        /// Provider name.
        name: String,
        /// Underlying failure.
        source: Box<dyn Error + Send + Sync>,
    },
    /// A command pattern failed to compile.
    #[error("invalid command pattern")]
    Pattern {
        /// Pattern text.
        pattern: String,
        /// Source regex error.
        source: regex::Error,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: marquee_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: marquee_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn io(
        operation: &'static str,
        path: Option<PathBuf>,
        source: io::Error,
    ) -> Self {
        Self::Io {
            operation,
            path,
            source,
        }
    }

    pub(crate) fn provider(operation: &'static str, name: &str, source: anyhow::Error) -> Self {
        Self::Provider {
            operation,
            name: name.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn pattern(pattern: &str, source: regex::Error) -> Self {
        Self::Pattern {
            pattern: pattern.to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_error_helpers_build_variants() {
        let config = AppError::config(
            "settings.load",
            marquee_config::ConfigError::InvalidField {
                field: "min_seeds".to_string(),
                value: Some("many".to_string()),
                reason: "unparsable_value",
            },
        );
        assert!(matches!(config, AppError::Config { .. }));
        assert!(config.source().is_some());

        let io = AppError::io("downloads.create", None, io::Error::other("io"));
        assert_eq!(io.to_string(), "io operation failed");

        let provider = AppError::provider("providers.init", "catalog", anyhow::anyhow!("gone"));
        assert!(matches!(provider, AppError::Provider { ref name, .. } if name == "catalog"));

        let Err(regex_error) = regex::Regex::new("(") else {
            panic!("pattern should not compile");
        };
        let pattern = AppError::pattern("(", regex_error);
        assert!(pattern.source().is_some());
    }
}
