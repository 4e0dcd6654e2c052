//! Error types for admission, lifecycle, search and status operations.

use std::error::Error;

use thiserror::Error;

use crate::model::{TransferDescriptor, TransferId};

/// Reasons a candidate is refused entry into the download queue.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// Candidate carries no usable transfer descriptor.
    #[error("invalid transfer descriptor")]
    InvalidDescriptor,
    /// Queue already holds `capacity` downloads.
    #[error("download queue is full")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },
    /// Payload exceeds the size ceiling.
    #[error("download exceeds size limit")]
    TooLarge {
        /// Candidate size in KiB.
        size_kb: u64,
        /// Configured ceiling in KiB.
        max_kb: u64,
    },
    /// Swarm health is below the configured floor.
    #[error("download quality too low")]
    LowQuality {
        /// Seeds reported for the candidate.
        seeds: u32,
        /// Leeches reported for the candidate.
        leeches: u32,
    },
    /// Descriptor is already queued or being resolved.
    #[error("download already queued")]
    AlreadyQueued {
        /// Duplicate descriptor.
        descriptor: TransferDescriptor,
    },
    /// Transfer engine failed to resolve the descriptor.
    #[error("transfer engine operation failed")]
    Engine {
        /// Engine operation identifier.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl AdmissionError {
    /// Reply text shown to the chat.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidDescriptor => "The download link is not valid.".to_string(),
            Self::QueueFull { capacity } => {
                format!("The download queue is full ({capacity} active), try again later.")
            }
            Self::TooLarge { .. } => "The file is too large.".to_string(),
            Self::LowQuality { .. } => "The download does not have enough quality.".to_string(),
            Self::AlreadyQueued { .. } => "That download is already in the queue.".to_string(),
            Self::Engine { .. } => {
                "Could not start the download, it is probably already in the queue.".to_string()
            }
        }
    }

    /// Machine-friendly outcome label for metrics.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::InvalidDescriptor => "invalid_descriptor",
            Self::QueueFull { .. } => "queue_full",
            Self::TooLarge { .. } => "too_large",
            Self::LowQuality { .. } => "low_quality",
            Self::AlreadyQueued { .. } => "already_queued",
            Self::Engine { .. } => "engine_error",
        }
    }
}

/// Lifecycle controller failures.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// No queue entry exists for the transfer id.
    #[error("download not found")]
    NotFound {
        /// Missing transfer identifier.
        transfer_id: TransferId,
    },
    /// Transfer engine operation failed.
    #[error("transfer engine operation failed")]
    Engine {
        /// Engine operation identifier.
        operation: &'static str,
        /// Transfer identifier involved.
        transfer_id: TransferId,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

/// Search service failures.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Another search holds the single-flight permit.
    #[error("search already in progress")]
    AlreadySearching,
    /// A search source failed as a whole or for a single row.
    #[error("search provider failed")]
    Provider {
        /// Provider name.
        provider: String,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl SearchError {
    /// Reply text shown to the chat.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::AlreadySearching => {
                "Already searching, wait for the current search to finish.".to_string()
            }
            Self::Provider { .. } => "The search failed, try again later.".to_string(),
        }
    }
}

/// Status watcher failures.
#[derive(Debug, Error)]
pub enum StatusError {
    /// No tracked download matches the transfer id.
    #[error("download not found")]
    NotFound {
        /// Missing transfer identifier.
        transfer_id: TransferId,
    },
    /// Looking the download up failed.
    #[error("download lookup failed")]
    Lookup {
        /// Underlying lifecycle failure.
        #[source]
        source: LifecycleError,
    },
    /// Chat transport failed to deliver the status message.
    #[error("status delivery failed")]
    Transport {
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StatusError {
    /// Reply text shown to the chat.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { .. } => "That download is no longer in the queue.".to_string(),
            Self::Lookup { .. } => "Could not read the download status.".to_string(),
            Self::Transport { .. } => "Could not send the download status.".to_string(),
        }
    }
}

/// Convenience alias for admission results.
pub type AdmissionResult<T> = Result<T, AdmissionError>;

/// Convenience alias for lifecycle results.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Convenience alias for search results.
pub type SearchResult<T> = Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_errors_render_user_messages() {
        let full = AdmissionError::QueueFull { capacity: 3 };
        assert!(full.user_message().contains("3 active"));
        assert_eq!(full.outcome(), "queue_full");

        let engine = AdmissionError::Engine {
            operation: "add",
            source: anyhow::anyhow!("boom").into(),
        };
        assert!(engine.source().is_some());
        assert_eq!(engine.outcome(), "engine_error");
    }

    #[test]
    fn search_errors_keep_provider_source() {
        let err = SearchError::Provider {
            provider: "catalog".to_string(),
            source: anyhow::anyhow!("offline").into(),
        };
        assert_eq!(err.to_string(), "search provider failed");
        assert!(err.source().is_some());
        assert!(SearchError::AlreadySearching.user_message().contains("Already"));
    }

    #[test]
    fn status_not_found_is_user_visible() {
        let err = StatusError::NotFound {
            transfer_id: TransferId::new("abc"),
        };
        assert!(err.user_message().contains("no longer"));
    }
}
