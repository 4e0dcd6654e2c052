//! Core media-request domain types and DTOs shared across the workspace.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::CandidateId;

pub mod chat;

/// Opaque address (magnet-style URI) identifying a peer-to-peer transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferDescriptor(String);

impl TransferDescriptor {
    #[must_use]
    /// Wrap a raw descriptor string.
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    #[must_use]
    /// Borrow the underlying URI.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    /// Whether the descriptor carries no usable address.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TransferDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier the transfer engine assigns to a resolved handle (info hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(String);

impl TransferId {
    #[must_use]
    /// Wrap a raw engine identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    /// Borrow the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One search hit with quality metadata, prior to admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    /// Time-ordered unique identifier, doubles as the selection token.
    pub id: CandidateId,
    /// Name of the provider that produced the row.
    pub source: String,
    /// Title as listed by the source.
    pub title: String,
    /// Number of seeding peers.
    pub seeds: u32,
    /// Number of leeching peers.
    pub leeches: u32,
    /// Payload size in KiB.
    pub size_kb: u64,
    /// Link to the source detail page.
    pub source_link: String,
    /// Transfer descriptor when the source exposed one.
    pub descriptor: Option<TransferDescriptor>,
    /// Category label reported by the source.
    pub category: Option<String>,
}

impl CandidateResult {
    /// Seed to leech ratio; a candidate without leeches has an unbounded ratio.
    #[must_use]
    pub fn seed_ratio(&self) -> f64 {
        if self.leeches == 0 {
            f64::INFINITY
        } else {
            f64::from(self.seeds) / f64::from(self.leeches)
        }
    }
}

/// Knobs handed to the transfer engine alongside a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOptions {
    /// Storage folder for downloaded payloads.
    pub download_dir: PathBuf,
    /// Download rate limit in KiB/s.
    pub download_limit_kbps: Option<u64>,
    /// Upload rate limit in KiB/s.
    pub upload_limit_kbps: Option<u64>,
    /// Delete stored payloads when the handle is destroyed.
    pub destroy_store_on_destroy: bool,
}

impl Default for AddOptions {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("./downloads"),
            download_limit_kbps: None,
            upload_limit_kbps: None,
            destroy_store_on_destroy: true,
        }
    }
}

/// File exposed by a transfer handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFile {
    /// File name relative to the transfer root.
    pub name: String,
    /// Absolute or storage-relative path on disk.
    pub path: PathBuf,
    /// File length in bytes.
    pub size_bytes: u64,
}

/// Live transfer rates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRates {
    /// Current download rate in bytes per second.
    pub download_bps: u64,
    /// Current upload rate in bytes per second.
    pub upload_bps: u64,
}

/// Point-in-time view of an engine handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSnapshot {
    /// Engine identifier.
    pub id: TransferId,
    /// Display name once metadata is known.
    pub name: String,
    /// Payload length in bytes.
    pub total_bytes: u64,
    /// Bytes already downloaded.
    pub downloaded_bytes: u64,
    /// Current rates.
    pub rates: TransferRates,
    /// Completion flag reported by the engine.
    pub done: bool,
    /// Files in the payload.
    pub files: Vec<TransferFile>,
}

/// Lifecycle stage of a queued download. A descriptor still being resolved holds a
/// queue slot but has no download yet; absence from the queue is the terminal
/// `Removed` stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    /// Handle resolved, progress observable.
    Active,
    /// Completion flag observed.
    Done,
    /// Removal scheduled.
    Evicting,
}

impl DownloadState {
    #[must_use]
    /// Human-readable label used in status text.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "downloading",
            Self::Done => "done",
            Self::Evicting => "finishing",
        }
    }
}

/// A tracked download: engine snapshot joined with its queue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveDownload {
    /// Engine identifier shared with the queue entry.
    pub transfer_id: TransferId,
    /// Descriptor the download was admitted with.
    pub descriptor: TransferDescriptor,
    /// Display name.
    pub display_name: String,
    /// Payload length in bytes.
    pub total_bytes: u64,
    /// Bytes already downloaded.
    pub downloaded_bytes: u64,
    /// Current rates.
    pub rates: TransferRates,
    /// Completion flag.
    pub done: bool,
    /// Files in the payload.
    pub files: Vec<TransferFile>,
    /// Admission timestamp.
    pub created_at: DateTime<Utc>,
    /// Lifecycle stage.
    pub state: DownloadState,
}

impl ActiveDownload {
    /// Percentage of the payload already downloaded.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn percent_complete(&self) -> f64 {
        if self.done {
            100.0
        } else if self.total_bytes == 0 {
            0.0
        } else {
            (self.downloaded_bytes as f64 / self.total_bytes as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(seeds: u32, leeches: u32) -> CandidateResult {
        CandidateResult {
            id: CandidateId::from_raw(1),
            source: "test".into(),
            title: "demo".into(),
            seeds,
            leeches,
            size_kb: 1,
            source_link: "https://example.invalid/1".into(),
            descriptor: None,
            category: None,
        }
    }

    #[test]
    fn seed_ratio_handles_zero_leeches() {
        assert!(candidate(3, 0).seed_ratio().is_infinite());
        assert!((candidate(10, 4).seed_ratio() - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn descriptor_blank_detection() {
        assert!(TransferDescriptor::new("   ").is_blank());
        assert!(!TransferDescriptor::new("magnet:?xt=urn:btih:abc").is_blank());
    }

    #[test]
    fn percent_complete_reports_full_when_done() {
        let download = ActiveDownload {
            transfer_id: TransferId::new("abc"),
            descriptor: TransferDescriptor::new("magnet:?xt=urn:btih:abc"),
            display_name: "demo".into(),
            total_bytes: 0,
            downloaded_bytes: 0,
            rates: TransferRates::default(),
            done: true,
            files: Vec::new(),
            created_at: Utc::now(),
            state: DownloadState::Done,
        };
        assert!((download.percent_complete() - 100.0).abs() < f64::EPSILON);
    }
}
