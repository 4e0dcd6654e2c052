//! In-memory transfer engine that simulates progress from the configured rate.
//!
//! # Design
//! - Progress is a pure function of elapsed time and the download limit, so tests with
//!   paused tokio time are deterministic.
//! - Handles are keyed by the descriptor's info hash; adding the same descriptor twice
//!   fails like a real session would.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use marquee_core::{
    AddOptions, TransferDescriptor, TransferEngine, TransferFile, TransferId, TransferRates,
    TransferSnapshot,
};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

/// Payload size used when the descriptor carries no `xl=` length.
pub const DEFAULT_PAYLOAD_BYTES: u64 = 64 * 1024 * 1024;
/// Rate used when the add request carries no download limit.
pub const DEFAULT_RATE_BPS: u64 = 1024 * 1024;

/// Simulated engine; cheap to share behind an `Arc`.
#[derive(Default)]
pub struct SimulatedEngine {
    transfers: RwLock<HashMap<TransferId, SimulatedTransfer>>,
}

#[derive(Debug, Clone)]
struct SimulatedTransfer {
    name: String,
    total_bytes: u64,
    download_bps: u64,
    upload_bps: u64,
    download_dir: PathBuf,
    started: Instant,
}

impl SimulatedTransfer {
    fn downloaded(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.started);
        let bytes = u128::from(self.download_bps) * elapsed.as_millis() / 1_000;
        u64::try_from(bytes)
            .unwrap_or(u64::MAX)
            .min(self.total_bytes)
    }

    fn snapshot(&self, id: &TransferId, now: Instant) -> TransferSnapshot {
        let downloaded_bytes = self.downloaded(now);
        let done = downloaded_bytes >= self.total_bytes;
        TransferSnapshot {
            id: id.clone(),
            name: self.name.clone(),
            total_bytes: self.total_bytes,
            downloaded_bytes,
            rates: TransferRates {
                download_bps: if done { 0 } else { self.download_bps },
                upload_bps: self.upload_bps,
            },
            done,
            files: vec![TransferFile {
                name: self.name.clone(),
                path: self.download_dir.join(&self.name),
                size_bytes: self.total_bytes,
            }],
        }
    }
}

impl SimulatedEngine {
    /// Empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live handles.
    pub async fn len(&self) -> usize {
        self.transfers.read().await.len()
    }

    /// Whether no handle is live.
    pub async fn is_empty(&self) -> bool {
        self.transfers.read().await.is_empty()
    }
}

#[async_trait]
impl TransferEngine for SimulatedEngine {
    async fn add(
        &self,
        descriptor: &TransferDescriptor,
        options: &AddOptions,
    ) -> Result<TransferSnapshot> {
        if descriptor.is_blank() {
            bail!("descriptor is blank");
        }
        let fields = MagnetFields::parse(descriptor)?;
        let id = fields.transfer_id(descriptor);
        let mut transfers = self.transfers.write().await;
        if transfers.contains_key(&id) {
            bail!("transfer {id} already exists");
        }
        let transfer = SimulatedTransfer {
            name: fields.name.unwrap_or_else(|| id.to_string()),
            total_bytes: fields.length.unwrap_or(DEFAULT_PAYLOAD_BYTES),
            download_bps: options
                .download_limit_kbps
                .map_or(DEFAULT_RATE_BPS, |kbps| kbps.saturating_mul(1024)),
            upload_bps: options
                .upload_limit_kbps
                .map_or(0, |kbps| kbps.saturating_mul(1024)),
            download_dir: options.download_dir.clone(),
            started: Instant::now(),
        };
        let snapshot = transfer.snapshot(&id, transfer.started);
        info!(transfer_id = %id, name = %transfer.name, "simulated transfer added");
        transfers.insert(id, transfer);
        Ok(snapshot)
    }

    async fn snapshot(&self, id: &TransferId) -> Result<Option<TransferSnapshot>> {
        let now = Instant::now();
        Ok(self
            .transfers
            .read()
            .await
            .get(id)
            .map(|transfer| transfer.snapshot(id, now)))
    }

    async fn destroy(&self, id: &TransferId) -> Result<()> {
        let Some(transfer) = self.transfers.write().await.remove(id) else {
            return Err(anyhow!("unknown transfer {id}"));
        };
        debug!(transfer_id = %id, name = %transfer.name, "simulated transfer destroyed");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TransferSnapshot>> {
        let now = Instant::now();
        let transfers = self.transfers.read().await;
        let mut snapshots: Vec<TransferSnapshot> = transfers
            .iter()
            .map(|(id, transfer)| transfer.snapshot(id, now))
            .collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(snapshots)
    }
}

/// Query fields the simulation reads from a magnet descriptor.
#[derive(Debug, Default, PartialEq, Eq)]
struct MagnetFields {
    info_hash: Option<String>,
    name: Option<String>,
    length: Option<u64>,
}

impl MagnetFields {
    /// First `xt` (btih only), `dn` and `xl` values, percent-decoded.
    fn parse(descriptor: &TransferDescriptor) -> Result<Self> {
        let uri = Url::parse(descriptor.as_str()).context("descriptor is not a valid uri")?;
        let mut fields = Self::default();
        for (key, value) in uri.query_pairs() {
            match key.as_ref() {
                "xt" if fields.info_hash.is_none() => {
                    fields.info_hash = value
                        .strip_prefix("urn:btih:")
                        .filter(|hash| !hash.is_empty())
                        .map(str::to_ascii_lowercase);
                }
                "dn" if fields.name.is_none() => fields.name = Some(value.into_owned()),
                "xl" if fields.length.is_none() => fields.length = value.parse().ok(),
                _ => {}
            }
        }
        Ok(fields)
    }

    /// The `btih` hash when present, otherwise a digest of the whole URI.
    fn transfer_id(&self, descriptor: &TransferDescriptor) -> TransferId {
        if let Some(hash) = &self.info_hash {
            return TransferId::new(hash.clone());
        }
        let mut hasher = DefaultHasher::new();
        descriptor.as_str().hash(&mut hasher);
        TransferId::new(format!("{:016x}", hasher.finish()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn options(limit_kbps: u64) -> AddOptions {
        AddOptions {
            download_dir: PathBuf::from("/tmp/marquee"),
            download_limit_kbps: Some(limit_kbps),
            upload_limit_kbps: Some(50),
            destroy_store_on_destroy: true,
        }
    }

    fn fields(raw: &str) -> Result<MagnetFields> {
        MagnetFields::parse(&TransferDescriptor::new(raw))
    }

    #[test]
    fn ids_prefer_info_hash() -> Result<()> {
        let descriptor = TransferDescriptor::new("magnet:?xt=urn:btih:ABCDEF&dn=Some+Movie");
        let parsed = MagnetFields::parse(&descriptor)?;
        assert_eq!(parsed.transfer_id(&descriptor).as_str(), "abcdef");

        let plain = TransferDescriptor::new("magnet:?dn=unnamed");
        let parsed = MagnetFields::parse(&plain)?;
        assert_eq!(parsed.transfer_id(&plain).as_str().len(), 16);
        Ok(())
    }

    #[test]
    fn encoded_info_hash_is_decoded_before_matching() -> Result<()> {
        let parsed = fields("magnet:?xt=urn%3Abtih%3AABC&dn=x")?;
        assert_eq!(parsed.info_hash.as_deref(), Some("abc"));
        Ok(())
    }

    #[test]
    fn names_and_lengths_are_decoded() -> Result<()> {
        let parsed = fields("magnet:?xt=urn:btih:aa&dn=Some+Movie%20%281999%29&xl=4096")?;
        assert_eq!(
            parsed,
            MagnetFields {
                info_hash: Some("aa".to_string()),
                name: Some("Some Movie (1999)".to_string()),
                length: Some(4096),
            }
        );
        let loose = fields("magnet:?xt=urn:sha1:zz&dn=100%25&xl=lots")?;
        assert_eq!(loose.info_hash, None);
        assert_eq!(loose.name.as_deref(), Some("100%"));
        assert_eq!(loose.length, None);
        Ok(())
    }

    #[tokio::test]
    async fn non_uri_descriptors_are_rejected() {
        let engine = SimulatedEngine::new();
        let descriptor = TransferDescriptor::new("not a uri");
        assert!(engine.add(&descriptor, &options(700)).await.is_err());
        assert!(engine.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_follows_rate_until_done() -> Result<()> {
        let engine = SimulatedEngine::new();
        let descriptor =
            TransferDescriptor::new("magnet:?xt=urn:btih:feed&dn=clip&xl=2048000");
        let added = engine.add(&descriptor, &options(1_000)).await?;
        assert_eq!(added.downloaded_bytes, 0);
        assert_eq!(added.name, "clip");
        assert!(!added.done);

        tokio::time::advance(Duration::from_secs(1)).await;
        let partial = engine
            .snapshot(&added.id)
            .await?
            .ok_or_else(|| anyhow!("missing"))?;
        assert_eq!(partial.downloaded_bytes, 1_024_000);
        assert!(!partial.done);

        tokio::time::advance(Duration::from_secs(1)).await;
        let finished = engine
            .snapshot(&added.id)
            .await?
            .ok_or_else(|| anyhow!("missing"))?;
        assert!(finished.done);
        assert_eq!(finished.files[0].path, PathBuf::from("/tmp/marquee/clip"));
        Ok(())
    }

    #[tokio::test]
    async fn duplicates_and_unknown_ids_fail() -> Result<()> {
        let engine = SimulatedEngine::new();
        let descriptor = TransferDescriptor::new("magnet:?xt=urn:btih:beef");
        let added = engine.add(&descriptor, &options(700)).await?;
        assert!(engine.add(&descriptor, &options(700)).await.is_err());
        assert_eq!(engine.list().await?.len(), 1);

        engine.destroy(&added.id).await?;
        assert!(engine.is_empty().await);
        assert!(engine.destroy(&added.id).await.is_err());
        assert!(engine.snapshot(&added.id).await?.is_none());
        Ok(())
    }
}
