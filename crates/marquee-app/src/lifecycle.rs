//! Download lifecycle controller: the bounded queue, per-download watchers, forced
//! eviction on age and delayed removal after completion.
//!
//! # Design
//! - The queue maps transfer id to entry; the engine owns the handles. The two are
//!   joined by id on every read and never hold references to each other.
//! - One recurring watcher per download. A watcher that finds its entry or handle
//!   gone stops quietly.
//! - Queue mutations happen under one async mutex that is never held across an
//!   engine call. A descriptor being resolved counts toward capacity and duplicates.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use marquee_config::BotSettings;
use marquee_core::{
    ActiveDownload, AddOptions, AdmissionError, AdmissionResult, ChatId, CompletionSink,
    DownloadState, LifecycleError, LifecycleResult, TransferDescriptor, TransferEngine,
    TransferId, TransferSnapshot,
};
use marquee_telemetry::Metrics;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::timers::{RecurringTask, TickOutcome, TimerHandle, spawn_delayed};

/// Queue limits and timings.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Downloads admitted at once.
    pub capacity: usize,
    /// Age after which an unfinished download is evicted.
    pub max_age: Duration,
    /// Grace window between completion and removal.
    pub remove_delay: Duration,
    /// Watcher cadence.
    pub poll_interval: Duration,
    /// Options passed to the engine on every add.
    pub add_options: AddOptions,
}

impl From<&BotSettings> for LifecycleConfig {
    fn from(settings: &BotSettings) -> Self {
        Self {
            capacity: settings.max_queue_size,
            max_age: settings.max_download_age(),
            remove_delay: settings.remove_delay(),
            poll_interval: settings.poll_interval(),
            add_options: AddOptions {
                download_dir: settings.download_path.clone(),
                download_limit_kbps: Some(settings.download_speed_limit_kbps),
                upload_limit_kbps: Some(settings.upload_speed_limit_kbps),
                destroy_store_on_destroy: true,
            },
        }
    }
}

#[derive(Debug)]
struct QueueEntry {
    descriptor: TransferDescriptor,
    origin: ChatId,
    created_at: DateTime<Utc>,
    admitted: Instant,
    state: DownloadState,
    watcher: Option<TimerHandle>,
    removal: Option<TimerHandle>,
}

impl QueueEntry {
    fn cancel_timers(&self) {
        if let Some(watcher) = &self.watcher {
            watcher.cancel();
        }
        if let Some(removal) = &self.removal {
            removal.cancel();
        }
    }

    fn join(&self, snapshot: TransferSnapshot) -> ActiveDownload {
        ActiveDownload {
            transfer_id: snapshot.id,
            descriptor: self.descriptor.clone(),
            display_name: snapshot.name,
            total_bytes: snapshot.total_bytes,
            downloaded_bytes: snapshot.downloaded_bytes,
            rates: snapshot.rates,
            done: snapshot.done,
            files: snapshot.files,
            created_at: self.created_at,
            state: self.state,
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    entries: HashMap<TransferId, QueueEntry>,
    by_descriptor: HashMap<TransferDescriptor, TransferId>,
    resolving: HashSet<TransferDescriptor>,
}

impl QueueState {
    fn occupied(&self) -> usize {
        self.entries.len() + self.resolving.len()
    }
}

/// Owns the download queue and every watcher attached to it.
pub struct LifecycleController {
    engine: Arc<dyn TransferEngine>,
    sink: Arc<dyn CompletionSink>,
    config: LifecycleConfig,
    metrics: Metrics,
    state: Mutex<QueueState>,
}

impl LifecycleController {
    /// Controller with an empty queue.
    #[must_use]
    pub fn new(
        engine: Arc<dyn TransferEngine>,
        sink: Arc<dyn CompletionSink>,
        config: LifecycleConfig,
        metrics: Metrics,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            sink,
            config,
            metrics,
            state: Mutex::new(QueueState::default()),
        })
    }

    /// Configured queue capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Hand `descriptor` to the engine and track the resulting download.
    ///
    /// # Errors
    ///
    /// `QueueFull` when no slot is free, `AlreadyQueued` when the descriptor (or the
    /// handle it resolves to) is already tracked, `Engine` when the engine refuses it.
    pub async fn enqueue(
        self: &Arc<Self>,
        descriptor: &TransferDescriptor,
        origin: ChatId,
    ) -> AdmissionResult<ActiveDownload> {
        {
            let mut state = self.state.lock().await;
            if state.by_descriptor.contains_key(descriptor) || state.resolving.contains(descriptor)
            {
                return Err(AdmissionError::AlreadyQueued {
                    descriptor: descriptor.clone(),
                });
            }
            if state.occupied() >= self.config.capacity {
                return Err(AdmissionError::QueueFull {
                    capacity: self.config.capacity,
                });
            }
            state.resolving.insert(descriptor.clone());
        }

        let added = self.engine.add(descriptor, &self.config.add_options).await;

        let mut state = self.state.lock().await;
        state.resolving.remove(descriptor);
        let snapshot = added.map_err(|source| AdmissionError::Engine {
            operation: "enqueue.add",
            source: source.into(),
        })?;
        if state.entries.contains_key(&snapshot.id) {
            return Err(AdmissionError::AlreadyQueued {
                descriptor: descriptor.clone(),
            });
        }

        let transfer_id = snapshot.id.clone();
        let mut entry = QueueEntry {
            descriptor: descriptor.clone(),
            origin,
            created_at: Utc::now(),
            admitted: Instant::now(),
            state: DownloadState::Active,
            watcher: None,
            removal: None,
        };
        entry.watcher = Some(self.spawn_watcher(transfer_id.clone()));
        let download = entry.join(snapshot);
        state
            .by_descriptor
            .insert(descriptor.clone(), transfer_id.clone());
        state.entries.insert(transfer_id.clone(), entry);
        self.metrics.set_queue_depth(state.entries.len());
        info!(
            transfer_id = %transfer_id,
            chat_id = %origin,
            name = %download.display_name,
            "download admitted"
        );
        Ok(download)
    }

    /// Tear down the engine handle and release the queue entry.
    ///
    /// # Errors
    ///
    /// `NotFound` when no entry exists for `transfer_id`, `Engine` when the handle
    /// could not be destroyed (the entry is released regardless).
    pub async fn remove(&self, transfer_id: &TransferId) -> LifecycleResult<()> {
        self.remove_with_reason(transfer_id, "removed").await
    }

    async fn remove_with_reason(
        &self,
        transfer_id: &TransferId,
        reason: &'static str,
    ) -> LifecycleResult<()> {
        self.release(transfer_id, reason).await?;
        self.engine
            .destroy(transfer_id)
            .await
            .map_err(|source| LifecycleError::Engine {
                operation: "remove.destroy",
                transfer_id: transfer_id.clone(),
                source: source.into(),
            })
    }

    async fn release(&self, transfer_id: &TransferId, reason: &'static str) -> LifecycleResult<()> {
        let mut state = self.state.lock().await;
        let Some(entry) = state.entries.remove(transfer_id) else {
            return Err(LifecycleError::NotFound {
                transfer_id: transfer_id.clone(),
            });
        };
        state.by_descriptor.remove(&entry.descriptor);
        entry.cancel_timers();
        self.metrics.set_queue_depth(state.entries.len());
        self.metrics.inc_eviction(reason);
        drop(state);
        info!(transfer_id = %transfer_id, reason, "download left the queue");
        Ok(())
    }

    /// Current view of a tracked download; `None` when the entry or the handle is gone.
    ///
    /// # Errors
    ///
    /// Returns `Engine` when the engine cannot report the handle.
    pub async fn describe(
        &self,
        transfer_id: &TransferId,
    ) -> LifecycleResult<Option<ActiveDownload>> {
        if !self.contains_transfer(transfer_id).await {
            return Ok(None);
        }
        let snapshot = self.snapshot(transfer_id, "describe.snapshot").await?;
        let state = self.state.lock().await;
        Ok(snapshot.and_then(|snapshot| {
            state
                .entries
                .get(transfer_id)
                .map(|entry| entry.join(snapshot))
        }))
    }

    /// Every tracked download ordered by admission time.
    ///
    /// Reads every handle in one engine call; engines without listing support are
    /// asked one handle at a time.
    ///
    /// # Errors
    ///
    /// Returns `Engine` when the engine cannot report a handle.
    pub async fn list(&self) -> LifecycleResult<Vec<ActiveDownload>> {
        let listed = self.engine.list().await;
        let mut snapshots: HashMap<TransferId, TransferSnapshot> = match listed {
            Ok(snapshots) => snapshots
                .into_iter()
                .map(|snapshot| (snapshot.id.clone(), snapshot))
                .collect(),
            Err(err) => {
                debug!(error = %err, "engine listing unavailable; reading handles one by one");
                self.snapshots_one_by_one().await?
            }
        };
        let mut downloads: Vec<(Instant, ActiveDownload)> = {
            let state = self.state.lock().await;
            state
                .entries
                .iter()
                .filter_map(|(id, entry)| {
                    snapshots
                        .remove(id)
                        .map(|snapshot| (entry.admitted, entry.join(snapshot)))
                })
                .collect()
        };
        downloads.sort_by_key(|(admitted, _)| *admitted);
        Ok(downloads.into_iter().map(|(_, download)| download).collect())
    }

    async fn snapshots_one_by_one(
        &self,
    ) -> LifecycleResult<HashMap<TransferId, TransferSnapshot>> {
        let ids: Vec<TransferId> = self.state.lock().await.entries.keys().cloned().collect();
        let mut snapshots = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(snapshot) = self.snapshot(&id, "list.snapshot").await? {
                snapshots.insert(id, snapshot);
            }
        }
        Ok(snapshots)
    }

    /// Downloads currently holding a queue slot.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Whether the queue holds no downloads.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    /// Whether every slot is taken, counting descriptors still being resolved.
    pub async fn is_full(&self) -> bool {
        self.state.lock().await.occupied() >= self.config.capacity
    }

    /// Whether `transfer_id` has a queue entry.
    pub async fn contains_transfer(&self, transfer_id: &TransferId) -> bool {
        self.state.lock().await.entries.contains_key(transfer_id)
    }

    /// Cancel every watcher and pending removal. Entries stay in place.
    pub async fn shutdown(&self) {
        let state = self.state.lock().await;
        for entry in state.entries.values() {
            entry.cancel_timers();
        }
        info!(downloads = state.entries.len(), "lifecycle watchers stopped");
    }

    async fn snapshot(
        &self,
        transfer_id: &TransferId,
        operation: &'static str,
    ) -> LifecycleResult<Option<TransferSnapshot>> {
        self.engine
            .snapshot(transfer_id)
            .await
            .map_err(|source| LifecycleError::Engine {
                operation,
                transfer_id: transfer_id.clone(),
                source: source.into(),
            })
    }

    fn spawn_watcher(self: &Arc<Self>, transfer_id: TransferId) -> TimerHandle {
        let controller: Weak<Self> = Arc::downgrade(self);
        RecurringTask::new("download_watch", self.config.poll_interval)
            .with_metrics(self.metrics.clone())
            .spawn(move || {
                let controller = controller.clone();
                let transfer_id = transfer_id.clone();
                async move {
                    let Some(controller) = controller.upgrade() else {
                        return Ok(TickOutcome::Stop);
                    };
                    controller.watch_tick(&transfer_id).await
                }
            })
    }

    async fn watch_tick(self: &Arc<Self>, transfer_id: &TransferId) -> anyhow::Result<TickOutcome> {
        let admitted = {
            let state = self.state.lock().await;
            match state.entries.get(transfer_id) {
                Some(entry) if entry.state == DownloadState::Active => entry.admitted,
                _ => return Ok(TickOutcome::Stop),
            }
        };

        let Some(snapshot) = self.snapshot(transfer_id, "watch.snapshot").await? else {
            debug!(transfer_id = %transfer_id, "engine handle vanished");
            if self.release(transfer_id, "vanished").await.is_err() {
                debug!(transfer_id = %transfer_id, "entry already released");
            }
            return Ok(TickOutcome::Stop);
        };

        if !snapshot.done && admitted.elapsed() > self.config.max_age {
            warn!(
                transfer_id = %transfer_id,
                downloaded = snapshot.downloaded_bytes,
                total = snapshot.total_bytes,
                "download exceeded its age limit"
            );
            match self.remove_with_reason(transfer_id, "expired").await {
                Ok(()) | Err(LifecycleError::NotFound { .. }) => {}
                Err(err) => warn!(transfer_id = %transfer_id, error = %err, "eviction failed"),
            }
            return Ok(TickOutcome::Stop);
        }

        if snapshot.done {
            self.complete(transfer_id, snapshot).await;
            return Ok(TickOutcome::Stop);
        }
        Ok(TickOutcome::Continue)
    }

    async fn complete(self: &Arc<Self>, transfer_id: &TransferId, snapshot: TransferSnapshot) {
        let (origin, download) = {
            let mut state = self.state.lock().await;
            let Some(entry) = state.entries.get_mut(transfer_id) else {
                return;
            };
            entry.state = DownloadState::Done;
            (entry.origin, entry.join(snapshot))
        };
        info!(transfer_id = %transfer_id, name = %download.display_name, "download completed");

        if let Err(err) = self.sink.download_completed(origin, &download).await {
            warn!(transfer_id = %transfer_id, error = %err, "completion delivery failed");
        }

        let controller = Arc::downgrade(self);
        let id = transfer_id.clone();
        let removal = spawn_delayed("download_removal", self.config.remove_delay, async move {
            let Some(controller) = controller.upgrade() else {
                return;
            };
            match controller.remove_with_reason(&id, "completed").await {
                Ok(()) | Err(LifecycleError::NotFound { .. }) => {}
                Err(err) => warn!(transfer_id = %id, error = %err, "delayed removal failed"),
            }
        });

        let mut state = self.state.lock().await;
        match state.entries.get_mut(transfer_id) {
            Some(entry) => {
                entry.state = DownloadState::Evicting;
                entry.removal = Some(removal);
            }
            None => removal.cancel(),
        }
    }
}
