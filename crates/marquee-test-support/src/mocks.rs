//! Recording and scriptable collaborator doubles.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use futures_util::FutureExt;
use marquee_core::{
    ActiveDownload, AddOptions, CandidateFuture, CandidateResult, ChatAction, ChatId,
    ChatTransport, CompletionSink, DeliveryOptions, MessageHandle, SearchProvider,
    TransferDescriptor, TransferEngine, TransferFile, TransferId, TransferRates,
    TransferSnapshot,
};
use tokio::sync::Notify;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// A message the transport was asked to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    /// Target chat.
    pub chat_id: ChatId,
    /// Message text.
    pub text: String,
    /// Delivery options.
    pub options: DeliveryOptions,
    /// Handle returned to the caller.
    pub handle: MessageHandle,
}

/// Transport that records every call.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    delivered: Mutex<Vec<Delivered>>,
    edits: Mutex<Vec<(MessageHandle, String)>>,
    actions: Mutex<Vec<(ChatId, ChatAction)>>,
    next_id: AtomicI64,
    fail_deliveries: Mutex<bool>,
}

impl RecordingTransport {
    /// Fresh transport.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every delivered message in order.
    #[must_use]
    pub fn delivered(&self) -> Vec<Delivered> {
        lock(&self.delivered).clone()
    }

    /// Texts delivered to `chat_id`.
    #[must_use]
    pub fn texts_for(&self, chat_id: ChatId) -> Vec<String> {
        lock(&self.delivered)
            .iter()
            .filter(|message| message.chat_id == chat_id)
            .map(|message| message.text.clone())
            .collect()
    }

    /// Every edit in order.
    #[must_use]
    pub fn edits(&self) -> Vec<(MessageHandle, String)> {
        lock(&self.edits).clone()
    }

    /// Every chat action in order.
    #[must_use]
    pub fn actions(&self) -> Vec<(ChatId, ChatAction)> {
        lock(&self.actions).clone()
    }

    /// Make later deliveries fail.
    pub fn fail_deliveries(&self, fail: bool) {
        *lock(&self.fail_deliveries) = fail;
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn deliver(
        &self,
        chat_id: ChatId,
        text: &str,
        options: DeliveryOptions,
    ) -> Result<MessageHandle> {
        if *lock(&self.fail_deliveries) {
            bail!("delivery refused");
        }
        let handle = MessageHandle {
            chat_id,
            message_id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
        };
        lock(&self.delivered).push(Delivered {
            chat_id,
            text: text.to_string(),
            options,
            handle,
        });
        Ok(handle)
    }

    async fn edit(&self, handle: MessageHandle, text: &str) -> Result<()> {
        lock(&self.edits).push((handle, text.to_string()));
        Ok(())
    }

    async fn notify_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        lock(&self.actions).push((chat_id, action));
        Ok(())
    }
}

/// Signals shared between a gated double and the test driving it.
#[derive(Debug, Default)]
pub struct Gate {
    /// Notified once a call has entered the double.
    pub entered: Notify,
    /// Notify to let the blocked call continue.
    pub release: Notify,
}

impl Gate {
    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

#[derive(Debug, Clone)]
struct FakeTransfer {
    snapshot: TransferSnapshot,
}

/// Scriptable transfer engine; progress only moves when a test says so.
#[derive(Debug, Default)]
pub struct FakeEngine {
    transfers: Mutex<HashMap<TransferId, FakeTransfer>>,
    fail_next_add: Mutex<Option<String>>,
    add_gate: Mutex<Option<Arc<Gate>>>,
    added: Mutex<Vec<(TransferDescriptor, AddOptions)>>,
    destroyed: Mutex<Vec<TransferId>>,
}

/// Payload size every fake transfer reports.
pub const FAKE_TOTAL_BYTES: u64 = 1_000;

impl FakeEngine {
    /// Fresh engine.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Id the engine assigns to `descriptor`.
    #[must_use]
    pub fn id_for(descriptor: &TransferDescriptor) -> TransferId {
        let raw = descriptor.as_str();
        let hash = raw
            .split_once("btih:")
            .map_or(raw, |(_, rest)| rest.split('&').next().unwrap_or(rest));
        TransferId::new(hash.to_ascii_lowercase())
    }

    /// Make the next `add` fail with `message`.
    pub fn fail_next_add(&self, message: impl Into<String>) {
        *lock(&self.fail_next_add) = Some(message.into());
    }

    /// Make every later `add` block until the returned gate is released.
    #[must_use]
    pub fn gate_adds(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *lock(&self.add_gate) = Some(Arc::clone(&gate));
        gate
    }

    /// Set downloaded bytes for a handle.
    pub fn set_progress(&self, id: &TransferId, downloaded_bytes: u64) {
        if let Some(transfer) = lock(&self.transfers).get_mut(id) {
            transfer.snapshot.downloaded_bytes = downloaded_bytes.min(FAKE_TOTAL_BYTES);
        }
    }

    /// Mark a handle finished.
    pub fn complete(&self, id: &TransferId) {
        if let Some(transfer) = lock(&self.transfers).get_mut(id) {
            transfer.snapshot.downloaded_bytes = FAKE_TOTAL_BYTES;
            transfer.snapshot.done = true;
            transfer.snapshot.rates = TransferRates::default();
        }
    }

    /// Drop a handle behind the controller's back.
    pub fn forget(&self, id: &TransferId) {
        lock(&self.transfers).remove(id);
    }

    /// Add requests received so far.
    #[must_use]
    pub fn added(&self) -> Vec<(TransferDescriptor, AddOptions)> {
        lock(&self.added).clone()
    }

    /// Handles destroyed so far.
    #[must_use]
    pub fn destroyed(&self) -> Vec<TransferId> {
        lock(&self.destroyed).clone()
    }

    /// Live handle count.
    #[must_use]
    pub fn live(&self) -> usize {
        lock(&self.transfers).len()
    }
}

#[async_trait]
impl TransferEngine for FakeEngine {
    async fn add(
        &self,
        descriptor: &TransferDescriptor,
        options: &AddOptions,
    ) -> Result<TransferSnapshot> {
        let gate = lock(&self.add_gate).clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        if let Some(message) = lock(&self.fail_next_add).take() {
            bail!(message);
        }
        let id = Self::id_for(descriptor);
        let mut transfers = lock(&self.transfers);
        if transfers.contains_key(&id) {
            bail!("transfer {id} already exists");
        }
        let snapshot = TransferSnapshot {
            id: id.clone(),
            name: id.to_string(),
            total_bytes: FAKE_TOTAL_BYTES,
            downloaded_bytes: 0,
            rates: TransferRates {
                download_bps: 512,
                upload_bps: 64,
            },
            done: false,
            files: vec![TransferFile {
                name: format!("{id}.mkv"),
                path: options.download_dir.join(format!("{id}.mkv")),
                size_bytes: FAKE_TOTAL_BYTES,
            }],
        };
        transfers.insert(
            id,
            FakeTransfer {
                snapshot: snapshot.clone(),
            },
        );
        lock(&self.added).push((descriptor.clone(), options.clone()));
        Ok(snapshot)
    }

    async fn snapshot(&self, id: &TransferId) -> Result<Option<TransferSnapshot>> {
        Ok(lock(&self.transfers)
            .get(id)
            .map(|transfer| transfer.snapshot.clone()))
    }

    async fn destroy(&self, id: &TransferId) -> Result<()> {
        lock(&self.transfers)
            .remove(id)
            .ok_or_else(|| anyhow!("unknown transfer {id}"))?;
        lock(&self.destroyed).push(id.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TransferSnapshot>> {
        let mut snapshots: Vec<TransferSnapshot> = lock(&self.transfers)
            .values()
            .map(|transfer| transfer.snapshot.clone())
            .collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(snapshots)
    }
}

/// Scripted outcome of one provider row.
#[derive(Debug, Clone)]
pub enum Row {
    /// Row resolves to a candidate.
    Hit(CandidateResult),
    /// Row failed the category allow-list.
    Filtered,
    /// Row future fails.
    Broken(String),
}

/// Provider returning scripted rows and counting calls.
#[derive(Debug)]
pub struct StaticProvider {
    name: String,
    rows: Vec<Row>,
    failure: Option<String>,
    calls: AtomicUsize,
    gate: Option<Arc<Gate>>,
}

impl StaticProvider {
    /// Provider yielding `rows` for every query.
    #[must_use]
    pub fn new(name: &str, rows: Vec<Row>) -> Self {
        Self {
            name: name.to_string(),
            rows,
            failure: None,
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Provider whose `search` fails as a whole.
    #[must_use]
    pub fn failing(name: &str, message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(name, Vec::new())
        }
    }

    /// Provider that blocks inside `search` until the gate is released.
    #[must_use]
    pub fn gated(name: &str, rows: Vec<Row>) -> (Self, Arc<Gate>) {
        let gate = Arc::new(Gate::default());
        (
            Self {
                gate: Some(Arc::clone(&gate)),
                ..Self::new(name, rows)
            },
            gate,
        )
    }

    /// Number of `search` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<CandidateFuture>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        if let Some(message) = &self.failure {
            bail!(message.clone());
        }
        Ok(self
            .rows
            .iter()
            .take(limit)
            .cloned()
            .map(|row| {
                async move {
                    match row {
                        Row::Hit(candidate) => Ok(Some(candidate)),
                        Row::Filtered => Ok(None),
                        Row::Broken(message) => Err(anyhow!(message)),
                    }
                }
                .boxed()
            })
            .collect())
    }
}

/// Completion sink that records every call.
#[derive(Debug, Default)]
pub struct RecordingSink {
    completed: Mutex<Vec<(ChatId, TransferId, Vec<PathBuf>)>>,
}

impl RecordingSink {
    /// Fresh sink.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Completions observed so far.
    #[must_use]
    pub fn completed(&self) -> Vec<(ChatId, TransferId, Vec<PathBuf>)> {
        lock(&self.completed).clone()
    }
}

#[async_trait]
impl CompletionSink for RecordingSink {
    async fn download_completed(&self, origin: ChatId, download: &ActiveDownload) -> Result<()> {
        lock(&self.completed).push((
            origin,
            download.transfer_id.clone(),
            download.files.iter().map(|file| file.path.clone()).collect(),
        ));
        Ok(())
    }
}
