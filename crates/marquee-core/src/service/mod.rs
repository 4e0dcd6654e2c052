//! Collaborator traits implemented by chat transports, search sources and transfer engines.

use anyhow::bail;
use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::model::chat::{ChatAction, ChatId, DeliveryOptions, InboundEvent, MessageHandle};
use crate::model::{
    ActiveDownload, AddOptions, CandidateResult, TransferDescriptor, TransferId, TransferSnapshot,
};

/// One discovered row; resolves to `None` when the row fails the source's category
/// allow-list.
pub type CandidateFuture = BoxFuture<'static, anyhow::Result<Option<CandidateResult>>>;

/// Outbound half of the chat platform.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a message and return a handle for later edits.
    async fn deliver(
        &self,
        chat_id: ChatId,
        text: &str,
        options: DeliveryOptions,
    ) -> anyhow::Result<MessageHandle>;

    /// Replace the text of a previously delivered message.
    async fn edit(&self, handle: MessageHandle, text: &str) -> anyhow::Result<()>;

    /// Show a presence indicator; default implementation is a no-op.
    async fn notify_action(&self, chat_id: ChatId, action: ChatAction) -> anyhow::Result<()> {
        let _ = (chat_id, action);
        Ok(())
    }
}

/// Inbound half of the chat platform.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Wait for the next inbound event; `None` once the source is exhausted.
    async fn next_event(&self) -> Option<InboundEvent>;
}

/// A named search source.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Source name shown in listings and logs.
    fn name(&self) -> &str;

    /// Acquire resources before the first search.
    async fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Discover up to `limit` rows for `query`, one future per row.
    async fn search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<CandidateFuture>>;

    /// Release resources acquired by `init`.
    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Peer-to-peer transfer engine.
#[async_trait]
pub trait TransferEngine: Send + Sync {
    /// Resolve a descriptor into a handle.
    async fn add(
        &self,
        descriptor: &TransferDescriptor,
        options: &AddOptions,
    ) -> anyhow::Result<TransferSnapshot>;

    /// Current view of a handle, `None` once it is gone.
    async fn snapshot(&self, id: &TransferId) -> anyhow::Result<Option<TransferSnapshot>>;

    /// Tear down a handle and release its storage.
    async fn destroy(&self, id: &TransferId) -> anyhow::Result<()>;

    /// Every handle the engine currently tracks; default implementation reports lack of
    /// support.
    async fn list(&self) -> anyhow::Result<Vec<TransferSnapshot>> {
        bail!("handle listing not supported by this engine");
    }
}

/// Receives finished downloads for delivery to the originating chat.
#[async_trait]
pub trait CompletionSink: Send + Sync {
    /// Called once per download when its completion flag is first observed.
    async fn download_completed(
        &self,
        origin: ChatId,
        download: &ActiveDownload,
    ) -> anyhow::Result<()>;
}
