#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Engine- and transport-agnostic media request interfaces and DTOs.
//!
//! Layout: `model/` (candidates, downloads, chat DTOs), `service/` (collaborator traits),
//! `error.rs` (typed failures), `id.rs` (snowflake ids), `format.rs` (size helpers).

pub mod error;
pub mod format;
pub mod id;
pub mod model;
pub mod service;

pub use error::{
    AdmissionError, AdmissionResult, LifecycleError, LifecycleResult, SearchError, SearchResult,
    StatusError,
};
pub use format::{human_bytes, human_rate, parse_size_kb};
pub use id::{CandidateId, SnowflakeGenerator};
pub use model::chat::{
    ChatAction, ChatId, ChatKind, ChatRef, DeliveryOptions, InboundEvent, InboundMessage,
    MessageHandle, SelectionOption,
};
pub use model::{
    ActiveDownload, AddOptions, CandidateResult, DownloadState, TransferDescriptor, TransferFile,
    TransferId, TransferRates, TransferSnapshot,
};
pub use service::{
    CandidateFuture, ChatTransport, CompletionSink, EventSource, SearchProvider, TransferEngine,
};
