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

//! Marquee bot: admission, download lifecycle, search, status refresh and command
//! dispatch wired over the collaborator traits in `marquee-core`.
//!
//! Layout: `bootstrap.rs` (boot sequence), `bot.rs` (service wiring and event routing),
//! `dispatch.rs` (pattern registrations), `admission.rs`, `lifecycle.rs`, `search.rs`,
//! `status.rs`, `session.rs`, `timers.rs`, `render.rs`, `error.rs`.

/// Admission policy and gate.
pub mod admission;
/// Application bootstrap.
pub mod bootstrap;
/// Bot wiring and chat commands.
pub mod bot;
/// Command registrations and dispatch.
pub mod dispatch;
/// Application error type.
pub mod error;
/// Download queue and watchers.
pub mod lifecycle;
/// Chat-facing text.
pub mod render;
/// Search fan-out and selection history.
pub mod search;
/// Shared session state.
pub mod session;
/// Status message refresh.
pub mod status;
/// Recurring and delayed timers.
pub mod timers;

pub use admission::{AdmissionGate, AdmissionPolicy};
pub use bootstrap::run_app;
pub use bot::{Bot, CompletionNotifier};
pub use dispatch::{ComputeResponse, Dispatcher, Invocation, Registration, Response};
pub use error::{AppError, AppResult};
pub use lifecycle::{LifecycleConfig, LifecycleController};
pub use render::Reply;
pub use search::{SearchConfig, SearchService};
pub use session::{SearchPermit, SessionState};
pub use status::{StatusConfig, StatusOutcome, StatusWatcher};
pub use timers::{RecurringTask, TickOutcome, TimerHandle, spawn_delayed};
