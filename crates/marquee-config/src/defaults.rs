//! Default values for every bot setting.
//!
//! # Design
//! - Centralize defaults so the serde model, loader and guard rails agree.
//! - Time-based defaults keep their unit in the name for auditability.

/// Candidates remembered for selection-token resolution.
pub(crate) const MAX_SEARCH_HISTORY_SIZE: usize = 100;
/// Concurrent downloads admitted into the queue.
pub(crate) const MAX_QUEUE_SIZE: usize = 3;
/// Largest payload admitted, in KiB.
pub(crate) const MAX_DOWNLOAD_SIZE_KB: u64 = 2_048_000;
/// Minimum seed to leech ratio.
pub(crate) const MIN_RATIO: f64 = 5.0;
/// Minimum seed count.
pub(crate) const MIN_SEEDS: u32 = 10;
/// Age after which an unfinished download is evicted.
pub(crate) const MAX_DOWNLOAD_AGE_MINS: u64 = 90;
/// Grace window between completion and removal.
pub(crate) const REMOVE_DELAY_SECS: u64 = 60;
/// Rows requested from each search source.
pub(crate) const SEARCH_LIMIT: usize = 5;
/// Status subscriptions tracked at once.
pub(crate) const MAX_DOWNLOAD_INFORMATION_MESSAGES: usize = 10;
/// Status refresh cadence.
pub(crate) const DOWNLOAD_INFO_MESSAGES_INTERVAL_SECS: u64 = 30;
/// Welcome broadcast cadence.
pub(crate) const WELCOME_MESSAGE_INTERVAL_MINS: u64 = 60;
/// Download watcher poll cadence.
pub(crate) const DOWNLOAD_POLL_INTERVAL_MS: u64 = 500;
/// Lower bound for the download watcher poll cadence.
pub(crate) const MIN_POLL_INTERVAL_MS: u64 = 250;
/// Upper bound for the download watcher poll cadence.
pub(crate) const MAX_POLL_INTERVAL_MS: u64 = 2_000;
/// Download rate limit in KiB/s.
pub(crate) const DOWNLOAD_SPEED_LIMIT_KBPS: u64 = 700;
/// Upload rate limit in KiB/s.
pub(crate) const UPLOAD_SPEED_LIMIT_KBPS: u64 = 50;
/// Storage folder for payloads.
pub(crate) const DOWNLOAD_PATH: &str = "./downloads";
/// Default log level.
pub(crate) const LOG_LEVEL: &str = "info";
/// Categories accepted from search sources.
pub(crate) const ALLOWED_CATEGORIES: [&str; 5] =
    ["movies", "tv", "anime", "music", "documentaries"];
/// Text broadcast to groups and new members.
pub(crate) const WELCOME_MESSAGE: &str = "Hi! Send /search <title> to look for something to \
download, /downloads to see the queue and /help for everything else.";
/// Reply to messages outside group chats.
pub(crate) const PRIVATE_CHAT_NOTICE: &str = "I am not designed to work in private chats, ask \
my creator to add me to a group.";
