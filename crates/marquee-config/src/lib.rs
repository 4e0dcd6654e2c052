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
#![allow(clippy::redundant_pub_crate)]

//! File- and environment-backed settings for the bot.
//!
//! Layout: `model.rs` (typed settings), `defaults.rs` (compiled defaults), `loader.rs`
//! (document + env layering), `validate.rs` (guard rails).

mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{CONFIG_PATH_ENV, ENV_PREFIX, load_settings, load_settings_with, read_document};
pub use model::{BotSettings, EffectiveSettings};
pub use validate::{MAX_PERIOD_SECS, MAX_RATE_LIMIT_KBPS, normalize_settings};
