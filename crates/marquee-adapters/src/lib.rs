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

//! Local collaborators that make the bot runnable without a chat platform, scraper or
//! peer-to-peer engine.
//!
//! Layout: `console.rs` (stdin/stdout chat), `engine.rs` (simulated transfers),
//! `catalog.rs` (JSON-backed search source).

pub mod catalog;
pub mod console;
pub mod engine;

pub use catalog::{CatalogProvider, CatalogRow};
pub use console::{ConsoleTransport, GROUP_CHAT_ID, PRIVATE_CHAT_ID, parse_line};
pub use engine::SimulatedEngine;
