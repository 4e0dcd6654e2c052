//! Process-wide span so every log line carries the chat transport and build.

use tracing::{Span, span::Entered};

use crate::init::build_sha;

/// Keeps the `marquee` span entered until dropped; hold it for the life of `main`.
pub struct GlobalContextGuard {
    _entered: Entered<'static>,
}

impl GlobalContextGuard {
    /// Enter the `marquee` span tagged with `transport` (e.g. `console`) and the build SHA.
    #[must_use]
    pub fn new(transport: impl Into<String>) -> Self {
        let transport = transport.into();
        let span: &'static Span = Box::leak(Box::new(tracing::info_span!(
            "marquee",
            transport = %transport,
            build_sha = %build_sha()
        )));
        Self {
            _entered: span.enter(),
        }
    }
}
