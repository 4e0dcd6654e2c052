//! Pattern-matched command dispatch.
//!
//! # Design
//! - Every registration whose pattern matches fires; registrations are not exclusive.
//! - Non-group chats get the private notice and only universal registrations run.
//! - Recurring registrations recompute their response on every tick and hand their
//!   timer to the chat's session entry so `/stop` can cancel it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use marquee_core::{ChatId, ChatRef, ChatTransport, InboundMessage, MessageHandle};
use marquee_telemetry::Metrics;
use regex::{Regex, RegexBuilder};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::render::Reply;
use crate::session::SessionState;
use crate::timers::{RecurringTask, TickOutcome};

/// Reply sent when a handler fails.
pub const GENERIC_FAILURE: &str = "Something went wrong, try again later.";

/// Context handed to computed responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Originating chat.
    pub chat: ChatRef,
    /// Full message text.
    pub text: String,
    /// Message that triggered the registration.
    pub message: Option<MessageHandle>,
    /// Capture groups after the whole match; unmatched groups are `None`.
    pub captures: Vec<Option<String>>,
}

impl Invocation {
    /// Capture group `index` (1-based, like the pattern), trimmed; `None` when empty.
    #[must_use]
    pub fn capture(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|slot| self.captures.get(slot))
            .and_then(Option::as_deref)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// Response produced at dispatch time.
#[async_trait]
pub trait ComputeResponse: Send + Sync {
    /// Build the reply; `None` sends nothing.
    async fn compute(&self, invocation: &Invocation) -> anyhow::Result<Option<Reply>>;
}

/// What a registration answers with.
#[derive(Clone)]
pub enum Response {
    /// Fixed text; empty text only logs.
    Literal(String),
    /// Computed on every dispatch and every recurring tick.
    Computed(Arc<dyn ComputeResponse>),
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            Self::Computed(_) => f.write_str("Computed"),
        }
    }
}

impl Response {
    async fn resolve(&self, invocation: &Invocation) -> anyhow::Result<Option<Reply>> {
        match self {
            Self::Literal(text) if text.is_empty() => Ok(None),
            Self::Literal(text) => Ok(Some(Reply::text(text.clone()))),
            Self::Computed(handler) => handler.compute(invocation).await,
        }
    }
}

/// A pattern and what to do when it matches.
#[derive(Debug, Clone)]
pub struct Registration {
    name: &'static str,
    pattern: Regex,
    response: Response,
    pre_response: Option<String>,
    repeat: Option<Duration>,
    universal: bool,
}

impl Registration {
    /// Registration answering with fixed text.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Pattern`] when `pattern` does not compile.
    pub fn literal(name: &'static str, pattern: &str, text: impl Into<String>) -> AppResult<Self> {
        Self::build(name, pattern, Response::Literal(text.into()))
    }

    /// Registration answering with a computed reply.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Pattern`] when `pattern` does not compile.
    pub fn computed(
        name: &'static str,
        pattern: &str,
        handler: Arc<dyn ComputeResponse>,
    ) -> AppResult<Self> {
        Self::build(name, pattern, Response::Computed(handler))
    }

    fn build(name: &'static str, pattern: &str, response: Response) -> AppResult<Self> {
        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| AppError::pattern(pattern, source))?;
        Ok(Self {
            name,
            pattern,
            response,
            pre_response: None,
            repeat: None,
            universal: false,
        })
    }

    /// Text sent before the main response.
    #[must_use]
    pub fn with_pre_response(mut self, text: impl Into<String>) -> Self {
        self.pre_response = Some(text.into());
        self
    }

    /// Re-send the response every `period` until the chat's timers are stopped.
    #[must_use]
    pub const fn repeating(mut self, period: Duration) -> Self {
        self.repeat = Some(period);
        self
    }

    /// Also run for non-group chats.
    #[must_use]
    pub const fn universal(mut self) -> Self {
        self.universal = true;
        self
    }

    /// Registration name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    fn invocation(&self, message: &InboundMessage) -> Option<Invocation> {
        let captures = self.pattern.captures(&message.text)?;
        Some(Invocation {
            chat: message.chat.clone(),
            text: message.text.clone(),
            message: Some(message.handle()),
            captures: captures
                .iter()
                .skip(1)
                .map(|group| group.map(|found| found.as_str().to_string()))
                .collect(),
        })
    }
}

/// Routes inbound messages to registrations.
pub struct Dispatcher {
    registrations: Vec<Registration>,
    transport: Arc<dyn ChatTransport>,
    session: Arc<SessionState>,
    private_notice: String,
    metrics: Metrics,
}

impl Dispatcher {
    /// Dispatcher without registrations.
    #[must_use]
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        session: Arc<SessionState>,
        private_notice: impl Into<String>,
        metrics: Metrics,
    ) -> Self {
        Self {
            registrations: Vec::new(),
            transport,
            session,
            private_notice: private_notice.into(),
            metrics,
        }
    }

    /// Append a registration; registrations fire in insertion order.
    pub fn register(&mut self, registration: Registration) {
        self.registrations.push(registration);
    }

    /// Run every matching registration; returns how many fired.
    pub async fn dispatch(&self, message: &InboundMessage) -> usize {
        let group = message.chat.kind.is_group();
        if !group {
            debug!(chat_id = %message.chat.id, "message outside a group chat");
            if !self.private_notice.is_empty() {
                deliver(
                    self.transport.as_ref(),
                    message.chat.id,
                    Reply::text(self.private_notice.clone()),
                )
                .await;
            }
        }

        let mut fired = 0;
        for registration in &self.registrations {
            if !group && !registration.universal {
                continue;
            }
            let Some(invocation) = registration.invocation(message) else {
                continue;
            };
            fired += 1;
            self.fire(registration, invocation).await;
        }
        fired
    }

    async fn fire(&self, registration: &Registration, invocation: Invocation) {
        let chat_id = invocation.chat.id;
        if let Some(pre) = &registration.pre_response {
            info!(registration = registration.name, chat_id = %chat_id, "sending pre-response");
            deliver(self.transport.as_ref(), chat_id, Reply::text(pre.clone())).await;
        }

        match registration.response.resolve(&invocation).await {
            Ok(Some(reply)) => deliver(self.transport.as_ref(), chat_id, reply).await,
            Ok(None) => {
                info!(
                    registration = registration.name,
                    chat = %invocation.chat.label(),
                    text = %invocation.text,
                    "message matched"
                );
            }
            Err(err) => {
                warn!(
                    registration = registration.name,
                    chat_id = %chat_id,
                    error = %err,
                    "handler failed"
                );
                deliver(
                    self.transport.as_ref(),
                    chat_id,
                    Reply::text(GENERIC_FAILURE),
                )
                .await;
            }
        }

        if let Some(period) = registration.repeat {
            let transport = Arc::clone(&self.transport);
            let response = registration.response.clone();
            let timer = RecurringTask::new("broadcast", period)
                .with_metrics(self.metrics.clone())
                .spawn(move || {
                    let transport = Arc::clone(&transport);
                    let response = response.clone();
                    let invocation = invocation.clone();
                    async move {
                        if let Some(reply) = response.resolve(&invocation).await? {
                            transport
                                .deliver(invocation.chat.id, &reply.text, reply.options)
                                .await?;
                        }
                        Ok(TickOutcome::Continue)
                    }
                });
            self.session.track_timer(chat_id, timer).await;
            info!(
                registration = registration.name,
                chat_id = %chat_id,
                ?period,
                "broadcast scheduled"
            );
        }
    }
}

async fn deliver(transport: &dyn ChatTransport, chat_id: ChatId, reply: Reply) {
    if let Err(err) = transport.deliver(chat_id, &reply.text, reply.options).await {
        warn!(chat_id = %chat_id, error = %err, "delivery failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_core::{ChatKind, InboundEvent};
    use marquee_test_support::fixtures;
    use marquee_test_support::mocks::RecordingTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn inbound(chat: ChatRef, text: &str) -> InboundMessage {
        match fixtures::message(chat, text) {
            InboundEvent::Message(message) => message,
            other => panic!("unexpected event {other:?}"),
        }
    }

    fn dispatcher(
        transport: &Arc<RecordingTransport>,
    ) -> anyhow::Result<(Dispatcher, Arc<SessionState>)> {
        let session = Arc::new(SessionState::new());
        let shared: Arc<dyn ChatTransport> = transport.clone();
        Ok((
            Dispatcher::new(shared, Arc::clone(&session), "groups only", Metrics::new()?),
            session,
        ))
    }

    struct Counter(AtomicUsize);

    #[async_trait]
    impl ComputeResponse for Counter {
        async fn compute(&self, _invocation: &Invocation) -> anyhow::Result<Option<Reply>> {
            let next = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Some(Reply::text(format!("tick {next}"))))
        }
    }

    struct Echo;

    #[async_trait]
    impl ComputeResponse for Echo {
        async fn compute(&self, invocation: &Invocation) -> anyhow::Result<Option<Reply>> {
            Ok(invocation.capture(1).map(|query| Reply::text(format!("echo {query}"))))
        }
    }

    struct Broken;

    #[async_trait]
    impl ComputeResponse for Broken {
        async fn compute(&self, _invocation: &Invocation) -> anyhow::Result<Option<Reply>> {
            anyhow::bail!("handler exploded")
        }
    }

    #[tokio::test]
    async fn every_matching_registration_fires() -> anyhow::Result<()> {
        let transport = RecordingTransport::new();
        let (mut dispatcher, _) = dispatcher(&transport)?;
        dispatcher.register(Registration::literal("help", r"^/help\b", "usage")?);
        dispatcher.register(Registration::literal("log", ".*", "")?.universal());

        let fired = dispatcher.dispatch(&inbound(fixtures::group_chat(), "/HELP")).await;
        assert_eq!(fired, 2);
        assert_eq!(transport.texts_for(fixtures::GROUP), vec!["usage".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn private_chats_get_the_notice_and_universal_registrations_only() -> anyhow::Result<()> {
        let transport = RecordingTransport::new();
        let (mut dispatcher, _) = dispatcher(&transport)?;
        dispatcher.register(Registration::literal("help", r"^/help\b", "usage")?);
        dispatcher.register(Registration::literal("log", ".*", "")?.universal());

        let chat = fixtures::private_chat();
        let fired = dispatcher.dispatch(&inbound(chat.clone(), "/help")).await;
        assert_eq!(fired, 1);
        assert_eq!(transport.texts_for(chat.id), vec!["groups only".to_string()]);

        let channel = ChatRef {
            kind: ChatKind::Channel,
            ..chat
        };
        assert_eq!(dispatcher.dispatch(&inbound(channel, "hello")).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn pre_response_precedes_the_reply_and_captures_reach_handlers() -> anyhow::Result<()> {
        let transport = RecordingTransport::new();
        let (mut dispatcher, _) = dispatcher(&transport)?;
        dispatcher.register(
            Registration::computed("echo", r"^/echo(.*)$", Arc::new(Echo))?
                .with_pre_response("working"),
        );

        dispatcher
            .dispatch(&inbound(fixtures::group_chat(), "/echo  dune "))
            .await;
        assert_eq!(
            transport.texts_for(fixtures::GROUP),
            vec!["working".to_string(), "echo dune".to_string()]
        );
        Ok(())
    }

    #[tokio::test]
    async fn failing_handler_is_answered_with_generic_failure() -> anyhow::Result<()> {
        let transport = RecordingTransport::new();
        let (mut dispatcher, _) = dispatcher(&transport)?;
        dispatcher.register(Registration::computed("broken", "^/boom", Arc::new(Broken))?);

        dispatcher.dispatch(&inbound(fixtures::group_chat(), "/boom")).await;
        assert_eq!(
            transport.texts_for(fixtures::GROUP),
            vec![GENERIC_FAILURE.to_string()]
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn repeating_registration_recomputes_until_stopped() -> anyhow::Result<()> {
        let transport = RecordingTransport::new();
        let (mut dispatcher, session) = dispatcher(&transport)?;
        dispatcher.register(
            Registration::computed("live", "^/live", Arc::new(Counter(AtomicUsize::new(0))))?
                .repeating(Duration::from_secs(10)),
        );

        dispatcher.dispatch(&inbound(fixtures::group_chat(), "/live")).await;
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(
            transport.texts_for(fixtures::GROUP),
            vec!["tick 1".to_string(), "tick 2".to_string(), "tick 3".to_string()]
        );

        assert_eq!(session.cancel_chat_timers(fixtures::GROUP).await, 1);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.texts_for(fixtures::GROUP).len(), 3);
        Ok(())
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        let err = Registration::literal("bad", "(", "x").expect_err("pattern should fail");
        assert!(matches!(err, AppError::Pattern { .. }));
    }

    #[test]
    fn capture_skips_blank_groups() {
        let invocation = Invocation {
            chat: fixtures::group_chat(),
            text: "/search".to_string(),
            message: None,
            captures: vec![Some("   ".to_string()), None],
        };
        assert_eq!(invocation.capture(1), None);
        assert_eq!(invocation.capture(2), None);
        assert_eq!(invocation.capture(0), None);
    }
}
