//! Wires the services together and routes inbound events.

use std::sync::Arc;

use async_trait::async_trait;
use marquee_config::BotSettings;
use marquee_core::{
    ActiveDownload, ChatAction, ChatId, ChatRef, ChatTransport, CompletionSink, DeliveryOptions,
    EventSource, InboundEvent, MessageHandle, SearchProvider, StatusError, TransferEngine,
    TransferId,
};
use marquee_telemetry::Metrics;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::admission::{AdmissionGate, AdmissionPolicy};
use crate::dispatch::{ComputeResponse, Dispatcher, Invocation, Registration};
use crate::error::{AppError, AppResult};
use crate::lifecycle::{LifecycleConfig, LifecycleController};
use crate::render::{self, Reply};
use crate::search::{SearchConfig, SearchService};
use crate::session::SessionState;
use crate::status::{StatusConfig, StatusWatcher};

/// Reply to `/help`.
pub const HELP_TEXT: &str = "Commands:\n\
/search <title> - search for a title (alias /buscar)\n\
/downloads - show the download queue\n\
/downloads_live - keep posting the download queue\n\
/start - post the welcome message periodically\n\
/stop - stop every periodic message in this chat\n\
/help - show this message";

/// Reply to a search without a title.
pub const SEARCH_USAGE: &str = "Usage: /search <title>";

/// Delivers finished downloads to the chat that requested them.
pub struct CompletionNotifier {
    transport: Arc<dyn ChatTransport>,
}

impl CompletionNotifier {
    /// Notifier delivering through `transport`.
    #[must_use]
    pub const fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl CompletionSink for CompletionNotifier {
    async fn download_completed(
        &self,
        origin: ChatId,
        download: &ActiveDownload,
    ) -> anyhow::Result<()> {
        if let Err(err) = self
            .transport
            .notify_action(origin, ChatAction::UploadDocument)
            .await
        {
            debug!(chat_id = %origin, error = %err, "upload indicator failed");
        }
        let reply = render::completion(download);
        self.transport
            .deliver(origin, &reply.text, reply.options)
            .await?;
        Ok(())
    }
}

struct SearchCommand {
    search: Arc<SearchService>,
    transport: Arc<dyn ChatTransport>,
}

#[async_trait]
impl ComputeResponse for SearchCommand {
    async fn compute(&self, invocation: &Invocation) -> anyhow::Result<Option<Reply>> {
        let Some(query) = invocation.capture(1) else {
            return Ok(Some(Reply::text(SEARCH_USAGE)));
        };
        if let Err(err) = self
            .transport
            .notify_action(invocation.chat.id, ChatAction::Typing)
            .await
        {
            debug!(chat_id = %invocation.chat.id, error = %err, "typing indicator failed");
        }
        let reply = match self.search.search(query).await {
            Ok(candidates) if candidates.is_empty() => render::no_results(query),
            Ok(candidates) => render::search_listing(query, &candidates),
            Err(err) => {
                warn!(query, error = %err, "search failed");
                Reply::text(err.user_message())
            }
        };
        Ok(Some(Reply {
            options: DeliveryOptions {
                reply_to: invocation.message,
                ..reply.options
            },
            ..reply
        }))
    }
}

struct DownloadsCommand {
    lifecycle: Arc<LifecycleController>,
}

#[async_trait]
impl ComputeResponse for DownloadsCommand {
    async fn compute(&self, _invocation: &Invocation) -> anyhow::Result<Option<Reply>> {
        let downloads = self.lifecycle.list().await?;
        Ok(Some(render::queue_listing(
            &downloads,
            self.lifecycle.capacity(),
        )))
    }
}

struct StopCommand {
    session: Arc<SessionState>,
}

#[async_trait]
impl ComputeResponse for StopCommand {
    async fn compute(&self, invocation: &Invocation) -> anyhow::Result<Option<Reply>> {
        let stopped = self.session.cancel_chat_timers(invocation.chat.id).await;
        let text = if stopped == 0 {
            "Nothing to stop.".to_string()
        } else {
            format!("Stopped {stopped} periodic message(s).")
        };
        Ok(Some(Reply::text(text)))
    }
}

/// The assembled bot.
pub struct Bot {
    dispatcher: Dispatcher,
    transport: Arc<dyn ChatTransport>,
    session: Arc<SessionState>,
    search: Arc<SearchService>,
    lifecycle: Arc<LifecycleController>,
    admission: AdmissionGate,
    status: Arc<StatusWatcher>,
    welcome: String,
    private_notice: String,
}

impl Bot {
    /// Build every service from `settings` and register the chat commands.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Pattern`] when a command pattern does not compile.
    pub fn new(
        settings: &BotSettings,
        transport: Arc<dyn ChatTransport>,
        engine: Arc<dyn TransferEngine>,
        providers: Vec<Arc<dyn SearchProvider>>,
        metrics: &Metrics,
    ) -> AppResult<Arc<Self>> {
        let session = Arc::new(SessionState::new());
        let sink: Arc<dyn CompletionSink> =
            Arc::new(CompletionNotifier::new(Arc::clone(&transport)));
        let lifecycle = LifecycleController::new(
            engine,
            sink,
            LifecycleConfig::from(settings),
            metrics.clone(),
        );
        let admission = AdmissionGate::new(
            AdmissionPolicy::from(settings),
            Arc::clone(&lifecycle),
            metrics.clone(),
        );
        let search = Arc::new(SearchService::new(
            providers,
            Arc::clone(&session),
            SearchConfig::from(settings),
            metrics.clone(),
        ));
        let status = StatusWatcher::new(
            Arc::clone(&transport),
            Arc::clone(&lifecycle),
            StatusConfig::from(settings),
            metrics.clone(),
        );

        let mut dispatcher = Dispatcher::new(
            Arc::clone(&transport),
            Arc::clone(&session),
            settings.private_chat_notice.clone(),
            metrics.clone(),
        );
        let search_command: Arc<dyn ComputeResponse> = Arc::new(SearchCommand {
            search: Arc::clone(&search),
            transport: Arc::clone(&transport),
        });
        let downloads_command: Arc<dyn ComputeResponse> = Arc::new(DownloadsCommand {
            lifecycle: Arc::clone(&lifecycle),
        });
        let stop_command: Arc<dyn ComputeResponse> = Arc::new(StopCommand {
            session: Arc::clone(&session),
        });
        dispatcher.register(Registration::computed(
            "search",
            r"^/(?:search|buscar)(?:@\S+)?(?:\s+(.*))?$",
            search_command,
        )?);
        dispatcher.register(Registration::computed(
            "downloads",
            r"^/downloads(?:@\S+)?\s*$",
            Arc::clone(&downloads_command),
        )?);
        dispatcher.register(
            Registration::computed(
                "downloads_live",
                r"^/downloads_live(?:@\S+)?\s*$",
                downloads_command,
            )?
            .repeating(settings.status_interval()),
        );
        dispatcher.register(Registration::literal("help", r"^/help\b", HELP_TEXT)?);
        dispatcher.register(
            Registration::literal("start", r"^/start\b", settings.welcome_message.clone())?
                .repeating(settings.welcome_interval()),
        );
        dispatcher.register(Registration::computed("stop", r"^/stop\b", stop_command)?);
        dispatcher.register(Registration::literal("log", r"(?s).*", "")?.universal());

        Ok(Arc::new(Self {
            dispatcher,
            transport,
            session,
            search,
            lifecycle,
            admission,
            status,
            welcome: settings.welcome_message.clone(),
            private_notice: settings.private_chat_notice.clone(),
        }))
    }

    /// Initialise the search providers.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Provider`] naming the first provider that failed.
    pub async fn init(&self) -> AppResult<()> {
        self.search
            .init_providers()
            .await
            .map_err(|(name, source)| AppError::provider("providers.init", &name, source))
    }

    /// Lifecycle controller owning the queue.
    #[must_use]
    pub fn lifecycle(&self) -> &Arc<LifecycleController> {
        &self.lifecycle
    }

    /// Search service holding the selection history.
    #[must_use]
    pub fn search(&self) -> &Arc<SearchService> {
        &self.search
    }

    /// Status watcher holding the subscriptions.
    #[must_use]
    pub fn status(&self) -> &Arc<StatusWatcher> {
        &self.status
    }

    /// Route one inbound event.
    pub async fn handle_event(&self, event: InboundEvent) {
        match event {
            InboundEvent::Message(message) => {
                let fired = self.dispatcher.dispatch(&message).await;
                debug!(chat_id = %message.chat.id, fired, "message dispatched");
            }
            InboundEvent::MembersJoined { chat, members } => {
                if chat.kind.is_group() && !self.welcome.is_empty() {
                    info!(chat = %chat.label(), members = members.len(), "welcoming new members");
                    self.send(chat.id, Reply::text(self.welcome.clone())).await;
                }
            }
            InboundEvent::Selection {
                chat,
                token,
                message,
            } => self.handle_selection(&chat, &token, message).await,
        }
    }

    async fn handle_selection(&self, chat: &ChatRef, token: &str, message: Option<MessageHandle>) {
        if !chat.kind.is_group() {
            if !self.private_notice.is_empty() {
                self.send(chat.id, Reply::text(self.private_notice.clone()))
                    .await;
            }
            return;
        }
        let (admitted, reported) = tokio::join!(
            self.admit_selection(chat.id, token),
            self.report_selection(chat.id, token, message),
        );
        if !admitted && !reported {
            debug!(chat_id = %chat.id, token, "selection token matched nothing");
        }
    }

    async fn admit_selection(&self, chat_id: ChatId, token: &str) -> bool {
        let Some(candidate) = self.search.resolve(token).await else {
            return false;
        };
        let reply = match self.admission.admit(&candidate, chat_id).await {
            Ok(download) => render::admitted(&download),
            Err(err) => Reply::text(err.user_message()),
        };
        self.send(chat_id, reply).await;
        true
    }

    async fn report_selection(
        &self,
        chat_id: ChatId,
        token: &str,
        message: Option<MessageHandle>,
    ) -> bool {
        let transfer_id = TransferId::new(token);
        match self.status.request(chat_id, &transfer_id, message).await {
            Ok(outcome) => {
                debug!(transfer_id = %transfer_id, ?outcome, "status delivered");
                true
            }
            Err(StatusError::NotFound { .. }) => false,
            Err(err) => {
                warn!(transfer_id = %transfer_id, error = %err, "status request failed");
                self.send(chat_id, Reply::text(err.user_message())).await;
                true
            }
        }
    }

    async fn send(&self, chat_id: ChatId, reply: Reply) {
        if let Err(err) = self
            .transport
            .deliver(chat_id, &reply.text, reply.options)
            .await
        {
            warn!(chat_id = %chat_id, error = %err, "delivery failed");
        }
    }

    /// Consume `events` until the source is exhausted, one task per event.
    pub async fn run(self: Arc<Self>, events: Arc<dyn EventSource>) {
        let mut handlers = JoinSet::new();
        while let Some(event) = events.next_event().await {
            let bot = Arc::clone(&self);
            handlers.spawn(async move { bot.handle_event(event).await });
            while let Some(finished) = handlers.try_join_next() {
                if let Err(err) = finished {
                    warn!(error = %err, "event handler panicked");
                }
            }
        }
        while let Some(finished) = handlers.join_next().await {
            if let Err(err) = finished {
                warn!(error = %err, "event handler panicked");
            }
        }
        info!("event source closed");
    }

    /// Cancel every timer and release the providers.
    pub async fn shutdown(&self) {
        self.session.cancel_all().await;
        self.status.cancel_all().await;
        self.lifecycle.shutdown().await;
        self.search.close_providers().await;
        info!("bot stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_core::ChatKind;
    use marquee_test_support::fixtures;
    use marquee_test_support::mocks::{FakeEngine, RecordingTransport, Row, StaticProvider};

    struct Harness {
        bot: Arc<Bot>,
        transport: Arc<RecordingTransport>,
        engine: Arc<FakeEngine>,
    }

    fn harness(rows: Vec<Row>) -> anyhow::Result<Harness> {
        let transport = RecordingTransport::new();
        let engine = FakeEngine::new();
        let provider: Arc<dyn SearchProvider> = Arc::new(StaticProvider::new("fixture", rows));
        let shared_transport: Arc<dyn ChatTransport> = transport.clone();
        let shared_engine: Arc<dyn TransferEngine> = engine.clone();
        let bot = Bot::new(
            &BotSettings::default(),
            shared_transport,
            shared_engine,
            vec![provider],
            &Metrics::new()?,
        )?;
        Ok(Harness {
            bot,
            transport,
            engine,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn search_then_selection_admits_the_candidate() -> anyhow::Result<()> {
        let candidate = fixtures::candidate("dune");
        let h = harness(vec![Row::Hit(candidate.clone())])?;

        h.bot
            .handle_event(fixtures::message(fixtures::group_chat(), "/search dune"))
            .await;
        let listing = h.transport.delivered();
        assert_eq!(listing.len(), 1);
        assert!(listing[0].text.contains("dune"));
        assert_eq!(
            h.transport.actions(),
            vec![(fixtures::GROUP, ChatAction::Typing)]
        );
        let token = listing[0].options.selections[0].token.clone();
        assert_eq!(token, candidate.id.token());

        h.bot
            .handle_event(InboundEvent::Selection {
                chat: fixtures::group_chat(),
                token,
                message: None,
            })
            .await;
        let texts = h.transport.texts_for(fixtures::GROUP);
        assert!(texts[1].starts_with("Download started"));
        assert_eq!(h.engine.live(), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn bare_search_gets_usage_without_calling_providers() -> anyhow::Result<()> {
        let h = harness(Vec::new())?;
        h.bot
            .handle_event(fixtures::message(fixtures::group_chat(), "/buscar"))
            .await;
        assert_eq!(
            h.transport.texts_for(fixtures::GROUP),
            vec![SEARCH_USAGE.to_string()]
        );
        assert!(h.transport.actions().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn transfer_token_selection_delivers_status() -> anyhow::Result<()> {
        let h = harness(Vec::new())?;
        let download = h
            .bot
            .lifecycle()
            .enqueue(&fixtures::descriptor("st9"), fixtures::GROUP)
            .await?;
        h.bot
            .handle_event(InboundEvent::Selection {
                chat: fixtures::group_chat(),
                token: download.transfer_id.to_string(),
                message: None,
            })
            .await;
        let texts = h.transport.texts_for(fixtures::GROUP);
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("st9"));
        assert_eq!(h.bot.status().tracked().await, 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn token_matching_candidate_and_transfer_runs_both_paths() -> anyhow::Result<()> {
        let candidate = fixtures::candidate("shared");
        let token = candidate.id.token();
        let h = harness(vec![Row::Hit(candidate.clone())])?;
        h.bot.search().search("shared").await?;
        let collision = h
            .bot
            .lifecycle()
            .enqueue(&fixtures::descriptor(&token), fixtures::GROUP)
            .await?;
        assert_eq!(collision.transfer_id, FakeEngine::id_for(&fixtures::descriptor(&token)));
        assert_eq!(collision.transfer_id.as_str(), token);

        h.bot
            .handle_event(InboundEvent::Selection {
                chat: fixtures::group_chat(),
                token: token.clone(),
                message: None,
            })
            .await;

        let texts = h.transport.texts_for(fixtures::GROUP);
        assert_eq!(texts.len(), 2, "{texts:?}");
        assert!(texts.iter().any(|text| text == "Download started: shared"));
        assert!(texts.iter().any(|text| text.starts_with(&format!("{token}\n"))));
        assert_eq!(h.bot.lifecycle().len().await, 2);
        assert_eq!(h.bot.status().tracked().await, 1);
        assert_eq!(h.engine.added().len(), 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_selection_is_ignored() -> anyhow::Result<()> {
        let h = harness(Vec::new())?;
        h.bot
            .handle_event(InboundEvent::Selection {
                chat: fixtures::group_chat(),
                token: "nothing".to_string(),
                message: None,
            })
            .await;
        assert!(h.transport.delivered().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn new_members_are_welcomed_in_groups_only() -> anyhow::Result<()> {
        let h = harness(Vec::new())?;
        h.bot
            .handle_event(InboundEvent::MembersJoined {
                chat: fixtures::group_chat(),
                members: vec!["ana".to_string()],
            })
            .await;
        h.bot
            .handle_event(InboundEvent::MembersJoined {
                chat: ChatRef {
                    kind: ChatKind::Channel,
                    ..fixtures::group_chat()
                },
                members: vec!["bo".to_string()],
            })
            .await;
        assert_eq!(
            h.transport.texts_for(fixtures::GROUP),
            vec![BotSettings::default().welcome_message]
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn start_broadcasts_until_stop() -> anyhow::Result<()> {
        let h = harness(Vec::new())?;
        let welcome = BotSettings::default().welcome_message;
        h.bot
            .handle_event(fixtures::message(fixtures::group_chat(), "/start"))
            .await;
        tokio::time::sleep(std::time::Duration::from_secs(60 * 60 + 1)).await;
        assert_eq!(
            h.transport.texts_for(fixtures::GROUP),
            vec![welcome.clone(), welcome.clone()]
        );

        h.bot
            .handle_event(fixtures::message(fixtures::group_chat(), "/stop"))
            .await;
        tokio::time::sleep(std::time::Duration::from_secs(2 * 60 * 60)).await;
        let texts = h.transport.texts_for(fixtures::GROUP);
        assert_eq!(texts.len(), 3);
        assert!(texts[2].starts_with("Stopped 1"));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn completion_notifier_attaches_files() -> anyhow::Result<()> {
        let h = harness(Vec::new())?;
        let download = h
            .bot
            .lifecycle()
            .enqueue(&fixtures::descriptor("done1"), fixtures::GROUP)
            .await?;
        h.engine.complete(&download.transfer_id);
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;

        let delivered = h.transport.delivered();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].text.starts_with("Download finished"));
        assert_eq!(delivered[0].options.attachments.len(), 1);
        assert!(
            h.transport
                .actions()
                .contains(&(fixtures::GROUP, ChatAction::UploadDocument))
        );
        Ok(())
    }
}
