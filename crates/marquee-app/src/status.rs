//! Status watcher: refreshes a delivered progress message on a timer, editing it only
//! when the rendered text changes.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use marquee_config::BotSettings;
use marquee_core::{ChatId, ChatTransport, DeliveryOptions, MessageHandle, StatusError, TransferId};
use marquee_telemetry::Metrics;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::lifecycle::LifecycleController;
use crate::render::status_text;
use crate::timers::{RecurringTask, TickOutcome, TimerHandle};

/// Subscription cap and refresh cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusConfig {
    /// Subscriptions refreshed at once.
    pub max_tracked: usize,
    /// Refresh cadence.
    pub interval: Duration,
}

impl From<&BotSettings> for StatusConfig {
    fn from(settings: &BotSettings) -> Self {
        Self {
            max_tracked: settings.max_download_information_messages,
            interval: settings.status_interval(),
        }
    }
}

/// What happened to a status request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    /// Delivered and refreshed until the download disappears.
    Tracked(MessageHandle),
    /// Delivered once; the cap was reached so no refresh timer exists.
    Untracked(MessageHandle),
}

#[derive(Debug)]
struct Subscription {
    transfer_id: TransferId,
    last_text: String,
    timer: TimerHandle,
}

/// Keeps delivered status messages current.
pub struct StatusWatcher {
    transport: Arc<dyn ChatTransport>,
    lifecycle: Arc<LifecycleController>,
    config: StatusConfig,
    metrics: Metrics,
    subscriptions: Mutex<HashMap<MessageHandle, Subscription>>,
}

impl StatusWatcher {
    /// Watcher with no subscriptions.
    #[must_use]
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        lifecycle: Arc<LifecycleController>,
        config: StatusConfig,
        metrics: Metrics,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            lifecycle,
            config,
            metrics,
            subscriptions: Mutex::new(HashMap::new()),
        })
    }

    /// Deliver the status of `transfer_id` to `chat_id` and keep it refreshed while the
    /// cap allows.
    ///
    /// # Errors
    ///
    /// `NotFound` when the download is not queued, `Lookup` when the engine cannot
    /// report it, `Transport` when delivery fails.
    pub async fn request(
        self: &Arc<Self>,
        chat_id: ChatId,
        transfer_id: &TransferId,
        reply_to: Option<MessageHandle>,
    ) -> Result<StatusOutcome, StatusError> {
        let download = self
            .lifecycle
            .describe(transfer_id)
            .await
            .map_err(|source| StatusError::Lookup { source })?
            .ok_or_else(|| StatusError::NotFound {
                transfer_id: transfer_id.clone(),
            })?;
        let text = status_text(&download);
        let handle = self
            .transport
            .deliver(
                chat_id,
                &text,
                DeliveryOptions {
                    reply_to,
                    ..DeliveryOptions::default()
                },
            )
            .await
            .map_err(|source| StatusError::Transport {
                source: source.into(),
            })?;

        let mut subscriptions = self.subscriptions.lock().await;
        if subscriptions.len() >= self.config.max_tracked {
            debug!(transfer_id = %transfer_id, "status cap reached, not tracking");
            return Ok(StatusOutcome::Untracked(handle));
        }
        let timer = self.spawn_refresh(handle);
        subscriptions.insert(
            handle,
            Subscription {
                transfer_id: transfer_id.clone(),
                last_text: text,
                timer,
            },
        );
        self.metrics.set_status_subscriptions(subscriptions.len());
        info!(transfer_id = %transfer_id, chat_id = %chat_id, "status subscription started");
        Ok(StatusOutcome::Tracked(handle))
    }

    /// Stop refreshing `handle`; returns whether a subscription existed.
    pub async fn cancel(&self, handle: MessageHandle) -> bool {
        let mut subscriptions = self.subscriptions.lock().await;
        let removed = subscriptions.remove(&handle);
        self.metrics.set_status_subscriptions(subscriptions.len());
        drop(subscriptions);
        let Some(subscription) = removed else {
            return false;
        };
        subscription.timer.cancel();
        true
    }

    /// Stop every subscription.
    pub async fn cancel_all(&self) {
        let mut subscriptions = self.subscriptions.lock().await;
        for subscription in subscriptions.values() {
            subscription.timer.cancel();
        }
        subscriptions.clear();
        self.metrics.set_status_subscriptions(0);
    }

    /// Subscriptions currently refreshed.
    pub async fn tracked(&self) -> usize {
        self.subscriptions.lock().await.len()
    }

    fn spawn_refresh(self: &Arc<Self>, handle: MessageHandle) -> TimerHandle {
        let watcher: Weak<Self> = Arc::downgrade(self);
        RecurringTask::new("status_refresh", self.config.interval)
            .with_metrics(self.metrics.clone())
            .spawn(move || {
                let watcher = watcher.clone();
                async move {
                    let Some(watcher) = watcher.upgrade() else {
                        return Ok(TickOutcome::Stop);
                    };
                    watcher.refresh(handle).await
                }
            })
    }

    async fn refresh(&self, handle: MessageHandle) -> anyhow::Result<TickOutcome> {
        let transfer_id = {
            let subscriptions = self.subscriptions.lock().await;
            let Some(subscription) = subscriptions.get(&handle) else {
                return Ok(TickOutcome::Stop);
            };
            subscription.transfer_id.clone()
        };

        let Some(download) = self.lifecycle.describe(&transfer_id).await? else {
            self.cancel(handle).await;
            debug!(transfer_id = %transfer_id, "download gone, status subscription ended");
            return Ok(TickOutcome::Stop);
        };

        let text = status_text(&download);
        let changed = {
            let subscriptions = self.subscriptions.lock().await;
            match subscriptions.get(&handle) {
                Some(subscription) => subscription.last_text != text,
                None => return Ok(TickOutcome::Stop),
            }
        };
        if !changed {
            return Ok(TickOutcome::Continue);
        }

        self.transport.edit(handle, &text).await?;
        if let Some(subscription) = self.subscriptions.lock().await.get_mut(&handle) {
            subscription.last_text = text;
        }
        Ok(TickOutcome::Continue)
    }
}
