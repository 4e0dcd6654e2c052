//! Cancellable recurring and delayed tasks.
//!
//! Every timer is driven by its own tokio task and stopped through a
//! [`CancellationToken`]. A tick that fails is logged and the schedule continues; a
//! tick may end its own timer by returning [`TickOutcome::Stop`].

use std::future::Future;
use std::time::Duration;

use marquee_telemetry::Metrics;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// What a recurring tick wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Keep the schedule.
    Continue,
    /// End the timer.
    Stop,
}

/// Handle used to stop a timer; cloning shares the same token.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    label: &'static str,
    token: CancellationToken,
}

impl TimerHandle {
    /// Stop the timer. Idempotent.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            debug!(task = self.label, "timer cancelled");
        }
        self.token.cancel();
    }

    /// Whether the timer was cancelled or ended on its own.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Task label used in logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.label
    }
}

/// A recurring task description.
#[derive(Clone)]
pub struct RecurringTask {
    label: &'static str,
    period: Duration,
    metrics: Option<Metrics>,
}

impl RecurringTask {
    /// Task firing every `period`, first tick one period from now.
    #[must_use]
    pub fn new(label: &'static str, period: Duration) -> Self {
        Self {
            label,
            period: period.max(MIN_PERIOD),
            metrics: None,
        }
    }

    /// Count failed ticks in `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Spawn the task; `tick` is called once per period until it stops or the handle
    /// is cancelled.
    pub fn spawn<F, Fut>(self, mut tick: F) -> TimerHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<TickOutcome>> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancel = token.clone();
        let Self {
            label,
            period,
            metrics,
        } = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match tick().await {
                    Ok(TickOutcome::Continue) => {}
                    Ok(TickOutcome::Stop) => {
                        debug!(task = label, "timer stopped itself");
                        break;
                    }
                    Err(err) => {
                        warn!(task = label, error = %err, "timer tick failed");
                        if let Some(metrics) = &metrics {
                            metrics.inc_timer_tick_failure(label);
                        }
                    }
                }
                if cancel.is_cancelled() {
                    break;
                }
            }
            cancel.cancel();
        });
        TimerHandle { label, token }
    }
}

/// Run `task` once after `delay` unless the returned handle is cancelled first.
pub fn spawn_delayed<Fut>(label: &'static str, delay: Duration, task: Fut) -> TimerHandle
where
    Fut: Future<Output = ()> + Send + 'static,
{
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            () = cancel.cancelled() => {}
            () = tokio::time::sleep(delay) => {
                task.await;
                cancel.cancel();
            }
        }
    });
    TimerHandle { label, token }
}
