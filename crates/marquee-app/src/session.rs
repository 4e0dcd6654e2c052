//! Process-wide session state shared by the dispatcher and the search service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use marquee_core::ChatId;
use tokio::sync::Mutex;
use tracing::debug;

use crate::timers::TimerHandle;

/// Single-flight search flag plus the recurring timers each chat registered.
#[derive(Debug, Default)]
pub struct SessionState {
    searching: AtomicBool,
    chat_timers: Mutex<HashMap<ChatId, Vec<TimerHandle>>>,
}

/// Proof that the caller holds the single search slot; released on drop.
#[derive(Debug)]
pub struct SearchPermit<'a> {
    flag: &'a AtomicBool,
}

impl Drop for SearchPermit<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl SessionState {
    /// Fresh state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the search slot, or `None` when another search holds it.
    pub fn try_begin_search(&self) -> Option<SearchPermit<'_>> {
        self.searching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SearchPermit {
                flag: &self.searching,
            })
    }

    /// Whether a search currently holds the slot.
    #[must_use]
    pub fn is_searching(&self) -> bool {
        self.searching.load(Ordering::Acquire)
    }

    /// Remember a recurring timer created on behalf of `chat_id`.
    pub async fn track_timer(&self, chat_id: ChatId, handle: TimerHandle) {
        let mut timers = self.chat_timers.lock().await;
        let entry = timers.entry(chat_id).or_default();
        entry.retain(|timer| !timer.is_finished());
        entry.push(handle);
    }

    /// Cancel every recurring timer of `chat_id`; returns how many were live.
    pub async fn cancel_chat_timers(&self, chat_id: ChatId) -> usize {
        let removed = self.chat_timers.lock().await.remove(&chat_id);
        let mut live = 0;
        for timer in removed.unwrap_or_default() {
            if !timer.is_finished() {
                live += 1;
            }
            timer.cancel();
        }
        debug!(chat_id = %chat_id, live, "chat timers cancelled");
        live
    }

    /// Live timer count for `chat_id`.
    pub async fn timer_count(&self, chat_id: ChatId) -> usize {
        self.chat_timers
            .lock()
            .await
            .get(&chat_id)
            .map_or(0, |timers| {
                timers.iter().filter(|timer| !timer.is_finished()).count()
            })
    }

    /// Cancel every tracked timer of every chat.
    pub async fn cancel_all(&self) {
        let drained: Vec<TimerHandle> = self
            .chat_timers
            .lock()
            .await
            .drain()
            .flat_map(|(_, timers)| timers)
            .collect();
        for timer in drained {
            timer.cancel();
        }
    }
}
