//! Single-flight search over every configured provider plus the bounded candidate
//! history used to resolve selection tokens.
//!
//! # Design
//! - Providers are queried in parallel and joined; results keep provider order, then
//!   row order within a provider.
//! - The history is a FIFO ring: the oldest insertion is evicted first, lookups never
//!   refresh an entry.

use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::future::join_all;
use marquee_config::BotSettings;
use marquee_core::{CandidateId, CandidateResult, SearchError, SearchProvider, SearchResult};
use marquee_telemetry::Metrics;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::session::SessionState;

/// History bound and per-provider row limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchConfig {
    /// Candidates remembered for token resolution.
    pub history_capacity: usize,
    /// Rows requested from each provider.
    pub limit: usize,
}

impl From<&BotSettings> for SearchConfig {
    fn from(settings: &BotSettings) -> Self {
        Self {
            history_capacity: settings.max_search_history_size,
            limit: settings.search_limit,
        }
    }
}

/// Fans a query out to providers and remembers what they returned.
pub struct SearchService {
    providers: Vec<Arc<dyn SearchProvider>>,
    session: Arc<SessionState>,
    history: Mutex<VecDeque<CandidateResult>>,
    config: SearchConfig,
    metrics: Metrics,
}

impl SearchService {
    /// Service over `providers`, sharing the single-flight flag in `session`.
    #[must_use]
    pub fn new(
        providers: Vec<Arc<dyn SearchProvider>>,
        session: Arc<SessionState>,
        config: SearchConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            providers,
            session,
            history: Mutex::new(VecDeque::with_capacity(config.history_capacity)),
            config,
            metrics,
        }
    }

    /// Initialise every provider.
    ///
    /// # Errors
    ///
    /// Returns the name and failure of the first provider that could not start.
    pub async fn init_providers(&self) -> Result<(), (String, anyhow::Error)> {
        for provider in &self.providers {
            provider
                .init()
                .await
                .map_err(|err| (provider.name().to_string(), err))?;
            debug!(provider = provider.name(), "search provider ready");
        }
        Ok(())
    }

    /// Release every provider; failures are logged.
    pub async fn close_providers(&self) {
        for provider in &self.providers {
            if let Err(err) = provider.close().await {
                warn!(provider = provider.name(), error = %err, "search provider close failed");
            }
        }
    }

    /// Run one search. A blank query returns no candidates without taking the
    /// single-flight slot.
    ///
    /// # Errors
    ///
    /// `AlreadySearching` when another search is running (no provider is called), or
    /// `Provider` when every provider failed as a whole.
    pub async fn search(&self, query: &str) -> SearchResult<Vec<CandidateResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let Some(_permit) = self.session.try_begin_search() else {
            self.metrics.inc_search("already_searching");
            debug!(query, "search rejected while another runs");
            return Err(SearchError::AlreadySearching);
        };

        let outcomes = join_all(
            self.providers
                .iter()
                .map(|provider| self.query_provider(provider.as_ref(), query)),
        )
        .await;

        let mut candidates = Vec::new();
        let mut first_failure = None;
        let mut failures = 0;
        for outcome in outcomes {
            match outcome {
                Ok(rows) => candidates.extend(rows),
                Err(err) => {
                    failures += 1;
                    first_failure.get_or_insert(err);
                }
            }
        }
        if failures == self.providers.len()
            && let Some(err) = first_failure
        {
            self.metrics.inc_search("failed");
            return Err(err);
        }

        self.remember(&candidates).await;
        self.metrics.inc_search(if candidates.is_empty() {
            "no_results"
        } else {
            "results"
        });
        info!(query, results = candidates.len(), "search finished");
        Ok(candidates)
    }

    async fn query_provider(
        &self,
        provider: &dyn SearchProvider,
        query: &str,
    ) -> SearchResult<Vec<CandidateResult>> {
        let rows = provider
            .search(query, self.config.limit)
            .await
            .map_err(|source| {
                warn!(provider = provider.name(), query, error = %source, "search provider failed");
                SearchError::Provider {
                    provider: provider.name().to_string(),
                    source: source.into(),
                }
            })?;
        let resolved = join_all(rows).await;
        let mut candidates = Vec::with_capacity(resolved.len());
        for row in resolved {
            match row {
                Ok(Some(candidate)) => candidates.push(candidate),
                Ok(None) => {}
                Err(err) => {
                    warn!(provider = provider.name(), error = %err, "search row failed");
                }
            }
        }
        Ok(candidates)
    }

    async fn remember(&self, candidates: &[CandidateResult]) {
        let capacity = self.config.history_capacity;
        let mut history = self.history.lock().await;
        for candidate in candidates {
            if capacity == 0 {
                break;
            }
            while history.len() >= capacity {
                history.pop_front();
            }
            history.push_back(candidate.clone());
        }
    }

    /// Look a selection token up in the history.
    pub async fn resolve(&self, token: &str) -> Option<CandidateResult> {
        let id: CandidateId = token.parse().ok()?;
        self.history
            .lock()
            .await
            .iter()
            .find(|candidate| candidate.id == id)
            .cloned()
    }

    /// Remembered candidate ids, oldest first.
    pub async fn history_ids(&self) -> Vec<CandidateId> {
        self.history
            .lock()
            .await
            .iter()
            .map(|candidate| candidate.id)
            .collect()
    }
}
