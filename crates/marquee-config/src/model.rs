//! Typed bot settings.
//!
//! # Design
//! - Pure data carrier deserialized from the optional JSON document.
//! - Every field is optional in the document and falls back to `defaults.rs`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Every knob the bot reads at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BotSettings {
    /// Candidates remembered for selection-token resolution.
    pub max_search_history_size: usize,
    /// Concurrent downloads admitted into the queue.
    pub max_queue_size: usize,
    /// Largest payload admitted, in KiB.
    pub max_download_size_kb: u64,
    /// Minimum seed to leech ratio.
    pub min_ratio: f64,
    /// Minimum seed count.
    pub min_seeds: u32,
    /// Age after which an unfinished download is evicted.
    pub max_download_age_mins: u64,
    /// Grace window between completion and removal.
    pub remove_delay_secs: u64,
    /// Rows requested from each search source.
    pub search_limit: usize,
    /// Status subscriptions tracked at once.
    pub max_download_information_messages: usize,
    /// Status refresh cadence.
    pub download_info_messages_interval_secs: u64,
    /// Welcome broadcast cadence.
    pub welcome_message_interval_mins: u64,
    /// Download watcher poll cadence.
    pub download_poll_interval_ms: u64,
    /// Download rate limit in KiB/s.
    pub download_speed_limit_kbps: u64,
    /// Upload rate limit in KiB/s.
    pub upload_speed_limit_kbps: u64,
    /// Storage folder for payloads.
    pub download_path: PathBuf,
    /// JSON catalog backing the local search provider.
    pub catalog_path: Option<PathBuf>,
    /// Categories accepted from search sources.
    pub allowed_categories: Vec<String>,
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,
    /// `json` or `pretty`; inferred from the build when unset.
    pub log_format: Option<String>,
    /// Text broadcast to groups and new members.
    pub welcome_message: String,
    /// Reply to messages outside group chats.
    pub private_chat_notice: String,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            max_search_history_size: defaults::MAX_SEARCH_HISTORY_SIZE,
            max_queue_size: defaults::MAX_QUEUE_SIZE,
            max_download_size_kb: defaults::MAX_DOWNLOAD_SIZE_KB,
            min_ratio: defaults::MIN_RATIO,
            min_seeds: defaults::MIN_SEEDS,
            max_download_age_mins: defaults::MAX_DOWNLOAD_AGE_MINS,
            remove_delay_secs: defaults::REMOVE_DELAY_SECS,
            search_limit: defaults::SEARCH_LIMIT,
            max_download_information_messages: defaults::MAX_DOWNLOAD_INFORMATION_MESSAGES,
            download_info_messages_interval_secs: defaults::DOWNLOAD_INFO_MESSAGES_INTERVAL_SECS,
            welcome_message_interval_mins: defaults::WELCOME_MESSAGE_INTERVAL_MINS,
            download_poll_interval_ms: defaults::DOWNLOAD_POLL_INTERVAL_MS,
            download_speed_limit_kbps: defaults::DOWNLOAD_SPEED_LIMIT_KBPS,
            upload_speed_limit_kbps: defaults::UPLOAD_SPEED_LIMIT_KBPS,
            download_path: PathBuf::from(defaults::DOWNLOAD_PATH),
            catalog_path: None,
            allowed_categories: defaults::ALLOWED_CATEGORIES
                .iter()
                .map(ToString::to_string)
                .collect(),
            log_level: defaults::LOG_LEVEL.to_string(),
            log_format: None,
            welcome_message: defaults::WELCOME_MESSAGE.to_string(),
            private_chat_notice: defaults::PRIVATE_CHAT_NOTICE.to_string(),
        }
    }
}

impl BotSettings {
    #[must_use]
    /// Age limit for unfinished downloads.
    pub const fn max_download_age(&self) -> Duration {
        Duration::from_secs(self.max_download_age_mins.saturating_mul(60))
    }

    #[must_use]
    /// Grace window between completion and removal.
    pub const fn remove_delay(&self) -> Duration {
        Duration::from_secs(self.remove_delay_secs)
    }

    #[must_use]
    /// Status refresh cadence.
    pub const fn status_interval(&self) -> Duration {
        Duration::from_secs(self.download_info_messages_interval_secs)
    }

    #[must_use]
    /// Welcome broadcast cadence.
    pub const fn welcome_interval(&self) -> Duration {
        Duration::from_secs(self.welcome_message_interval_mins.saturating_mul(60))
    }

    #[must_use]
    /// Download watcher poll cadence.
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.download_poll_interval_ms)
    }
}

/// Settings after guard rails were applied, with a note per adjustment.
#[derive(Debug, Clone)]
pub struct EffectiveSettings {
    /// Normalized settings.
    pub settings: BotSettings,
    /// Guard-rail adjustments applied during normalization.
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let parsed: BotSettings = serde_json::from_str("{}").expect("empty document");
        assert_eq!(parsed, BotSettings::default());
        assert_eq!(parsed.max_queue_size, 3);
        assert_eq!(parsed.max_download_size_kb, 2_048_000);
        assert_eq!(parsed.allowed_categories.len(), 5);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed = serde_json::from_str::<BotSettings>(r#"{"max_queue": 4}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn duration_helpers_convert_units() {
        let settings = BotSettings::default();
        assert_eq!(settings.max_download_age(), Duration::from_secs(90 * 60));
        assert_eq!(settings.remove_delay(), Duration::from_secs(60));
        assert_eq!(settings.poll_interval(), Duration::from_millis(500));
        assert_eq!(settings.welcome_interval(), Duration::from_secs(3_600));
    }

    #[test]
    fn minute_helpers_saturate_instead_of_overflowing() {
        let settings = BotSettings {
            max_download_age_mins: u64::MAX / 2,
            welcome_message_interval_mins: u64::MAX,
            ..BotSettings::default()
        };
        assert_eq!(settings.max_download_age(), Duration::from_secs(u64::MAX));
        assert_eq!(settings.welcome_interval(), Duration::from_secs(u64::MAX));
    }
}
