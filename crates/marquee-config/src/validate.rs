//! Guard rails applied to loaded settings.

use std::path::PathBuf;

use crate::defaults;
use crate::model::{BotSettings, EffectiveSettings};

/// Ceiling for the configured rate limits, in KiB/s.
pub const MAX_RATE_LIMIT_KBPS: u64 = 1_000_000;
/// Ceiling for every timer-backed setting, in seconds (one week).
pub const MAX_PERIOD_SECS: u64 = 7 * 24 * 60 * 60;

/// Clamp settings into safe ranges, recording a warning for every adjustment.
#[must_use]
pub fn normalize_settings(mut settings: BotSettings) -> EffectiveSettings {
    let mut warnings = Vec::new();

    fallback_if_zero(
        &mut settings.max_queue_size,
        defaults::MAX_QUEUE_SIZE,
        "max_queue_size",
        &mut warnings,
    );
    fallback_if_zero(
        &mut settings.max_search_history_size,
        defaults::MAX_SEARCH_HISTORY_SIZE,
        "max_search_history_size",
        &mut warnings,
    );
    fallback_if_zero(
        &mut settings.search_limit,
        defaults::SEARCH_LIMIT,
        "search_limit",
        &mut warnings,
    );
    fallback_if_zero(
        &mut settings.download_info_messages_interval_secs,
        defaults::DOWNLOAD_INFO_MESSAGES_INTERVAL_SECS,
        "download_info_messages_interval_secs",
        &mut warnings,
    );
    fallback_if_zero(
        &mut settings.welcome_message_interval_mins,
        defaults::WELCOME_MESSAGE_INTERVAL_MINS,
        "welcome_message_interval_mins",
        &mut warnings,
    );
    fallback_if_zero(
        &mut settings.max_download_age_mins,
        defaults::MAX_DOWNLOAD_AGE_MINS,
        "max_download_age_mins",
        &mut warnings,
    );

    clamp_period(
        &mut settings.max_download_age_mins,
        60,
        "max_download_age_mins",
        &mut warnings,
    );
    clamp_period(
        &mut settings.welcome_message_interval_mins,
        60,
        "welcome_message_interval_mins",
        &mut warnings,
    );
    clamp_period(
        &mut settings.download_info_messages_interval_secs,
        1,
        "download_info_messages_interval_secs",
        &mut warnings,
    );
    clamp_period(
        &mut settings.remove_delay_secs,
        1,
        "remove_delay_secs",
        &mut warnings,
    );

    if !settings.min_ratio.is_finite() || settings.min_ratio < 0.0 {
        warnings.push(format!(
            "min_ratio {} is not a non-negative number; clamping to 0",
            settings.min_ratio
        ));
        settings.min_ratio = 0.0;
    }

    let poll = settings
        .download_poll_interval_ms
        .clamp(defaults::MIN_POLL_INTERVAL_MS, defaults::MAX_POLL_INTERVAL_MS);
    if poll != settings.download_poll_interval_ms {
        warnings.push(format!(
            "download_poll_interval_ms {} is outside {}..={}; using {poll}",
            settings.download_poll_interval_ms,
            defaults::MIN_POLL_INTERVAL_MS,
            defaults::MAX_POLL_INTERVAL_MS
        ));
        settings.download_poll_interval_ms = poll;
    }

    clamp_rate_limit(
        &mut settings.download_speed_limit_kbps,
        "download_speed_limit_kbps",
        &mut warnings,
    );
    clamp_rate_limit(
        &mut settings.upload_speed_limit_kbps,
        "upload_speed_limit_kbps",
        &mut warnings,
    );

    if settings.download_path.as_os_str().is_empty()
        || settings.download_path.to_string_lossy().trim().is_empty()
    {
        warnings.push(format!(
            "download_path is empty; falling back to {}",
            defaults::DOWNLOAD_PATH
        ));
        settings.download_path = PathBuf::from(defaults::DOWNLOAD_PATH);
    }

    settings.allowed_categories = settings
        .allowed_categories
        .iter()
        .map(|category| category.trim().to_lowercase())
        .filter(|category| !category.is_empty())
        .collect();

    if settings.max_search_history_size < settings.search_limit {
        warnings.push(format!(
            "max_search_history_size {} is below search_limit {}; older selections expire quickly",
            settings.max_search_history_size, settings.search_limit
        ));
    }

    EffectiveSettings { settings, warnings }
}

fn fallback_if_zero<T>(value: &mut T, fallback: T, field: &str, warnings: &mut Vec<String>)
where
    T: Copy + Default + PartialEq + std::fmt::Display,
{
    if *value == T::default() {
        warnings.push(format!("{field} must be positive; using default {fallback}"));
        *value = fallback;
    }
}

fn clamp_rate_limit(value: &mut u64, field: &str, warnings: &mut Vec<String>) {
    if *value > MAX_RATE_LIMIT_KBPS {
        warnings.push(format!(
            "{field} {value} exceeds guard rail {MAX_RATE_LIMIT_KBPS}; clamping"
        ));
        *value = MAX_RATE_LIMIT_KBPS;
    }
}

/// `value` is counted in units of `unit_secs` seconds.
fn clamp_period(value: &mut u64, unit_secs: u64, field: &str, warnings: &mut Vec<String>) {
    let ceiling = MAX_PERIOD_SECS / unit_secs;
    if *value > ceiling {
        warnings.push(format!(
            "{field} {value} exceeds guard rail {ceiling}; clamping"
        ));
        *value = ceiling;
    }
}
