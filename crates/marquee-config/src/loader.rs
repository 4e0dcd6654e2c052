//! Settings loader: compiled defaults, optional JSON document, environment overrides.
//!
//! # Design
//! - The environment is read through a lookup function so tests never mutate the
//!   process environment.
//! - Overrides use `MARQUEE_<FIELD>` names; list values are comma separated.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{BotSettings, EffectiveSettings};
use crate::validate::normalize_settings;

/// Environment variable naming the optional JSON settings document.
pub const CONFIG_PATH_ENV: &str = "MARQUEE_CONFIG";
/// Prefix shared by every override variable.
pub const ENV_PREFIX: &str = "MARQUEE_";

/// Load settings from the process environment.
///
/// # Errors
///
/// Returns an error when the settings document cannot be read or parsed, or when an
/// override holds a malformed value.
pub fn load_settings() -> ConfigResult<EffectiveSettings> {
    load_settings_with(|key| std::env::var(key).ok())
}

/// Load settings using `lookup` in place of the process environment.
///
/// # Errors
///
/// Returns an error when the settings document cannot be read or parsed, or when an
/// override holds a malformed value.
pub fn load_settings_with<F>(lookup: F) -> ConfigResult<EffectiveSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = match lookup(CONFIG_PATH_ENV) {
        Some(path) if !path.trim().is_empty() => read_document(Path::new(path.trim()))?,
        _ => BotSettings::default(),
    };
    apply_env_overrides(&mut settings, &lookup)?;
    Ok(normalize_settings(settings))
}

/// Parse a settings document from disk.
///
/// # Errors
///
/// Returns an error when the file cannot be read or is not a valid settings document.
pub fn read_document(path: &Path) -> ConfigResult<BotSettings> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        operation: "settings.read",
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "loaded settings document");
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn apply_env_overrides<F>(settings: &mut BotSettings, lookup: &F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    override_value(lookup, "max_search_history_size", &mut settings.max_search_history_size)?;
    override_value(lookup, "max_queue_size", &mut settings.max_queue_size)?;
    override_value(lookup, "max_download_size_kb", &mut settings.max_download_size_kb)?;
    override_value(lookup, "min_ratio", &mut settings.min_ratio)?;
    override_value(lookup, "min_seeds", &mut settings.min_seeds)?;
    override_value(lookup, "max_download_age_mins", &mut settings.max_download_age_mins)?;
    override_value(lookup, "remove_delay_secs", &mut settings.remove_delay_secs)?;
    override_value(lookup, "search_limit", &mut settings.search_limit)?;
    override_value(
        lookup,
        "max_download_information_messages",
        &mut settings.max_download_information_messages,
    )?;
    override_value(
        lookup,
        "download_info_messages_interval_secs",
        &mut settings.download_info_messages_interval_secs,
    )?;
    override_value(
        lookup,
        "welcome_message_interval_mins",
        &mut settings.welcome_message_interval_mins,
    )?;
    override_value(
        lookup,
        "download_poll_interval_ms",
        &mut settings.download_poll_interval_ms,
    )?;
    override_value(
        lookup,
        "download_speed_limit_kbps",
        &mut settings.download_speed_limit_kbps,
    )?;
    override_value(
        lookup,
        "upload_speed_limit_kbps",
        &mut settings.upload_speed_limit_kbps,
    )?;
    override_value(lookup, "download_path", &mut settings.download_path)?;
    override_value(lookup, "log_level", &mut settings.log_level)?;
    override_value(lookup, "welcome_message", &mut settings.welcome_message)?;
    override_value(lookup, "private_chat_notice", &mut settings.private_chat_notice)?;

    if let Some(raw) = env_value(lookup, "catalog_path") {
        settings.catalog_path = Some(PathBuf::from(raw));
    }
    if let Some(raw) = env_value(lookup, "log_format") {
        settings.log_format = Some(raw);
    }
    if let Some(raw) = env_value(lookup, "allowed_categories") {
        settings.allowed_categories = raw
            .split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
            .collect();
    }
    Ok(())
}

fn override_value<F, T>(lookup: &F, field: &str, target: &mut T) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = env_value(lookup, field) else {
        return Ok(());
    };
    *target = raw.parse::<T>().map_err(|_| ConfigError::InvalidField {
        field: field.to_string(),
        value: Some(raw.clone()),
        reason: "unparsable_value",
    })?;
    Ok(())
}

fn env_value<F>(lookup: &F, field: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(&env_key(field))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_key(field: &str) -> String {
    format!("{ENV_PREFIX}{}", field.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_key_uses_prefix_and_upper_case() {
        assert_eq!(env_key("max_queue_size"), "MARQUEE_MAX_QUEUE_SIZE");
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let effective = load_settings_with(|_| None).expect("defaults load");
        assert_eq!(effective.settings, BotSettings::default());
    }

    #[test]
    fn overrides_replace_defaults() {
        let effective = load_settings_with(lookup_from(&[
            ("MARQUEE_MAX_QUEUE_SIZE", "5"),
            ("MARQUEE_MIN_RATIO", "1.5"),
            ("MARQUEE_ALLOWED_CATEGORIES", "Movies, tv ,"),
            ("MARQUEE_DOWNLOAD_PATH", "/srv/media"),
        ]))
        .expect("overrides load");
        let settings = effective.settings;
        assert_eq!(settings.max_queue_size, 5);
        assert!((settings.min_ratio - 1.5).abs() < f64::EPSILON);
        assert_eq!(settings.allowed_categories, vec!["movies", "tv"]);
        assert_eq!(settings.download_path, PathBuf::from("/srv/media"));
    }

    #[test]
    fn malformed_override_is_rejected() {
        let err = load_settings_with(lookup_from(&[("MARQUEE_MIN_SEEDS", "many")]))
            .expect_err("malformed value should fail");
        assert!(matches!(
            err,
            ConfigError::InvalidField { ref field, .. } if field == "min_seeds"
        ));
    }

    #[test]
    fn missing_document_surfaces_io_error() {
        let err = load_settings_with(lookup_from(&[(
            CONFIG_PATH_ENV,
            "/definitely/missing/marquee.json",
        )]))
        .expect_err("missing file should fail");
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
