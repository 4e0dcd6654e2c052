use std::fs;
use std::path::PathBuf;

use marquee_config::{BotSettings, CONFIG_PATH_ENV, ConfigError, load_settings_with};
use tempfile::TempDir;

#[test]
fn document_values_are_layered_under_env_overrides() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let path = temp.path().join("marquee.json");
    fs::write(
        &path,
        r#"{
            "max_queue_size": 4,
            "search_limit": 8,
            "catalog_path": "catalog.json",
            "allowed_categories": ["movies"]
        }"#,
    )?;
    let path_text = path.display().to_string();

    let effective = load_settings_with(|key| match key {
        CONFIG_PATH_ENV => Some(path_text.clone()),
        "MARQUEE_SEARCH_LIMIT" => Some("3".to_string()),
        _ => None,
    })?;

    let settings = effective.settings;
    assert_eq!(settings.max_queue_size, 4, "document value kept");
    assert_eq!(settings.search_limit, 3, "env override wins");
    assert_eq!(settings.catalog_path, Some(PathBuf::from("catalog.json")));
    assert_eq!(settings.allowed_categories, vec!["movies"]);
    assert_eq!(
        settings.max_download_size_kb,
        BotSettings::default().max_download_size_kb
    );
    Ok(())
}

#[test]
fn invalid_document_reports_parse_error() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let path = temp.path().join("broken.json");
    fs::write(&path, "{ not json")?;
    let path_text = path.display().to_string();

    let err = load_settings_with(|key| (key == CONFIG_PATH_ENV).then(|| path_text.clone()))
        .expect_err("broken document should fail");
    assert!(matches!(err, ConfigError::Parse { .. }));
    Ok(())
}

#[test]
fn guard_rail_warnings_surface_through_loader() -> Result<(), Box<dyn std::error::Error>> {
    let effective = load_settings_with(|key| {
        (key == "MARQUEE_MAX_QUEUE_SIZE").then(|| "0".to_string())
    })?;
    assert_eq!(effective.settings.max_queue_size, 3);
    assert_eq!(effective.warnings.len(), 1);
    Ok(())
}
