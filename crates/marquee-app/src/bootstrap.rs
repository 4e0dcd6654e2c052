//! Boot sequence: settings, logging, collaborators, bot, shutdown.

use std::future::Future;
use std::sync::Arc;

use marquee_adapters::{CatalogProvider, ConsoleTransport, SimulatedEngine};
use marquee_config::EffectiveSettings;
use marquee_core::{ChatTransport, EventSource, SearchProvider, TransferEngine};
use marquee_telemetry::{GlobalContextGuard, LoggingConfig, Metrics};
use tracing::{debug, info, warn};

use crate::bot::Bot;
use crate::error::{AppError, AppResult};

/// Name of the catalog-backed search source.
pub const CATALOG_PROVIDER: &str = "catalog";

/// Collaborators the bot runs against.
pub(crate) struct BootstrapDependencies {
    effective: EffectiveSettings,
    metrics: Metrics,
    transport: Arc<dyn ChatTransport>,
    events: Arc<dyn EventSource>,
    engine: Arc<dyn TransferEngine>,
    providers: Vec<Arc<dyn SearchProvider>>,
}

impl BootstrapDependencies {
    /// Local collaborators configured from the environment.
    pub(crate) fn from_env() -> AppResult<Self> {
        let effective = marquee_config::load_settings()
            .map_err(|err| AppError::config("settings.load", err))?;
        let metrics =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;

        let console = Arc::new(ConsoleTransport::stdio());
        let transport: Arc<dyn ChatTransport> = console.clone();
        let events: Arc<dyn EventSource> = console;
        let engine: Arc<dyn TransferEngine> = Arc::new(SimulatedEngine::new());

        let settings = &effective.settings;
        let mut providers: Vec<Arc<dyn SearchProvider>> = Vec::new();
        if let Some(path) = &settings.catalog_path {
            let catalog: Arc<dyn SearchProvider> = Arc::new(CatalogProvider::new(
                CATALOG_PROVIDER,
                path.clone(),
                &settings.allowed_categories,
            ));
            providers.push(catalog);
        }

        Ok(Self {
            effective,
            metrics,
            transport,
            events,
            engine,
            providers,
        })
    }
}

/// Entry point for the bot boot sequence.
///
/// # Errors
///
/// Returns an error when settings are invalid, logging cannot be installed, the storage
/// folder cannot be created or a search provider fails to start.
pub async fn run_app() -> AppResult<()> {
    let dependencies = BootstrapDependencies::from_env()?;
    let settings = &dependencies.effective.settings;
    marquee_telemetry::init_logging(&LoggingConfig {
        level: &settings.log_level,
        format: marquee_telemetry::log_format_from_str(settings.log_format.as_deref()),
        build_sha: marquee_telemetry::build_sha(),
    })
    .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new("console");

    run_app_with(dependencies, shutdown_signal()).await
}

/// Boot sequence over injected collaborators; returns once `shutdown` resolves.
pub(crate) async fn run_app_with<S>(
    dependencies: BootstrapDependencies,
    shutdown: S,
) -> AppResult<()>
where
    S: Future<Output = ()>,
{
    let BootstrapDependencies {
        effective,
        metrics,
        transport,
        events,
        engine,
        providers,
    } = dependencies;
    let EffectiveSettings { settings, warnings } = effective;
    info!("marquee bootstrap starting");
    for warning in &warnings {
        warn!(adjustment = %warning, "settings adjusted");
    }

    tokio::fs::create_dir_all(&settings.download_path)
        .await
        .map_err(|err| {
            AppError::io(
                "downloads.create_dir",
                Some(settings.download_path.clone()),
                err,
            )
        })?;

    let provider_count = providers.len();
    let bot = Bot::new(&settings, transport, engine, providers, &metrics)?;
    bot.init().await?;
    info!(
        providers = provider_count,
        queue = settings.max_queue_size,
        "bot ready"
    );

    tokio::pin!(shutdown);
    let events_closed = tokio::select! {
        () = Arc::clone(&bot).run(events) => true,
        () = &mut shutdown => false,
    };
    if events_closed {
        info!("waiting for shutdown signal");
        shutdown.await;
    }

    bot.shutdown().await;
    match metrics.render() {
        Ok(exposition) => debug!(metrics = %exposition, "final metrics"),
        Err(err) => warn!(error = %err, "metrics render failed"),
    }
    info!("marquee shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "shutdown signal unavailable");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_config::BotSettings;
    use marquee_test_support::fixtures;
    use marquee_test_support::mocks::{FakeEngine, RecordingTransport, Row, StaticProvider};
    use std::time::Duration;
    use tokio::io::BufReader;

    fn dependencies(
        script: &'static str,
        settings: BotSettings,
        transport: &Arc<RecordingTransport>,
        providers: Vec<Arc<dyn SearchProvider>>,
    ) -> anyhow::Result<BootstrapDependencies> {
        let console = Arc::new(ConsoleTransport::new(
            BufReader::new(script.as_bytes()),
            tokio::io::sink(),
        ));
        let shared_transport: Arc<dyn ChatTransport> = transport.clone();
        let engine: Arc<dyn TransferEngine> = FakeEngine::new();
        Ok(BootstrapDependencies {
            effective: EffectiveSettings {
                settings,
                warnings: vec!["poll interval clamped".to_string()],
            },
            metrics: Metrics::new()?,
            transport: shared_transport,
            events: console,
            engine,
            providers,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn scripted_session_runs_until_shutdown() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let settings = BotSettings {
            download_path: dir.path().join("downloads"),
            ..BotSettings::default()
        };
        let transport = RecordingTransport::new();
        let provider: Arc<dyn SearchProvider> = Arc::new(StaticProvider::new(
            "fixture",
            vec![Row::Hit(fixtures::candidate("dune"))],
        ));
        let deps = dependencies("/search dune\n/help\n", settings, &transport, vec![provider])?;

        run_app_with(deps, tokio::time::sleep(Duration::from_secs(60))).await?;

        let texts = transport.texts_for(marquee_adapters::GROUP_CHAT_ID);
        assert_eq!(texts.len(), 2);
        assert!(texts.iter().any(|text| text.contains("dune")));
        assert!(texts.iter().any(|text| text.starts_with("Commands:")));
        assert!(dir.path().join("downloads").is_dir());
        Ok(())
    }

    #[tokio::test]
    async fn failing_provider_is_fatal() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let settings = BotSettings {
            download_path: dir.path().to_path_buf(),
            ..BotSettings::default()
        };
        let transport = RecordingTransport::new();
        let catalog: Arc<dyn SearchProvider> = Arc::new(CatalogProvider::new(
            CATALOG_PROVIDER,
            dir.path().join("missing.json"),
            &settings.allowed_categories,
        ));
        let deps = dependencies("", settings, &transport, vec![catalog])?;

        let err = run_app_with(deps, async {})
            .await
            .expect_err("missing catalog should abort startup");
        assert!(matches!(err, AppError::Provider { ref name, .. } if name == CATALOG_PROVIDER));
        Ok(())
    }
}
