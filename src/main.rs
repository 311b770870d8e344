use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use worklog::alerts::spawn_alert_task;
use worklog::calendar::{Calendar, GoogleCalendar};
use worklog::config::AppConfig;
use worklog::drive::{FileStore, GoogleDrive};
use worklog::google::http_client;
use worklog::llm::{LlmProvider, create_provider};
use worklog::notes::Workbook;
use worklog::store::{CachedBackend, GoogleSheetsBackend, LibSqlBackend, SheetBackend};
use worklog::web::{AppState, Integrations, app_routes};

const ALERT_SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// Console logging, plus a daily rolling file when `log_dir` is set.
/// The returned guard flushes the file writer on drop.
fn init_tracing(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().with_target(false);

    match log_dir {
        Some(dir) => {
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "worklog.log"));
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(fmt::layer().with_target(false).with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(console).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    let client = http_client(config.http_timeout);
    let tokens = config
        .google_auth
        .as_ref()
        .map(|auth| auth.token_source(client.clone()));

    let backend: Arc<dyn SheetBackend> = match (&config.spreadsheet_id, &tokens) {
        (Some(id), Some(tokens)) => Arc::new(GoogleSheetsBackend::new(
            id.clone(),
            Arc::clone(tokens),
            client.clone(),
        )),
        (spreadsheet, _) => {
            if spreadsheet.is_some() {
                warn!("Spreadsheet configured without Google credentials, using local database");
            }
            Arc::new(
                LibSqlBackend::new_local(&config.db_path)
                    .await
                    .context("Failed to open local database")?,
            )
        }
    };
    let backend: Arc<dyn SheetBackend> = Arc::new(CachedBackend::new(backend, config.cache_ttl));

    let llm: Option<Arc<dyn LlmProvider>> = match &config.llm {
        Some(llm_config) => match create_provider(llm_config) {
            Ok(provider) => Some(provider),
            Err(e) => {
                warn!(error = %e, "LLM unavailable, AI mode disabled");
                None
            }
        },
        None => {
            warn!("No LLM API key configured, AI mode disabled");
            None
        }
    };

    let files: Option<Arc<dyn FileStore>> = match (&config.drive_folder_id, &tokens) {
        (Some(folder), Some(tokens)) => Some(Arc::new(GoogleDrive::new(
            folder.clone(),
            Arc::clone(tokens),
            client.clone(),
        ))),
        _ => None,
    };

    let calendar: Option<Arc<dyn Calendar>> = match (&config.calendar_id, &tokens) {
        (Some(id), Some(tokens)) => Some(Arc::new(GoogleCalendar::new(
            id.clone(),
            Arc::clone(tokens),
            client.clone(),
        ))),
        _ => None,
    };

    let workbook = Arc::new(Workbook::new(backend));
    let state = AppState::new(
        workbook,
        Integrations {
            llm,
            files,
            calendar,
        },
        config.alert_window,
    );

    eprintln!("📒 Worklog v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Storage: {}", state.status.backend);
    eprintln!(
        "   AI: {}",
        state.status.model.as_deref().unwrap_or("disabled")
    );
    eprintln!("   Drive: {}", if state.status.drive { "on" } else { "off" });
    eprintln!("   Calendar: {}", if state.status.calendar { "on" } else { "off" });
    eprintln!("   Dashboard: http://0.0.0.0:{}/", config.port);
    eprintln!("   Notes WS: ws://0.0.0.0:{}/ws/notes\n", config.port);

    let _alerts = spawn_alert_task(
        Arc::clone(&state.workbook),
        state.tx.clone(),
        ALERT_SWEEP_PERIOD,
    );

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    info!(port = config.port, "Worklog server listening");
    axum::serve(listener, app_routes(state))
        .await
        .context("Server error")?;

    Ok(())
}
