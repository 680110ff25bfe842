pub mod config;
pub mod errors;
pub mod models;
pub mod resolver;
pub mod service;
pub mod store;
pub mod uploads;

pub use crate::config::AppConfig;
pub use crate::errors::{AppError, AppResult};
pub use crate::resolver::{StaticAsset, StaticBase, StaticResolver, StaticResolvers};
pub use crate::service::TimelineCore;
pub use crate::store::{DocumentBackend, DocumentStore, JsonFileBackend, LoadOutcome, MemoryBackend};
pub use crate::uploads::UploadStore;

use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

const LOG_FILE_NAME: &str = "timeline.log";
const DEFAULT_LOG_FILTER: &str = "info";

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Builds the file-backed core and performs the startup load, so id backfill
/// and a degraded document are visible in the log before the first request.
pub fn bootstrap(config: &AppConfig) -> AppResult<Arc<TimelineCore>> {
    let core = TimelineCore::from_config(config)?;
    match core.store().load().outcome {
        LoadOutcome::Loaded => {}
        LoadOutcome::Backfilled { assigned } => {
            tracing::info!(assigned, "startup load assigned missing item ids");
        }
        LoadOutcome::RecoveredDefault { reason } => {
            tracing::warn!(reason = %reason, "starting with the default timeline document");
        }
    }
    Ok(core)
}

/// Installs the process-wide JSON subscriber writing to a daily file under
/// `log_dir`. `RUST_LOG` overrides the default `info` filter. Only the first
/// call installs anything; later calls return `Internal`.
pub fn init_tracing(log_dir: &Path) -> AppResult<()> {
    if LOG_GUARD.get().is_some() {
        return Err(AppError::Internal("tracing is already initialised".to_string()));
    }
    std::fs::create_dir_all(log_dir)?;

    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_writer(writer)
        .try_init()
        .map_err(|error| AppError::Internal(format!("tracing subscriber: {}", error)))?;
    let _ = LOG_GUARD.set(guard);
    tracing::info!(log_dir = %log_dir.to_string_lossy(), "tracing initialised");
    Ok(())
}

pub fn to_client_error(error: impl std::fmt::Display) -> String {
    error.to_string()
}

/// JSON body for a failed request.
pub fn error_body(error: &AppError) -> Value {
    json!({
        "code": error.code(),
        "status": error.status_code(),
        "error": to_client_error(error),
    })
}
