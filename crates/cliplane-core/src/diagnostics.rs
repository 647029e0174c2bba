use std::{fs, path::Path};

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_appender::{non_blocking::WorkerGuard, rolling::RollingFileAppender};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::config::CliplaneConfig;

pub const DEFAULT_LOG_FILTER: &str = "info,cliplane_core=trace,cliplane_cli=trace";
pub const DEFAULT_TRACE_FILE_PREFIX: &str = "cliplane";

/// How the JSON log file is split over time.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// One file per session, named after its start time.
    #[default]
    Never,
    Hourly,
    Daily,
}

impl LogRotation {
    fn appender(self, log_dir: &Path, file_prefix: &str) -> RollingFileAppender {
        match self {
            Self::Never => {
                let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
                tracing_appender::rolling::never(log_dir, format!("{file_prefix}-{timestamp}.log"))
            }
            Self::Hourly => tracing_appender::rolling::hourly(log_dir, format!("{file_prefix}.log")),
            Self::Daily => tracing_appender::rolling::daily(log_dir, format!("{file_prefix}.log")),
        }
    }
}

/// Keeps the file writer alive; logs stop flushing once this is dropped.
pub struct TelemetryGuard {
    pub session_id: Uuid,
    _file_guard: WorkerGuard,
}

pub fn init_tracing(log_dir: impl AsRef<Path>) -> anyhow::Result<TelemetryGuard> {
    init_tracing_with_options(
        log_dir,
        DEFAULT_TRACE_FILE_PREFIX,
        DEFAULT_LOG_FILTER,
        LogRotation::default(),
    )
}

pub fn init_tracing_from_config(config: &CliplaneConfig) -> anyhow::Result<TelemetryGuard> {
    init_tracing_with_options(
        &config.paths.logs_dir,
        &config.diagnostics.trace_file_prefix,
        &config.diagnostics.rust_log_filter,
        config.diagnostics.rotation,
    )
}

/// Installs a compact stdout layer and a JSON file layer behind one `EnvFilter`.
///
/// `RUST_LOG` wins over `default_filter`. A second call keeps the first subscriber.
pub fn init_tracing_with_options(
    log_dir: impl AsRef<Path>,
    file_prefix: &str,
    default_filter: &str,
    rotation: LogRotation,
) -> anyhow::Result<TelemetryGuard> {
    let log_dir = log_dir.as_ref();
    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory: {}", log_dir.display()))?;

    let session_id = Uuid::new_v4();
    let (file_writer, file_guard) =
        tracing_appender::non_blocking(rotation.appender(log_dir, file_prefix));

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_thread_ids(true)
        .with_target(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(file_writer);

    if let Err(error) = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
    {
        warn!(?error, "global tracing subscriber already initialized");
    } else {
        info!(%session_id, log_dir = %log_dir.display(), ?rotation, "tracing initialized");
    }

    Ok(TelemetryGuard {
        session_id,
        _file_guard: file_guard,
    })
}
