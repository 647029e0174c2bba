use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    diagnostics::{DEFAULT_LOG_FILTER, DEFAULT_TRACE_FILE_PREFIX, LogRotation},
    journal::DEFAULT_MAX_UNDO_DEPTH,
    time::{DEFAULT_BPM, DEFAULT_SAMPLE_RATE, DEFAULT_SAMPLES_PER_PIXEL, DEFAULT_SUBDIVISION},
};

pub const CONFIG_FILE_NAME: &str = "cliplane.config.toml";
pub const CONFIG_PATH_ENV: &str = "CLIPLANE_CONFIG_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CliplaneConfig {
    pub project: ProjectConfig,
    pub timeline: TimelineConfig,
    pub cache: CacheConfig,
    pub journal: JournalConfig,
    pub diagnostics: DiagnosticsConfig,
    pub paths: PathsConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProjectConfig {
    pub default_title: String,
    pub default_bpm: u32,
    pub default_sample_rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimelineConfig {
    pub samples_per_pixel: u32,
    pub snap_to_grid: bool,
    pub subdivision: u32,
}

/// `max_buffers` of `None` (or 0) leaves the buffer cache unbounded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    pub max_buffers: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct JournalConfig {
    pub max_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub rust_log_filter: String,
    pub trace_file_prefix: String,
    pub rotation: LogRotation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub logs_dir: PathBuf,
    pub autosave_dir: PathBuf,
    pub export_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExportConfig {
    pub ffmpeg_binary: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            default_title: "Untitled".to_string(),
            default_bpm: DEFAULT_BPM,
            default_sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            samples_per_pixel: DEFAULT_SAMPLES_PER_PIXEL,
            snap_to_grid: true,
            subdivision: DEFAULT_SUBDIVISION,
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_UNDO_DEPTH,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            rust_log_filter: DEFAULT_LOG_FILTER.to_string(),
            trace_file_prefix: DEFAULT_TRACE_FILE_PREFIX.to_string(),
            rotation: LogRotation::Never,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            logs_dir: PathBuf::from("logs"),
            autosave_dir: PathBuf::from("data/autosave"),
            export_dir: PathBuf::from("data/exports"),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            ffmpeg_binary: PathBuf::from("ffmpeg"),
        }
    }
}

impl CliplaneConfig {
    pub fn load() -> Result<Self> {
        let config_path = discover_config_path().with_context(|| {
            format!("failed to locate {CONFIG_FILE_NAME}; looked in cwd and parent directory")
        })?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read config file {}", config_path.display()))?;

        Self::from_toml_str(&content).with_context(|| {
            format!("failed to parse config TOML from {}", config_path.display())
        })
    }

    /// Falls back to defaults when no config file can be found; a file that exists but does not
    /// parse is still an error.
    pub fn load_or_default() -> Result<Self> {
        match discover_config_path() {
            Ok(path) => Self::load_from(&path),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("invalid cliplane config")
    }
}

pub fn discover_config_path() -> Result<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Ok(path);
        }
    }

    let cwd = env::current_dir().context("failed to resolve current directory")?;
    let candidates = [
        cwd.join(CONFIG_FILE_NAME),
        cwd.join("..").join(CONFIG_FILE_NAME),
    ];

    candidates
        .into_iter()
        .find(|path| path.is_file())
        .ok_or_else(|| anyhow::anyhow!("{CONFIG_FILE_NAME} not found"))
}
