//! Runtime configuration.
//!
//! Resolution order: built-in defaults, then `pos-config.json` in the data
//! directory, then `POS_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PosError, PosResult};
use crate::retry::RetryPolicy;
use crate::tickets::PaperWidth;

pub const CONFIG_FILE: &str = "pos-config.json";
const APP_DIR_NAME: &str = "counter-pos";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Push,
    Poll,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PosConfig {
    pub data_dir: PathBuf,
    pub backend: StorageBackend,
    pub transport: TransportMode,
    pub poll_interval_ms: u64,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub tracking_base_url: String,
    pub paper_width_mm: u32,
    pub kitchen_spool_dir: Option<PathBuf>,
    pub log_filter: Option<String>,
}

impl Default for PosConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backend: StorageBackend::Sqlite,
            transport: TransportMode::Push,
            poll_interval_ms: 2_000,
            retry_attempts: 3,
            retry_base_delay_ms: 200,
            retry_max_delay_ms: 2_000,
            tracking_base_url: "http://localhost:5173".into(),
            paper_width_mm: 58,
            kitchen_spool_dir: None,
            log_filter: None,
        }
    }
}

/// `$XDG_DATA_HOME/counter-pos`, falling back to `~/.local/share/counter-pos`.
pub fn default_data_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                .join(".local")
                .join("share")
        });
    base.join(APP_DIR_NAME)
}

/// What happened while loading. Configuration is read before logging is
/// installed, so the caller logs this afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Config file that was read, if any.
    pub file: Option<PathBuf>,
    pub warnings: Vec<String>,
}

impl PosConfig {
    pub fn load() -> PosResult<(Self, LoadReport)> {
        let data_dir = std::env::var("POS_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());
        let path = data_dir.join(CONFIG_FILE);
        let mut report = LoadReport::default();
        let mut config = match Self::from_file(&path)? {
            Some(config) => {
                report.file = Some(path);
                config
            }
            None => Self::default(),
        };
        config.data_dir = data_dir;
        config.apply_env()?;
        report.warnings = config.validate()?;
        Ok((config, report))
    }

    fn from_file(path: &Path) -> PosResult<Option<Self>> {
        match std::fs::read(path) {
            Ok(raw) => {
                let config = serde_json::from_slice(&raw).map_err(|e| {
                    PosError::Validation(format!("{}: {e}", path.display()))
                })?;
                Ok(Some(config))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn apply_env(&mut self) -> PosResult<()> {
        if let Some(raw) = env_value("POS_BACKEND") {
            self.backend = match raw.to_ascii_lowercase().as_str() {
                "sqlite" => StorageBackend::Sqlite,
                "local" => StorageBackend::Local,
                other => {
                    return Err(PosError::Validation(format!(
                        "POS_BACKEND must be sqlite or local, got {other}"
                    )))
                }
            };
        }
        if let Some(raw) = env_value("POS_TRANSPORT") {
            self.transport = match raw.to_ascii_lowercase().as_str() {
                "push" => TransportMode::Push,
                "poll" => TransportMode::Poll,
                other => {
                    return Err(PosError::Validation(format!(
                        "POS_TRANSPORT must be push or poll, got {other}"
                    )))
                }
            };
        }
        if let Some(v) = env_parse("POS_POLL_INTERVAL_MS")? {
            self.poll_interval_ms = v;
        }
        if let Some(v) = env_parse("POS_RETRY_ATTEMPTS")? {
            self.retry_attempts = v;
        }
        if let Some(v) = env_parse("POS_PAPER_WIDTH_MM")? {
            self.paper_width_mm = v;
        }
        if let Some(url) = env_value("POS_TRACKING_BASE_URL") {
            self.tracking_base_url = url;
        }
        if let Some(filter) = env_value("POS_LOG") {
            self.log_filter = Some(filter);
        }
        Ok(())
    }

    /// Errors on unusable values; returns warnings for values that are
    /// adjusted instead.
    pub fn validate(&self) -> PosResult<Vec<String>> {
        if self.poll_interval_ms == 0 {
            return Err(PosError::Validation("poll_interval_ms must be > 0".into()));
        }
        if self.retry_attempts == 0 {
            return Err(PosError::Validation("retry_attempts must be >= 1".into()));
        }
        if self.tracking_base_url.trim().is_empty() {
            return Err(PosError::Validation("tracking_base_url is empty".into()));
        }
        let mut warnings = Vec::new();
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            warnings.push(format!(
                "retry_max_delay_ms ({}) below retry_base_delay_ms ({}); base delay wins",
                self.retry_max_delay_ms, self.retry_base_delay_ms
            ));
        }
        Ok(warnings)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms.max(self.retry_base_delay_ms)),
        }
    }

    pub fn paper_width(&self) -> PaperWidth {
        PaperWidth::from_mm(self.paper_width_mm)
    }

    pub fn spool_dir(&self) -> PathBuf {
        self.kitchen_spool_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("kot"))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> PosResult<Option<T>> {
    match env_value(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| PosError::Validation(format!("{key} is not a valid number: {raw}"))),
        None => Ok(None),
    }
}
