//! Service configuration.

use std::path::PathBuf;
use std::time::Duration;

use subgen_models::LanguageCode;
use subgen_worker::WorkerConfig;

/// Grace period matching the original deployment: 12 hours.
const DEFAULT_GRACE_SECS: u64 = 12 * 3600;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Root data directory; media, artifacts and job state live under it
    pub data_dir: PathBuf,
    /// Subtitle target languages for every job
    pub languages: Vec<LanguageCode>,
    /// Delay between a job turning terminal and its files being reaped
    pub grace_period: Duration,
    /// How often the retention sweeper runs
    pub sweep_interval: Duration,
    /// Worker pool settings
    pub worker: WorkerConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: std::env::temp_dir().join("subgen"),
            languages: vec![LanguageCode::new("ko"), LanguageCode::new("en")],
            grace_period: Duration::from_secs(DEFAULT_GRACE_SECS),
            sweep_interval: Duration::from_secs(60),
            worker: WorkerConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: std::env::var("SUBGEN_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            languages: std::env::var("SUBGEN_LANGUAGES")
                .map(|s| {
                    s.split(',')
                        .filter(|p| !p.trim().is_empty())
                        .map(LanguageCode::new)
                        .collect()
                })
                .ok()
                .filter(|langs: &Vec<LanguageCode>| !langs.is_empty())
                .unwrap_or(defaults.languages),
            grace_period: Duration::from_secs(
                std::env::var("RETENTION_GRACE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_GRACE_SECS),
            ),
            sweep_interval: Duration::from_secs(
                std::env::var("RETENTION_SWEEP_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            worker: WorkerConfig::from_env(),
        }
    }

    /// Directory for uploaded media.
    pub fn media_dir(&self) -> PathBuf {
        self.data_dir.join("media")
    }

    /// Directory for generated subtitle files.
    pub fn artifacts_dir(&self) -> PathBuf {
        self.data_dir.join("artifacts")
    }

    /// Directory for persisted job state.
    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join("state")
    }
}
