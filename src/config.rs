use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::Platform;
use crate::error::ExifError;

pub const DEFAULT_CONFIG_FILE: &str = "exiftool-runner.json";
pub const TAG_CACHE_FILE: &str = "tagData.json";
pub const DEFAULT_WORKING_DIR: &str = "./exiftool";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub working_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub download: DownloadSection,
    #[serde(default)]
    pub invocation: InvocationSection,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DownloadSection {
    #[serde(default)]
    pub windows_url: Option<String>,
    #[serde(default)]
    pub macos_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub retries: Option<usize>,
    #[serde(default)]
    pub progress_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InvocationSection {
    #[serde(default)]
    pub grace_ms: Option<u64>,
    #[serde(default)]
    pub tick_ms: Option<u64>,
    #[serde(default)]
    pub quiet_ticks: Option<u32>,
    #[serde(default)]
    pub exit_poll_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub windows_url: String,
    pub macos_url: String,
    pub timeout: Duration,
    pub retries: usize,
    pub progress_interval: Duration,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            windows_url: "https://exiftool.org/exiftool-12.67.zip".to_string(),
            macos_url: "https://exiftool.org/Image-ExifTool-12.67.tar.gz".to_string(),
            timeout: Duration::from_secs(300),
            retries: 3,
            progress_interval: Duration::from_millis(500),
        }
    }
}

impl DownloadSettings {
    pub fn url_for(&self, platform: &Platform) -> Result<&str, ExifError> {
        match platform {
            Platform::Windows => Ok(&self.windows_url),
            Platform::MacOs => Ok(&self.macos_url),
            Platform::Other(name) => Err(ExifError::UnsupportedPlatform(name.clone())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuiescenceSettings {
    pub grace: Duration,
    pub tick: Duration,
    pub quiet_ticks: u32,
    pub exit_poll: Duration,
}

impl Default for QuiescenceSettings {
    fn default() -> Self {
        Self {
            grace: Duration::from_millis(1000),
            tick: Duration::from_millis(1000),
            quiet_ticks: 2,
            exit_poll: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub working_dir: PathBuf,
    pub download: DownloadSettings,
    pub quiescence: QuiescenceSettings,
}

impl ResolvedConfig {
    pub fn tag_cache_path(&self) -> PathBuf {
        self.working_dir.join(TAG_CACHE_FILE)
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from(DEFAULT_WORKING_DIR),
            download: DownloadSettings::default(),
            quiescence: QuiescenceSettings::default(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, ExifError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| ExifError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| ExifError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, ExifError> {
        let working_dir = config
            .working_dir
            .map(Utf8PathBuf::into_std_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKING_DIR));

        let base = DownloadSettings::default();
        let download = DownloadSettings {
            windows_url: config.download.windows_url.unwrap_or(base.windows_url),
            macos_url: config.download.macos_url.unwrap_or(base.macos_url),
            timeout: secs_or(config.download.timeout_secs, base.timeout, "timeout_secs")?,
            retries: config.download.retries.unwrap_or(base.retries),
            progress_interval: millis_or(
                config.download.progress_interval_ms,
                base.progress_interval,
                "progress_interval_ms",
            )?,
        };

        let defaults = QuiescenceSettings::default();
        let quiescence = QuiescenceSettings {
            grace: config
                .invocation
                .grace_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.grace),
            tick: millis_or(config.invocation.tick_ms, defaults.tick, "tick_ms")?,
            quiet_ticks: config
                .invocation
                .quiet_ticks
                .unwrap_or(defaults.quiet_ticks)
                .max(1),
            exit_poll: millis_or(config.invocation.exit_poll_ms, defaults.exit_poll, "exit_poll_ms")?,
        };

        Ok(ResolvedConfig {
            working_dir,
            download,
            quiescence,
        })
    }
}

fn millis_or(value: Option<u64>, default: Duration, name: &str) -> Result<Duration, ExifError> {
    match value {
        Some(0) => Err(ExifError::ConfigParse(format!(
            "{name} must be greater than zero"
        ))),
        Some(value) => Ok(Duration::from_millis(value)),
        None => Ok(default),
    }
}

fn secs_or(value: Option<u64>, default: Duration, name: &str) -> Result<Duration, ExifError> {
    millis_or(value.map(|secs| secs.saturating_mul(1000)), default, name)
}
