use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::config::DownloadSettings;
use crate::domain::{InstallState, Platform};
use crate::error::ExifError;
use crate::fetcher::ArchiveFetcher;
use crate::fs_util;
use crate::hooks::Hooks;
use crate::locator::ToolLocator;

/// Install state shared between the installer and every invoker.
#[derive(Debug, Clone)]
pub struct InstallStatus(Arc<RwLock<InstallState>>);

impl Default for InstallStatus {
    fn default() -> Self {
        Self(Arc::new(RwLock::new(InstallState::Uninstalled)))
    }
}

impl InstallStatus {
    pub fn installed(executable: impl Into<PathBuf>) -> Self {
        Self(Arc::new(RwLock::new(InstallState::Installed {
            executable: executable.into(),
        })))
    }

    pub fn get(&self) -> InstallState {
        match self.0.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set(&self, state: InstallState) {
        match self.0.write() {
            Ok(mut guard) => *guard = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
    }

    /// Moves to `Installing` unless an install is already running.
    fn try_begin(&self) -> bool {
        let mut guard = match self.0.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *guard == InstallState::Installing {
            return false;
        }
        *guard = InstallState::Installing;
        true
    }
}

pub struct Installer<F: ArchiveFetcher> {
    locator: ToolLocator,
    fetcher: F,
    download: DownloadSettings,
    platform: Platform,
    status: InstallStatus,
    hooks: Hooks,
}

impl<F: ArchiveFetcher> Installer<F> {
    pub fn new(
        working_dir: impl Into<PathBuf>,
        fetcher: F,
        download: DownloadSettings,
        status: InstallStatus,
        hooks: Hooks,
    ) -> Self {
        Self {
            locator: ToolLocator::new(working_dir),
            fetcher,
            download,
            platform: Platform::current(),
            status,
            hooks,
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn status(&self) -> &InstallStatus {
        &self.status
    }

    pub fn working_dir(&self) -> &Path {
        self.locator.working_dir()
    }

    /// Brings the tool onto disk if needed and publishes the resulting state.
    ///
    /// Any failure leaves the state at `Uninstalled`, so invocations keep
    /// failing fast with `ToolNotInstalled` instead of hanging.
    pub fn ensure_installed(&self) -> Result<InstallState, ExifError> {
        if !self.status.try_begin() {
            self.hooks.log("exiftool install already in progress");
            return Ok(InstallState::Installing);
        }
        let outcome = self.run_bootstrap();
        let state = match &outcome {
            Ok(executable) => InstallState::Installed {
                executable: executable.clone(),
            },
            Err(err) => {
                self.hooks.log(format!("exiftool install failed: {err}"));
                tracing::warn!(error = %err, "exiftool unavailable, continuing without it");
                InstallState::Uninstalled
            }
        };
        self.status.set(state.clone());
        outcome.map(|_| state)
    }

    fn run_bootstrap(&self) -> Result<PathBuf, ExifError> {
        let working_dir = self.locator.working_dir();
        fs::create_dir_all(working_dir).map_err(|err| {
            ExifError::Filesystem(format!(
                "create working directory {}: {err}",
                working_dir.display()
            ))
        })?;

        if let Some(executable) = self.locator.locate() {
            tracing::debug!(path = %executable.display(), "exiftool already installed");
            return Ok(executable);
        }

        let url = self.download.url_for(&self.platform)?;
        let archive = working_dir.join(archive_name(url));
        self.hooks.log(format!("downloading exiftool from {url}"));
        match self.fetcher.fetch_and_extract(Some(url), &archive, working_dir) {
            Ok(true) => {}
            Ok(false) => {
                return Err(ExifError::InstallationFailed(format!(
                    "fetcher reported failure for {url}"
                )));
            }
            Err(err) => return Err(ExifError::InstallationFailed(err.to_string())),
        }

        let executable = self.locator.locate().ok_or_else(|| {
            ExifError::InstallationFailed(format!(
                "archive extracted but no exiftool executable found in {}",
                working_dir.display()
            ))
        })?;
        fs_util::make_executable(&executable)?;
        tracing::info!(path = %executable.display(), "exiftool installed");
        Ok(executable)
    }
}

fn archive_name(url: &str) -> String {
    url.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("exiftool.zip")
        .to_string()
}
