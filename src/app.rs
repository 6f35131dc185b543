use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::args::MetadataInput;
use crate::config::ResolvedConfig;
use crate::domain::{InstallState, InvocationResult, WriteOutcome};
use crate::error::ExifError;
use crate::fetcher::{ArchiveFetcher, HttpArchiveFetcher};
use crate::hooks::Hooks;
use crate::installer::{InstallStatus, Installer};
use crate::invoker::{ProcessInvoker, ToolInvoker};
use crate::tags::{HttpTagDirectory, LazyTagCatalog, TagCatalog, TagDirectory};
use crate::writer::{WriteOrchestrator, WriteRequest};

type InstallHandle = JoinHandle<Result<InstallState, ExifError>>;

/// Entry point tying installation, invocation and tag validation together.
pub struct App<I: ToolInvoker, D: TagDirectory, F: ArchiveFetcher + 'static> {
    hooks: Hooks,
    invoker: I,
    tags: LazyTagCatalog<D>,
    installer: Arc<Installer<F>>,
    install_thread: Mutex<Option<InstallHandle>>,
}

impl App<ProcessInvoker, HttpTagDirectory, HttpArchiveFetcher> {
    /// Builds the default stack and starts installing exiftool in the background.
    pub fn from_config(config: &ResolvedConfig, hooks: Hooks) -> Result<Self, ExifError> {
        let status = InstallStatus::default();
        let fetcher = HttpArchiveFetcher::new(&config.download, hooks.clone())?;
        let installer = Installer::new(
            config.working_dir.clone(),
            fetcher,
            config.download.clone(),
            status.clone(),
            hooks.clone(),
        );
        let invoker = ProcessInvoker::new(status, config.quiescence, hooks.clone());
        let tags = HttpTagDirectory::new(config.tag_cache_path(), hooks.clone())?;

        let app = Self::new(hooks, invoker, tags, installer);
        app.start_install();
        Ok(app)
    }
}

impl<I: ToolInvoker, D: TagDirectory, F: ArchiveFetcher + 'static> App<I, D, F> {
    /// `installer` and `invoker` must share one `InstallStatus`.
    pub fn new(hooks: Hooks, invoker: I, tags: D, installer: Installer<F>) -> Self {
        Self {
            hooks,
            invoker,
            tags: LazyTagCatalog::new(tags),
            installer: Arc::new(installer),
            install_thread: Mutex::new(None),
        }
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn set_logger<L>(&self, hook: L)
    where
        L: Fn(&str) + Send + Sync + 'static,
    {
        self.hooks.set_logger(hook);
    }

    pub fn set_progress<P>(&self, hook: P)
    where
        P: Fn() + Send + Sync + 'static,
    {
        self.hooks.set_progress(hook);
    }

    pub fn install_state(&self) -> InstallState {
        self.installer.status().get()
    }

    /// Starts a background install unless one has already been started.
    ///
    /// Returns `false` when an earlier install thread exists; use
    /// [`App::reinstall`] to run the bootstrap again.
    pub fn start_install(&self) -> bool {
        let Ok(mut guard) = self.install_thread.lock() else {
            return false;
        };
        if guard.is_some() {
            return false;
        }
        *guard = Some(self.spawn_install());
        true
    }

    /// Runs the bootstrap again on a new background thread.
    ///
    /// An install that is still running is waited for first, so the new run
    /// sees its final state instead of `Installing`.
    pub fn reinstall(&self) {
        let Ok(mut guard) = self.install_thread.lock() else {
            return;
        };
        if let Some(previous) = guard.take() {
            if let Ok(Err(err)) = previous.join() {
                tracing::debug!(error = %err, "previous install failed before reinstall");
            }
        }
        *guard = Some(self.spawn_install());
    }

    /// Blocks until the background install finishes.
    pub fn wait_for_install(&self) -> Result<InstallState, ExifError> {
        let handle = self
            .install_thread
            .lock()
            .ok()
            .and_then(|mut guard| guard.take());
        match handle {
            Some(handle) => handle
                .join()
                .map_err(|_| ExifError::InstallationFailed("install thread panicked".to_string()))?,
            None => Ok(self.install_state()),
        }
    }

    /// Runs the bootstrap on the calling thread.
    pub fn install_now(&self) -> Result<InstallState, ExifError> {
        self.installer.ensure_installed()
    }

    fn spawn_install(&self) -> InstallHandle {
        let installer = self.installer.clone();
        let hooks = self.hooks.clone();
        thread::spawn(move || {
            let result = installer.ensure_installed();
            if let Err(err) = &result {
                hooks.log(format!("error installing exiftool: {err}"));
            }
            result
        })
    }

    pub fn set_metadata(
        &self,
        file: impl AsRef<Path>,
        overwrite_original: bool,
        verify: bool,
        input: MetadataInput,
    ) -> Result<WriteOutcome, ExifError> {
        let request = WriteRequest {
            overwrite_original,
            verify,
            input,
        };
        WriteOrchestrator::new(&self.invoker, &self.tags, &self.hooks)
            .set_metadata(file.as_ref(), &request)
    }

    /// Reads every tag of `file` as exiftool JSON.
    pub fn get_metadata(&self, file: impl AsRef<Path>) -> Result<serde_json::Value, ExifError> {
        let file = file.as_ref();
        let result = self
            .invoker
            .invoke(file, &["-j".to_string()])?
            .into_result(file)?;
        result.payload.ok_or(ExifError::UnknownError {
            exit_code: result.exit_code,
        })
    }

    /// Runs exiftool on `file` with no options and expects its version banner.
    pub fn self_test(&self, file: impl AsRef<Path>) -> Result<InvocationResult, ExifError> {
        let file = file.as_ref();
        self.invoker.invoke(file, &[])?.into_result(file)
    }

    pub fn refresh_tags(&self) -> Result<Arc<TagCatalog>, ExifError> {
        self.tags.refresh()
    }
}
