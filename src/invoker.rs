use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crate::classify::classify;
use crate::config::QuiescenceSettings;
use crate::domain::InvocationResult;
use crate::error::ExifError;
use crate::hooks::Hooks;
use crate::installer::InstallStatus;
use crate::quiescence::{Clock, Quiescence, QuiescenceTracker, SystemClock};

pub trait ToolInvoker: Send + Sync {
    /// Runs exiftool with `tokens` against `target`.
    ///
    /// `Err` is reserved for failures to run at all; a run whose output
    /// classifies as a failure is returned as `Ok` with `succeeded == false`.
    fn invoke(&self, target: &Path, tokens: &[String]) -> Result<InvocationResult, ExifError>;
}

pub struct ProcessInvoker<C: Clock = SystemClock> {
    status: InstallStatus,
    settings: QuiescenceSettings,
    clock: C,
    hooks: Hooks,
}

impl ProcessInvoker<SystemClock> {
    pub fn new(status: InstallStatus, settings: QuiescenceSettings, hooks: Hooks) -> Self {
        Self::with_clock(status, settings, hooks, SystemClock)
    }
}

impl<C: Clock> ProcessInvoker<C> {
    pub fn with_clock(status: InstallStatus, settings: QuiescenceSettings, hooks: Hooks, clock: C) -> Self {
        Self {
            status,
            settings,
            clock,
            hooks,
        }
    }

    fn resolve_paths(&self, target: &Path) -> Result<(PathBuf, PathBuf), ExifError> {
        let state = self.status.get();
        let Some(executable) = state.executable().filter(|path| path.exists()) else {
            self.hooks.log("exiftool is not installed");
            return Err(ExifError::ToolNotInstalled);
        };
        if !target.exists() {
            self.hooks
                .log(format!("target file does not exist: {}", target.display()));
            return Err(ExifError::FileNotFound(target.to_path_buf()));
        }
        Ok((canonical(executable)?, canonical(target)?))
    }

    fn wait_for_quiescence(&self, chunks: &AtomicU64, child: &mut std::process::Child) {
        let mut tracker = QuiescenceTracker::new(self.settings);
        loop {
            self.clock.sleep(tracker.next_wait());
            if tracker.observe(chunks.load(Ordering::SeqCst)) == Quiescence::Quiet {
                tracing::debug!("exiftool output is quiet, releasing process");
                return;
            }
            if matches!(child.try_wait(), Ok(Some(_))) {
                return;
            }
        }
    }
}

impl<C: Clock> ToolInvoker for ProcessInvoker<C> {
    fn invoke(&self, target: &Path, tokens: &[String]) -> Result<InvocationResult, ExifError> {
        let (executable, target_abs) = self.resolve_paths(target)?;
        let tokens: Vec<&String> = tokens.iter().filter(|token| !token.is_empty()).collect();
        self.hooks
            .log(format!("executing: {}", command_line(&executable, &tokens, &target_abs)));

        let mut child = Command::new(&executable)
            .args(&tokens)
            .arg(&target_abs)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| ExifError::Spawn(err.to_string()))?;

        let chunks = Arc::new(AtomicU64::new(0));
        let stdout_reader = child
            .stdout
            .take()
            .map(|stream| spawn_reader(stream, chunks.clone()));
        let stderr_reader = child
            .stderr
            .take()
            .map(|stream| spawn_reader(stream, chunks.clone()));
        let stdin = child.stdin.take();

        self.wait_for_quiescence(&chunks, &mut child);
        release(stdin);

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => self.clock.sleep(self.settings.exit_poll),
                Err(err) => return Err(ExifError::Spawn(err.to_string())),
            }
        };

        let stdout = collect(stdout_reader);
        let stderr = collect(stderr_reader);
        if !stderr.is_empty() {
            self.hooks.log(format!("exiftool stderr: {stderr}"));
        }
        self.hooks.log(format!("exiftool stdout: {stdout}"));
        self.hooks
            .log(format!("exiftool exited with code {:?}", status.code()));

        let result = classify(status.code(), &stdout, &stderr);
        tracing::info!(
            succeeded = result.succeeded,
            kind = ?result.error_kind,
            "exiftool finished"
        );
        Ok(result)
    }
}

/// Renders an invocation for logs. Entries containing whitespace or quotes
/// are wrapped in double quotes; the process itself is spawned from argv.
pub fn command_line<S: AsRef<str>>(executable: &Path, tokens: &[S], target: &Path) -> String {
    let mut parts = Vec::with_capacity(tokens.len() + 2);
    parts.push(format!("\"{}\"", executable.display()));
    parts.extend(tokens.iter().map(|token| display_token(token.as_ref())));
    parts.push(format!("\"{}\"", target.display()));
    parts.join(" ")
}

fn display_token(token: &str) -> String {
    if token.contains(|ch: char| ch.is_whitespace() || ch == '"') {
        format!("\"{}\"", token.replace('"', "\\\""))
    } else {
        token.to_string()
    }
}

fn canonical(path: &Path) -> Result<PathBuf, ExifError> {
    let resolved = fs::canonicalize(path)
        .map_err(|err| ExifError::Filesystem(format!("resolve {}: {err}", path.display())))?;
    Ok(strip_verbatim(resolved))
}

// exiftool does not understand `\\?\` verbatim paths.
fn strip_verbatim(path: PathBuf) -> PathBuf {
    if cfg!(windows) {
        if let Some(rest) = path.to_str().and_then(|value| value.strip_prefix(r"\\?\")) {
            return PathBuf::from(rest);
        }
    }
    path
}

fn spawn_reader(
    mut stream: impl Read + Send + 'static,
    chunks: Arc<AtomicU64>,
) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut collected = Vec::new();
        let mut buffer = [0u8; 4096];
        loop {
            let n = match stream.read(&mut buffer) {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            collected.extend_from_slice(&buffer[..n]);
            chunks.fetch_add(1, Ordering::SeqCst);
        }
        collected
    })
}

fn collect(reader: Option<thread::JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn release(stdin: Option<ChildStdin>) {
    if let Some(mut stdin) = stdin {
        // The process may already be gone; a broken pipe here is expected.
        let _ = stdin.write_all(b"\r\n");
        let _ = stdin.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_is_last_and_paths_are_quoted() {
        let line = command_line(
            Path::new("/opt/exiftool/exiftool"),
            &["-Artist=Jane Doe", "-overwrite_original", "-Title=say \"hi\""],
            Path::new("/photos/a b.jpg"),
        );
        assert_eq!(
            line,
            r#""/opt/exiftool/exiftool" "-Artist=Jane Doe" -overwrite_original "-Title=say \"hi\"" "/photos/a b.jpg""#
        );
    }

    #[test]
    fn not_installed_fails_without_spawning() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("a.jpg");
        std::fs::write(&file, b"").unwrap();
        let invoker = ProcessInvoker::new(
            InstallStatus::default(),
            QuiescenceSettings::default(),
            Hooks::new(),
        );
        let err = invoker.invoke(&file, &[]).unwrap_err();
        assert!(matches!(err, ExifError::ToolNotInstalled));
    }
}
