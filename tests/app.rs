use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;

use exiftool_runner::app::App;
use exiftool_runner::args::MetadataInput;
use exiftool_runner::classify::classify;
use exiftool_runner::config::DownloadSettings;
use exiftool_runner::domain::{InstallState, InvocationResult, Platform, TagRecord, WriteOutcome};
use exiftool_runner::error::ExifError;
use exiftool_runner::fetcher::ArchiveFetcher;
use exiftool_runner::hooks::Hooks;
use exiftool_runner::installer::{InstallStatus, Installer};
use exiftool_runner::invoker::ToolInvoker;
use exiftool_runner::tags::TagDirectory;

/// Replies to every call with the same exiftool output.
struct CannedInvoker {
    stdout: &'static str,
    stderr: &'static str,
    calls: Mutex<Vec<Vec<String>>>,
}

impl CannedInvoker {
    fn new(stdout: &'static str, stderr: &'static str) -> Self {
        Self {
            stdout,
            stderr,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl ToolInvoker for CannedInvoker {
    fn invoke(&self, _target: &Path, tokens: &[String]) -> Result<InvocationResult, ExifError> {
        self.calls.lock().unwrap().push(tokens.to_vec());
        Ok(classify(Some(0), self.stdout, self.stderr))
    }
}

struct OneTagDirectory;

impl TagDirectory for OneTagDirectory {
    fn is_cached(&self) -> bool {
        false
    }

    fn load(&self) -> Result<Vec<TagRecord>, ExifError> {
        Ok(Vec::new())
    }

    fn build(&self) -> Result<Vec<TagRecord>, ExifError> {
        Ok(vec![TagRecord {
            file_type: "JPEG".to_string(),
            field_name: "Artist".to_string(),
            writable: true,
            allowed_values: None,
        }])
    }

    fn save(&self, _records: &[TagRecord]) -> Result<bool, ExifError> {
        Ok(true)
    }
}

struct NoDownload;

impl ArchiveFetcher for NoDownload {
    fn fetch_and_extract(
        &self,
        _url: Option<&str>,
        _archive: &Path,
        _extract_to: &Path,
    ) -> Result<bool, ExifError> {
        Ok(false)
    }
}

fn app(
    working_dir: &Path,
    invoker: CannedInvoker,
) -> App<CannedInvoker, OneTagDirectory, NoDownload> {
    let hooks = Hooks::new();
    let installer = Installer::new(
        working_dir,
        NoDownload,
        DownloadSettings::default(),
        InstallStatus::default(),
        hooks.clone(),
    )
    .with_platform(Platform::Windows);
    App::new(hooks, invoker, OneTagDirectory, installer)
}

#[test]
fn background_install_finds_existing_tool() {
    let temp = tempfile::tempdir().unwrap();
    std::fs::write(temp.path().join("exiftool.exe"), b"").unwrap();
    let app = app(temp.path(), CannedInvoker::new("", ""));

    assert!(app.start_install());
    assert!(!app.start_install());
    let state = app.wait_for_install().unwrap();

    assert!(state.executable().unwrap().ends_with("exiftool.exe"));
    assert_eq!(app.install_state(), state);
}

#[test]
fn failed_download_is_reported_and_degrades() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(temp.path(), CannedInvoker::new("", ""));
    let log = std::sync::Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    app.set_logger(move |message| sink.lock().unwrap().push(message.to_string()));

    app.start_install();
    let err = app.wait_for_install().unwrap_err();

    assert_matches!(err, ExifError::InstallationFailed(_));
    assert_eq!(app.install_state(), InstallState::Uninstalled);
    assert!(
        log.lock()
            .unwrap()
            .iter()
            .any(|message| message.starts_with("error installing exiftool"))
    );
}

#[test]
fn wait_without_install_returns_current_state() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(temp.path(), CannedInvoker::new("", ""));

    assert_eq!(app.wait_for_install().unwrap(), InstallState::Uninstalled);
}

#[test]
fn get_metadata_returns_json_payload() {
    let temp = tempfile::tempdir().unwrap();
    let invoker = CannedInvoker::new(r#"[{"SourceFile": "a.jpg", "Artist": "Jane"}]"#, "");
    let app = app(temp.path(), invoker);

    let payload = app.get_metadata("a.jpg").unwrap();

    assert_eq!(payload[0]["Artist"], "Jane");
}

#[test]
fn get_metadata_without_json_is_unknown_error() {
    let temp = tempfile::tempdir().unwrap();
    let invoker = CannedInvoker::new("ExifTool Version Number : 12.67\n", "");
    let app = app(temp.path(), invoker);

    assert_matches!(
        app.get_metadata("a.jpg"),
        Err(ExifError::UnknownError { exit_code: Some(0) })
    );
}

#[test]
fn self_test_maps_failure_kind_to_error() {
    let temp = tempfile::tempdir().unwrap();
    let invoker = CannedInvoker::new("", "Error: File not found - a.jpg\n");
    let app = app(temp.path(), invoker);

    assert_matches!(
        app.self_test("a.jpg"),
        Err(ExifError::FileNotFound(path)) if path.ends_with("a.jpg")
    );
}

#[test]
fn verified_set_metadata_builds_tag_directory() {
    let temp = tempfile::tempdir().unwrap();
    let invoker = CannedInvoker::new("    1 image files updated\n", "");
    let app = app(temp.path(), invoker);

    let outcome = app
        .set_metadata("b.jpg", true, true, MetadataInput::map([("Artist", "Jane")]))
        .unwrap();
    assert_eq!(outcome, WriteOutcome::AllSucceeded);

    let err = app
        .set_metadata("b.jpg", true, true, MetadataInput::map([("Bogus", "x")]))
        .unwrap_err();
    assert_matches!(err, ExifError::TagVerificationFailed { .. });
}

/// Takes a while, then leaves `exiftool.exe` in the extract directory.
struct SlowFetcher;

impl ArchiveFetcher for SlowFetcher {
    fn fetch_and_extract(
        &self,
        _url: Option<&str>,
        _archive: &Path,
        extract_to: &Path,
    ) -> Result<bool, ExifError> {
        std::thread::sleep(std::time::Duration::from_millis(200));
        std::fs::write(extract_to.join("exiftool.exe"), b"").unwrap();
        Ok(true)
    }
}

#[test]
fn reinstall_waits_for_running_install() {
    let temp = tempfile::tempdir().unwrap();
    let hooks = Hooks::new();
    let installer = Installer::new(
        temp.path(),
        SlowFetcher,
        DownloadSettings::default(),
        InstallStatus::default(),
        hooks.clone(),
    )
    .with_platform(Platform::Windows);
    let app = App::new(hooks, CannedInvoker::new("", ""), OneTagDirectory, installer);

    app.start_install();
    app.reinstall();
    let state = app.wait_for_install().unwrap();

    assert!(state.is_installed());
    assert_eq!(app.install_state(), state);
}
