use std::path::PathBuf;
use std::time::Duration;

use assert_matches::assert_matches;

use exiftool_runner::config::{ConfigLoader, QuiescenceSettings};
use exiftool_runner::domain::Platform;
use exiftool_runner::error::ExifError;

fn write_config(content: &str) -> (tempfile::TempDir, String) {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("exiftool-runner.json");
    std::fs::write(&path, content).unwrap();
    let path = path.to_string_lossy().into_owned();
    (temp, path)
}

#[test]
fn file_overrides_defaults() {
    let (_temp, path) = write_config(
        r#"{
            "working_dir": "/opt/exiftool",
            "download": { "windows_url": "https://mirror.example/et.zip", "retries": 5 },
            "invocation": { "tick_ms": 250, "quiet_ticks": 3 }
        }"#,
    );

    let resolved = ConfigLoader::resolve(Some(&path)).unwrap();

    assert_eq!(resolved.working_dir, PathBuf::from("/opt/exiftool"));
    assert_eq!(
        resolved.download.url_for(&Platform::Windows).unwrap(),
        "https://mirror.example/et.zip"
    );
    assert_eq!(
        resolved.download.url_for(&Platform::MacOs).unwrap(),
        "https://exiftool.org/Image-ExifTool-12.67.tar.gz"
    );
    assert_eq!(resolved.download.retries, 5);
    assert_eq!(resolved.quiescence.tick, Duration::from_millis(250));
    assert_eq!(resolved.quiescence.quiet_ticks, 3);
    assert_eq!(resolved.quiescence.grace, QuiescenceSettings::default().grace);
}

#[test]
fn empty_object_is_all_defaults() {
    let (_temp, path) = write_config("{}");

    let resolved = ConfigLoader::resolve(Some(&path)).unwrap();

    assert_eq!(resolved.working_dir, PathBuf::from("./exiftool"));
    assert_eq!(resolved.quiescence, QuiescenceSettings::default());
    assert_eq!(resolved.download.timeout, Duration::from_secs(300));
}

#[test]
fn zero_tick_is_rejected() {
    let (_temp, path) = write_config(r#"{ "invocation": { "tick_ms": 0 } }"#);

    let err = ConfigLoader::resolve(Some(&path)).unwrap_err();

    assert_matches!(err, ExifError::ConfigParse(message) if message.contains("tick_ms"));
}

#[test]
fn zero_timeout_is_rejected() {
    let (_temp, path) = write_config(r#"{ "download": { "timeout_secs": 0 } }"#);

    assert_matches!(
        ConfigLoader::resolve(Some(&path)),
        Err(ExifError::ConfigParse(_))
    );
}

#[test]
fn malformed_json_is_parse_error() {
    let (_temp, path) = write_config("{ working_dir: ");

    assert_matches!(
        ConfigLoader::resolve(Some(&path)),
        Err(ExifError::ConfigParse(_))
    );
}

#[test]
fn explicit_missing_file_is_read_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("nope.json");

    let err = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap_err();

    assert_matches!(err, ExifError::ConfigRead(missing) if missing == path);
}
