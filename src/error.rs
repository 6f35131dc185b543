use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::InvocationErrorKind;

#[derive(Debug, Error, Diagnostic)]
pub enum ExifError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("tag not writable for this file format")]
    TagNotWritable,

    #[error("exiftool not installed")]
    #[diagnostic(help("run `exiftool-runner install` or wait for the background install"))]
    ToolNotInstalled,

    #[error("no writable tags set")]
    NoWritableTags,

    #[error("nothing to do")]
    NothingToDo,

    #[error("can't create backup file")]
    CantCreateBackupFile,

    #[error("unknown error from exiftool (exit code {exit_code:?})")]
    UnknownError { exit_code: Option<i32> },

    #[error("failed to write exif data: every field was rejected ({})", fields.join(", "))]
    FailedWriteExif { fields: Vec<String> },

    #[error("tag verification failed for {field} on {file_type}: {reason}")]
    TagVerificationFailed {
        field: String,
        file_type: String,
        reason: String,
    },

    #[error("platform not supported for exiftool download: {0}")]
    UnsupportedPlatform(String),

    #[error("exiftool installation failed: {0}")]
    InstallationFailed(String),

    #[error("failed to spawn exiftool: {0}")]
    Spawn(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("server returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("failed to read exiftool tag table: {0}")]
    TagTable(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl ExifError {
    /// Maps a classified tool failure onto the crate error.
    pub fn from_kind(kind: InvocationErrorKind, exit_code: Option<i32>, target: &Path) -> Self {
        match kind {
            InvocationErrorKind::FileNotFound => ExifError::FileNotFound(target.to_path_buf()),
            InvocationErrorKind::TagNotWritable => ExifError::TagNotWritable,
            InvocationErrorKind::NoWritableTags => ExifError::NoWritableTags,
            InvocationErrorKind::NothingToDo => ExifError::NothingToDo,
            InvocationErrorKind::CantCreateBackupFile => ExifError::CantCreateBackupFile,
            InvocationErrorKind::UnknownError => ExifError::UnknownError { exit_code },
        }
    }
}
