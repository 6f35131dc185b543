use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ExifError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum InstallState {
    Uninstalled,
    Installing,
    Installed { executable: PathBuf },
}

impl InstallState {
    pub fn executable(&self) -> Option<&Path> {
        match self {
            InstallState::Installed { executable } => Some(executable.as_path()),
            _ => None,
        }
    }

    pub fn is_installed(&self) -> bool {
        matches!(self, InstallState::Installed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InvocationErrorKind {
    FileNotFound,
    TagNotWritable,
    NoWritableTags,
    NothingToDo,
    CantCreateBackupFile,
    UnknownError,
}

impl fmt::Display for InvocationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            InvocationErrorKind::FileNotFound => "File not found",
            InvocationErrorKind::TagNotWritable => "Tag not writable",
            InvocationErrorKind::NoWritableTags => "No writable tags set",
            InvocationErrorKind::NothingToDo => "Nothing to do",
            InvocationErrorKind::CantCreateBackupFile => "Can't create backup file",
            InvocationErrorKind::UnknownError => "Unknown error",
        };
        f.write_str(text)
    }
}

/// Outcome of a single exiftool run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationResult {
    pub succeeded: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub error_kind: Option<InvocationErrorKind>,
    pub payload: Option<serde_json::Value>,
}

impl InvocationResult {
    pub fn into_result(self, target: &Path) -> Result<InvocationResult, ExifError> {
        if self.succeeded {
            return Ok(self);
        }
        let kind = self.error_kind.unwrap_or(InvocationErrorKind::UnknownError);
        Err(ExifError::from_kind(kind, self.exit_code, target))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldOutcome {
    pub field: String,
    pub value: String,
    pub succeeded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "fields", rename_all = "snake_case")]
pub enum WriteOutcome {
    AllSucceeded,
    PartialResult(Vec<FieldOutcome>),
}

impl WriteOutcome {
    /// Per-field success; the last attempt wins when a field was written twice.
    pub fn field_map(&self) -> BTreeMap<String, bool> {
        match self {
            WriteOutcome::AllSucceeded => BTreeMap::new(),
            WriteOutcome::PartialResult(fields) => fields
                .iter()
                .map(|outcome| (outcome.field.clone(), outcome.succeeded))
                .collect(),
        }
    }

    pub fn field(&self, name: &str) -> Option<bool> {
        match self {
            WriteOutcome::AllSucceeded => None,
            WriteOutcome::PartialResult(fields) => fields
                .iter()
                .rev()
                .find(|outcome| outcome.field == name)
                .map(|outcome| outcome.succeeded),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    pub file_type: String,
    pub field_name: String,
    pub writable: bool,
    #[serde(default)]
    pub allowed_values: Option<String>,
}

/// Normalizes a file extension to the file type key used by the tag directory.
pub fn file_ext_mutex(ext: &str) -> String {
    let upper = ext.trim().trim_start_matches('.').to_uppercase();
    match upper.as_str() {
        "JPG" => "JPEG".to_string(),
        _ => upper,
    }
}

pub fn file_type_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|value| value.to_str())
        .map(file_ext_mutex)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Other(String),
}

impl Platform {
    pub fn current() -> Self {
        std::env::consts::OS.parse().unwrap_or_else(|_| Platform::Other(String::new()))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Windows => write!(f, "windows"),
            Platform::MacOs => write!(f, "macos"),
            Platform::Other(name) => write!(f, "{name}"),
        }
    }
}

impl FromStr for Platform {
    type Err = ExifError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value.trim() {
            "windows" | "win32" => Platform::Windows,
            "macos" | "darwin" => Platform::MacOs,
            other => Platform::Other(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn ext_normalization() {
        assert_eq!(file_ext_mutex("jpg"), "JPEG");
        assert_eq!(file_ext_mutex("JPG"), "JPEG");
        assert_eq!(file_ext_mutex("png"), "PNG");
        assert_eq!(file_ext_mutex(".tif"), "TIF");
        assert_eq!(file_type_of(Path::new("a/b/photo.Jpg")).as_deref(), Some("JPEG"));
        assert_eq!(file_type_of(Path::new("noext")), None);
    }

    #[test]
    fn platform_from_os() {
        assert_eq!("darwin".parse::<Platform>().unwrap(), Platform::MacOs);
        assert_eq!("windows".parse::<Platform>().unwrap(), Platform::Windows);
        assert_matches!("linux".parse::<Platform>().unwrap(), Platform::Other(_));
    }

    #[test]
    fn failed_result_maps_kind() {
        let result = InvocationResult {
            succeeded: false,
            exit_code: Some(1),
            stdout: String::new(),
            stderr: String::new(),
            error_kind: Some(InvocationErrorKind::NothingToDo),
            payload: None,
        };
        let err = result.into_result(Path::new("x.jpg")).unwrap_err();
        assert_matches!(err, ExifError::NothingToDo);
    }

    #[test]
    fn partial_outcome_lookup() {
        let outcome = WriteOutcome::PartialResult(vec![
            FieldOutcome {
                field: "Artist".to_string(),
                value: "A".to_string(),
                succeeded: true,
            },
            FieldOutcome {
                field: "Bogus".to_string(),
                value: "B".to_string(),
                succeeded: false,
            },
        ]);
        assert_eq!(outcome.field("Artist"), Some(true));
        assert_eq!(outcome.field("Bogus"), Some(false));
        assert_eq!(outcome.field_map().len(), 2);
    }
}
