//! Interpretation of exiftool's text output.
//!
//! exiftool only distinguishes success and failure through its exit status, so
//! the reason for a failure is recovered from well-known phrases it prints.
//! Rules are evaluated in a fixed order and the first match wins.

use crate::domain::{InvocationErrorKind, InvocationResult};

pub const VERSION_BANNER: &str = "ExifTool Version Number";
pub const FILE_NOT_FOUND: &str = "File not found";
pub const NO_WRITABLE_TAGS: &str = "No writable tags set";
pub const NOTHING_TO_DO: &str = "Nothing to do";
pub const CANT_CREATE_BACKUP: &str = "Can't create backup file";
pub const TAG_WARNING: &str = "Warning: Tag '";
pub const FILES_UPDATED: &str = "image files updated";

enum Verdict {
    Success(Option<serde_json::Value>),
    Failure(InvocationErrorKind),
}

pub fn classify(exit_code: Option<i32>, stdout: &str, stderr: &str) -> InvocationResult {
    let verdict = match_rules(stdout, stderr);
    let exited_cleanly = exit_code == Some(0);

    let (succeeded, error_kind, payload) = match verdict {
        Verdict::Success(payload) if exited_cleanly => (true, None, payload),
        Verdict::Success(payload) => (false, Some(InvocationErrorKind::UnknownError), payload),
        Verdict::Failure(kind) => (false, Some(kind), None),
    };

    InvocationResult {
        succeeded,
        exit_code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        error_kind,
        payload,
    }
}

fn match_rules(stdout: &str, stderr: &str) -> Verdict {
    if let Some(payload) = parse_payload(stdout) {
        return Verdict::Success(Some(payload));
    }
    if stdout.contains(VERSION_BANNER) {
        return Verdict::Success(None);
    }
    if stderr.contains(FILE_NOT_FOUND) {
        return Verdict::Failure(InvocationErrorKind::FileNotFound);
    }
    if stderr.contains(NO_WRITABLE_TAGS) {
        return Verdict::Failure(InvocationErrorKind::NoWritableTags);
    }
    if stdout.contains(NOTHING_TO_DO) {
        return Verdict::Failure(InvocationErrorKind::NothingToDo);
    }
    if stderr.contains(CANT_CREATE_BACKUP) {
        return Verdict::Failure(InvocationErrorKind::CantCreateBackupFile);
    }
    if stderr.contains(TAG_WARNING) {
        return Verdict::Failure(InvocationErrorKind::TagNotWritable);
    }
    if stdout.contains(FILES_UPDATED) {
        return Verdict::Success(None);
    }
    Verdict::Failure(InvocationErrorKind::UnknownError)
}

/// Only objects and arrays count; a bare number or string on stdout is just text.
fn parse_payload(stdout: &str) -> Option<serde_json::Value> {
    let trimmed = stdout.trim();
    if !(trimmed.starts_with('[') || trimmed.starts_with('{')) {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}
