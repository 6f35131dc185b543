use std::fs;
use std::io::{self, BufReader, Write};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tempfile::NamedTempFile;
use zip::ZipArchive;

use crate::error::ExifError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
}

impl ArchiveKind {
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else {
            None
        }
    }
}

pub fn extract_archive(archive: &Path, target_dir: &Path) -> Result<(), ExifError> {
    match ArchiveKind::detect(archive) {
        Some(ArchiveKind::Zip) => extract_zip(archive, target_dir),
        Some(ArchiveKind::TarGz) => extract_tar_gz(archive, target_dir),
        None => Err(ExifError::Filesystem(format!(
            "unsupported archive format: {}",
            archive.display()
        ))),
    }
}

pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<(), ExifError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| ExifError::Filesystem(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| ExifError::Filesystem(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| ExifError::Filesystem(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(ExifError::Filesystem(
                    "zip entry path traversal detected".to_string(),
                ));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| ExifError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| ExifError::Filesystem(err.to_string()))?;
        }
        let mut outfile =
            fs::File::create(&entry_path).map_err(|err| ExifError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| ExifError::Filesystem(err.to_string()))?;
    }
    Ok(())
}

/// Unpacks a gzipped tarball, dropping the leading `Image-ExifTool-x.y/`
/// directory so the script lands directly in `target_dir`.
pub fn extract_tar_gz(archive_path: &Path, target_dir: &Path) -> Result<(), ExifError> {
    let file = fs::File::open(archive_path).map_err(|err| {
        ExifError::Filesystem(format!("open tarball {}: {err}", archive_path.display()))
    })?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    let entries = archive
        .entries()
        .map_err(|err| ExifError::Filesystem(err.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|err| ExifError::Filesystem(err.to_string()))?;
        let path = entry
            .path()
            .map_err(|err| ExifError::Filesystem(err.to_string()))?
            .into_owned();
        let Some(relative) = strip_top_level(&path) else {
            continue;
        };
        let destination = target_dir.join(relative);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|err| ExifError::Filesystem(err.to_string()))?;
        }
        entry
            .unpack(&destination)
            .map_err(|err| ExifError::Filesystem(format!("extract {}: {err}", path.display())))?;
    }
    Ok(())
}

fn strip_top_level(path: &Path) -> Option<PathBuf> {
    let mut components = path.components();
    components.next()?;
    let mut stripped = PathBuf::new();
    for component in components {
        match component {
            Component::Normal(part) => stripped.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if stripped.as_os_str().is_empty() {
        None
    } else {
        Some(stripped)
    }
}

#[cfg(unix)]
pub fn make_executable(path: &Path) -> Result<(), ExifError> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)
        .map_err(|err| ExifError::Filesystem(err.to_string()))?
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).map_err(|err| ExifError::Filesystem(err.to_string()))
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> Result<(), ExifError> {
    Ok(())
}

/// Writes `value` as tab-indented JSON, replacing `destination` atomically.
pub fn write_json_tabbed<T: Serialize>(value: &T, destination: &Path) -> Result<(), ExifError> {
    let dir = destination
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|err| ExifError::Filesystem(err.to_string()))?;

    let mut buffer = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"\t"));
    value
        .serialize(&mut serializer)
        .map_err(|err| ExifError::Filesystem(err.to_string()))?;

    let mut temp =
        NamedTempFile::new_in(dir).map_err(|err| ExifError::Filesystem(err.to_string()))?;
    temp.write_all(&buffer)
        .map_err(|err| ExifError::Filesystem(err.to_string()))?;
    temp.persist(destination)
        .map_err(|err| ExifError::Filesystem(err.to_string()))?;
    Ok(())
}
