use std::path::{Path, PathBuf};

/// Executable names looked up under the working directory, in priority order.
pub const CANDIDATES: [&str; 3] = ["exiftool.exe", "exiftool", "exiftool(-k).exe"];

#[derive(Debug, Clone)]
pub struct ToolLocator {
    working_dir: PathBuf,
}

impl ToolLocator {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn locate(&self) -> Option<PathBuf> {
        CANDIDATES
            .iter()
            .map(|name| self.working_dir.join(name))
            .find(|path| path.is_file())
    }
}
