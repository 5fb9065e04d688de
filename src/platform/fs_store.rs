use std::{fs::{self, OpenOptions}, path::{Path, PathBuf}};

use tracing::debug;

use super::{MediaStore, OutputTarget, PlatformError};

/// A [`MediaStore`] that keeps each video as a file in one directory
#[derive(Debug, Clone)]
pub struct FsMediaStore {
    root: PathBuf,
}

impl FsMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl MediaStore for FsMediaStore {
    fn create_video(&self, display_name: &str) -> Result<OutputTarget, PlatformError> {
        if display_name.is_empty() || display_name.contains(['/', '\\']) {
            return Err(PlatformError::Other(format!("invalid display name \"{}\"", display_name)));
        }
        fs::create_dir_all(&self.root)?;
        let path = self.root.join(display_name);
        // create_new: an existing entry with the same name is never truncated
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        debug!(path = %path.display(), "created media entry");
        Ok(OutputTarget::new(display_name, Box::new(file)).with_location(path))
    }
}
