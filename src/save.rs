//! Local save sink
//!
//! Delivers a finished blob to the user's filesystem. The bytes go into a
//! temporary file next to the destination first and are only moved to the
//! final name once fully written.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::media::MediaBlob;
use crate::utils::error::{AppError, AppResult};

/// Writes a blob under a file name chosen by the caller
pub trait SaveSink: Send + Sync {
    /// Save `blob` as `filename`, returning where it ended up
    fn save(&self, blob: &MediaBlob, filename: &str) -> AppResult<PathBuf>;
}

/// Saves into a fixed directory
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SaveSink for DirectorySink {
    fn save(&self, blob: &MediaBlob, filename: &str) -> AppResult<PathBuf> {
        validate_filename(filename)?;
        fs::create_dir_all(&self.dir)?;

        let destination = self.dir.join(filename);

        // Dropped (and deleted) on any early return
        let mut staged = NamedTempFile::new_in(&self.dir)?;
        staged.write_all(blob.bytes())?;
        staged.flush()?;

        staged
            .persist_noclobber(&destination)
            .map_err(|e| AppError::Save(format!("Failed to save {:?}: {}", destination, e.error)))?;

        tracing::info!(
            "Saved {} ({} bytes, {})",
            destination.display(),
            blob.len(),
            blob.mime()
        );
        Ok(destination)
    }
}

fn validate_filename(filename: &str) -> AppResult<()> {
    let path = Path::new(filename);
    let is_plain = path.file_name().map(|name| name == path.as_os_str()).unwrap_or(false);
    if filename.is_empty() || !is_plain {
        return Err(AppError::Save(format!("Invalid file name: {:?}", filename)));
    }
    Ok(())
}
