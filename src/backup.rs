//! Dated backup copies of replaced trail files.
//!
//! Layout, for a run on 2024-06-01:
//!
//! ```text
//! backups/2024-06-01/<name>_<id>.gpx          original download
//! backups/2024-06-01/smaller/<name>_<id>.gpx  reduced file that was uploaded
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::debug;

use crate::error::{ReduxError, Result};
use crate::model::Trail;

const REDUCED_DIR: &str = "smaller";

/// Writes original and reduced copies under a per-day directory.
#[derive(Debug, Clone)]
pub struct BackupWriter {
    day_dir: PathBuf,
}

impl BackupWriter {
    /// Backups for a run started at `run_start` go under `root/YYYY-MM-DD`.
    pub fn new(root: impl AsRef<Path>, run_start: DateTime<Utc>) -> Self {
        Self {
            day_dir: root
                .as_ref()
                .join(run_start.format("%Y-%m-%d").to_string()),
        }
    }

    /// File name used for a trail's backups.
    pub fn file_name(trail: &Trail) -> String {
        let name = if trail.name.trim().is_empty() {
            "trail"
        } else {
            trail.name.trim()
        };
        format!("{}_{}.gpx", sanitize_file_name(name), sanitize_file_name(&trail.id))
    }

    /// Store the original and reduced bytes; returns both paths.
    pub fn write(&self, trail: &Trail, original: &[u8], reduced: &[u8]) -> Result<(PathBuf, PathBuf)> {
        let file_name = Self::file_name(trail);
        let reduced_dir = self.day_dir.join(REDUCED_DIR);
        fs::create_dir_all(&reduced_dir).map_err(|e| backup_error(&reduced_dir, e))?;

        let original_path = self.day_dir.join(&file_name);
        fs::write(&original_path, original).map_err(|e| backup_error(&original_path, e))?;
        debug!("[Backup] Saved original to {}", original_path.display());

        let reduced_path = reduced_dir.join(&file_name);
        fs::write(&reduced_path, reduced).map_err(|e| backup_error(&reduced_path, e))?;
        debug!("[Backup] Saved reduced copy to {}", reduced_path.display());

        Ok((original_path, reduced_path))
    }
}

/// Replace characters that are invalid in file names on common platforms.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

fn backup_error(path: &Path, e: std::io::Error) -> ReduxError {
    ReduxError::Backup {
        message: format!("{}: {}", path.display(), e),
    }
}
