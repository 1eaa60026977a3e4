//! # Pipeline State
//!
//! Checkpoint (`last_checked`) and append-only run history.
//!
//! The state is a plain value: the orchestrator owns it for the duration of a
//! run and hands back a successor from [`PipelineState::record_run`]. The
//! [`StateStore`] reads it in full at start and replaces it in full at the end,
//! writing to a temporary sibling file and renaming it over the old snapshot so
//! a crash never leaves a half-written file behind.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{ReduxError, Result};

/// Summary of one completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Run start time
    pub timestamp: DateTime<Utc>,
    pub files_changed: u64,
    pub bytes_saved: u64,
}

/// Durable checkpoint plus run history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    /// Trails created/updated before this instant are not reconsidered.
    /// `None` means every trail is a candidate.
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default)]
    pub runs: Vec<RunRecord>,
}

impl PipelineState {
    /// Append a run and advance the checkpoint to the run's start time.
    pub fn record_run(mut self, record: RunRecord) -> Self {
        self.last_checked = Some(record.timestamp);
        self.runs.push(record);
        self
    }
}

/// JSON file holding the [`PipelineState`] snapshot.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot; a missing file yields the empty default state.
    pub fn load(&self) -> Result<PipelineState> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(
                    "[State] No state at {}, processing all trails",
                    self.path.display()
                );
                return Ok(PipelineState::default());
            }
            Err(e) => return Err(persistence_error(&self.path, e)),
        };

        let state: PipelineState =
            serde_json::from_slice(&data).map_err(|e| persistence_error(&self.path, e))?;
        debug!(
            "[State] Loaded {} (last checked: {:?}, {} runs)",
            self.path.display(),
            state.last_checked,
            state.runs.len()
        );
        Ok(state)
    }

    /// Replace the snapshot atomically.
    pub fn persist(&self, state: &PipelineState) -> Result<()> {
        let json =
            serde_json::to_vec_pretty(state).map_err(|e| persistence_error(&self.path, e))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| persistence_error(parent, e))?;
        }

        let tmp = self.tmp_path();
        fs::write(&tmp, json).map_err(|e| persistence_error(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| persistence_error(&self.path, e))?;

        debug!("[State] Persisted {}", self.path.display());
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn persistence_error(path: &Path, e: impl std::fmt::Display) -> ReduxError {
    ReduxError::StatePersistence {
        message: format!("{}: {}", path.display(), e),
    }
}
