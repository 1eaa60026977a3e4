//! Configuration file.
//!
//! ```json
//! {
//!   "pocketbase": { "url": "https://trails.example.org", "admin_email": "...", "admin_password": "..." },
//!   "min_distance_meters": { "Hiking": 20.0, "Cycling": 50.0 },
//!   "min_size_kb": 50,
//!   "max_retained_percent": 70,
//!   "comments": { "user": "trailbot", "content": "This track was reduced in size." },
//!   "state_path": "state.json",
//!   "backup_dir": "backups"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{OptionExt, ReduxError, Result};
use crate::policy::ReductionPolicy;
use crate::tolerance::ToleranceTable;

/// Environment variable overriding `pocketbase.admin_password`.
pub const PASSWORD_ENV: &str = "TRAIL_REDUX_ADMIN_PASSWORD";

/// Backend connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PocketBaseConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub admin_email: String,
    #[serde(default)]
    pub admin_password: String,
}

/// Notification comment settings; either half missing disables comments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommentsConfig {
    /// Display name of the local actor that posts the comment
    pub user: Option<String>,
    /// Comment text, wrapped in a paragraph when posted
    pub content: Option<String>,
}

impl CommentsConfig {
    /// `(author name, text)` when both are configured.
    pub fn pair(&self) -> Option<(&str, &str)> {
        match (self.user.as_deref(), self.content.as_deref()) {
            (Some(user), Some(content)) if !user.is_empty() && !content.is_empty() => {
                Some((user, content))
            }
            _ => None,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub pocketbase: PocketBaseConfig,
    /// Category name -> minimum distance in meters
    #[serde(default)]
    pub min_distance_meters: ToleranceTable,
    /// Files smaller than this many kilobytes (1024 bytes) are left alone
    #[serde(default)]
    pub min_size_kb: u64,
    /// Largest accepted reduced size, as a percentage of the original
    #[serde(default = "default_max_retained_percent")]
    pub max_retained_percent: u64,
    #[serde(default)]
    pub comments: CommentsConfig,
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
}

fn default_max_retained_percent() -> u64 {
    70
}

fn default_state_path() -> PathBuf {
    PathBuf::from("state.json")
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}

impl AppConfig {
    /// Read, apply environment overrides, and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| ReduxError::ConfigurationMissing {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        let mut config = Self::from_json(&data)?;
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            config.pocketbase.admin_password = password;
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating.
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| ReduxError::ConfigurationMissing {
            message: format!("invalid configuration: {}", e),
        })
    }

    /// Check that everything a run needs is present.
    pub fn validate(&self) -> Result<()> {
        non_empty(&self.pocketbase.url).ok_or_missing_config("pocketbase.url")?;
        non_empty(&self.pocketbase.admin_email).ok_or_missing_config("pocketbase.admin_email")?;
        non_empty(&self.pocketbase.admin_password)
            .ok_or_missing_config("pocketbase.admin_password")?;

        if self.min_distance_meters.is_empty() {
            return Err(ReduxError::ConfigurationMissing {
                message: "min_distance_meters has no categories".to_string(),
            });
        }
        let invalid = self.min_distance_meters.invalid_entries();
        if !invalid.is_empty() {
            return Err(ReduxError::ConfigurationMissing {
                message: format!("invalid min_distance_meters for {}", invalid.join(", ")),
            });
        }

        if self.comments.pair().is_none()
            && (self.comments.user.is_some() || self.comments.content.is_some())
        {
            warn!("[Config] comments.user and comments.content must both be set, comments disabled");
        }
        Ok(())
    }

    pub fn policy(&self) -> ReductionPolicy {
        ReductionPolicy {
            min_size_bytes: self.min_size_kb.saturating_mul(1024),
            max_retained_percent: self.max_retained_percent,
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    Some(s.trim()).filter(|s| !s.is_empty())
}
