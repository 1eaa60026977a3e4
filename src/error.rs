//! Unified error handling for the trail reduction pipeline.
//!
//! Errors are split by how far they may travel: configuration, state and
//! listing failures abort a run, while everything raised while processing a
//! single trail is caught at the trail boundary and turned into a skip.

use thiserror::Error;

/// Unified error type for trail-redux operations.
#[derive(Debug, Clone, Error)]
pub enum ReduxError {
    /// Required configuration (backend credentials, tolerance table) is absent
    #[error("Configuration missing: {message}")]
    ConfigurationMissing { message: String },

    /// Backend could not be reached or answered with a failure status
    #[error("{}", format_backend(.message, .status_code))]
    BackendUnavailable {
        message: String,
        status_code: Option<u16>,
    },

    /// Track payload could not be parsed or re-serialized as GPX
    #[error("Malformed track file: {message}")]
    MalformedTrackFile { message: String },

    /// The trail's category has no minimum distance configured
    #[error("No minimum distance configured for category '{category}'")]
    ToleranceNotConfigured { category: String },

    /// Pipeline state could not be read or written
    #[error("State persistence error: {message}")]
    StatePersistence { message: String },

    /// Backup copy could not be written
    #[error("Backup error: {message}")]
    Backup { message: String },
}

fn format_backend(message: &str, status_code: &Option<u16>) -> String {
    match status_code {
        Some(code) => format!("Backend unavailable ({}): {}", code, message),
        None => format!("Backend unavailable: {}", message),
    }
}

impl ReduxError {
    pub(crate) fn backend(message: impl Into<String>) -> Self {
        ReduxError::BackendUnavailable {
            message: message.into(),
            status_code: None,
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        ReduxError::MalformedTrackFile {
            message: message.into(),
        }
    }
}

/// Result type alias for trail-redux operations.
pub type Result<T> = std::result::Result<T, ReduxError>;

/// Extension trait for converting Option to ReduxError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a configuration-missing error.
    fn ok_or_missing_config(self, what: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_missing_config(self, what: &str) -> Result<T> {
        self.ok_or_else(|| ReduxError::ConfigurationMissing {
            message: format!("{} is not set", what),
        })
    }
}
