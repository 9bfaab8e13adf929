//! Error types and result aliases

use std::path::PathBuf;
use thiserror::Error;

/// Result type for settings document operations
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Failures reading or rewriting the persisted settings document
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings document not found: {0}")]
    DocumentMissing(PathBuf),

    /// Document has no `settings` root element
    #[error("settings document has no <settings> root")]
    MissingRoot,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML escape error: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),
}

/// Failures talking to the NextPVR backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Status(u16),

    #[error("Read failed: {0}")]
    Body(String),

    #[error("Invalid response: {0}")]
    Parse(String),
}

impl From<ureq::Error> for BackendError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => BackendError::Status(code),
            other => BackendError::Transport(other.to_string()),
        }
    }
}
