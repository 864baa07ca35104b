//! Error handling for the vdesk CLI.

use std::{io, result};

use thiserror::Error;
use vdesk_core::{ConfigError, WaitError};

/// Result type for CLI operations.
pub type Result<T> = result::Result<T, Error>;

/// Errors surfaced to the user.
#[derive(Debug, Error)]
pub enum Error {
    /// A desktop operation failed.
    #[error("{0}")]
    Shell(#[from] vdesk_core::Error),
    /// The configuration file could not be used.
    #[error("{0}")]
    Config(#[from] ConfigError),
    /// A bounded wait did not complete.
    #[error("{0}")]
    Wait(#[from] WaitError),
    /// JSON output failed.
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    /// Runtime setup or output failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
