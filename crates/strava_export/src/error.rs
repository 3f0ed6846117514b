//! Error types for the export pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Export errors.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("API error: {0}")]
    Api(#[from] strava_client::StravaError),

    #[error("Authorization failed: {0}")]
    Auth(String),

    #[error("Output file already exists: {}", .0.display())]
    OutputExists(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for export operations.
pub type ExportResult<T> = Result<T, ExportError>;
