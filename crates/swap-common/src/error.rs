//! Error types for SWAP.
//!
//! Every error carries a stable numeric code and a category so the CLI can
//! map failures onto exit codes and agents can group them:
//!
//! ```text
//! 10-19  configuration
//! 20-29  ingestion
//! 30-39  inference
//! 50-59  persistence
//! 60-69  I/O and serialization
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for SWAP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration file errors.
    Config,
    /// Classification and gold ingestion errors.
    Ingest,
    /// Scoring and EM errors.
    Inference,
    /// Estimator snapshot errors.
    Store,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Ingest => write!(f, "ingest"),
            ErrorCategory::Inference => write!(f, "inference"),
            ErrorCategory::Store => write!(f, "store"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for SWAP.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("config file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    // Ingestion errors (20-29)
    #[error("ingestion failed: {0}")]
    Ingest(String),

    #[error("malformed classification record: {0}")]
    MalformedRecord(String),

    #[error("invalid gold label {value} for subject {subject}")]
    InvalidGold { subject: String, value: String },

    // Inference errors (30-39)
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("numerical instability detected: {0}")]
    NumericalInstability(String),

    // Persistence errors (50-59)
    #[error("estimator store error: {0}")]
    Store(String),

    #[error("estimator snapshot corrupted: {0}")]
    SnapshotCorrupted(String),

    #[error("snapshot schema mismatch: expected {expected}, got {actual}")]
    SchemaMismatch { expected: String, actual: String },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidConfig(_) => 11,
            Error::ConfigNotFound { .. } => 12,
            Error::Ingest(_) => 20,
            Error::MalformedRecord(_) => 21,
            Error::InvalidGold { .. } => 22,
            Error::Inference(_) => 30,
            Error::NumericalInstability(_) => 31,
            Error::Store(_) => 50,
            Error::SnapshotCorrupted(_) => 51,
            Error::SchemaMismatch { .. } => 52,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidConfig(_) | Error::ConfigNotFound { .. } => {
                ErrorCategory::Config
            }
            Error::Ingest(_) | Error::MalformedRecord(_) | Error::InvalidGold { .. } => {
                ErrorCategory::Ingest
            }
            Error::Inference(_) | Error::NumericalInstability(_) => ErrorCategory::Inference,
            Error::Store(_) | Error::SnapshotCorrupted(_) | Error::SchemaMismatch { .. } => {
                ErrorCategory::Store
            }
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Whether ingestion may skip the offending item and keep going.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Error::MalformedRecord(_) | Error::InvalidGold { .. }
        )
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) | Error::InvalidConfig(_) => {
                "Check the estimator config file; probabilities must lie strictly between 0 and 1."
            }
            Error::ConfigNotFound { .. } => {
                "Pass an existing file to --config or unset SWAP_CONFIG to use defaults."
            }
            Error::Ingest(_) | Error::MalformedRecord(_) => {
                "Inspect the offending record; malformed records are skipped during 'swap run'."
            }
            Error::InvalidGold { .. } => "Gold labels must be 0 (bogus) or 1 (real).",
            Error::Inference(_) | Error::NumericalInstability(_) => {
                "Re-run the scoring cycle; if persistent, report with the estimator snapshot."
            }
            Error::Store(_) | Error::SnapshotCorrupted(_) => {
                "The snapshot is unreadable. Restore it from backup or start over with 'swap clear'."
            }
            Error::SchemaMismatch { .. } => {
                "The snapshot was written by an incompatible version of swap."
            }
            Error::Io(_) => "Check disk space, permissions, and that the data directory exists.",
            Error::Json(_) => "Invalid JSON. Check the file syntax or restore from backup.",
        }
    }
}
