//! Error type for the repository and HTTP boundary.
//!
//! The reconciler and aggregator are infallible; these errors only
//! arise when records are loaded, stored or corrected.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unsupported snapshot schema version {found} (expected {expected})")]
    Schema { found: u32, expected: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AttendanceError>;
