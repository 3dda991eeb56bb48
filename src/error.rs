use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by a single dedup invocation. One key's failure never
/// affects other keys in a batch run.
#[derive(Debug, Error)]
pub enum DedupError {
    /// The input CSV for the requested key does not exist. Nothing is written.
    #[error("input file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The similarity backend failed; the whole run for the key aborts and no
    /// partial per-group results are persisted.
    #[error("similarity computation failed: {0}")]
    Compute(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// The run was cancelled at a group boundary or before an oracle call.
    #[error("run cancelled")]
    Cancelled,
}

impl From<csv::Error> for DedupError {
    fn from(err: csv::Error) -> Self {
        DedupError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for DedupError {
    fn from(err: std::io::Error) -> Self {
        DedupError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DedupError>;
