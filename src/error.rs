use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a run before (or instead of) producing a measurement.
///
/// Per-trial failures are not represented here; they travel as
/// [`TrialOutcome`](crate::runner::TrialOutcome) sentinels.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("iterations must be positive (got {0})")]
    NonPositiveIterations(i64),

    #[error("cannot execute '{}'", .0.display())]
    NotExecutable(PathBuf),

    #[error("assumed clock frequency must be a positive number of GHz (got {0})")]
    InvalidFrequency(f64),

    #[error("instruction manifest '{}': {reason}", path.display())]
    Manifest { path: PathBuf, reason: String },

    #[error("cannot write report '{}': {source}", path.display())]
    Report { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
