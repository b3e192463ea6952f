pub(crate) mod grading;
pub(crate) mod oracle;
pub(crate) mod progression;
pub(crate) mod rate_limit;
pub(crate) mod rewards;
pub(crate) mod video_generation;
pub(crate) mod video_jobs;

use thiserror::Error;

/// Failures at the persistence seams the services depend on.
#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
}
