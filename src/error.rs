use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failure to analyze a single review. Recovered per review by the sweep.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Rating {0} is outside 1-5")]
    InvalidRating(u8),

    #[error("Comment has {len} characters, limit is {max}")]
    CommentTooLong { len: usize, max: usize },

    #[error(transparent)]
    State(#[from] LockPoisoned),
}

#[derive(Error, Debug)]
pub enum ReportGenerationError {
    #[error("Report period start {start} is after end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Report generation exceeded its time budget")]
    DeadlineExceeded,

    #[error(transparent)]
    State(#[from] LockPoisoned),
}

/// A shared store or registry lock was poisoned by a panicking writer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Engine state lock poisoned")]
pub struct LockPoisoned;

#[derive(Error, Debug)]
#[error("Attention flag delivery failed: {0}")]
pub struct DeliveryError(pub String);
