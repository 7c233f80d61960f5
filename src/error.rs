//! Fatal failures of an analysis run.
//!
//! Problems with individual records are never errors, they are dropped and counted.
//! See `entry::Rejection` for those.

use failure::Fail;

#[derive(Debug, Fail)]
pub enum AnalyticsError {
    #[fail(display = "worker count must be at least 1, got {}", _0)]
    InvalidWorkerCount(usize),

    #[fail(display = "worker {} failed: {}", index, cause)]
    WorkerFailure { index: usize, cause: String },

    #[fail(display = "worker {} panicked before reporting", _0)]
    WorkerPanicked(usize),

    #[fail(display = "only {} of {} workers reported", reported, expected)]
    MissingReports { reported: usize, expected: usize },
}
