//! Find the happiest and saddest hours and users in a large NDJSON dump of posts.
//!
//! The file is split into byte ranges, each range is streamed and summed by its own
//! worker thread, and the partial sums are merged once every worker has reported.

use std::path::Path;

use failure::Error;
use log;

mod aggregate;
mod chunk;
mod config;
mod entry;
mod error;
mod ndjson;
mod pool;
mod reduce;
mod report;
mod timestamp;
mod top_k;

pub use crate::aggregate::{Dropped, PartitionAggregate, BATCH_SIZE};
pub use crate::chunk::{partition, Chunk};
pub use crate::config::{Config, DEFAULT_OUTPUT_DIR, WORKERS_ENV};
pub use crate::entry::{Post, Rejection, UserSentiment};
pub use crate::error::AnalyticsError;
pub use crate::ndjson::{Record, RecordStream, StreamStats};
pub use crate::reduce::{GlobalAggregate, Reducer};
pub use crate::timestamp::hour_of;
pub use crate::top_k::{top_k, Extremum, Ranked, TopLists, UserId, UserRank, DEFAULT_K};

/// What a run produced, besides the report files.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub lists: TopLists,
    pub workers: usize,
    pub hours: usize,
    pub users: usize,
    pub aggregated: u64,
    pub dropped: Dropped,
    pub malformed: u64,
    pub skipped: u64,
}

/// Main entry function: aggregate the input, select the rankings and write the report.
pub fn analyze(config: &Config) -> Result<Analysis, Error> {
    log::info!(
        "Processing {} with {} workers.",
        config.input.display(),
        config.workers
    );

    let global = aggregate_file(&config.input, config.workers)?;

    let lists = TopLists::select(&global, DEFAULT_K);

    report::write_all(&config.output_dir, &lists)?;

    log::info!("Report written to {}.", config.output_dir.display());

    Ok(Analysis {
        lists,
        workers: config.workers,
        hours: global.hours.len(),
        users: global.users.len(),
        aggregated: global.aggregated,
        dropped: global.dropped,
        malformed: global.stream.malformed,
        skipped: global.stream.skipped,
    })
}

/// Aggregate `source` with `workers` partitions and merge the partial sums.
pub fn aggregate_file<P: AsRef<Path>>(source: P, workers: usize) -> Result<GlobalAggregate, Error> {
    let partitions = pool::Pool::new(workers)?.run(source)?;

    Ok(Reducer::merge(partitions))
}
