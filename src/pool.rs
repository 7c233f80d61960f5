//! Worker pool running one partition per thread.
//!
//! The workflow is illustrated as following:
//!
//! The coordinator splits the file into chunks and spawns one worker per chunk. Each
//! worker opens its own file handle, streams its chunk into a private aggregate and sends
//! that aggregate back exactly once. The coordinator blocks until every worker has
//! reported before anything is merged.

use std::fs;
use std::path::Path;
use std::sync::mpsc;

use failure::{Error, ResultExt};
use log;

use crate::aggregate::PartitionAggregate;
use crate::chunk;
use crate::error::AnalyticsError;

mod worker;

#[derive(Clone, Copy, Debug)]
pub struct Pool {
    size: usize,
}

impl Pool {
    pub fn new(size: usize) -> Result<Pool, AnalyticsError> {
        if size == 0 {
            return Err(AnalyticsError::InvalidWorkerCount(size));
        }
        Ok(Pool { size })
    }

    /// Aggregate every partition of `source`, in partition index order.
    ///
    /// Any failing or panicking worker fails the whole run and no aggregate is returned.
    pub fn run<P: AsRef<Path>>(&self, source: P) -> Result<Vec<PartitionAggregate>, Error> {
        let source = source.as_ref();

        let file_size = fs::metadata(source)
            .with_context(|_| format!("Missing source file {}", source.display()))?
            .len();

        let chunks = chunk::partition(file_size, self.size)?;

        log::info!(
            "Split {} ({} bytes) into {} partitions of ~{} bytes.",
            source.display(),
            file_size,
            chunks.len(),
            chunk::chunk_size(file_size, self.size)
        );

        let (tx, rx) = mpsc::channel();
        let mut handles = Vec::with_capacity(chunks.len());
        {
            // Drop the coordinator's sender so the receiver ends once all workers are done.
            let tx = tx;

            for chunk in chunks {
                handles.push(worker::spawn(source.to_path_buf(), chunk, tx.clone())?);
            }
        }

        let mut reports: Vec<Option<Result<PartitionAggregate, Error>>> =
            (0..self.size).map(|_| None).collect();

        for (index, result) in rx {
            reports[index] = Some(result);
        }

        for (index, handle) in handles.into_iter().enumerate() {
            if handle.join().is_err() {
                log::error!("Worker {} panicked.", index);
                return Err(AnalyticsError::WorkerPanicked(index).into());
            }
        }

        let expected = reports.len();
        let mut partitions = Vec::with_capacity(expected);

        for (index, report) in reports.into_iter().enumerate() {
            match report {
                Some(Ok(partition)) => partitions.push(partition),
                Some(Err(error)) => {
                    let cause = error
                        .iter_chain()
                        .map(|fail| fail.to_string())
                        .collect::<Vec<_>>()
                        .join(": ");

                    log::error!("Worker {} failed, abort the run: {}", index, cause);
                    return Err(AnalyticsError::WorkerFailure { index, cause }.into());
                }
                None => {
                    return Err(AnalyticsError::MissingReports {
                        reported: partitions.len(),
                        expected,
                    }
                    .into())
                }
            }
        }

        Ok(partitions)
    }
}
