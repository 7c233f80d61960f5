//! Internal implementation of a partition worker.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Instant;

use failure::{Error, ResultExt};
use log;

use crate::aggregate::{self, PartitionAggregate};
use crate::chunk::Chunk;
use crate::ndjson::RecordStream;

pub type Report = (usize, Result<PartitionAggregate, Error>);

type Sender = mpsc::Sender<Report>;
type Join = thread::JoinHandle<()>;

/// Spawn the worker for `chunk`. It sends exactly one report, then exits.
pub fn spawn(source: PathBuf, chunk: Chunk, tx: Sender) -> Result<Join, Error> {
    let handle = thread::Builder::new()
        .name(format!("partition-{}", chunk.index))
        .spawn(move || {
            let result = process(&source, chunk);

            // The receiver only disappears if the coordinator itself is gone.
            let _ = tx.send((chunk.index, result));
        })
        .with_context(|_| format!("Failed to spawn worker {}", chunk.index))?;

    Ok(handle)
}

/// Stream one chunk into a fresh aggregate. The file handle is released on return.
fn process(source: &Path, chunk: Chunk) -> Result<PartitionAggregate, Error> {
    let started = Instant::now();

    let (reader, position) = chunk
        .open(source)
        .with_context(|_| format!("Failed to open {} at {}", source.display(), chunk.start))?;

    log::debug!(
        "Worker {} reads from offset {} to {:?}.",
        chunk.index,
        position,
        chunk.end
    );

    let stream = RecordStream::new(reader, position, chunk.end);

    let partition = aggregate::aggregate_stream(chunk.index, stream)
        .with_context(|_| format!("Failed to read {} in partition {}", source.display(), chunk.index))?;

    log::debug!(
        "Worker {} done in {:?}: {} aggregated, {} dropped, {} malformed, {} skipped.",
        chunk.index,
        started.elapsed(),
        partition.aggregated,
        partition.dropped.total(),
        partition.stream.malformed,
        partition.stream.skipped
    );

    Ok(partition)
}
