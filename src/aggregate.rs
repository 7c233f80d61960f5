//! Per-partition aggregation of the record stream.

use std::collections::hash_map::{Entry, HashMap};
use std::io::{self, BufRead};

use log;

use crate::entry::{Post, Rejection, UserSentiment};
use crate::ndjson::{Record, RecordStream, StreamStats};

/// Records are pulled from the stream in windows of this size before being folded in.
/// It only bounds how much is decoded ahead; the result does not depend on it.
pub const BATCH_SIZE: usize = 10_000;

/// Why records were dropped, by reason.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct Dropped {
    pub missing_timestamp: u64,
    pub unparsable_timestamp: u64,
    pub missing_user_id: u64,
}

impl Dropped {
    pub fn total(&self) -> u64 {
        self.missing_timestamp + self.unparsable_timestamp + self.missing_user_id
    }

    fn count(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::MissingTimestamp => self.missing_timestamp += 1,
            Rejection::UnparsableTimestamp => self.unparsable_timestamp += 1,
            Rejection::MissingUserId => self.missing_user_id += 1,
        }
    }

    pub(crate) fn add(&mut self, other: &Dropped) {
        self.missing_timestamp += other.missing_timestamp;
        self.unparsable_timestamp += other.unparsable_timestamp;
        self.missing_user_id += other.missing_user_id;
    }
}

/// Hour and user sums of one partition, owned by its worker until handed to the reducer.
#[derive(Debug, Default, Clone)]
pub struct PartitionAggregate {
    pub index: usize,
    pub hours: HashMap<String, f64>,
    pub users: HashMap<String, UserSentiment>,
    pub aggregated: u64,
    pub dropped: Dropped,
    pub stream: StreamStats,
}

impl PartitionAggregate {
    pub fn new(index: usize) -> PartitionAggregate {
        PartitionAggregate {
            index,
            ..PartitionAggregate::default()
        }
    }

    /// Fold one record into the sums.
    ///
    /// A record without an hour or a user id updates nothing at all, even when the other
    /// half is usable.
    pub fn accumulate(&mut self, record: &Record) {
        let post = match Post::from_record(record) {
            Ok(post) => post,
            Err(rejection) => {
                log::trace!("Drop record in partition {}: {}", self.index, rejection);
                self.dropped.count(rejection);
                return;
            }
        };

        *self.hours.entry(post.hour).or_insert(0.0) += post.sentiment;

        match self.users.entry(post.user_id) {
            Entry::Occupied(mut entry) => entry.get_mut().sentiment += post.sentiment,
            Entry::Vacant(entry) => {
                entry.insert(UserSentiment::new(post.username, post.sentiment));
            }
        }

        self.aggregated += 1;
    }

    pub fn accumulate_batch(&mut self, batch: &[Record]) {
        for record in batch {
            self.accumulate(record);
        }
    }
}

/// Drain a record stream into the aggregate of partition `index`.
///
/// Fails only when the stream reports an I/O error.
pub fn aggregate_stream<R: BufRead>(
    index: usize,
    mut stream: RecordStream<R>,
) -> io::Result<PartitionAggregate> {
    let mut aggregate = PartitionAggregate::new(index);
    let mut batch = Vec::with_capacity(BATCH_SIZE);

    for record in stream.by_ref() {
        batch.push(record?);

        if batch.len() >= BATCH_SIZE {
            aggregate.accumulate_batch(&batch);
            batch.clear();
        }
    }
    aggregate.accumulate_batch(&batch);

    aggregate.stream = stream.stats();

    Ok(aggregate)
}
