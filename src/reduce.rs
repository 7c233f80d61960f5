//! Reducer

use std::collections::hash_map::{Entry, HashMap};

use log;

use crate::aggregate::{Dropped, PartitionAggregate};
use crate::entry::UserSentiment;
use crate::ndjson::StreamStats;

/// Union of every partition's sums. Built once by the coordinator, read-only afterward.
#[derive(Debug, Default, Clone)]
pub struct GlobalAggregate {
    pub hours: HashMap<String, f64>,
    pub users: HashMap<String, UserSentiment>,
    pub partitions: usize,
    pub aggregated: u64,
    pub dropped: Dropped,
    pub stream: StreamStats,
}

pub struct Reducer;

impl Reducer {
    /// Merge all partition aggregates. Must only run once every worker has reported.
    ///
    /// Partitions are folded in ascending index, i.e. file order. Hour and user sums add
    /// up; a user's name is the one held by the first partition that saw the user.
    pub fn merge(mut partitions: Vec<PartitionAggregate>) -> GlobalAggregate {
        log::info!("Start reducing {} partitions.", partitions.len());

        partitions.sort_by_key(|partition| partition.index);

        partitions
            .into_iter()
            .fold(GlobalAggregate::default(), |mut global, partition| {
                log::debug!(
                    "Merge partition {}: {} hours, {} users.",
                    partition.index,
                    partition.hours.len(),
                    partition.users.len()
                );

                for (hour, sentiment) in partition.hours {
                    *global.hours.entry(hour).or_insert(0.0) += sentiment;
                }

                for (user_id, user) in partition.users {
                    match global.users.entry(user_id) {
                        Entry::Occupied(mut entry) => entry.get_mut().merge(&user),
                        Entry::Vacant(entry) => {
                            entry.insert(user);
                        }
                    }
                }

                global.partitions += 1;
                global.aggregated += partition.aggregated;
                global.dropped.add(&partition.dropped);
                global.stream.records += partition.stream.records;
                global.stream.malformed += partition.stream.malformed;
                global.stream.skipped += partition.stream.skipped;

                global
            })
    }
}
