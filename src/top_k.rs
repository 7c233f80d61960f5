//! Top-k selection over the merged sums.
//!
//! A bounded heap keeps the k best candidates seen so far, so selection is O(n log k).
//! Equal scores are ordered by key ascending, which makes the output reproducible.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::reduce::GlobalAggregate;

pub const DEFAULT_K: usize = 5;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Extremum {
    /// Largest scores first.
    Max,
    /// Smallest scores first.
    Min,
}

/// A key with its score, as returned by `top_k`.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<K> {
    pub key: K,
    pub score: f64,
}

/// Ordered so that the better candidate compares greater.
struct Candidate<K> {
    key: K,
    score: f64,
    extremum: Extremum,
}

impl<K: Ord> Ord for Candidate<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_score = match self.extremum {
            Extremum::Max => self.score.partial_cmp(&other.score),
            Extremum::Min => other.score.partial_cmp(&self.score),
        };

        by_score
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.key.cmp(&self.key))
    }
}

impl<K: Ord> PartialOrd for Candidate<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord> PartialEq for Candidate<K> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K: Ord> Eq for Candidate<K> {}

/// The `k` entries with the largest (`Max`) or smallest (`Min`) score, best first.
/// Returns every entry when there are fewer than `k`.
pub fn top_k<K, I>(entries: I, k: usize, extremum: Extremum) -> Vec<Ranked<K>>
where
    K: Ord,
    I: IntoIterator<Item = (K, f64)>,
{
    if k == 0 {
        return Vec::new();
    }

    // Min-heap of the best k: the worst kept candidate sits on top.
    let mut heap = BinaryHeap::with_capacity(k + 1);

    for (key, score) in entries {
        let candidate = Candidate {
            key,
            score,
            extremum,
        };

        if heap.len() < k {
            heap.push(Reverse(candidate));
        } else if let Some(Reverse(worst)) = heap.peek() {
            if candidate > *worst {
                heap.pop();
                heap.push(Reverse(candidate));
            }
        }
    }

    heap.into_sorted_vec()
        .into_iter()
        .map(|Reverse(candidate)| Ranked {
            key: candidate.key,
            score: candidate.score,
        })
        .collect()
}

/// User ids compare numerically when both are unsigned integers, lexicographically
/// otherwise. Numeric ids sort before the rest.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct UserId<'a>(pub &'a str);

impl<'a> UserId<'a> {
    fn digits(&self) -> Option<&'a str> {
        if !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_digit()) {
            let trimmed = self.0.trim_start_matches('0');
            Some(trimmed)
        } else {
            None
        }
    }
}

impl<'a> Ord for UserId<'a> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.digits(), other.digits()) {
            (Some(left), Some(right)) => left
                .len()
                .cmp(&right.len())
                .then_with(|| left.cmp(right))
                .then_with(|| self.0.cmp(other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(other.0),
        }
    }
}

impl<'a> PartialOrd for UserId<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One line of a user ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRank {
    pub user_id: String,
    pub username: String,
    pub sentiment: f64,
}

/// The four rankings written to the report.
#[derive(Debug, Clone, PartialEq)]
pub struct TopLists {
    pub happiest_hours: Vec<Ranked<String>>,
    pub saddest_hours: Vec<Ranked<String>>,
    pub happiest_users: Vec<UserRank>,
    pub saddest_users: Vec<UserRank>,
}

impl TopLists {
    pub fn select(global: &GlobalAggregate, k: usize) -> TopLists {
        TopLists {
            happiest_hours: hours(global, k, Extremum::Max),
            saddest_hours: hours(global, k, Extremum::Min),
            happiest_users: users(global, k, Extremum::Max),
            saddest_users: users(global, k, Extremum::Min),
        }
    }
}

fn hours(global: &GlobalAggregate, k: usize, extremum: Extremum) -> Vec<Ranked<String>> {
    let entries = global
        .hours
        .iter()
        .map(|(hour, sentiment)| (hour.as_str(), *sentiment));

    top_k(entries, k, extremum)
        .into_iter()
        .map(|ranked| Ranked {
            key: ranked.key.to_string(),
            score: ranked.score,
        })
        .collect()
}

fn users(global: &GlobalAggregate, k: usize, extremum: Extremum) -> Vec<UserRank> {
    let entries = global
        .users
        .iter()
        .map(|(id, user)| (UserId(id.as_str()), user.sentiment));

    top_k(entries, k, extremum)
        .into_iter()
        .map(|ranked| {
            let user_id = ranked.key.0;
            let username = global
                .users
                .get(user_id)
                .map(|user| user.username.clone())
                .unwrap_or_default();

            UserRank {
                user_id: user_id.to_string(),
                username,
                sentiment: ranked.score,
            }
        })
        .collect()
}
