//! Entry module consists of the basic abstractions of a post and its aggregates.
//!
//! Including to: `Post`, `Rejection` and `UserSentiment`.

use std::fmt::{self, Display};

use serde_json::Value;

use crate::ndjson::Record;
use crate::timestamp;

/// The fields of a record the aggregation needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub hour: String,
    pub sentiment: f64,
    pub user_id: String,
    pub username: String,
}

/// Why a record was dropped without touching any aggregate.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Rejection {
    MissingTimestamp,
    UnparsableTimestamp,
    MissingUserId,
}

impl Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let reason = match self {
            Rejection::MissingTimestamp => "missing created_at",
            Rejection::UnparsableTimestamp => "unparsable created_at",
            Rejection::MissingUserId => "missing account.id",
        };
        f.write_str(reason)
    }
}

impl Post {
    /// Extract a post from a decoded record.
    ///
    /// A missing or non-numeric `sentiment` is 0.0 and a missing `username` is empty,
    /// but a record without a usable hour or user id is rejected as a whole.
    pub fn from_record(record: &Record) -> Result<Post, Rejection> {
        let created_at = match record.get("created_at") {
            Some(Value::String(created_at)) if !created_at.is_empty() => created_at,
            _ => return Err(Rejection::MissingTimestamp),
        };

        let hour = timestamp::hour_of(created_at).ok_or(Rejection::UnparsableTimestamp)?;

        let account = record.get("account");

        let user_id = account
            .and_then(|account| account.get("id"))
            .and_then(user_id_of)
            .ok_or(Rejection::MissingUserId)?;

        let username = account
            .and_then(|account| account.get("username"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        let sentiment = record
            .get("sentiment")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        Ok(Post {
            hour,
            sentiment,
            user_id,
            username,
        })
    }
}

/// Ids are opaque: strings are taken as-is and integers by their decimal form.
fn user_id_of(id: &Value) -> Option<String> {
    match id {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Accumulated sentiment of one user.
#[derive(Debug, Clone, PartialEq)]
pub struct UserSentiment {
    pub username: String,
    pub sentiment: f64,
}

impl UserSentiment {
    pub fn new(username: String, sentiment: f64) -> UserSentiment {
        UserSentiment {
            username,
            sentiment,
        }
    }

    /// Fold a later observation into this one.
    ///
    /// The username of the first observation is kept even when it is empty and the
    /// later one is not; only the sentiment accumulates.
    pub fn merge(&mut self, other: &UserSentiment) {
        self.sentiment += other.sentiment;
    }
}
