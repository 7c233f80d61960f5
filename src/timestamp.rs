//! Hour bucketing of `created_at` timestamps.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

const HOUR_FORMAT: &str = "%Y-%m-%d %H:00";

/// Numeric offsets without the colon RFC 3339 requires.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M%z",
];

const LOCAL_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

const MINUTE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Truncate an ISO-8601 timestamp to its hour, formatted `YYYY-MM-DD HH:00`.
///
/// The hour is taken in the timestamp's own offset; nothing is normalised to UTC.
/// Timestamps without an offset bucket on their wall-clock hour, and a bare date on
/// its midnight.
pub fn hour_of(timestamp: &str) -> Option<String> {
    let timestamp = timestamp.trim();

    let with_offset = DateTime::parse_from_rfc3339(timestamp).ok().or_else(|| {
        OFFSET_FORMATS
            .iter()
            .find_map(|format| DateTime::parse_from_str(timestamp, format).ok())
    });

    if let Some(datetime) = with_offset {
        return Some(datetime.format(HOUR_FORMAT).to_string());
    }

    local_time(timestamp).map(|datetime| datetime.format(HOUR_FORMAT).to_string())
}

fn local_time(timestamp: &str) -> Option<NaiveDateTime> {
    let parse = |text: &str, formats: &[&str]| {
        formats
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
    };

    if let Some(datetime) =
        parse(timestamp, LOCAL_FORMATS).or_else(|| parse(timestamp, MINUTE_FORMATS))
    {
        return Some(datetime);
    }

    // chrono wants minutes, so `YYYY-MM-DDTHH` gets them padded in.
    if let Some(datetime) = parse(&format!("{}:00", timestamp), MINUTE_FORMATS) {
        return Some(datetime);
    }

    NaiveDate::parse_from_str(timestamp, DATE_FORMAT)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
