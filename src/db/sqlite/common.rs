use std::{collections::HashSet, str::FromStr};

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, query::Query, sqlite::SqliteArguments};

use crate::db::{
    error::{DbError, DbResult},
    repos::CleanupCriteria,
};

pub type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Most ids bound into a single IN list. SQLite caps the number of
/// variables in one statement.
pub const ID_CHUNK_SIZE: usize = 500;

pub fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub fn opt_to_millis(time: Option<DateTime<Utc>>) -> Option<i64> {
    time.map(to_millis)
}

/// Convert a stored epoch-millisecond value back to a timestamp.
pub fn from_millis(millis: i64) -> DbResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| DbError::Internal(format!("Invalid timestamp in database: {}", millis)))
}

pub fn opt_from_millis(millis: Option<i64>) -> DbResult<Option<DateTime<Utc>>> {
    millis.map(from_millis).transpose()
}

/// Parse an enum column stored as text.
pub fn parse_column<T: FromStr<Err = String>>(value: &str) -> DbResult<T> {
    value.parse().map_err(DbError::Internal)
}

/// `?, ?, ?` for an IN list of `count` values.
pub fn placeholders(count: usize) -> String {
    (0..count).map(|_| "?").collect::<Vec<_>>().join(", ")
}

/// Distinct ids, in first-seen order, split into runs of at most `chunk_size`.
pub fn id_chunks(ids: &[String], chunk_size: usize) -> Vec<Vec<String>> {
    let mut seen = HashSet::new();
    let distinct: Vec<String> = ids
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect();
    distinct
        .chunks(chunk_size.max(1))
        .map(<[String]>::to_vec)
        .collect()
}

pub fn bind_ids<'q>(mut query: SqliteQuery<'q>, ids: &'q [String]) -> SqliteQuery<'q> {
    for id in ids {
        query = query.bind(id.as_str());
    }
    query
}

/// SQL fragment restricting `column` (epoch millis) to the criteria's minute
/// range. Empty when the range covers the whole hour.
pub fn minute_filter(column: &str, criteria: &CleanupCriteria) -> String {
    if criteria.covers_full_hour() {
        return String::new();
    }
    format!(
        "AND (({column} / 60000) % 60) BETWEEN {} AND {}",
        criteria.minute_from, criteria.minute_to
    )
}

/// SQL expression adding a TTL column (days) to a timestamp column.
pub fn plus_days(column: &str, ttl_column: &str) -> String {
    format!("({column} + {ttl_column} * {MILLIS_PER_DAY})")
}
