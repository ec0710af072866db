//! End-of-day closing: penalize records that missed the threshold.
//!
//! Closing stamps every record of the date with `closed_at`. Only unclosed
//! records are ever penalized, so a second run over the same date is a no-op.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use crate::storage::Database;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DayCloseReport {
    pub date: Option<NaiveDate>,
    /// Records stamped closed by this run, completed ones included.
    pub closed_records: usize,
    /// Users whose streak was broken by this run.
    pub missed_users: Vec<i64>,
}

/// Close `date`: every open record below `threshold` counts as a missed day
/// and resets its owner's current streak.
pub fn close_day(
    db: &Database,
    date: NaiveDate,
    threshold: u32,
    now: DateTime<Utc>,
) -> Result<DayCloseReport, rusqlite::Error> {
    let tx = db.begin()?;

    let misses = db.unclosed_misses_on(date, threshold)?;
    let mut missed_users = Vec::with_capacity(misses.len());
    for record in &misses {
        db.apply_miss(record.user_id)?;
        missed_users.push(record.user_id);
    }
    let closed_records = db.close_records_on(date, now)?;

    tx.commit()?;

    info!(
        date = %date,
        closed = closed_records,
        missed = missed_users.len(),
        "day closed"
    );

    Ok(DayCloseReport {
        date: Some(date),
        closed_records,
        missed_users,
    })
}

/// Close every date before `today` that still has unclosed records, oldest
/// first. Used when the process was down across a cutoff.
pub fn catch_up(
    db: &Database,
    today: NaiveDate,
    threshold: u32,
    now: DateTime<Utc>,
) -> Result<Vec<DayCloseReport>, rusqlite::Error> {
    db.unclosed_dates_before(today)?
        .into_iter()
        .map(|date| close_day(db, date, threshold, now))
        .collect()
}

/// Close `date` together with every earlier date still holding unclosed
/// records, oldest first. Records created for a date after its close are
/// picked up by the next run.
pub fn close_through(
    db: &Database,
    date: NaiveDate,
    threshold: u32,
    now: DateTime<Utc>,
) -> Result<Vec<DayCloseReport>, rusqlite::Error> {
    let mut dates = db.unclosed_dates_before(date)?;
    dates.push(date);
    dates
        .into_iter()
        .map(|d| close_day(db, d, threshold, now))
        .collect()
}
