//! Submitter statistics repository: per-submitter upload counters.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{parse_db_time, to_db_time, Database, DatabaseError};
use crate::job::SubmitterStats;

/// Records one resolved job for a submitter.
///
/// A single UPSERT creates the row on first use and increments it
/// afterwards, so concurrent outcomes for the same submitter never lose an
/// update. `bytes` is only counted for successes.
pub fn record_outcome(
    db: &Database,
    submitter_id: i64,
    succeeded: bool,
    bytes: u64,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| upsert_outcome(conn, submitter_id, succeeded, bytes, now))
}

/// The UPSERT behind [`record_outcome`], usable inside a caller's transaction.
pub(super) fn upsert_outcome(
    conn: &Connection,
    submitter_id: i64,
    succeeded: bool,
    bytes: u64,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let success_val: i64 = if succeeded { 1 } else { 0 };
    let failure_val: i64 = 1 - success_val;
    let bytes_val: i64 = if succeeded {
        i64::try_from(bytes).unwrap_or(i64::MAX)
    } else {
        0
    };
    let now = to_db_time(now);

    conn.execute(
        "INSERT INTO submitter_stats (submitter_id, total_submitted, total_succeeded,
         total_failed, total_bytes, last_upload_at, created_at)
         VALUES (?1, 1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(submitter_id) DO UPDATE SET
           total_submitted = total_submitted + 1,
           total_succeeded = total_succeeded + ?2,
           total_failed = total_failed + ?3,
           total_bytes = total_bytes + ?4,
           last_upload_at = ?5",
        params![submitter_id, success_val, failure_val, bytes_val, now],
    )?;
    Ok(())
}

/// Returns the submitter's counters, zeroed when nothing was recorded yet.
pub fn get(db: &Database, submitter_id: i64) -> Result<SubmitterStats, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT total_submitted, total_succeeded, total_failed, total_bytes, last_upload_at
                 FROM submitter_stats WHERE submitter_id = ?1",
                params![submitter_id],
                |r| {
                    Ok((
                        r.get::<_, u64>(0)?,
                        r.get::<_, u64>(1)?,
                        r.get::<_, u64>(2)?,
                        r.get::<_, u64>(3)?,
                        r.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((submitted, succeeded, failed, bytes, last)) = row else {
            return Ok(SubmitterStats::empty(submitter_id));
        };

        Ok(SubmitterStats {
            submitter_id,
            total_submitted: submitted,
            total_succeeded: succeeded,
            total_failed: failed,
            total_bytes: bytes,
            last_upload_at: last
                .as_deref()
                .map(|raw| parse_db_time("last_upload_at", raw))
                .transpose()?,
        })
    })
}
