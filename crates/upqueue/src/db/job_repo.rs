//! Job repository: queue operations on the `upload_jobs` table.
//!
//! Every function takes the current time explicitly so callers (and tests)
//! control the clock. Ordering ties on `created_at` fall back to `rowid`,
//! which is insertion order.

use chrono::{DateTime, Utc};
use rusqlite::{params, ErrorCode, OptionalExtension, Row};

use super::{parse_db_time, stats_repo, to_db_time, Database, DatabaseError};
use crate::job::{Job, JobDescriptor, JobOutcome, StatusCounts};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub source_file_ref: String,
    pub display_name: String,
    pub declared_size: i64,
    pub category: String,
    pub submitter_id: i64,
    pub message_ref: i64,
    pub note: Option<String>,
    pub status: String,
    pub priority: i64,
    pub created_at: String,
    pub updated_at: String,
    pub attempts: i64,
    pub max_attempts: i64,
    pub result_location: Option<String>,
    pub error: Option<String>,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            source_file_ref: row.get("source_file_ref")?,
            display_name: row.get("display_name")?,
            declared_size: row.get("declared_size")?,
            category: row.get("category")?,
            submitter_id: row.get("submitter_id")?,
            message_ref: row.get("message_ref")?,
            note: row.get("note")?,
            status: row.get("status")?,
            priority: row.get("priority")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            attempts: row.get("attempts")?,
            max_attempts: row.get("max_attempts")?,
            result_location: row.get("result_location")?,
            error: row.get("error")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

impl TryFrom<JobRow> for Job {
    type Error = DatabaseError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let corrupt = |column: &'static str| move |reason: String| DatabaseError::CorruptRow { column, reason };

        Ok(Job {
            status: row.status.parse().map_err(corrupt("status"))?,
            category: row.category.parse().map_err(corrupt("category"))?,
            created_at: parse_db_time("created_at", &row.created_at)?,
            updated_at: parse_db_time("updated_at", &row.updated_at)?,
            completed_at: row
                .completed_at
                .as_deref()
                .map(|raw| parse_db_time("completed_at", raw))
                .transpose()?,
            declared_size: u64::try_from(row.declared_size)
                .map_err(|e| corrupt("declared_size")(e.to_string()))?,
            attempts: u32::try_from(row.attempts)
                .map_err(|e| corrupt("attempts")(e.to_string()))?,
            max_attempts: u32::try_from(row.max_attempts)
                .map_err(|e| corrupt("max_attempts")(e.to_string()))?,
            id: row.id,
            source_file_ref: row.source_file_ref,
            display_name: row.display_name,
            submitter_id: row.submitter_id,
            message_ref: row.message_ref,
            note: row.note,
            priority: row.priority,
            result_location: row.result_location,
            error: row.error,
        })
    }
}

/// Inserts a queued job and returns its 1-based rank among queued jobs.
///
/// Insert and count run in one transaction, so the rank reflects a snapshot
/// that includes the new row.
pub fn insert_queued(
    db: &Database,
    desc: &JobDescriptor,
    max_attempts: u32,
    now: DateTime<Utc>,
) -> Result<u64, DatabaseError> {
    let declared_size =
        i64::try_from(desc.declared_size.unwrap_or(0)).map_err(|_| DatabaseError::OutOfRange {
            column: "declared_size",
            value: desc.declared_size.unwrap_or(0).to_string(),
        })?;

    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let created_at = to_db_time(now);

        let inserted = tx.execute(
            "INSERT INTO upload_jobs (id, source_file_ref, display_name, declared_size, category,
             submitter_id, message_ref, note, status, priority, created_at, updated_at,
             attempts, max_attempts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'queued', 0, ?9, ?9, 0, ?10)",
            params![
                uuid::Uuid::new_v4().to_string(),
                desc.source_file_ref,
                desc.resolved_name(),
                declared_size,
                desc.category.as_str(),
                desc.submitter_id,
                desc.message_ref,
                desc.note,
                created_at,
                max_attempts,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(DatabaseError::DuplicateJob(desc.source_file_ref.clone()));
            }
            Err(e) => return Err(e.into()),
        }
        let rowid = tx.last_insert_rowid();

        let ahead: u64 = tx.query_row(
            "SELECT COUNT(*) FROM upload_jobs
             WHERE status = 'queued'
               AND (created_at < ?1 OR (created_at = ?1 AND rowid < ?2))",
            params![created_at, rowid],
            |r| r.get(0),
        )?;

        tx.commit()?;
        Ok(ahead + 1)
    })
}

/// Atomically claims the next eligible job.
///
/// Eligible means `queued` with attempts left. Highest priority wins, then
/// oldest. The selection and the transition happen in one UPDATE statement,
/// so two callers (threads or processes) can never claim the same row.
///
/// The claim commits only once the row decodes. A row that does not is
/// marked `failed` instead, so it cannot block the queue, and the decode
/// error is returned.
pub fn claim_next(db: &Database, now: DateTime<Utc>) -> Result<Option<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let now = to_db_time(now);
        let tx = conn.unchecked_transaction()?;
        let row = tx
            .query_row(
                "UPDATE upload_jobs
                 SET status = 'processing', attempts = attempts + 1, updated_at = ?1
                 WHERE rowid = (
                     SELECT rowid FROM upload_jobs
                     WHERE status = 'queued' AND attempts < max_attempts
                     ORDER BY priority DESC, created_at ASC, rowid ASC
                     LIMIT 1
                 )
                 RETURNING *",
                params![now],
                JobRow::from_row,
            )
            .optional()?;

        let Some(row) = row else {
            return Ok(None);
        };
        let source_file_ref = row.source_file_ref.clone();

        match Job::try_from(row) {
            Ok(job) => {
                tx.commit()?;
                Ok(Some(job))
            }
            Err(e) => {
                tx.rollback()?;
                log::error!("Job '{}' has an unreadable record: {}", source_file_ref, e);
                conn.execute(
                    "UPDATE upload_jobs SET status = 'failed', error = ?2, result_location = NULL,
                     completed_at = NULL, updated_at = ?3
                     WHERE source_file_ref = ?1",
                    params![source_file_ref, format!("Unreadable job record: {}", e), now],
                )?;
                Err(e)
            }
        }
    })
}

/// Resolves a job. Returns `false` when no job has this reference.
///
/// Re-applying an outcome overwrites the previous one; the opposite field
/// is cleared so exactly one of location/error is set.
pub fn record_outcome(
    db: &Database,
    source_file_ref: &str,
    outcome: &JobOutcome,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let now = to_db_time(now);
        let changed = match outcome {
            JobOutcome::Uploaded { location } => conn.execute(
                "UPDATE upload_jobs SET status = 'completed', result_location = ?2, error = NULL,
                 completed_at = ?3, updated_at = ?3
                 WHERE source_file_ref = ?1",
                params![source_file_ref, location, now],
            )?,
            JobOutcome::Failed { error } => conn.execute(
                "UPDATE upload_jobs SET status = 'failed', error = ?2, result_location = NULL,
                 completed_at = NULL, updated_at = ?3
                 WHERE source_file_ref = ?1",
                params![source_file_ref, error, now],
            )?,
        };
        Ok(changed > 0)
    })
}

/// Counts jobs per status in a single query.
pub fn count_by_status(db: &Database) -> Result<StatusCounts, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM upload_jobs GROUP BY status")?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, u64>(1)?)))?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let (status, count) = row?;
            match status.as_str() {
                "queued" => counts.queued = count,
                "processing" => counts.processing = count,
                "completed" => counts.completed = count,
                "failed" => counts.failed = count,
                other => log::warn!("Ignoring {} jobs with unknown status '{}'", count, other),
            }
        }
        Ok(counts)
    })
}

/// Rank of the submitter's earliest queued job, if any.
pub fn position_of(db: &Database, submitter_id: i64) -> Result<Option<u64>, DatabaseError> {
    db.with_conn(|conn| {
        let position = conn
            .query_row(
                "SELECT (
                     SELECT COUNT(*) FROM upload_jobs o
                     WHERE o.status = 'queued'
                       AND (o.created_at < j.created_at
                            OR (o.created_at = j.created_at AND o.rowid < j.rowid))
                 ) + 1
                 FROM upload_jobs j
                 WHERE j.submitter_id = ?1 AND j.status = 'queued'
                 ORDER BY j.created_at ASC, j.rowid ASC
                 LIMIT 1",
                params![submitter_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(position)
    })
}

/// Takes `processing` jobs last touched before `cutoff` out of processing.
///
/// Jobs with attempts left go back to `queued` with attempts unchanged.
/// Jobs that used their last attempt are resolved as `failed` and counted
/// in their submitter's stats, in the same transaction. Returns the number
/// of jobs moved either way.
pub fn reclaim_stale(
    db: &Database,
    cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let cutoff_text = to_db_time(cutoff);
        let now_text = to_db_time(now);
        let tx = conn.unchecked_transaction()?;

        let abandoned: Vec<i64> = {
            let mut stmt = tx.prepare(
                "UPDATE upload_jobs
                 SET status = 'failed',
                     error = 'Abandoned after ' || attempts ||
                             CASE WHEN attempts = 1 THEN ' attempt' ELSE ' attempts' END,
                     result_location = NULL, completed_at = NULL, updated_at = ?2
                 WHERE status = 'processing' AND updated_at < ?1
                   AND attempts >= max_attempts
                 RETURNING submitter_id",
            )?;
            let ids = stmt
                .query_map(params![cutoff_text, now_text], |r| r.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };
        for submitter_id in &abandoned {
            stats_repo::upsert_outcome(&tx, *submitter_id, false, 0, now)?;
        }

        let requeued = tx.execute(
            "UPDATE upload_jobs SET status = 'queued', updated_at = ?2
             WHERE status = 'processing' AND updated_at < ?1",
            params![cutoff_text, now_text],
        )?;

        tx.commit()?;

        if !abandoned.is_empty() {
            log::warn!(
                "Failed {} stale jobs that had no attempts left",
                abandoned.len()
            );
        }
        Ok(requeued as u64 + abandoned.len() as u64)
    })
}

/// Finds a job by its source file reference.
pub fn find_by_ref(db: &Database, source_file_ref: &str) -> Result<Option<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM upload_jobs WHERE source_file_ref = ?1",
                params![source_file_ref],
                JobRow::from_row,
            )
            .optional()?;
        row.map(Job::try_from).transpose()
    })
}

/// The submitter's most recent resolved jobs, newest first.
pub fn recent_for_submitter(
    db: &Database,
    submitter_id: i64,
    limit: u32,
) -> Result<Vec<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM upload_jobs
             WHERE submitter_id = ?1 AND status IN ('completed', 'failed')
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2",
        )?;
        let rows: Vec<JobRow> = stmt
            .query_map(params![submitter_id, limit], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(Job::try_from).collect()
    })
}

/// Changes the priority of a job. Higher priorities are claimed first.
pub fn set_priority(
    db: &Database,
    source_file_ref: &str,
    priority: i64,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE upload_jobs SET priority = ?2, updated_at = ?3 WHERE source_file_ref = ?1",
            params![source_file_ref, priority, to_db_time(now)],
        )?;
        Ok(changed > 0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{ContentCategory, JobStatus};
    use chrono::{Duration, TimeZone};
    use std::collections::HashSet;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn desc(file_ref: &str, submitter: i64) -> JobDescriptor {
        JobDescriptor::new(file_ref, submitter, 100)
            .with_name(format!("{}.bin", file_ref))
            .with_size(1024)
    }

    #[test]
    fn test_insert_returns_rank_and_stores_defaults() {
        let db = test_db();
        assert_eq!(insert_queued(&db, &desc("a", 1), 3, t0()).unwrap(), 1);
        assert_eq!(
            insert_queued(&db, &desc("b", 2), 3, t0() + Duration::seconds(1)).unwrap(),
            2
        );

        let job = find_by_ref(&db, "b").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.priority, 0);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_attempts, 3);
        assert_eq!(job.display_name, "b.bin");
        assert_eq!(job.declared_size, 1024);
        assert_eq!(job.created_at, t0() + Duration::seconds(1));
        assert_eq!(job.created_at, job.updated_at);
        assert!(job.result_location.is_none() && job.error.is_none());
    }

    #[test]
    fn test_insert_same_timestamp_ranks_by_insertion() {
        let db = test_db();
        assert_eq!(insert_queued(&db, &desc("a", 1), 3, t0()).unwrap(), 1);
        assert_eq!(insert_queued(&db, &desc("b", 1), 3, t0()).unwrap(), 2);
        assert_eq!(insert_queued(&db, &desc("c", 1), 3, t0()).unwrap(), 3);
    }

    #[test]
    fn test_insert_duplicate_reference_rejected() {
        let db = test_db();
        insert_queued(&db, &desc("dup", 1), 3, t0()).unwrap();
        let err = insert_queued(&db, &desc("dup", 2), 3, t0()).unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateJob(ref r) if r == "dup"));
    }

    #[test]
    fn test_insert_stores_category_and_note() {
        let db = test_db();
        let d = JobDescriptor::new("p1", 5, 9)
            .with_category(ContentCategory::Photo)
            .with_note("for the archive");
        insert_queued(&db, &d, 3, t0()).unwrap();

        let job = find_by_ref(&db, "p1").unwrap().unwrap();
        assert_eq!(job.category, ContentCategory::Photo);
        assert_eq!(job.display_name, "photo_p1.jpg");
        assert_eq!(job.note.as_deref(), Some("for the archive"));
    }

    #[test]
    fn test_claim_order_is_creation_order_for_equal_priority() {
        let db = test_db();
        for i in 0..5 {
            insert_queued(&db, &desc(&format!("j{}", i), 1), 3, t0() + Duration::seconds(i)).unwrap();
        }

        let claimed: Vec<String> = (0..5)
            .map(|_| claim_next(&db, t0() + Duration::minutes(1)).unwrap().unwrap().source_file_ref)
            .collect();
        assert_eq!(claimed, vec!["j0", "j1", "j2", "j3", "j4"]);
        assert!(claim_next(&db, t0()).unwrap().is_none());
    }

    #[test]
    fn test_claim_prefers_higher_priority() {
        let db = test_db();
        insert_queued(&db, &desc("old", 1), 3, t0()).unwrap();
        insert_queued(&db, &desc("urgent", 2), 3, t0() + Duration::seconds(5)).unwrap();
        set_priority(&db, "urgent", 10, t0()).unwrap();

        let first = claim_next(&db, t0()).unwrap().unwrap();
        assert_eq!(first.source_file_ref, "urgent");
        let second = claim_next(&db, t0()).unwrap().unwrap();
        assert_eq!(second.source_file_ref, "old");
    }

    #[test]
    fn test_claim_transitions_record() {
        let db = test_db();
        insert_queued(&db, &desc("a", 1), 3, t0()).unwrap();

        let claimed_at = t0() + Duration::seconds(30);
        let job = claim_next(&db, claimed_at).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.updated_at, claimed_at);
        assert_eq!(job.created_at, t0());

        let counts = count_by_status(&db).unwrap();
        assert_eq!(counts.queued, 0);
        assert_eq!(counts.processing, 1);
    }

    #[test]
    fn test_concurrent_claims_never_share_a_job() {
        let db = test_db();
        for i in 0..40 {
            insert_queued(&db, &desc(&format!("c{}", i), i % 4), 3, t0()).unwrap();
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                std::thread::spawn(move || {
                    let mut mine = Vec::new();
                    while let Some(job) = claim_next(&db, t0()).unwrap() {
                        mine.push(job.id);
                    }
                    mine
                })
            })
            .collect();

        let mut seen = HashSet::new();
        let mut total = 0;
        for handle in handles {
            for id in handle.join().unwrap() {
                total += 1;
                assert!(seen.insert(id), "job claimed twice");
            }
        }
        assert_eq!(total, 40);
    }

    #[test]
    fn test_exhausted_job_is_failed_by_the_sweep() {
        let db = test_db();
        insert_queued(&db, &desc("x", 1), 2, t0()).unwrap();

        for round in 1..=2 {
            let job = claim_next(&db, t0()).unwrap().unwrap();
            assert_eq!(job.attempts, round);
            // Abandoned mid-upload, then swept.
            assert_eq!(reclaim_stale(&db, t0() + Duration::hours(2), t0()).unwrap(), 1);
        }

        let job = find_by_ref(&db, "x").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 2);
        assert_eq!(job.error.as_deref(), Some("Abandoned after 2 attempts"));
        assert!(claim_next(&db, t0()).unwrap().is_none());

        let stats = stats_repo::get(&db, 1).unwrap();
        assert_eq!(stats.total_submitted, 1);
        assert_eq!(stats.total_failed, 1);
        assert_eq!(stats.total_bytes, 0);
    }

    #[test]
    fn test_abandoned_job_does_not_hold_a_queue_position() {
        let db = test_db();
        insert_queued(&db, &desc("once", 1), 1, t0()).unwrap();
        claim_next(&db, t0()).unwrap().unwrap();

        let later = t0() + Duration::hours(2);
        reclaim_stale(&db, later - Duration::hours(1), later).unwrap();

        assert_eq!(position_of(&db, 1).unwrap(), None);
        assert_eq!(insert_queued(&db, &desc("next", 2), 1, later).unwrap(), 1);
        assert_eq!(count_by_status(&db).unwrap().queued, 1);
        assert_eq!(
            find_by_ref(&db, "once").unwrap().unwrap().error.as_deref(),
            Some("Abandoned after 1 attempt")
        );
    }

    #[test]
    fn test_insert_rejects_size_that_does_not_fit() {
        let db = test_db();
        let oversized = JobDescriptor::new("big", 1, 1).with_size(u64::MAX);
        assert!(matches!(
            insert_queued(&db, &oversized, 3, t0()),
            Err(DatabaseError::OutOfRange { column: "declared_size", .. })
        ));
        assert_eq!(count_by_status(&db).unwrap(), StatusCounts::default());
    }

    #[test]
    fn test_unreadable_row_is_failed_instead_of_claimed() {
        let db = test_db();
        insert_queued(&db, &desc("bad", 1), 3, t0()).unwrap();
        insert_queued(&db, &desc("good", 1), 3, t0()).unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE upload_jobs SET declared_size = -5 WHERE source_file_ref = 'bad'",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        assert!(matches!(
            claim_next(&db, t0()),
            Err(DatabaseError::CorruptRow { column: "declared_size", .. })
        ));
        let counts = count_by_status(&db).unwrap();
        assert_eq!(counts.processing, 0);
        assert_eq!(counts.failed, 1);

        let (status, attempts, error): (String, i64, String) = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT status, attempts, error FROM upload_jobs WHERE source_file_ref = 'bad'",
                    [],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                )?)
            })
            .unwrap();
        assert_eq!(status, "failed");
        assert_eq!(attempts, 0);
        assert!(error.starts_with("Unreadable job record"));

        // The queue moves on to the next job.
        let job = claim_next(&db, t0()).unwrap().unwrap();
        assert_eq!(job.source_file_ref, "good");
    }

    #[test]
    fn test_record_success_and_failure() {
        let db = test_db();
        insert_queued(&db, &desc("ok", 1), 3, t0()).unwrap();
        insert_queued(&db, &desc("bad", 1), 3, t0()).unwrap();
        claim_next(&db, t0()).unwrap();
        claim_next(&db, t0()).unwrap();

        let done = t0() + Duration::minutes(2);
        assert!(record_outcome(
            &db,
            "ok",
            &JobOutcome::Uploaded {
                location: "https://host/ok".into()
            },
            done
        )
        .unwrap());
        assert!(record_outcome(
            &db,
            "bad",
            &JobOutcome::Failed {
                error: "HTTP 500: nope".into()
            },
            done
        )
        .unwrap());

        let ok = find_by_ref(&db, "ok").unwrap().unwrap();
        assert_eq!(ok.status, JobStatus::Completed);
        assert_eq!(ok.result_location.as_deref(), Some("https://host/ok"));
        assert!(ok.error.is_none());
        assert_eq!(ok.completed_at, Some(done));

        let bad = find_by_ref(&db, "bad").unwrap().unwrap();
        assert_eq!(bad.status, JobStatus::Failed);
        assert_eq!(bad.error.as_deref(), Some("HTTP 500: nope"));
        assert!(bad.result_location.is_none());

        let counts = count_by_status(&db).unwrap();
        assert_eq!(
            counts,
            StatusCounts {
                queued: 0,
                processing: 0,
                completed: 1,
                failed: 1
            }
        );
    }

    #[test]
    fn test_record_outcome_overwrites_and_keeps_one_field() {
        let db = test_db();
        insert_queued(&db, &desc("r", 1), 3, t0()).unwrap();
        record_outcome(&db, "r", &JobOutcome::Failed { error: "first".into() }, t0()).unwrap();
        record_outcome(
            &db,
            "r",
            &JobOutcome::Uploaded {
                location: "https://host/r".into(),
            },
            t0(),
        )
        .unwrap();

        let job = find_by_ref(&db, "r").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error.is_none());
        assert_eq!(job.created_at, t0());
    }

    #[test]
    fn test_record_outcome_unknown_reference() {
        let db = test_db();
        let found = record_outcome(&db, "ghost", &JobOutcome::Failed { error: "x".into() }, t0())
            .unwrap();
        assert!(!found);
    }

    #[test]
    fn test_position_of_uses_earliest_queued_job() {
        let db = test_db();
        insert_queued(&db, &desc("a1", 1), 3, t0()).unwrap();
        insert_queued(&db, &desc("b1", 2), 3, t0() + Duration::seconds(1)).unwrap();
        insert_queued(&db, &desc("b2", 2), 3, t0() + Duration::seconds(2)).unwrap();
        insert_queued(&db, &desc("a2", 1), 3, t0() + Duration::seconds(3)).unwrap();

        assert_eq!(position_of(&db, 1).unwrap(), Some(1));
        assert_eq!(position_of(&db, 2).unwrap(), Some(2));
        assert_eq!(position_of(&db, 3).unwrap(), None);

        // Once a1 is claimed, submitter 1's earliest queued job is a2.
        claim_next(&db, t0()).unwrap();
        assert_eq!(position_of(&db, 1).unwrap(), Some(3));
        assert_eq!(position_of(&db, 2).unwrap(), Some(1));
    }

    #[test]
    fn test_enqueue_then_position_is_one_on_empty_queue() {
        let db = test_db();
        let rank = insert_queued(&db, &desc("solo", 9), 3, t0()).unwrap();
        assert_eq!(rank, 1);
        assert_eq!(position_of(&db, 9).unwrap(), Some(1));
    }

    #[test]
    fn test_reclaim_stale_only_touches_old_processing_jobs() {
        let db = test_db();
        for name in ["queued", "stale", "fresh", "done", "broken"] {
            insert_queued(&db, &desc(name, 1), 3, t0()).unwrap();
        }
        // Claim everything, then arrange each row's state by hand.
        let claimed_at = t0();
        for _ in 0..5 {
            claim_next(&db, claimed_at).unwrap();
        }
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE upload_jobs SET status = 'queued', attempts = 0 WHERE source_file_ref = 'queued'",
                [],
            )?;
            conn.execute(
                "UPDATE upload_jobs SET updated_at = ?1 WHERE source_file_ref = 'fresh'",
                params![to_db_time(t0() + Duration::minutes(50))],
            )?;
            Ok(())
        })
        .unwrap();
        record_outcome(&db, "done", &JobOutcome::Uploaded { location: "u".into() }, t0()).unwrap();
        record_outcome(&db, "broken", &JobOutcome::Failed { error: "e".into() }, t0()).unwrap();

        let now = t0() + Duration::minutes(61);
        let reclaimed = reclaim_stale(&db, now - Duration::hours(1), now).unwrap();
        assert_eq!(reclaimed, 1);

        let stale = find_by_ref(&db, "stale").unwrap().unwrap();
        assert_eq!(stale.status, JobStatus::Queued);
        assert_eq!(stale.attempts, 1);
        assert_eq!(stale.updated_at, now);

        assert_eq!(find_by_ref(&db, "fresh").unwrap().unwrap().status, JobStatus::Processing);
        assert_eq!(find_by_ref(&db, "done").unwrap().unwrap().status, JobStatus::Completed);
        assert_eq!(find_by_ref(&db, "broken").unwrap().unwrap().status, JobStatus::Failed);
        let untouched = find_by_ref(&db, "queued").unwrap().unwrap();
        assert_eq!(untouched.updated_at, claimed_at);
    }

    #[test]
    fn test_recent_for_submitter_lists_resolved_newest_first() {
        let db = test_db();
        for i in 0..4 {
            insert_queued(&db, &desc(&format!("h{}", i), 7), 3, t0() + Duration::seconds(i)).unwrap();
        }
        insert_queued(&db, &desc("other", 8), 3, t0()).unwrap();
        record_outcome(&db, "h0", &JobOutcome::Uploaded { location: "l0".into() }, t0()).unwrap();
        record_outcome(&db, "h2", &JobOutcome::Failed { error: "e2".into() }, t0()).unwrap();
        record_outcome(&db, "h3", &JobOutcome::Uploaded { location: "l3".into() }, t0()).unwrap();
        record_outcome(&db, "other", &JobOutcome::Uploaded { location: "x".into() }, t0()).unwrap();

        let recent = recent_for_submitter(&db, 7, 2).unwrap();
        let refs: Vec<&str> = recent.iter().map(|j| j.source_file_ref.as_str()).collect();
        assert_eq!(refs, vec!["h3", "h2"]);

        let all = recent_for_submitter(&db, 7, 10).unwrap();
        assert_eq!(all.len(), 3);
    }
}
