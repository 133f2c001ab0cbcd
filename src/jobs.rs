//! Durable job queue backed by the `jobs` table. Workers reserve rows with
//! `FOR UPDATE SKIP LOCKED`, so a job runs in at most one process at a time,
//! and a retry re-queues the same row.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDateTime};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::models::{Job, NewJob};
use crate::schema::jobs;

/// Delivers one alert email. Payload: [`AlertDeliveryPayload`].
pub const JOB_SEND_ALERT_EMAIL: &str = "send-alert-email";

/// A `processing` row untouched for this long belongs to a worker that died
/// mid-job and may be reserved again. Well above the mail relay timeout.
pub const STALE_PROCESSING_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Processing,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertDeliveryPayload {
    pub alert_id: Uuid,
}

#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("malformed job payload: {0}")]
    Payload(#[from] serde_json::Error),
}

pub type JobQueueResult<T> = Result<T, JobQueueError>;

/// Queues a delivery attempt for `alert_id`, runnable from `now`.
pub fn enqueue_alert_delivery(
    conn: &mut PgConnection,
    alert_id: Uuid,
    now: NaiveDateTime,
) -> JobQueueResult<Job> {
    let payload = serde_json::to_value(AlertDeliveryPayload { alert_id })?;
    let job = diesel::insert_into(jobs::table)
        .values(&NewJob {
            id: Uuid::new_v4(),
            job_type: JOB_SEND_ALERT_EMAIL.to_string(),
            payload,
            status: JobStatus::Queued.as_str().to_string(),
            run_after: now,
        })
        .get_result(conn)?;
    Ok(job)
}

pub fn alert_delivery_payload(job: &Job) -> JobQueueResult<AlertDeliveryPayload> {
    Ok(serde_json::from_value(job.payload.clone())?)
}

/// Whether a delivery job for `alert_id` is still queued or running.
pub fn alert_delivery_in_flight(conn: &mut PgConnection, alert_id: Uuid) -> JobQueueResult<bool> {
    let payload = serde_json::to_value(AlertDeliveryPayload { alert_id })?;
    let live: i64 = jobs::table
        .filter(jobs::job_type.eq(JOB_SEND_ALERT_EMAIL))
        .filter(jobs::status.eq_any([JobStatus::Queued.as_str(), JobStatus::Processing.as_str()]))
        .filter(jobs::payload.eq(payload))
        .count()
        .get_result(conn)?;
    Ok(live > 0)
}

/// Takes the oldest runnable job of the given types and bumps its attempt
/// counter, so `attempts` on the returned row counts the current attempt.
/// Stale `processing` rows count as runnable.
pub fn reserve_job(
    conn: &mut PgConnection,
    job_types: &[&str],
    now: NaiveDateTime,
) -> JobQueueResult<Option<Job>> {
    let stale_before = now - ChronoDuration::minutes(STALE_PROCESSING_MINUTES);
    let reserved = conn.transaction(|conn| {
        let candidate: Option<(Uuid, String)> = jobs::table
            .filter(
                jobs::status
                    .eq(JobStatus::Queued.as_str())
                    .and(jobs::run_after.le(now))
                    .or(jobs::status
                        .eq(JobStatus::Processing.as_str())
                        .and(jobs::updated_at.lt(stale_before))),
            )
            .filter(jobs::job_type.eq_any(job_types))
            .order(jobs::run_after.asc())
            .select((jobs::id, jobs::status))
            .for_update()
            .skip_locked()
            .first(conn)
            .optional()?;

        match candidate {
            Some((id, status)) => {
                if status == JobStatus::Processing.as_str() {
                    warn!(job_id = %id, "reclaiming job abandoned mid-run");
                }
                diesel::update(jobs::table.find(id))
                    .set((
                        jobs::status.eq(JobStatus::Processing.as_str()),
                        jobs::attempts.eq(jobs::attempts + 1),
                        jobs::updated_at.eq(now),
                    ))
                    .get_result::<Job>(conn)
                    .map(Some)
            }
            None => Ok(None),
        }
    })?;
    Ok(reserved)
}

fn set_status(
    conn: &mut PgConnection,
    job_id: Uuid,
    status: JobStatus,
    error_message: Option<&str>,
    now: NaiveDateTime,
) -> JobQueueResult<()> {
    diesel::update(jobs::table.find(job_id))
        .set((
            jobs::status.eq(status.as_str()),
            jobs::last_error.eq(error_message),
            jobs::updated_at.eq(now),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn mark_job_succeeded(
    conn: &mut PgConnection,
    job_id: Uuid,
    now: NaiveDateTime,
) -> JobQueueResult<()> {
    set_status(conn, job_id, JobStatus::Succeeded, None, now)
}

pub fn mark_job_failed(
    conn: &mut PgConnection,
    job_id: Uuid,
    error_message: &str,
    now: NaiveDateTime,
) -> JobQueueResult<()> {
    set_status(conn, job_id, JobStatus::Failed, Some(error_message), now)
}

/// Puts the job back in the queue, runnable again after `delay`.
pub fn retry_job_after(
    conn: &mut PgConnection,
    job_id: Uuid,
    delay: Duration,
    error_message: &str,
    now: NaiveDateTime,
) -> JobQueueResult<()> {
    let delay = ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::minutes(5));
    diesel::update(jobs::table.find(job_id))
        .set((
            jobs::status.eq(JobStatus::Queued.as_str()),
            jobs::run_after.eq(now + delay),
            jobs::last_error.eq(Some(error_message)),
            jobs::updated_at.eq(now),
        ))
        .execute(conn)?;
    Ok(())
}

/// Removes succeeded jobs last touched before `cutoff`. Failed jobs are
/// kept for inspection.
pub fn purge_finished_jobs(conn: &mut PgConnection, cutoff: NaiveDateTime) -> JobQueueResult<usize> {
    let removed = diesel::delete(
        jobs::table
            .filter(jobs::status.eq(JobStatus::Succeeded.as_str()))
            .filter(jobs::updated_at.lt(cutoff)),
    )
    .execute(conn)?;
    Ok(removed)
}

/// Jobs per status, for the maintenance output.
pub fn job_counts(conn: &mut PgConnection) -> JobQueueResult<Vec<(String, i64)>> {
    let counts = jobs::table
        .group_by(jobs::status)
        .select((jobs::status, diesel::dsl::count_star()))
        .order(jobs::status.asc())
        .load(conn)?;
    Ok(counts)
}
