//! Durable reconciliation queue (SQLite).
//!
//! A task is `queued` until a worker leases it. Leasing bumps `attempts` and
//! stamps an expiry; a lease that expires without being finished is handed to
//! the next worker that asks. Finished tasks end `done` or `failed`, and a
//! lead has at most one `queued`/`leased` task at a time.

use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared_utils::tz::to_rfc3339_millis;
use tracing::{info, warn};

use crate::{
    ledger::RepoResult,
    models::{NewReconcileTask, ReconcileTask},
    schema::reconcile_tasks::{self, dsl as rt},
    worker::{Backoffs, Outcome, ReconcileError},
};

/// Lifecycle states stored in `reconcile_tasks.state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Leased,
    Done,
    Failed,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Leased => "leased",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task claimed by one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeasedTask {
    pub task_id: i32,
    pub lead_id: i32,
    /// Runs so far, including this one.
    pub attempts: i32,
}

/// What [`apply_result`] did with a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskDisposition {
    Done { status: String },
    Requeued { run_at: DateTime<Utc> },
    Failed { error: String },
}

fn ts(dt: DateTime<Utc>) -> String {
    to_rfc3339_millis(dt)
}

fn add(now: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(d)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Queue a reconciliation for `lead_id`.
///
/// Returns `None` when the lead already has an active task.
pub fn enqueue(
    conn: &mut SqliteConnection,
    lead_id: i32,
    run_at: DateTime<Utc>,
) -> RepoResult<Option<i32>> {
    let run_at = ts(run_at);
    let id = diesel::insert_into(reconcile_tasks::table)
        .values(&NewReconcileTask {
            lead_id,
            run_at: &run_at,
        })
        .on_conflict_do_nothing()
        .returning(rt::id)
        .get_result::<i32>(conn)
        .optional()?;
    Ok(id)
}

/// Claim up to `limit` due tasks for `worker`.
///
/// Due means `queued` with `run_at <= now`, or `leased` with an expired lease.
pub fn lease(
    conn: &mut SqliteConnection,
    worker: &str,
    limit: i64,
    ttl: Duration,
    now: DateTime<Utc>,
) -> RepoResult<Vec<LeasedTask>> {
    let now_s = ts(now);
    let expires = ts(add(now, ttl));

    conn.immediate_transaction(|conn| {
        let due: Vec<(i32, i32, i32)> = rt::reconcile_tasks
            .filter(
                rt::state
                    .eq(TaskState::Queued.as_str())
                    .and(rt::run_at.le(now_s.as_str()))
                    .or(rt::state
                        .eq(TaskState::Leased.as_str())
                        .and(rt::lease_expires_at.le(now_s.as_str()))),
            )
            .order((rt::run_at.asc(), rt::id.asc()))
            .limit(limit)
            .select((rt::id, rt::lead_id, rt::attempts))
            .load(conn)?;

        let mut leased = Vec::with_capacity(due.len());
        for (task_id, lead_id, attempts) in due {
            diesel::update(rt::reconcile_tasks.find(task_id))
                .set((
                    rt::state.eq(TaskState::Leased.as_str()),
                    rt::attempts.eq(attempts + 1),
                    rt::lease_owner.eq(Some(worker)),
                    rt::lease_expires_at.eq(Some(expires.as_str())),
                ))
                .execute(conn)?;
            leased.push(LeasedTask {
                task_id,
                lead_id,
                attempts: attempts + 1,
            });
        }
        Ok(leased)
    })
}

/// Finish a task successfully with a terminal status.
pub fn complete(conn: &mut SqliteConnection, task_id: i32, status: &str) -> RepoResult<()> {
    diesel::update(rt::reconcile_tasks.find(task_id))
        .set((
            rt::state.eq(TaskState::Done.as_str()),
            rt::last_status.eq(Some(status)),
            rt::lease_owner.eq(None::<String>),
            rt::lease_expires_at.eq(None::<String>),
        ))
        .execute(conn)?;
    Ok(())
}

/// Put a task back in the queue to run at `run_at`.
pub fn reschedule(
    conn: &mut SqliteConnection,
    task_id: i32,
    run_at: DateTime<Utc>,
    reason: &str,
) -> RepoResult<()> {
    diesel::update(rt::reconcile_tasks.find(task_id))
        .set((
            rt::state.eq(TaskState::Queued.as_str()),
            rt::run_at.eq(ts(run_at)),
            rt::last_error.eq(Some(reason)),
            rt::lease_owner.eq(None::<String>),
            rt::lease_expires_at.eq(None::<String>),
        ))
        .execute(conn)?;
    Ok(())
}

/// Give up on a task; it stays listed for operator inspection.
pub fn fail(conn: &mut SqliteConnection, task_id: i32, error: &str) -> RepoResult<()> {
    diesel::update(rt::reconcile_tasks.find(task_id))
        .set((
            rt::state.eq(TaskState::Failed.as_str()),
            rt::last_error.eq(Some(error)),
            rt::lease_owner.eq(None::<String>),
            rt::lease_expires_at.eq(None::<String>),
        ))
        .execute(conn)?;
    Ok(())
}

/// Failed tasks, most recently updated first.
pub fn list_failed(conn: &mut SqliteConnection) -> RepoResult<Vec<ReconcileTask>> {
    let rows = rt::reconcile_tasks
        .filter(rt::state.eq(TaskState::Failed.as_str()))
        .order((rt::updated_at.desc(), rt::id.desc()))
        .select(ReconcileTask::as_select())
        .load(conn)?;
    Ok(rows)
}

/// Load one task.
pub fn find_task(conn: &mut SqliteConnection, task_id: i32) -> RepoResult<Option<ReconcileTask>> {
    let row = rt::reconcile_tasks
        .find(task_id)
        .select(ReconcileTask::as_select())
        .first(conn)
        .optional()?;
    Ok(row)
}

/// Record the result of one run on its task.
///
/// Terminal statuses finish the task. A retry is requeued while `attempts`
/// is within `max_retries`, so a task runs at most `max_retries + 1` times
/// before it is failed. Storage errors retry at the short backoff; every
/// other error fails the task at once.
pub fn apply_result(
    conn: &mut SqliteConnection,
    task: &LeasedTask,
    result: &Result<Outcome, ReconcileError>,
    max_retries: u32,
    backoffs: &Backoffs,
    now: DateTime<Utc>,
) -> RepoResult<TaskDisposition> {
    let over_cap = i64::from(task.attempts) > i64::from(max_retries);

    let (after, reason) = match result {
        Ok(Outcome::Finished(status)) => {
            complete(conn, task.task_id, status.as_str())?;
            info!(task_id = task.task_id, lead_id = task.lead_id, status = status.as_str(), "task done");
            return Ok(TaskDisposition::Done {
                status: status.as_str().to_string(),
            });
        }
        Ok(Outcome::Retry { after, reason }) => (*after, reason.to_string()),
        Err(e @ ReconcileError::Storage(_)) => (backoffs.short, e.to_string()),
        Err(e) => {
            let error = e.to_string();
            fail(conn, task.task_id, &error)?;
            warn!(task_id = task.task_id, lead_id = task.lead_id, error = %error, "task failed");
            return Ok(TaskDisposition::Failed { error });
        }
    };

    if over_cap {
        let error = format!("retry limit reached after {} attempts: {reason}", task.attempts);
        fail(conn, task.task_id, &error)?;
        warn!(task_id = task.task_id, lead_id = task.lead_id, error = %error, "task failed");
        return Ok(TaskDisposition::Failed { error });
    }

    let run_at = add(now, after);
    reschedule(conn, task.task_id, run_at, &reason)?;
    info!(
        task_id = task.task_id,
        lead_id = task.lead_id,
        attempts = task.attempts,
        run_at = %ts(run_at),
        reason = %reason,
        "task requeued"
    );
    Ok(TaskDisposition::Requeued { run_at })
}
