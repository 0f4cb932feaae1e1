//! Worker pool draining the reconciliation queue.
//!
//! Each loop owns its own SQLite connection, leases one task at a time, runs
//! [`reconcile_lead`] and records the result on the task. Loops sleep for the
//! poll interval when the queue is empty and stop when the shutdown flag flips.

use chrono::Utc;
use diesel::SqliteConnection;
use tokio::{sync::watch, task::JoinSet};
use tracing::{Instrument, error, info};

use crate::{
    config::WorkerSettings,
    db::connection::connect_sqlite_with_timeout,
    ledger::RepoResult,
    observability::worker_span,
    queue::{self, LeasedTask, TaskDisposition},
    worker::{ReconcileDeps, ReconcileSettings, reconcile_lead},
};

/// Lease and run at most one due task. Returns `None` when nothing was due.
pub async fn run_once(
    conn: &mut SqliteConnection,
    worker: &str,
    deps: &ReconcileDeps,
    settings: &ReconcileSettings,
    worker_settings: &WorkerSettings,
) -> RepoResult<Option<(LeasedTask, TaskDisposition)>> {
    let Some(task) = queue::lease(conn, worker, 1, worker_settings.lease_ttl(), Utc::now())?
        .into_iter()
        .next()
    else {
        return Ok(None);
    };

    let result = reconcile_lead(conn, task.lead_id, deps, settings, Utc::now()).await;
    let disposition = queue::apply_result(
        conn,
        &task,
        &result,
        worker_settings.max_retries,
        &settings.backoffs,
        Utc::now(),
    )?;
    Ok(Some((task, disposition)))
}

/// Run tasks until none is due; returns how many ran.
pub async fn drain(
    conn: &mut SqliteConnection,
    worker: &str,
    deps: &ReconcileDeps,
    settings: &ReconcileSettings,
    worker_settings: &WorkerSettings,
) -> RepoResult<usize> {
    let mut ran = 0;
    while run_once(conn, worker, deps, settings, worker_settings)
        .await?
        .is_some()
    {
        ran += 1;
    }
    Ok(ran)
}

async fn worker_loop(
    name: String,
    database_url: String,
    deps: ReconcileDeps,
    settings: ReconcileSettings,
    worker_settings: WorkerSettings,
    mut shutdown: watch::Receiver<bool>,
) -> RepoResult<()> {
    let mut conn = connect_sqlite_with_timeout(&database_url, worker_settings.busy_timeout())?;
    info!("worker started");

    while !*shutdown.borrow() {
        match run_once(&mut conn, &name, &deps, &settings, &worker_settings).await {
            Ok(Some(_)) => continue,
            Ok(None) => {}
            Err(e) => error!(error = %e, "queue operation failed"),
        }
        tokio::select! {
            _ = tokio::time::sleep(worker_settings.poll_interval()) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!("worker stopped");
    Ok(())
}

/// Spawn `worker_settings.concurrency` loops and wait until all have stopped.
pub async fn run_pool(
    database_url: &str,
    deps: ReconcileDeps,
    settings: ReconcileSettings,
    worker_settings: WorkerSettings,
    shutdown: watch::Receiver<bool>,
) -> RepoResult<()> {
    let mut set = JoinSet::new();
    for i in 0..worker_settings.concurrency.max(1) {
        let name = format!("worker-{i}");
        let span = worker_span(&name);
        set.spawn(
            worker_loop(
                name,
                database_url.to_string(),
                deps.clone(),
                settings.clone(),
                worker_settings.clone(),
                shutdown.clone(),
            )
            .instrument(span),
        );
    }

    let mut first_error = None;
    while let Some(joined) = set.join_next().await {
        let res = joined.map_err(anyhow::Error::from).and_then(|r| r);
        if let Err(e) = res {
            error!(error = %e, "worker exited with error");
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
