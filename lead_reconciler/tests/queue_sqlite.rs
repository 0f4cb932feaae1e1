mod common;

use std::time::Duration;

use chrono::Duration as ChronoDuration;
use common::*;
use diesel::RunQueryDsl;
use lead_reconciler::{
    intake::{LeadEvent, accept_lead_event},
    queue::{self, TaskDisposition, TaskState},
    worker::{Backoffs, Outcome, ReconcileError, RetryReason, Status},
};
use serde_json::json;

const TTL: Duration = Duration::from_secs(300);

fn plain_lead(conn: &mut diesel::SqliteConnection, id: &str) -> i32 {
    // status "new" is not qualified, so intake queues nothing
    insert_lead(conn, json!({"id": id, "caller_number": "5551234567", "lead_status": "new"}))
}

#[test]
fn enqueue_keeps_one_active_task_per_lead() {
    let (_db, mut conn) = setup_db();
    let lead = plain_lead(&mut conn, "a");

    let first = queue::enqueue(&mut conn, lead, now()).unwrap();
    assert!(first.is_some());
    assert_eq!(queue::enqueue(&mut conn, lead, now()).unwrap(), None);

    let task = queue::lease(&mut conn, "w1", 10, TTL, now()).unwrap();
    assert_eq!(task.len(), 1);
    assert_eq!(queue::enqueue(&mut conn, lead, now()).unwrap(), None);

    queue::complete(&mut conn, task[0].task_id, "ok").unwrap();
    assert!(queue::enqueue(&mut conn, lead, now()).unwrap().is_some());
}

#[test]
fn lease_claims_due_tasks_in_order() {
    let (_db, mut conn) = setup_db();
    let a = plain_lead(&mut conn, "a");
    let b = plain_lead(&mut conn, "b");
    let c = plain_lead(&mut conn, "c");
    queue::enqueue(&mut conn, b, now() - ChronoDuration::minutes(5)).unwrap();
    queue::enqueue(&mut conn, a, now() - ChronoDuration::minutes(10)).unwrap();
    queue::enqueue(&mut conn, c, now() + ChronoDuration::hours(1)).unwrap();

    let leased = queue::lease(&mut conn, "w1", 10, TTL, now()).unwrap();
    let leads: Vec<_> = leased.iter().map(|t| t.lead_id).collect();
    assert_eq!(leads, [a, b]);
    assert!(leased.iter().all(|t| t.attempts == 1));

    // nothing left that is due
    assert!(queue::lease(&mut conn, "w2", 10, TTL, now()).unwrap().is_empty());

    let row = queue::find_task(&mut conn, leased[0].task_id).unwrap().unwrap();
    assert_eq!(row.state, TaskState::Leased.as_str());
    assert_eq!(row.lease_owner.as_deref(), Some("w1"));
}

#[test]
fn lease_respects_the_limit() {
    let (_db, mut conn) = setup_db();
    for id in ["a", "b", "c"] {
        let lead = plain_lead(&mut conn, id);
        queue::enqueue(&mut conn, lead, now()).unwrap();
    }
    assert_eq!(queue::lease(&mut conn, "w1", 2, TTL, now()).unwrap().len(), 2);
    assert_eq!(queue::lease(&mut conn, "w2", 2, TTL, now()).unwrap().len(), 1);
}

#[test]
fn expired_lease_is_reclaimed() {
    let (_db, mut conn) = setup_db();
    let lead = plain_lead(&mut conn, "a");
    queue::enqueue(&mut conn, lead, now()).unwrap();

    let first = queue::lease(&mut conn, "w1", 1, TTL, now()).unwrap();
    assert_eq!(first[0].attempts, 1);

    // still held just before expiry
    let before = now() + ChronoDuration::seconds(299);
    assert!(queue::lease(&mut conn, "w2", 1, TTL, before).unwrap().is_empty());

    let after = now() + ChronoDuration::seconds(300);
    let second = queue::lease(&mut conn, "w2", 1, TTL, after).unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].task_id, first[0].task_id);
    assert_eq!(second[0].attempts, 2);

    let row = queue::find_task(&mut conn, second[0].task_id).unwrap().unwrap();
    assert_eq!(row.lease_owner.as_deref(), Some("w2"));
}

#[test]
fn finished_runs_complete_the_task() {
    let (_db, mut conn) = setup_db();
    let lead = plain_lead(&mut conn, "a");
    queue::enqueue(&mut conn, lead, now()).unwrap();
    let task = queue::lease(&mut conn, "w1", 1, TTL, now()).unwrap().remove(0);

    let d = queue::apply_result(
        &mut conn,
        &task,
        &Ok(Outcome::Finished(Status::WafBlocked)),
        3,
        &Backoffs::default(),
        now(),
    )
    .unwrap();
    assert_eq!(
        d,
        TaskDisposition::Done {
            status: "waf_blocked".into()
        }
    );

    let row = queue::find_task(&mut conn, task.task_id).unwrap().unwrap();
    assert_eq!(row.state, "done");
    assert_eq!(row.last_status.as_deref(), Some("waf_blocked"));
    assert!(row.lease_owner.is_none());
}

#[test]
fn retries_are_requeued_until_the_cap() {
    let (_db, mut conn) = setup_db();
    let lead = plain_lead(&mut conn, "a");
    queue::enqueue(&mut conn, lead, now()).unwrap();
    let backoffs = Backoffs::default();
    let retry = Ok(Outcome::Retry {
        after: Duration::from_secs(60),
        reason: RetryReason::NoOrders,
    });

    let mut clock = now();
    for attempt in 1..=3 {
        let task = queue::lease(&mut conn, "w1", 1, TTL, clock).unwrap().remove(0);
        assert_eq!(task.attempts, attempt);
        let d = queue::apply_result(&mut conn, &task, &retry, 2, &backoffs, clock).unwrap();
        if attempt < 3 {
            assert_eq!(
                d,
                TaskDisposition::Requeued {
                    run_at: clock + ChronoDuration::seconds(60)
                }
            );
            // not due before run_at
            assert!(queue::lease(&mut conn, "w1", 1, TTL, clock).unwrap().is_empty());
            clock += ChronoDuration::seconds(60);
        } else {
            match d {
                TaskDisposition::Failed { error } => {
                    assert!(error.contains("retry limit reached after 3 attempts"), "{error}");
                    assert!(error.contains("no orders yet"), "{error}");
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    let failed = queue::list_failed(&mut conn).unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].lead_id, lead);
    assert_eq!(failed[0].attempts, 3);
}

#[test]
fn storage_errors_retry_at_the_short_backoff() {
    let (_db, mut conn) = setup_db();
    let lead = plain_lead(&mut conn, "a");
    queue::enqueue(&mut conn, lead, now()).unwrap();
    let task = queue::lease(&mut conn, "w1", 1, TTL, now()).unwrap().remove(0);
    let backoffs = Backoffs::default();

    let err = Err(ReconcileError::Storage(anyhow::anyhow!("database is locked")));
    let d = queue::apply_result(&mut conn, &task, &err, 3, &backoffs, now()).unwrap();
    assert_eq!(
        d,
        TaskDisposition::Requeued {
            run_at: now() + ChronoDuration::from_std(backoffs.short).unwrap()
        }
    );
    let row = queue::find_task(&mut conn, task.task_id).unwrap().unwrap();
    assert!(row.last_error.unwrap().contains("database is locked"));
}

#[test]
fn fatal_errors_fail_at_once() {
    let (_db, mut conn) = setup_db();
    let lead = plain_lead(&mut conn, "a");
    queue::enqueue(&mut conn, lead, now()).unwrap();
    let task = queue::lease(&mut conn, "w1", 1, TTL, now()).unwrap().remove(0);

    let err = Err(ReconcileError::LeadNotFound(lead));
    let d = queue::apply_result(&mut conn, &task, &err, 3, &Backoffs::default(), now()).unwrap();
    assert!(matches!(d, TaskDisposition::Failed { .. }));
    assert_eq!(queue::list_failed(&mut conn).unwrap().len(), 1);
}

#[test]
fn intake_queues_qualified_leads_once() {
    let (_db, mut conn) = setup_db();
    let payload = json!({"id": 991, "caller_number": "5551234567", "gclid": "g", "lead_status": "Good"});
    let event = LeadEvent::from_payload(payload, now());

    let first = accept_lead_event(&mut conn, &event, now()).unwrap();
    assert!(first.created);
    assert!(first.task_id.is_some());

    // redelivery reuses the lead and the active task
    let again = accept_lead_event(&mut conn, &event, now()).unwrap();
    assert_eq!(again.lead_id, first.lead_id);
    assert!(!again.created);
    assert_eq!(again.task_id, None);
    assert_eq!(count(&mut conn, "SELECT COUNT(*) AS cnt FROM leads"), 1);
    assert_eq!(count(&mut conn, "SELECT COUNT(*) AS cnt FROM reconcile_tasks"), 1);
}

#[test]
fn intake_skips_unqualified_and_processed_leads() {
    let (_db, mut conn) = setup_db();
    let cold = LeadEvent::from_payload(json!({"id": "c1", "lead_status": "spam"}), now());
    let receipt = accept_lead_event(&mut conn, &cold, now()).unwrap();
    assert!(receipt.created);
    assert_eq!(receipt.task_id, None);

    let by_milestone = LeadEvent::from_payload(
        json!({"id": "c2", "lead_status": "new", "milestones": {"qualified": {"at": "2025-01-10"}}}),
        now(),
    );
    assert!(accept_lead_event(&mut conn, &by_milestone, now()).unwrap().task_id.is_some());

    // once processed, a redelivery queues nothing
    let warm = LeadEvent::from_payload(json!({"id": "c3", "lead_status": "good"}), now());
    let r = accept_lead_event(&mut conn, &warm, now()).unwrap();
    let task = queue::lease(&mut conn, "w1", 10, TTL, now()).unwrap();
    for t in &task {
        queue::complete(&mut conn, t.task_id, "ok").unwrap();
    }
    diesel::sql_query(format!("UPDATE leads SET processed = 1 WHERE id = {}", r.lead_id))
        .execute(&mut conn)
        .unwrap();
    assert_eq!(accept_lead_event(&mut conn, &warm, now()).unwrap().task_id, None);
}
