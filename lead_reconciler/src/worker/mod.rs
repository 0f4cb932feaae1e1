//! Lead reconciliation state machine.
//!
//! [`reconcile_lead`] runs one attempt for one lead:
//!
//! 1. Load the lead without a lock; already processed leads stop here.
//! 2. Fetch the lead's orders from the commerce API.
//! 3. No orders yet: retry after the long backoff.
//! 4. Claim the lead ([`claim_lead`]), re-checking `processed`. A lead claimed
//!    by a live attempt is retried after the short backoff.
//! 5. For each finalized order, consult the conversion ledger and upload once.
//!    No database lock is held while waiting on either API.
//! 6. Write mirrors, ledger records and `processed` in one short transaction
//!    that also releases the claim. An upload failure keeps the lead open and
//!    retries after the medium backoff.
//!
//! Every call is idempotent: the ledger short-circuits pairs already uploaded
//! and a processed lead is never reopened.

pub mod identity;
mod upload;

use std::{fmt, sync::Arc, time::Duration};

use ad_conversions::uploader::ConversionUploader;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use commerce_orders::providers::{OrderProvider, ProviderError};
use diesel::SqliteConnection;
use serde_json::Value;
use thiserror::Error;
use tracing::{Instrument, info, warn};

use crate::{
    config::WorkerSettings,
    leads::{ClaimAttempt, claim_lead, find_lead},
    ledger::ConversionLedger,
    observability::reconcile_span,
    policy::is_order_finalized,
};
use identity::MatchStrategy;
use upload::{UploadOutcome, persist_report, report_order};

/// Terminal results of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// At least one conversion is recorded as uploaded.
    Ok,
    /// Finalized orders were seen but nothing is uploaded yet.
    PendingOrders,
    /// The commerce API served a bot-protection page; not retried.
    WafBlocked,
    /// Another attempt finished this lead first.
    AlreadyProcessed,
    /// Uploads ran in validate-only mode; the lead stays open for a live run.
    ValidatedOnly,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::PendingOrders => "pending_orders",
            Self::WafBlocked => "waf_blocked",
            Self::AlreadyProcessed => "already_processed",
            Self::ValidatedOnly => "validated_only",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an attempt asked to be retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryReason {
    /// Transient or throttled commerce API failure.
    CommerceUnavailable(String),
    /// The commerce API has no orders for the lead yet.
    NoOrders,
    /// Orders exist but none is finalized.
    NoFinalizedOrders,
    /// An upload failed.
    UploadFailed(String),
    /// Another attempt holds the lead.
    LeadBusy,
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommerceUnavailable(e) => write!(f, "commerce API unavailable: {e}"),
            Self::NoOrders => f.write_str("no orders yet"),
            Self::NoFinalizedOrders => f.write_str("no finalized orders yet"),
            Self::UploadFailed(e) => write!(f, "conversion upload failed: {e}"),
            Self::LeadBusy => f.write_str("lead claimed by another attempt"),
        }
    }
}

/// Result of one attempt that did not error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Finished(Status),
    Retry { after: Duration, reason: RetryReason },
}

/// Failures that end the attempt without a retry decision of its own.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("lead {0} not found")]
    LeadNotFound(i32),
    /// Non-retryable commerce failure: rejected credentials or an unexpected status.
    #[error("commerce lookup failed: {0}")]
    Commerce(#[source] ProviderError),
    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

/// Observable steps of an attempt, used as the `stage` log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Qualifying,
    PerUpload,
    Finalizing,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetching => "fetching",
            Self::Qualifying => "qualifying",
            Self::PerUpload => "per_upload",
            Self::Finalizing => "finalizing",
        }
    }
}

/// Retry delays by failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoffs {
    pub short: Duration,
    pub medium: Duration,
    pub long: Duration,
}

impl Default for Backoffs {
    fn default() -> Self {
        Backoffs::from(&WorkerSettings::default())
    }
}

impl From<&WorkerSettings> for Backoffs {
    fn from(w: &WorkerSettings) -> Self {
        Self {
            short: Duration::from_secs(w.short_backoff_secs),
            medium: Duration::from_secs(w.medium_backoff_secs),
            long: Duration::from_secs(w.long_backoff_secs),
        }
    }
}

/// Collaborators of the worker, chosen at startup.
#[derive(Clone)]
pub struct ReconcileDeps {
    pub orders: Arc<dyn OrderProvider>,
    pub uploader: Arc<dyn ConversionUploader>,
    pub ledger: Arc<dyn ConversionLedger>,
}

/// Immutable per-process worker settings.
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub backoffs: Backoffs,
    /// Zone for order timestamps without an offset.
    pub zone: Tz,
    /// How long an attempt holds its lead.
    pub claim_ttl: Duration,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            backoffs: Backoffs::default(),
            zone: Tz::UTC,
            claim_ttl: WorkerSettings::default().claim_ttl(),
        }
    }
}

fn stage_event(lead_id: i32, stage: Stage, outcome: &str) {
    info!(lead_id, stage = stage.as_str(), outcome, "reconcile stage");
}

/// Run one reconciliation attempt for `lead_id`.
///
/// `now` is the fallback conversion time for orders without a completion
/// timestamp and the start of the lead claim.
pub async fn reconcile_lead(
    conn: &mut SqliteConnection,
    lead_id: i32,
    deps: &ReconcileDeps,
    settings: &ReconcileSettings,
    now: DateTime<Utc>,
) -> Result<Outcome, ReconcileError> {
    reconcile_inner(conn, lead_id, deps, settings, now)
        .instrument(reconcile_span(lead_id))
        .await
}

async fn reconcile_inner(
    conn: &mut SqliteConnection,
    lead_id: i32,
    deps: &ReconcileDeps,
    settings: &ReconcileSettings,
    now: DateTime<Utc>,
) -> Result<Outcome, ReconcileError> {
    let lead = find_lead(conn, lead_id)?.ok_or(ReconcileError::LeadNotFound(lead_id))?;
    if lead.processed {
        stage_event(lead_id, Stage::Fetching, Status::AlreadyProcessed.as_str());
        return Ok(Outcome::Finished(Status::AlreadyProcessed));
    }
    let payload: Value = serde_json::from_str(&lead.payload).unwrap_or(Value::Null);

    let orders = match deps.orders.fetch_orders_by_contact(&lead.phone).await {
        Ok(orders) => orders,
        Err(ProviderError::Blocked { status }) => {
            warn!(lead_id, status, "commerce API blocked the lookup; not retrying");
            stage_event(lead_id, Stage::Fetching, Status::WafBlocked.as_str());
            return Ok(Outcome::Finished(Status::WafBlocked));
        }
        Err(e) if e.is_retryable() => {
            stage_event(lead_id, Stage::Fetching, "retry");
            return Ok(Outcome::Retry {
                after: settings.backoffs.short,
                reason: RetryReason::CommerceUnavailable(e.to_string()),
            });
        }
        Err(e) => {
            stage_event(lead_id, Stage::Fetching, "error");
            return Err(ReconcileError::Commerce(e));
        }
    };
    stage_event(lead_id, Stage::Fetching, &format!("{} orders", orders.len()));

    if orders.is_empty() {
        return Ok(Outcome::Retry {
            after: settings.backoffs.long,
            reason: RetryReason::NoOrders,
        });
    }

    let strategy = MatchStrategy::for_lead(&lead.phone, lead.click_id.as_deref(), &payload);
    let claim = match claim_lead(conn, lead_id, settings.claim_ttl, now)? {
        ClaimAttempt::Claimed(claim) => claim,
        ClaimAttempt::Processed => {
            stage_event(lead_id, Stage::Qualifying, Status::AlreadyProcessed.as_str());
            return Ok(Outcome::Finished(Status::AlreadyProcessed));
        }
        ClaimAttempt::Busy { owner, until } => {
            info!(lead_id, owner = %owner, until = %until, "lead claimed elsewhere");
            stage_event(lead_id, Stage::Qualifying, "busy");
            return Ok(Outcome::Retry {
                after: settings.backoffs.short,
                reason: RetryReason::LeadBusy,
            });
        }
    };

    let mut reports = Vec::new();
    let mut failure = None;
    for order in &orders {
        if !is_order_finalized(order) {
            stage_event(lead_id, Stage::Qualifying, "not_finalized");
            continue;
        }
        let report = match report_order(conn, lead_id, order, &strategy, deps, settings, now).await {
            Ok(report) => report,
            Err(e) => {
                claim.release(conn)?;
                return Err(e);
            }
        };
        if let UploadOutcome::Failed(e) = &report.outcome {
            failure = Some(e.to_string());
            break;
        }
        reports.push(report);
    }

    if let Some(error) = failure {
        // keep what reached the platform before the failure
        claim.finish(conn, false, |conn| {
            for report in &reports {
                persist_report(conn, deps.ledger.as_ref(), &lead.phone, report)?;
            }
            Ok(())
        })?;
        stage_event(lead_id, Stage::PerUpload, "retry");
        return Ok(Outcome::Retry {
            after: settings.backoffs.medium,
            reason: RetryReason::UploadFailed(error),
        });
    }

    if reports.is_empty() {
        claim.release(conn)?;
        stage_event(lead_id, Stage::Finalizing, "no_finalized_orders");
        return Ok(Outcome::Retry {
            after: settings.backoffs.long,
            reason: RetryReason::NoFinalizedOrders,
        });
    }

    let validated = reports
        .iter()
        .any(|r| matches!(r.outcome, UploadOutcome::Validated(_)));
    let uploaded = reports
        .iter()
        .filter(|r| matches!(r.outcome, UploadOutcome::Uploaded(_) | UploadOutcome::AlreadyUploaded))
        .count();

    claim.finish(conn, !validated, |conn| {
        for report in &reports {
            persist_report(conn, deps.ledger.as_ref(), &lead.phone, report)?;
        }
        Ok(())
    })?;

    let status = if validated {
        Status::ValidatedOnly
    } else if uploaded > 0 {
        Status::Ok
    } else {
        Status::PendingOrders
    };
    stage_event(lead_id, Stage::Finalizing, status.as_str());
    Ok(Outcome::Finished(status))
}
