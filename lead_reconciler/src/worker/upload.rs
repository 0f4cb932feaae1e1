//! Ledger-guarded upload of one finalized order.
//!
//! [`report_order`] only reads local state and talks to the ad platform;
//! [`persist_report`] writes the outcome and runs inside the claim's finishing
//! transaction.

use ad_conversions::{
    datetime::resolve_conversion_time,
    models::{
        conversion::{ClickConversion, HashedConversion, value_from_cents},
        upload_result::UploadResult,
    },
    uploader::UploadError,
};
use chrono::{DateTime, Utc};
use commerce_orders::models::order::Order;
use diesel::SqliteConnection;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, info};

use crate::ledger::{ConversionLedger, RepoResult};

use super::{ReconcileDeps, ReconcileError, ReconcileSettings, Stage, identity::MatchStrategy, stage_event};

/// What happened to one finalized order.
#[derive(Debug)]
pub(super) enum UploadOutcome {
    /// Uploaded now.
    Uploaded(UploadResult),
    /// The platform only validated the request; nothing was reported.
    Validated(UploadResult),
    /// The ledger already had this pair uploaded; no request was made.
    AlreadyUploaded,
    /// Hashed upload returned no usable result; the record stays pending.
    NoMatch,
    /// The lead has nothing to match on.
    NoIdentifier,
    /// The platform call failed; nothing about this order is written.
    Failed(UploadError),
}

#[derive(Debug)]
pub(super) struct OrderReport<'o> {
    pub order: &'o Order,
    pub matching_key: Option<String>,
    pub value: Decimal,
    pub outcome: UploadOutcome,
}

pub(super) async fn report_order<'o>(
    conn: &mut SqliteConnection,
    lead_id: i32,
    order: &'o Order,
    strategy: &MatchStrategy,
    deps: &ReconcileDeps,
    settings: &ReconcileSettings,
    now: DateTime<Utc>,
) -> Result<OrderReport<'o>, ReconcileError> {
    let value = value_from_cents(order.total_cents);
    let report = |matching_key: Option<&str>, outcome| OrderReport {
        order,
        matching_key: matching_key.map(str::to_string),
        value,
        outcome,
    };

    let Some(key) = strategy.matching_key() else {
        debug!(lead_id, order_id = %order.id, "no click id or identity to report under");
        stage_event(lead_id, Stage::PerUpload, "no_identifier");
        return Ok(report(None, UploadOutcome::NoIdentifier));
    };

    let already_uploaded = deps
        .ledger
        .find_record_for_order(conn, key, &order.id)?
        .is_some_and(|r| r.uploaded);
    if already_uploaded {
        stage_event(lead_id, Stage::PerUpload, "already_uploaded");
        return Ok(report(Some(key), UploadOutcome::AlreadyUploaded));
    }

    let conversion_time =
        resolve_conversion_time(order.completed_at.as_deref(), now, settings.zone);
    let order_id = Some(order.id.clone()).filter(|id| !id.is_empty());

    let uploaded = match strategy {
        MatchStrategy::Click { click_id } => {
            let conversion = ClickConversion {
                click_id: click_id.clone(),
                order_id,
                value,
                conversion_time,
            };
            deps.uploader.upload_by_click_identifier(&conversion).await.map(Some)
        }
        MatchStrategy::Hashed {
            phone_sha256,
            email_sha256,
        } => {
            let conversion = HashedConversion {
                phone_sha256: phone_sha256.clone(),
                email_sha256: email_sha256.clone(),
                order_id,
                value,
                conversion_time,
            };
            deps.uploader.upload_by_hashed_identity(&conversion).await
        }
        MatchStrategy::Unmatchable => Ok(None),
    };

    let outcome = match uploaded {
        Ok(Some(result)) if result.validate_only => {
            info!(lead_id, order_id = %order.id, strategy = strategy.label(), "conversion validated only");
            stage_event(lead_id, Stage::PerUpload, "validated");
            UploadOutcome::Validated(result)
        }
        Ok(Some(result)) => {
            info!(
                lead_id,
                order_id = %order.id,
                strategy = strategy.label(),
                value = %value,
                partial_failure = result.partial_failure_message().unwrap_or("-"),
                "conversion uploaded"
            );
            stage_event(lead_id, Stage::PerUpload, "uploaded");
            UploadOutcome::Uploaded(result)
        }
        Ok(None) => {
            stage_event(lead_id, Stage::PerUpload, "no_match");
            UploadOutcome::NoMatch
        }
        Err(e) => {
            stage_event(lead_id, Stage::PerUpload, "upload_failed");
            UploadOutcome::Failed(e)
        }
    };
    Ok(report(Some(key), outcome))
}

/// Mirror the order and write its ledger record.
pub(super) fn persist_report(
    conn: &mut SqliteConnection,
    ledger: &dyn ConversionLedger,
    phone: &str,
    report: &OrderReport<'_>,
) -> RepoResult<()> {
    if matches!(report.outcome, UploadOutcome::Failed(_)) {
        return Ok(());
    }
    let order_row = ledger.upsert_order(conn, phone, report.order)?;
    let Some(key) = report.matching_key.as_deref() else {
        return Ok(());
    };

    match &report.outcome {
        UploadOutcome::Uploaded(result) => {
            let record = ledger.ensure_record(conn, key, order_row, report.value)?;
            ledger.mark_uploaded(conn, record.id, &result.to_ledger_json())
        }
        UploadOutcome::Validated(result) => {
            let record = ledger.ensure_record(conn, key, order_row, report.value)?;
            ledger.record_response(conn, record.id, &result.to_ledger_json())
        }
        UploadOutcome::NoMatch => {
            let record = ledger.ensure_record(conn, key, order_row, report.value)?;
            ledger.record_response(conn, record.id, &json!({"outcome": "no_match"}))
        }
        UploadOutcome::AlreadyUploaded | UploadOutcome::NoIdentifier | UploadOutcome::Failed(_) => {
            Ok(())
        }
    }
}
