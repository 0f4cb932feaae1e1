//! Recording inbound lead events.
//!
//! The call tracking webhook delivers at-least-once. [`accept_lead_event`]
//! keys leads by their external id, so redeliveries reuse the stored row, and
//! queues a reconciliation only for qualified leads.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use tracing::info;

use crate::{
    leads::find_lead_by_external_id,
    ledger::RepoResult,
    models::NewLead,
    policy::is_lead_qualified,
    queue,
    schema::leads,
};

/// Phone fields accepted on the event, in order.
const PHONE_FIELDS: [&str; 2] = ["caller_number", "phone"];

/// The fields of an inbound event the reconciler uses.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadEvent {
    pub external_id: String,
    pub phone: String,
    pub click_id: Option<String>,
    /// Lowercased, trimmed.
    pub lead_status: String,
    /// The full event, kept for later identity lookups.
    pub payload: Value,
}

fn text_field(payload: &Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl LeadEvent {
    /// Extract a lead event from webhook JSON.
    ///
    /// A missing `id` falls back to `call-<unix seconds of now>`.
    pub fn from_payload(payload: Value, now: DateTime<Utc>) -> Self {
        let external_id =
            text_field(&payload, "id").unwrap_or_else(|| format!("call-{}", now.timestamp()));
        let phone = PHONE_FIELDS
            .iter()
            .find_map(|k| text_field(&payload, k))
            .unwrap_or_default();
        let click_id = text_field(&payload, "gclid");
        let lead_status = text_field(&payload, "lead_status")
            .unwrap_or_default()
            .to_lowercase();

        Self {
            external_id,
            phone,
            click_id,
            lead_status,
            payload,
        }
    }

    pub fn is_qualified(&self) -> bool {
        is_lead_qualified(&self.lead_status, &self.payload)
    }
}

/// What [`accept_lead_event`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeReceipt {
    pub lead_id: i32,
    /// False for a redelivery of a known lead.
    pub created: bool,
    /// Id of the queued reconciliation task, if one was added.
    pub task_id: Option<i32>,
}

/// Store `event` (get-or-create by external id) and queue reconciliation when
/// the lead is qualified and not yet processed.
pub fn accept_lead_event(
    conn: &mut SqliteConnection,
    event: &LeadEvent,
    now: DateTime<Utc>,
) -> RepoResult<IntakeReceipt> {
    conn.immediate_transaction(|conn| {
        let payload = event.payload.to_string();
        let inserted = diesel::insert_into(leads::table)
            .values(&NewLead {
                external_id: &event.external_id,
                phone: &event.phone,
                click_id: event.click_id.as_deref(),
                lead_status: &event.lead_status,
                payload: &payload,
            })
            .on_conflict(leads::external_id)
            .do_nothing()
            .returning(leads::id)
            .get_result::<i32>(conn)
            .optional()?;

        let (lead_id, created, processed) = match inserted {
            Some(id) => (id, true, false),
            None => {
                let lead = find_lead_by_external_id(conn, &event.external_id)?.ok_or_else(|| {
                    anyhow::anyhow!("lead {} missing after conflict", event.external_id)
                })?;
                (lead.id, false, lead.processed)
            }
        };

        let task_id = if event.is_qualified() && !processed {
            queue::enqueue(conn, lead_id, now)?
        } else {
            None
        };

        info!(
            lead_id,
            external_id = %event.external_id,
            created,
            status = %event.lead_status,
            queued = task_id.is_some(),
            "lead event accepted"
        );
        Ok(IntakeReceipt {
            lead_id,
            created,
            task_id,
        })
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 10, 15, 0, 0).unwrap()
    }

    #[test]
    fn extracts_webhook_fields() {
        let e = LeadEvent::from_payload(
            json!({
                "id": 991,
                "caller_number": "+1 (555) 123-4567",
                "gclid": "Cj0-abc",
                "lead_status": " Good_Lead ",
                "customer_email": "x@y.z"
            }),
            now(),
        );
        assert_eq!(e.external_id, "991");
        assert_eq!(e.phone, "+1 (555) 123-4567");
        assert_eq!(e.click_id.as_deref(), Some("Cj0-abc"));
        assert_eq!(e.lead_status, "good_lead");
        assert!(e.is_qualified());
    }

    #[test]
    fn missing_fields_fall_back() {
        let e = LeadEvent::from_payload(json!({"phone": "5551234567", "gclid": ""}), now());
        assert_eq!(e.external_id, format!("call-{}", now().timestamp()));
        assert_eq!(e.phone, "5551234567");
        assert_eq!(e.click_id, None);
        assert_eq!(e.lead_status, "");
        assert!(!e.is_qualified());
    }
}
