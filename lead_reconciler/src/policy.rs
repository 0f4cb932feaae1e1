//! Qualification rules for leads and orders.

use commerce_orders::models::order::Order;
use serde_json::Value;

/// Lead statuses that count as qualified, compared trimmed and lowercased.
pub const QUALIFIED_STATUSES: [&str; 5] = [
    "good",
    "good_lead",
    "qualified",
    "qualified_lead",
    "previously_marked_good_lead",
];

/// A lead qualifies by status, or by a `milestones.qualified` entry in its payload.
pub fn is_lead_qualified(status: &str, payload: &Value) -> bool {
    let status = status.trim().to_lowercase();
    if QUALIFIED_STATUSES.contains(&status.as_str()) {
        return true;
    }
    payload
        .get("milestones")
        .and_then(Value::as_object)
        .is_some_and(|m| m.contains_key("qualified"))
}

/// An order is finalized once archived, paid or invoiced, and only with a positive total.
pub fn is_order_finalized(order: &Order) -> bool {
    (order.archived || order.paid || order.invoiced) && order.total_cents > 0
}
