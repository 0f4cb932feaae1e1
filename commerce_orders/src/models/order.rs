//! Canonical in-memory representation of a commerce order.
//!
//! This struct is the standard output of every
//! [`OrderProvider`](crate::providers::OrderProvider) implementation,
//! regardless of which commerce backend produced it.

use serde_json::Value;

/// A single order as returned by the commerce system.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    /// External order id assigned by the commerce system.
    pub id: String,

    /// Order total in minor currency units (cents).
    pub total_cents: i64,

    /// Order was archived (closed out) in the commerce system.
    pub archived: bool,

    /// Order was paid.
    pub paid: bool,

    /// Order was invoiced.
    pub invoiced: bool,

    /// Completion timestamp exactly as sent upstream; may lack a zone.
    pub completed_at: Option<String>,

    /// The full item as fetched, kept for the local mirror.
    pub raw: Value,
}
