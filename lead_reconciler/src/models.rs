//! Diesel models mapping to the database schema.
//!
//! These types mirror the tables defined in the embedded migrations and in
//! [`crate::schema`]:
//! - [`crate::schema::leads`]: inbound leads and their terminal `processed` flag
//! - [`crate::schema::commerce_orders`]: last fetched copy of each commerce order
//! - [`crate::schema::conversion_records`]: the upload idempotency ledger
//! - [`crate::schema::reconcile_tasks`]: durable reconciliation queue
//!
//! See migrations for constraints and triggers (terminal flags, the
//! `(matching_key, order_id)` uniqueness, one active task per lead).

use diesel::prelude::*;

use crate::schema::*;

/// A row in [`crate::schema::leads`].
#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = leads, check_for_backend(diesel::sqlite::Sqlite))]
pub struct Lead {
    pub id: i32,
    /// Identifier assigned by the call tracking system; unique.
    pub external_id: String,
    pub phone: String,
    /// Ad click identifier captured with the call, if any.
    pub click_id: Option<String>,
    pub lead_status: String,
    /// Raw event JSON.
    pub payload: String,
    /// Once true, never false again.
    pub processed: bool,
    /// Token of the attempt holding the lead, if any.
    pub claim_owner: Option<String>,
    /// RFC-3339 UTC; the claim lapses at this instant.
    pub claim_expires_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Insertable form of [`Lead`].
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = leads)]
pub struct NewLead<'a> {
    pub external_id: &'a str,
    pub phone: &'a str,
    pub click_id: Option<&'a str>,
    pub lead_status: &'a str,
    pub payload: &'a str,
}

/// A row in [`crate::schema::commerce_orders`].
#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = commerce_orders, check_for_backend(diesel::sqlite::Sqlite))]
pub struct CommerceOrderRow {
    pub id: i32,
    pub external_order_id: String,
    pub phone: String,
    pub total_cents: i64,
    pub archived: bool,
    pub paid: bool,
    pub invoiced: bool,
    pub completed_at: Option<String>,
    pub raw: String,
    pub fetched_at: String,
}

/// Insert/overwrite form of [`CommerceOrderRow`]; `None` overwrites with NULL.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = commerce_orders, treat_none_as_null = true)]
pub struct UpsertCommerceOrder<'a> {
    pub external_order_id: &'a str,
    pub phone: &'a str,
    pub total_cents: i64,
    pub archived: bool,
    pub paid: bool,
    pub invoiced: bool,
    pub completed_at: Option<&'a str>,
    pub raw: &'a str,
    pub fetched_at: &'a str,
}

/// A row in [`crate::schema::conversion_records`].
#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = conversion_records, check_for_backend(diesel::sqlite::Sqlite))]
pub struct ConversionRecord {
    pub id: i32,
    /// Click identifier or identity digest the conversion was reported under.
    pub matching_key: String,
    /// FK to [`CommerceOrderRow::id`].
    pub order_id: i32,
    /// Decimal text with two fractional digits, e.g. `"25.00"`.
    pub value: String,
    pub uploaded: bool,
    /// Structured platform response (JSON text).
    pub upload_response: Option<String>,
    pub created_at: String,
}

/// Insertable form of [`ConversionRecord`]; starts out not uploaded.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = conversion_records)]
pub struct NewConversionRecord<'a> {
    pub matching_key: &'a str,
    pub order_id: i32,
    pub value: &'a str,
}

/// A row in [`crate::schema::reconcile_tasks`].
#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = reconcile_tasks, check_for_backend(diesel::sqlite::Sqlite))]
pub struct ReconcileTask {
    pub id: i32,
    pub lead_id: i32,
    /// One of `queued`, `leased`, `done`, `failed`.
    pub state: String,
    /// Number of times the task has been leased.
    pub attempts: i32,
    /// RFC-3339 UTC; the task is not leased before this.
    pub run_at: String,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<String>,
    /// Status string of the last finished run.
    pub last_status: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Insertable form of [`ReconcileTask`].
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = reconcile_tasks)]
pub struct NewReconcileTask<'a> {
    pub lead_id: i32,
    pub run_at: &'a str,
}
