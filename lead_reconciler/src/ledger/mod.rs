//! Conversion ledger: order mirror plus the upload idempotency records (SQLite).

pub mod repo;

pub use repo::SqliteLedger;

use commerce_orders::models::order::Order;
use diesel::SqliteConnection;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::models::ConversionRecord;

/// Errors raised by the ledger beyond plain storage failures.
#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    /// The `(matching_key, order_id)` pair already has a record.
    #[error("conversion already recorded for key {matching_key} and order {order_id}")]
    DuplicateConversion {
        /// Click identifier or identity digest.
        matching_key: String,
        /// Row id of the commerce order.
        order_id: i32,
    },
    /// A record id that does not exist.
    #[error("conversion record {0} not found")]
    UnknownRecord(i32),
}

/// Result type used throughout the repositories for fallible operations.
pub type RepoResult<T> = anyhow::Result<T>;

/// Portable surface, SQLite implementation lives in `repo.rs`.
pub trait ConversionLedger: Send + Sync {
    /// Insert or overwrite the local copy of `order`; returns its row id.
    fn upsert_order(
        &self,
        conn: &mut SqliteConnection,
        phone: &str,
        order: &Order,
    ) -> RepoResult<i32>;

    /// Record for the pair, if any.
    fn find_record(
        &self,
        conn: &mut SqliteConnection,
        matching_key: &str,
        order_id: i32,
    ) -> RepoResult<Option<ConversionRecord>>;

    /// Record for the key and the mirrored order with `external_order_id`.
    fn find_record_for_order(
        &self,
        conn: &mut SqliteConnection,
        matching_key: &str,
        external_order_id: &str,
    ) -> RepoResult<Option<ConversionRecord>>;

    /// Strict insert of a not-yet-uploaded record; a second insert for the
    /// same pair fails with [`LedgerError::DuplicateConversion`].
    fn insert_record(
        &self,
        conn: &mut SqliteConnection,
        matching_key: &str,
        order_id: i32,
        value: Decimal,
    ) -> RepoResult<ConversionRecord>;

    /// Insert-if-absent; returns the existing record when the pair is known.
    fn ensure_record(
        &self,
        conn: &mut SqliteConnection,
        matching_key: &str,
        order_id: i32,
        value: Decimal,
    ) -> RepoResult<ConversionRecord>;

    /// Flip `uploaded` to true and store the platform response.
    fn mark_uploaded(
        &self,
        conn: &mut SqliteConnection,
        record_id: i32,
        response: &Value,
    ) -> RepoResult<()>;

    /// Store a response without marking the record uploaded.
    fn record_response(
        &self,
        conn: &mut SqliteConnection,
        record_id: i32,
        response: &Value,
    ) -> RepoResult<()>;
}
