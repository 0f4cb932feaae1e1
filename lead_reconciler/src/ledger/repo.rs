use chrono::Utc;
use commerce_orders::models::order::Order;
use diesel::{
    prelude::*,
    result::{DatabaseErrorKind, Error as DieselError},
};
use rust_decimal::Decimal;
use serde_json::Value;
use shared_utils::tz;

use crate::{
    ledger::{ConversionLedger, LedgerError, RepoResult},
    models::{ConversionRecord, NewConversionRecord, UpsertCommerceOrder},
    schema::{commerce_orders as order_mirror, conversion_records},
};

/// Ledger backed by the crate's SQLite schema.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteLedger;

impl SqliteLedger {
    pub fn new() -> Self {
        Self
    }
}

fn value_text(value: Decimal) -> String {
    let mut v = value.round_dp(2);
    v.rescale(2);
    v.to_string()
}

impl ConversionLedger for SqliteLedger {
    fn upsert_order(
        &self,
        conn: &mut SqliteConnection,
        phone: &str,
        order: &Order,
    ) -> RepoResult<i32> {
        let raw = order.raw.to_string();
        let fetched_at = tz::to_rfc3339_millis(Utc::now());
        let row = UpsertCommerceOrder {
            external_order_id: &order.id,
            phone,
            total_cents: order.total_cents,
            archived: order.archived,
            paid: order.paid,
            invoiced: order.invoiced,
            completed_at: order.completed_at.as_deref(),
            raw: &raw,
            fetched_at: &fetched_at,
        };

        // Insert .. ON CONFLICT (..) DO UPDATE .. RETURNING id (Sqlite 3.35+)
        let id = diesel::insert_into(order_mirror::table)
            .values(&row)
            .on_conflict(order_mirror::external_order_id)
            .do_update()
            .set(&row)
            .returning(order_mirror::id)
            .get_result(conn)?;
        Ok(id)
    }

    fn find_record(
        &self,
        conn: &mut SqliteConnection,
        matching_key: &str,
        order_id: i32,
    ) -> RepoResult<Option<ConversionRecord>> {
        use crate::schema::conversion_records::dsl as cr;

        let rec = cr::conversion_records
            .filter(cr::matching_key.eq(matching_key).and(cr::order_id.eq(order_id)))
            .select(ConversionRecord::as_select())
            .first(conn)
            .optional()?;
        Ok(rec)
    }

    fn find_record_for_order(
        &self,
        conn: &mut SqliteConnection,
        matching_key: &str,
        external_order_id: &str,
    ) -> RepoResult<Option<ConversionRecord>> {
        let rec = conversion_records::table
            .inner_join(order_mirror::table)
            .filter(conversion_records::matching_key.eq(matching_key))
            .filter(order_mirror::external_order_id.eq(external_order_id))
            .select(ConversionRecord::as_select())
            .first(conn)
            .optional()?;
        Ok(rec)
    }

    fn insert_record(
        &self,
        conn: &mut SqliteConnection,
        matching_key: &str,
        order_id: i32,
        value: Decimal,
    ) -> RepoResult<ConversionRecord> {
        let value = value_text(value);
        let res = diesel::insert_into(conversion_records::table)
            .values(&NewConversionRecord {
                matching_key,
                order_id,
                value: &value,
            })
            .returning(ConversionRecord::as_returning())
            .get_result(conn);

        match res {
            Ok(rec) => Ok(rec),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Err(LedgerError::DuplicateConversion {
                    matching_key: matching_key.to_string(),
                    order_id,
                }
                .into())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn ensure_record(
        &self,
        conn: &mut SqliteConnection,
        matching_key: &str,
        order_id: i32,
        value: Decimal,
    ) -> RepoResult<ConversionRecord> {
        let value = value_text(value);
        diesel::insert_into(conversion_records::table)
            .values(&NewConversionRecord {
                matching_key,
                order_id,
                value: &value,
            })
            .on_conflict((conversion_records::matching_key, conversion_records::order_id))
            .do_nothing()
            .execute(conn)?;

        self.find_record(conn, matching_key, order_id)?
            .ok_or_else(|| anyhow::anyhow!("conversion record for {matching_key}/{order_id} missing after insert"))
    }

    fn mark_uploaded(
        &self,
        conn: &mut SqliteConnection,
        record_id: i32,
        response: &Value,
    ) -> RepoResult<()> {
        let n = diesel::update(conversion_records::table.find(record_id))
            .set((
                conversion_records::uploaded.eq(true),
                conversion_records::upload_response.eq(Some(response.to_string())),
            ))
            .execute(conn)?;
        if n == 0 {
            return Err(LedgerError::UnknownRecord(record_id).into());
        }
        Ok(())
    }

    fn record_response(
        &self,
        conn: &mut SqliteConnection,
        record_id: i32,
        response: &Value,
    ) -> RepoResult<()> {
        let n = diesel::update(conversion_records::table.find(record_id))
            .set(conversion_records::upload_response.eq(Some(response.to_string())))
            .execute(conn)?;
        if n == 0 {
            return Err(LedgerError::UnknownRecord(record_id).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_always_carry_two_places() {
        assert_eq!(value_text(Decimal::new(25, 0)), "25.00");
        assert_eq!(value_text(Decimal::new(2500, 2)), "25.00");
        assert_eq!(value_text(Decimal::new(19999, 3)), "20.00");
        assert_eq!(value_text(Decimal::new(5, 2)), "0.05");
    }
}
