mod common;

use common::{count, order, setup_db};
use lead_reconciler::ledger::{ConversionLedger, LedgerError, SqliteLedger};
use rust_decimal::Decimal;
use serde_json::{Value, json};

#[test]
fn upsert_overwrites_the_local_copy() {
    let (_db, mut conn) = setup_db();
    let ledger = SqliteLedger::new();

    let mut o = order("sm-1", 1000, false);
    let first = ledger.upsert_order(&mut conn, "+15551234567", &o).unwrap();

    o.paid = true;
    o.total_cents = 2500;
    o.completed_at = None;
    let second = ledger.upsert_order(&mut conn, "+15551234567", &o).unwrap();

    assert_eq!(first, second);
    assert_eq!(count(&mut conn, "SELECT COUNT(*) AS cnt FROM commerce_orders"), 1);
    assert_eq!(
        count(
            &mut conn,
            "SELECT COUNT(*) AS cnt FROM commerce_orders WHERE paid = 1 AND total_cents = 2500 AND completed_at IS NULL"
        ),
        1
    );
}

#[test]
fn strict_insert_rejects_a_second_record() {
    let (_db, mut conn) = setup_db();
    let ledger = SqliteLedger::new();
    let order_id = ledger
        .upsert_order(&mut conn, "", &order("sm-1", 2500, true))
        .unwrap();

    let rec = ledger
        .insert_record(&mut conn, "gclid-abc", order_id, Decimal::new(2500, 2))
        .unwrap();
    assert_eq!(rec.value, "25.00");
    assert!(!rec.uploaded);
    assert!(rec.upload_response.is_none());

    let err = ledger
        .insert_record(&mut conn, "gclid-abc", order_id, Decimal::new(2500, 2))
        .unwrap_err();
    match err.downcast_ref::<LedgerError>() {
        Some(LedgerError::DuplicateConversion {
            matching_key,
            order_id: oid,
        }) => {
            assert_eq!(matching_key, "gclid-abc");
            assert_eq!(*oid, order_id);
        }
        other => panic!("expected DuplicateConversion, got {other:?} ({err})"),
    }
}

#[test]
fn ensure_record_returns_the_existing_row() {
    let (_db, mut conn) = setup_db();
    let ledger = SqliteLedger::new();
    let order_id = ledger
        .upsert_order(&mut conn, "", &order("sm-1", 2500, true))
        .unwrap();

    let a = ledger
        .ensure_record(&mut conn, "k", order_id, Decimal::new(25, 0))
        .unwrap();
    // a later call with a different value keeps the first row
    let b = ledger
        .ensure_record(&mut conn, "k", order_id, Decimal::new(30, 0))
        .unwrap();

    assert_eq!(a.id, b.id);
    assert_eq!(b.value, "25.00");
    assert_eq!(count(&mut conn, "SELECT COUNT(*) AS cnt FROM conversion_records"), 1);
}

#[test]
fn same_key_may_cover_several_orders() {
    let (_db, mut conn) = setup_db();
    let ledger = SqliteLedger::new();
    let o1 = ledger.upsert_order(&mut conn, "", &order("sm-1", 100, true)).unwrap();
    let o2 = ledger.upsert_order(&mut conn, "", &order("sm-2", 200, true)).unwrap();

    ledger.insert_record(&mut conn, "k", o1, Decimal::ONE).unwrap();
    ledger.insert_record(&mut conn, "k", o2, Decimal::ONE).unwrap();
    assert_eq!(count(&mut conn, "SELECT COUNT(*) AS cnt FROM conversion_records"), 2);
}

#[test]
fn mark_uploaded_stores_the_response() {
    let (_db, mut conn) = setup_db();
    let ledger = SqliteLedger::new();
    let order_id = ledger
        .upsert_order(&mut conn, "", &order("sm-1", 2500, true))
        .unwrap();
    let rec = ledger
        .ensure_record(&mut conn, "k", order_id, Decimal::new(2500, 2))
        .unwrap();

    ledger
        .record_response(&mut conn, rec.id, &json!({"outcome": "no_match"}))
        .unwrap();
    let pending = ledger.find_record(&mut conn, "k", order_id).unwrap().unwrap();
    assert!(!pending.uploaded);

    ledger
        .mark_uploaded(&mut conn, rec.id, &json!({"succeeded": 1}))
        .unwrap();
    let done = ledger.find_record(&mut conn, "k", order_id).unwrap().unwrap();
    assert!(done.uploaded);
    let stored: Value = serde_json::from_str(done.upload_response.as_deref().unwrap()).unwrap();
    assert_eq!(stored, json!({"succeeded": 1}));
}

#[test]
fn unknown_record_ids_are_reported() {
    let (_db, mut conn) = setup_db();
    let ledger = SqliteLedger::new();
    let err = ledger
        .mark_uploaded(&mut conn, 77, &json!({}))
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LedgerError>(),
        Some(LedgerError::UnknownRecord(77))
    ));
}

#[test]
fn find_record_misses_cleanly() {
    let (_db, mut conn) = setup_db();
    let ledger = SqliteLedger::new();
    assert!(ledger.find_record(&mut conn, "k", 1).unwrap().is_none());
}

#[test]
fn records_are_found_by_external_order_id() {
    let (_db, mut conn) = setup_db();
    let ledger = SqliteLedger::new();
    let order_id = ledger
        .upsert_order(&mut conn, "", &order("sm-1", 2500, true))
        .unwrap();
    ledger.upsert_order(&mut conn, "", &order("sm-2", 100, true)).unwrap();
    let rec = ledger
        .ensure_record(&mut conn, "k", order_id, Decimal::new(2500, 2))
        .unwrap();

    let found = ledger
        .find_record_for_order(&mut conn, "k", "sm-1")
        .unwrap()
        .unwrap();
    assert_eq!(found.id, rec.id);
    assert!(ledger.find_record_for_order(&mut conn, "k", "sm-2").unwrap().is_none());
    assert!(ledger.find_record_for_order(&mut conn, "other", "sm-1").unwrap().is_none());
}
