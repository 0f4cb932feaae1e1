#![allow(dead_code)]

use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use ad_conversions::{
    models::{
        conversion::{ClickConversion, HashedConversion},
        upload_result::UploadResult,
    },
    uploader::{ConversionUploader, UploadError},
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use commerce_orders::{
    models::order::Order,
    providers::{OrderProvider, ProviderError},
};
use diesel::QueryableByName;
use diesel::prelude::*;
use diesel::sql_types::{Integer, Text};
use lead_reconciler::{
    db::{connection, migrate},
    intake::{LeadEvent, accept_lead_event},
    ledger::SqliteLedger,
    worker::{ReconcileDeps, ReconcileSettings},
};
use serde_json::{Value, json};
use tempfile::TempDir;

#[derive(QueryableByName)]
struct JournalMode {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}
#[derive(QueryableByName)]
struct ForeignKeys {
    #[diesel(sql_type = Integer)]
    foreign_keys: i32,
}
#[derive(QueryableByName)]
struct BusyTimeout {
    #[diesel(sql_type = Integer, column_name = "timeout")]
    busy_timeout: i32,
}
#[derive(QueryableByName)]
struct Count {
    #[diesel(sql_type = Integer)]
    cnt: i32,
}

pub struct TestDb {
    _dir: TempDir,    // keep alive for the life of the test
    pub path: String, // <tmpdir>/test.db
}

impl TestDb {
    pub fn connect(&self) -> SqliteConnection {
        connection::connect_sqlite(&self.path).expect("connect")
    }
}

pub fn setup_db() -> (TestDb, SqliteConnection) {
    let dir = TempDir::new().expect("tempdir");
    let mut p = PathBuf::from(dir.path());
    p.push("test.db");
    let path = p.to_string_lossy().to_string();

    migrate::run_all(&path).expect("migrations");

    let conn = connection::connect_sqlite(&path).expect("connect");
    (TestDb { _dir: dir, path }, conn)
}

pub fn assert_sqlite_pragmas(conn: &mut SqliteConnection, expected_busy_ms: i32) {
    use diesel::sql_query;

    let jm: JournalMode = sql_query("PRAGMA journal_mode;").get_result(conn).unwrap();
    assert_eq!(jm.journal_mode.to_lowercase(), "wal");

    let fk: ForeignKeys = sql_query("PRAGMA foreign_keys;").get_result(conn).unwrap();
    assert_eq!(fk.foreign_keys, 1);

    let bt: BusyTimeout = sql_query("PRAGMA busy_timeout;").get_result(conn).unwrap();
    assert_eq!(bt.busy_timeout, expected_busy_ms);
}

pub fn count(conn: &mut SqliteConnection, sql: &str) -> i32 {
    diesel::sql_query(sql)
        .get_result::<Count>(conn)
        .expect("count query")
        .cnt
}

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 10, 15, 0, 0).unwrap()
}

/// Store a lead through intake and return its row id.
pub fn insert_lead(conn: &mut SqliteConnection, payload: Value) -> i32 {
    let event = LeadEvent::from_payload(payload, now());
    accept_lead_event(conn, &event, now()).expect("intake").lead_id
}

pub fn click_lead(conn: &mut SqliteConnection) -> i32 {
    insert_lead(
        conn,
        json!({"id": "call-1", "caller_number": "(555) 123-4567", "gclid": "gclid-abc", "lead_status": "good"}),
    )
}

pub fn phone_only_lead(conn: &mut SqliteConnection) -> i32 {
    insert_lead(
        conn,
        json!({"id": "call-2", "caller_number": "555-123-4567", "lead_status": "qualified"}),
    )
}

pub fn lead_processed(conn: &mut SqliteConnection, lead_id: i32) -> bool {
    use lead_reconciler::schema::leads;
    leads::table
        .find(lead_id)
        .select(leads::processed)
        .first(conn)
        .expect("lead row")
}

pub fn order(id: &str, total_cents: i64, paid: bool) -> Order {
    Order {
        id: id.into(),
        total_cents,
        archived: false,
        paid,
        invoiced: false,
        completed_at: Some("2025-01-09T18:30:00Z".into()),
        raw: json!({"id": id, "totalCostCents": total_cents, "paid": paid}),
    }
}

/// Order source answering from a script, then with `fallback`.
pub struct FakeOrders {
    script: Mutex<VecDeque<Result<Vec<Order>, ProviderError>>>,
    fallback: Vec<Order>,
    calls: AtomicUsize,
}

impl FakeOrders {
    pub fn always(orders: Vec<Order>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: orders,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn scripted(
        script: Vec<Result<Vec<Order>, ProviderError>>,
        fallback: Vec<Order>,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderProvider for FakeOrders {
    async fn fetch_orders_by_contact(&self, _phone: &str) -> Result<Vec<Order>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(r) => r,
            None => Ok(self.fallback.clone()),
        }
    }
}

pub fn click_success(click_id: &str) -> UploadResult {
    UploadResult {
        items: vec![json!({"gclid": click_id})],
        partial_failure: None,
        validate_only: false,
        raw: json!({"results": [{"gclid": click_id}]}),
    }
}

pub fn rejected() -> UploadError {
    UploadError::Rejected {
        status: 429,
        code: Some("quotaError:RESOURCE_EXHAUSTED".into()),
        message: "Too many requests".into(),
        request_id: Some("req-1".into()),
    }
}

/// Uploader recording every call; scripted failures come first.
#[derive(Default)]
pub struct FakeUploader {
    pub clicks: Mutex<Vec<ClickConversion>>,
    pub hashed: Mutex<Vec<HashedConversion>>,
    click_failures: Mutex<VecDeque<UploadError>>,
    hashed_no_match: bool,
    delay: Option<Duration>,
    validate_only: AtomicBool,
}

impl FakeUploader {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_clicks(failures: Vec<UploadError>) -> Arc<Self> {
        Arc::new(Self {
            click_failures: Mutex::new(failures.into()),
            ..Default::default()
        })
    }

    pub fn hashed_no_match() -> Arc<Self> {
        Arc::new(Self {
            hashed_no_match: true,
            ..Default::default()
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Default::default()
        })
    }

    /// Answer like an account with `validate_only` set.
    pub fn validating() -> Arc<Self> {
        Arc::new(Self {
            validate_only: AtomicBool::new(true),
            ..Default::default()
        })
    }

    pub fn set_validate_only(&self, on: bool) {
        self.validate_only.store(on, Ordering::SeqCst);
    }

    pub fn click_calls(&self) -> usize {
        self.clicks.lock().unwrap().len()
    }

    pub fn hashed_calls(&self) -> usize {
        self.hashed.lock().unwrap().len()
    }
}

#[async_trait]
impl ConversionUploader for FakeUploader {
    async fn upload_by_click_identifier(
        &self,
        conversion: &ClickConversion,
    ) -> Result<UploadResult, UploadError> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.clicks.lock().unwrap().push(conversion.clone());
        if let Some(e) = self.click_failures.lock().unwrap().pop_front() {
            return Err(e);
        }
        let mut result = click_success(&conversion.click_id);
        result.validate_only = self.validate_only.load(Ordering::SeqCst);
        Ok(result)
    }

    async fn upload_by_hashed_identity(
        &self,
        conversion: &HashedConversion,
    ) -> Result<Option<UploadResult>, UploadError> {
        self.hashed.lock().unwrap().push(conversion.clone());
        if self.hashed_no_match {
            return Ok(None);
        }
        Ok(Some(UploadResult {
            items: vec![json!({"resourceName": "customers/1/offlineUserDataJobs/2"})],
            partial_failure: None,
            validate_only: self.validate_only.load(Ordering::SeqCst),
            raw: json!({}),
        }))
    }
}

pub fn deps(orders: Arc<FakeOrders>, uploader: Arc<FakeUploader>) -> ReconcileDeps {
    ReconcileDeps {
        orders,
        uploader,
        ledger: Arc::new(SqliteLedger::new()),
    }
}

pub fn settings() -> ReconcileSettings {
    ReconcileSettings {
        zone: chrono_tz::America::New_York,
        ..Default::default()
    }
}
