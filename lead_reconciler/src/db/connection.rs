//! SQLite connection helpers.

use std::time::Duration;

use diesel::{Connection, RunQueryDsl, SqliteConnection, sql_query};

use super::sqlite_path;

/// Busy timeout applied by [`connect_sqlite`].
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Open a SQLite connection and apply connection-wide PRAGMAs.
pub fn connect_sqlite(database_url: &str) -> anyhow::Result<SqliteConnection> {
    connect_sqlite_with_timeout(database_url, DEFAULT_BUSY_TIMEOUT)
}

/// Like [`connect_sqlite`] with an explicit busy timeout.
pub fn connect_sqlite_with_timeout(
    database_url: &str,
    busy_timeout: Duration,
) -> anyhow::Result<SqliteConnection> {
    let mut conn = SqliteConnection::establish(sqlite_path(database_url))?;

    sql_query("PRAGMA journal_mode=WAL;").execute(&mut conn)?;
    sql_query("PRAGMA foreign_keys=ON;").execute(&mut conn)?;
    sql_query(format!("PRAGMA busy_timeout={};", busy_timeout.as_millis())).execute(&mut conn)?;
    Ok(conn)
}
