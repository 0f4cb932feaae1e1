//! Database utilities for connections and schema migrations.
//!
//! - [`connection::connect_sqlite`] opens a connection with WAL, `foreign_keys=ON`
//!   and a 5000ms busy timeout; [`connection::connect_sqlite_with_timeout`] lets
//!   workers wait longer for a peer's write lock.
//! - [`migrate::run_sqlite`] / [`migrate::run_all`] apply the embedded Diesel
//!   migrations. URLs may be bare paths or carry a `sqlite:` / `sqlite://` prefix.
//!
//! Example:
//! ```no_run
//! use lead_reconciler::db::{connection, migrate};
//!
//! let db_path = std::env::temp_dir().join("lead_reconciler_example.db");
//! migrate::run_all(db_path.to_str().unwrap()).expect("migrations");
//! let _conn = connection::connect_sqlite(db_path.to_str().unwrap()).expect("connect");
//! ```

pub mod connection;
pub mod migrate;

/// Strip an optional `sqlite://` or `sqlite:` scheme from a database URL.
pub fn sqlite_path(database_url: &str) -> &str {
    database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url)
}
