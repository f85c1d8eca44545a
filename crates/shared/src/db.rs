//! Postgres pool for the ledger store
//!
//! Only used when `DATABASE_URL` is set; without it the API runs on the
//! in-memory ledger and nothing here is touched.

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::{str::FromStr, time::Duration};

/// Settlement transactions wait on `FOR UPDATE` row locks held by a competing
/// webhook or verify call, so acquiring a connection gets a generous window.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_LIFETIME: Duration = Duration::from_secs(300);

/// Connection options for the ledger database
///
/// The statement cache is off so the pool can sit behind PgBouncer in
/// transaction mode, which cannot track prepared statements across clients.
pub fn ledger_connect_options(database_url: &str) -> Result<PgConnectOptions, sqlx::Error> {
    Ok(PgConnectOptions::from_str(database_url)?
        .statement_cache_capacity(0)
        .application_name("shopledger"))
}

/// Open the pool backing `PgLedgerStore`
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .min_connections(0)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .idle_timeout(IDLE_TIMEOUT)
        .max_lifetime(MAX_LIFETIME)
        .connect_with(ledger_connect_options(database_url)?)
        .await
}

/// Apply the ledger schema (accounts, orders, revenue, settled references, payouts)
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}
