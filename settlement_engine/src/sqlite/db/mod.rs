//! # SQLite database methods
//!
//! This module contains the "low-level" SQLite database interactions.
//!
//! They are plain functions that accept a `&mut SqliteConnection`. Callers obtain a connection from the pool, or open
//! a database transaction when several steps must commit together, and call through without any other changes.
//!
//! Timestamps are always bound from Rust (`DateTime<Utc>`) so that they compare correctly as text.
use std::{env, str::FromStr, time::Duration};

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

mod errors;

pub mod checkout;
pub mod escalation;
pub mod ledger;
pub mod payments;
pub mod refunds;
pub mod settlement;
pub mod stock;
pub mod transactions;
pub mod vouchers;

pub use errors::SqliteDatabaseError;

const SQLITE_DB_URL: &str = "sqlite://data/settlement.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub fn db_url() -> String {
    let result = env::var("MSE_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ MSE_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqliteDatabaseError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}
