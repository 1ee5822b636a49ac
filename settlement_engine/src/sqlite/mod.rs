//! SQLite backend for the settlement engine.
mod sqlite_impl;

pub mod db;
pub use db::SqliteDatabaseError;
pub use sqlite_impl::SqliteDatabase;
