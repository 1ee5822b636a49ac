//! Helpers for tests: throwaway SQLite databases and catalog seeding.
pub mod prepare_env;
pub mod seed;
