//! # Settlement server
//! The worker daemon for the settlement engine. It is responsible for:
//! * Preparing the database and running any outstanding migrations on startup.
//! * Running the escalation sweeps on a timer, so that transactions and refund requests whose parties have gone quiet
//!   are moved on without anyone having to ask.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Commands
//! * `run`: the default. Migrate, then run the escalation worker until interrupted.
//! * `sweep <kind>`: run a single page of one sweep and print what it did.
//! * `env`: print the configuration the server would use.

pub mod cli;
pub mod config;
pub mod errors;
pub mod escalation_worker;
pub mod server;
