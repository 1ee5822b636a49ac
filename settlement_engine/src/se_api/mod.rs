//! # Settlement engine public API
//!
//! The `se_api` module exposes the programmatic API of the settlement engine. Each API covers one concern and is
//! generic over the backend traits it needs, so callers pick only what they use.
//!
//! * [`ledger_api`] reads and moves balances: wallets, merchant holding accounts, top-ups and withdrawals.
//! * [`checkout_api`] prices carts, opens payments and turns them into transactions, and handles the gateway's
//!   confirmation or failure callbacks.
//! * [`transaction_flow_api`] drives a transaction through its milestones to completion or cancellation.
//! * [`refund_api`] runs the buyer / seller / admin refund negotiation.
//! * [`escalation_api`] forces stalled transactions and refund requests forward once their SLA window has passed.
//!
//! # API usage
//!
//! Every API is created from a backend that implements the traits it needs, plus the configuration it reads.
//!
//! ```rust,ignore
//! use settlement_engine::{EngineConfig, EventProducers, SqliteDatabase, TransactionFlowApi};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let api = TransactionFlowApi::new(db, EngineConfig::default(), EventProducers::default());
//! let settled = api.complete(transaction_id).await?;
//! ```
pub mod checkout_api;
pub mod errors;
pub mod escalation_api;
pub mod ledger_api;
pub mod refund_api;
pub mod transaction_flow_api;
