//! Marketplace Settlement Engine
//!
//! The settlement engine turns a marketplace checkout into a durable, multi-party financial record, moves it through
//! its delivery milestones, and settles the money between the platform ledger, the merchants' holding accounts and the
//! buyers' wallets. Disputes go through a bounded buyer / seller / admin refund negotiation, and a scheduler forces
//! stalled records forward once their SLA window has passed.
//!
//! The library is divided into three main sections:
//! 1. Data types ([`mod@db_types`]) and the pure rules that govern them: the transaction status machine, the refund
//!    stage machine and the settlement plans ([`mod@settlement`]). None of these touch the database.
//! 2. The backend ([`mod@traits`] and [`mod@sqlite`]). Backends implement the traits; SQLite is the supported one. You
//!    should never need to call the backend directly.
//! 3. The public API ([`mod@se_api`]), one API per concern, each generic over the backend traits it needs.
//!
//! The engine also publishes [`mod@events`] after every settlement and refund decision, so that outer layers
//! (notifications, email) can react without the engine knowing about them.
pub mod config;
pub mod db_types;
pub mod events;
pub mod external;
pub mod helpers;
pub mod se_api;
pub mod settlement;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

#[cfg(all(feature = "sqlite", any(feature = "test_utils", test)))]
pub mod test_utils;

pub use config::{EngineConfig, EscalationConfig, SweepConfig, SweepKind};
pub use events::{EventHandlers, EventHooks, EventProducers};
pub use se_api::{
    checkout_api::{CheckoutApi, CheckoutReceipt},
    errors::{
        AllocationError,
        ErrorKind,
        EscalationError,
        LedgerError,
        RefundFlowError,
        TransactionFlowError,
    },
    escalation_api::{EscalationApi, SweepResult},
    ledger_api::LedgerApi,
    refund_api::RefundApi,
    transaction_flow_api::TransactionFlowApi,
};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteDatabase, SqliteDatabaseError};
pub use traits::{EscalationManagement, LedgerManagement, RefundManagement, TransactionManagement};
