//! # Backend contracts
//!
//! The traits a database backend has to implement to drive the settlement engine. The public APIs in `se_api` are
//! generic over these traits; [`crate::SqliteDatabase`] is the shipped implementation.
//!
//! * [`LedgerManagement`] owns balances: wallets, merchant holding accounts and their histories.
//! * [`TransactionManagement`] owns checkout, payment confirmation and the transaction status machine, including
//!   settlement.
//! * [`RefundManagement`] owns refund requests and their decision history.
//! * [`EscalationManagement`] finds records that have been left past their SLA window.
//!
//! Every mutating method is atomic: it either applies completely or not at all.
mod escalation_management;
mod ledger_management;
mod refund_management;
mod transaction_management;

pub use escalation_management::EscalationManagement;
pub use ledger_management::LedgerManagement;
pub use refund_management::RefundManagement;
pub use transaction_management::TransactionManagement;
