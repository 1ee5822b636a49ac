use thiserror::Error;

use crate::{
    db_types::{AccountSelector, RefundStageError, TransitionError},
    se_api::errors::{AllocationError, EscalationError, LedgerError, RefundFlowError, TransactionFlowError},
};

#[derive(Debug, Error)]
pub enum SqliteDatabaseError {
    #[error("Database connection error: {0}")]
    DriverError(#[from] sqlx::Error),
    #[error("Database migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
    #[error("Insufficient funds in {0}")]
    InsufficientFunds(AccountSelector),
    #[error("Account not found: {0}")]
    AccountNotFound(AccountSelector),
    #[error("An account already exists for {0}")]
    DuplicateAccount(AccountSelector),
    #[error("Allocation failed: {0}")]
    Allocation(AllocationError),
    #[error("Transaction #{0} does not exist")]
    TransactionNotFound(i64),
    #[error("Merchant #{0} does not exist")]
    MerchantNotFound(i64),
    #[error("Payment {0} does not exist")]
    PaymentNotFound(String),
    #[error("Payment {0} has already been resolved")]
    PaymentAlreadyResolved(String),
    #[error("Checkout prices changed since the quote")]
    PriceChanged,
    #[error("Invalid checkout: {0}")]
    InvalidCheckout(String),
    #[error("Illegal status transition: {0}")]
    Transition(#[from] TransitionError),
    #[error("Status of transaction #{0} changed underneath us")]
    StaleStatus(i64),
    #[error("Refund request #{0} does not exist")]
    RefundRequestNotFound(i64),
    #[error("Transaction #{0} already has a refund request")]
    DuplicateRefundRequest(i64),
    #[error("Refund request #{0} has no open status row")]
    MissingOpenStatus(i64),
    #[error("Illegal refund decision: {0}")]
    RefundStage(#[from] RefundStageError),
}

impl From<AllocationError> for SqliteDatabaseError {
    fn from(e: AllocationError) -> Self {
        SqliteDatabaseError::Allocation(e)
    }
}

impl From<SqliteDatabaseError> for LedgerError {
    fn from(e: SqliteDatabaseError) -> Self {
        match e {
            SqliteDatabaseError::InsufficientFunds(a) => LedgerError::InsufficientFunds(a),
            SqliteDatabaseError::AccountNotFound(a) => LedgerError::AccountNotFound(a),
            SqliteDatabaseError::DuplicateAccount(a) => LedgerError::DuplicateAccount(a),
            e => LedgerError::DatabaseError(e.to_string()),
        }
    }
}

impl From<SqliteDatabaseError> for AllocationError {
    fn from(e: SqliteDatabaseError) -> Self {
        match e {
            SqliteDatabaseError::Allocation(e) => e,
            e => AllocationError::DatabaseError(e.to_string()),
        }
    }
}

impl From<SqliteDatabaseError> for TransactionFlowError {
    fn from(e: SqliteDatabaseError) -> Self {
        match e {
            e @ (SqliteDatabaseError::InsufficientFunds(_) |
            SqliteDatabaseError::AccountNotFound(_) |
            SqliteDatabaseError::DuplicateAccount(_)) => TransactionFlowError::Ledger(e.into()),
            SqliteDatabaseError::Allocation(e) => TransactionFlowError::Allocation(e),
            SqliteDatabaseError::Transition(e) => TransactionFlowError::Transition(e),
            SqliteDatabaseError::TransactionNotFound(id) => TransactionFlowError::TransactionNotFound(id),
            SqliteDatabaseError::MerchantNotFound(id) => TransactionFlowError::MerchantNotFound(id),
            SqliteDatabaseError::PaymentNotFound(id) => TransactionFlowError::PaymentNotFound(id),
            SqliteDatabaseError::PaymentAlreadyResolved(id) => TransactionFlowError::PaymentAlreadyResolved(id),
            SqliteDatabaseError::PriceChanged => TransactionFlowError::PriceChanged,
            SqliteDatabaseError::InvalidCheckout(msg) => TransactionFlowError::InvalidCheckout(msg),
            SqliteDatabaseError::StaleStatus(id) => TransactionFlowError::StaleStatus(id),
            e => TransactionFlowError::DatabaseError(e.to_string()),
        }
    }
}

impl From<SqliteDatabaseError> for RefundFlowError {
    fn from(e: SqliteDatabaseError) -> Self {
        match e {
            SqliteDatabaseError::RefundRequestNotFound(id) => RefundFlowError::RefundRequestNotFound(id),
            SqliteDatabaseError::DuplicateRefundRequest(id) => RefundFlowError::DuplicateRefundRequest(id),
            SqliteDatabaseError::MissingOpenStatus(id) => RefundFlowError::MissingOpenStatus(id),
            SqliteDatabaseError::RefundStage(e) => RefundFlowError::Stage(e),
            e => RefundFlowError::Flow(e.into()),
        }
    }
}

impl From<SqliteDatabaseError> for EscalationError {
    fn from(e: SqliteDatabaseError) -> Self {
        EscalationError::DatabaseError(e.to_string())
    }
}

/// True when `e` is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}
