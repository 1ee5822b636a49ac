use thiserror::Error;

use crate::{
    db_types::{AccountSelector, Money, RefundStageError, TransitionError},
    external::{CacheError, GatewayError},
};

/// How a caller should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request was not allowed in the current state. Nothing changed.
    Validation,
    /// Money, stock or a concurrent writer got in the way. Nothing changed.
    Conflict,
    NotFound,
    /// The backend failed unexpectedly. Everything was rolled back.
    Integrity,
    /// A collaborator failed. Retry later.
    External,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::External)
    }
}

impl TransitionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransitionError::AlreadyTerminal(_) => ErrorKind::Conflict,
            _ => ErrorKind::Validation,
        }
    }
}

//--------------------------------------     LedgerError     ---------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Insufficient funds in {0}")]
    InsufficientFunds(AccountSelector),
    #[error("No such account: {0}")]
    AccountNotFound(AccountSelector),
    #[error("An account already exists for {0}")]
    DuplicateAccount(AccountSelector),
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Money),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InsufficientFunds(_) | LedgerError::DuplicateAccount(_) => ErrorKind::Conflict,
            LedgerError::AccountNotFound(_) => ErrorKind::NotFound,
            LedgerError::InvalidAmount(_) => ErrorKind::Validation,
            LedgerError::DatabaseError(_) => ErrorKind::Integrity,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

//--------------------------------------   AllocationError   ---------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum AllocationError {
    #[error("Not enough stock of variant #{variant_id} (product #{product_id})")]
    InsufficientStock { product_id: i64, variant_id: i64 },
    #[error("Variant #{variant_id} of product #{product_id} does not exist")]
    VariantNotFound { product_id: i64, variant_id: i64 },
    #[error("Product #{0} does not exist")]
    ProductNotFound(i64),
    #[error("Promotion #{0} is unknown or has no quota left")]
    PromotionUnavailable(i64),
    #[error("Marketplace voucher #{0} is unknown, expired or used up")]
    MarketplaceVoucherUnavailable(i64),
    #[error("Voucher #{voucher_id} of merchant '{merchant_domain}' is unknown, expired or used up")]
    MerchantVoucherUnavailable { merchant_domain: String, voucher_id: i64 },
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl AllocationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AllocationError::InsufficientStock { .. } |
            AllocationError::PromotionUnavailable(_) |
            AllocationError::MarketplaceVoucherUnavailable(_) |
            AllocationError::MerchantVoucherUnavailable { .. } => ErrorKind::Conflict,
            AllocationError::VariantNotFound { .. } | AllocationError::ProductNotFound(_) => ErrorKind::NotFound,
            AllocationError::DatabaseError(_) => ErrorKind::Integrity,
        }
    }
}

//-------------------------------------- TransactionFlowError ---------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum TransactionFlowError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("Transaction #{0} does not exist")]
    TransactionNotFound(i64),
    #[error("Payment {0} does not exist")]
    PaymentNotFound(String),
    #[error("Payment {0} has already been confirmed or failed")]
    PaymentAlreadyResolved(String),
    #[error("Merchant #{0} does not exist")]
    MerchantNotFound(i64),
    #[error("The status of transaction #{0} changed while the request was being processed")]
    StaleStatus(i64),
    #[error("Prices changed since the checkout was quoted")]
    PriceChanged,
    #[error("Invalid checkout: {0}")]
    InvalidCheckout(String),
    #[error("Invalid receipt number")]
    InvalidReceiptNumber,
    #[error("{0} is not an invoice code")]
    InvalidInvoiceCode(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl TransactionFlowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransactionFlowError::Ledger(e) => e.kind(),
            TransactionFlowError::Allocation(e) => e.kind(),
            TransactionFlowError::Transition(e) => e.kind(),
            TransactionFlowError::Gateway(_) => ErrorKind::External,
            TransactionFlowError::TransactionNotFound(_) |
            TransactionFlowError::PaymentNotFound(_) |
            TransactionFlowError::MerchantNotFound(_) => ErrorKind::NotFound,
            TransactionFlowError::PaymentAlreadyResolved(_) |
            TransactionFlowError::StaleStatus(_) |
            TransactionFlowError::PriceChanged => ErrorKind::Conflict,
            TransactionFlowError::InvalidCheckout(_) |
            TransactionFlowError::InvalidReceiptNumber |
            TransactionFlowError::InvalidInvoiceCode(_) => ErrorKind::Validation,
            TransactionFlowError::DatabaseError(_) => ErrorKind::Integrity,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

//--------------------------------------   RefundFlowError   ---------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum RefundFlowError {
    #[error(transparent)]
    Flow(#[from] TransactionFlowError),
    #[error(transparent)]
    Stage(#[from] RefundStageError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("Refund request #{0} does not exist")]
    RefundRequestNotFound(i64),
    #[error("Transaction #{0} already has a refund request")]
    DuplicateRefundRequest(i64),
    #[error("Refund request #{0} has no open status row")]
    MissingOpenStatus(i64),
    #[error("The caller is not a party to this transaction")]
    NotAParty,
    #[error("A refund reason is required")]
    ReasonRequired,
    #[error("Too many refund requests. Try again in {retry_after_secs}s")]
    TooManyRequests { retry_after_secs: i64 },
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<TransitionError> for RefundFlowError {
    fn from(e: TransitionError) -> Self {
        RefundFlowError::Flow(e.into())
    }
}

impl RefundFlowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RefundFlowError::Flow(e) => e.kind(),
            RefundFlowError::Stage(_) | RefundFlowError::NotAParty | RefundFlowError::ReasonRequired => {
                ErrorKind::Validation
            },
            RefundFlowError::Cache(_) => ErrorKind::External,
            RefundFlowError::RefundRequestNotFound(_) => ErrorKind::NotFound,
            RefundFlowError::DuplicateRefundRequest(_) | RefundFlowError::TooManyRequests { .. } => {
                ErrorKind::Conflict
            },
            RefundFlowError::MissingOpenStatus(_) | RefundFlowError::DatabaseError(_) => ErrorKind::Integrity,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

//--------------------------------------   EscalationError   ---------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum EscalationError {
    #[error("Could not fetch the batch: {0}")]
    DatabaseError(String),
}

impl EscalationError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Integrity
    }
}
