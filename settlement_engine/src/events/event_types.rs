use serde::{Deserialize, Serialize};

use crate::db_types::{InvoiceCode, Money, RefundStage, SettledTransaction, SettlementOutcome};

/// Published once a transaction reaches a terminal state and its money has moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSettledEvent {
    pub transaction_id: i64,
    pub invoice_code: InvoiceCode,
    pub buyer_id: i64,
    pub merchant_id: i64,
    pub outcome: SettlementOutcome,
    pub settlement_amount: Money,
}

impl From<&SettledTransaction> for TransactionSettledEvent {
    fn from(settled: &SettledTransaction) -> Self {
        let tx = &settled.transaction;
        Self {
            transaction_id: tx.id,
            invoice_code: tx.invoice_code.clone(),
            buyer_id: tx.buyer_id,
            merchant_id: tx.merchant_id,
            outcome: settled.outcome,
            settlement_amount: tx.settlement_amount(),
        }
    }
}

/// Published whenever a refund request is opened or moves to another stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundUpdatedEvent {
    pub refund_request_id: i64,
    pub transaction_id: i64,
    pub stage: RefundStage,
}

impl RefundUpdatedEvent {
    pub fn new(refund_request_id: i64, transaction_id: i64, stage: RefundStage) -> Self {
        Self { refund_request_id, transaction_id, stage }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    TransactionSettled(TransactionSettledEvent),
    RefundUpdated(RefundUpdatedEvent),
}
