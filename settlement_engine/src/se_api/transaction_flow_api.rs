use std::fmt::Debug;

use log::*;

use crate::{
    config::EngineConfig,
    db_types::{
        InvoiceCode,
        Milestone,
        SettledTransaction,
        SettlementOutcome,
        SettlementTrigger,
        TransactionDeliveryStatus,
        TransactionRecord,
        TransactionStatus,
    },
    events::{EventProducers, TransactionSettledEvent},
    helpers::{normalize_receipt_number, parse_invoice_code},
    se_api::errors::TransactionFlowError,
    traits::TransactionManagement,
};

/// `TransactionFlowApi` moves a paid transaction through its milestones and settles it.
///
/// | From \ To   | processed | on_delivery  | delivered | completed | canceled |
/// |-------------|-----------|--------------|-----------|-----------|----------|
/// | waited      | ok        | skip         | skip      | no        | ok       |
/// | processed   | reverse   | receipt req. | skip      | no        | ok       |
/// | on_delivery | reverse   | reverse      | ok        | no        | shipped  |
/// | delivered   | reverse   | reverse      | reverse   | ok        | shipped  |
///
/// Refunds are not available here: only the refund negotiation can refund a transaction.
pub struct TransactionFlowApi<B> {
    db: B,
    config: EngineConfig,
    producers: EventProducers,
}

impl<B> Debug for TransactionFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TransactionFlowApi")
    }
}

impl<B> TransactionFlowApi<B> {
    pub fn new(db: B, config: EngineConfig, producers: EventProducers) -> Self {
        Self { db, config, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> TransactionFlowApi<B>
where B: TransactionManagement
{
    pub async fn fetch(&self, id: i64) -> Result<TransactionRecord, TransactionFlowError> {
        self.db.fetch_transaction(id).await?.ok_or(TransactionFlowError::TransactionNotFound(id))
    }

    /// Looks a transaction up by its invoice code. Malformed codes are refused without touching the database.
    pub async fn fetch_by_invoice(
        &self,
        invoice: &InvoiceCode,
    ) -> Result<Option<TransactionRecord>, TransactionFlowError> {
        let (_, merchant_id) = parse_invoice_code(invoice.as_str())
            .ok_or_else(|| TransactionFlowError::InvalidInvoiceCode(invoice.to_string()))?;
        let record = self.db.fetch_transaction_by_invoice(invoice).await?;
        Ok(record.filter(|r| r.transaction.merchant_id == merchant_id))
    }

    /// Records the carrier's receipt number. It is normalised to upper case first and must look like a receipt.
    pub async fn set_receipt_number(
        &self,
        id: i64,
        receipt_number: &str,
    ) -> Result<TransactionDeliveryStatus, TransactionFlowError> {
        let receipt = normalize_receipt_number(receipt_number).ok_or(TransactionFlowError::InvalidReceiptNumber)?;
        let delivery = self.db.set_receipt_number(id, &receipt).await?;
        debug!("🔄️🚚️ Receipt {receipt} recorded for transaction #{id}");
        Ok(delivery)
    }

    /// Moves the transaction to `target`, which must be the milestone right after its current one.
    pub async fn advance(&self, id: i64, target: Milestone) -> Result<TransactionStatus, TransactionFlowError> {
        let status = self.db.advance_milestone(id, target).await?;
        info!("🔄️🚚️ Transaction #{id} is now {target}");
        Ok(status)
    }

    /// Cancels a paid transaction that has not shipped. The buyer gets their money back and every reservation is
    /// released.
    pub async fn cancel(&self, id: i64, note: Option<&str>) -> Result<SettledTransaction, TransactionFlowError> {
        self.settle(id, SettlementOutcome::Canceled, note).await
    }

    /// Completes a delivered transaction and pays the merchant.
    pub async fn complete(&self, id: i64) -> Result<SettledTransaction, TransactionFlowError> {
        self.settle(id, SettlementOutcome::Completed, None).await
    }

    async fn settle(
        &self,
        id: i64,
        outcome: SettlementOutcome,
        note: Option<&str>,
    ) -> Result<SettledTransaction, TransactionFlowError> {
        let settled =
            self.db.settle_transaction(id, outcome, SettlementTrigger::Direct, note, &self.config.accounts).await?;
        info!("🔄️💰️ Transaction #{id} {outcome}. Settlement amount: {}", settled.transaction.settlement_amount());
        self.producers.publish_transaction_settled(TransactionSettledEvent::from(&settled)).await;
        Ok(settled)
    }
}
