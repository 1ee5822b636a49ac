use crate::{
    db_types::{
        CheckoutQuote,
        InvoiceCode,
        Milestone,
        NewCheckout,
        PaymentRecord,
        PlatformAccounts,
        SettledTransaction,
        SettlementOutcome,
        SettlementTrigger,
        Transaction,
        TransactionDeliveryStatus,
        TransactionRecord,
        TransactionStatus,
    },
    se_api::errors::TransactionFlowError,
};

/// Checkout, payment and the transaction status machine.
#[allow(async_fn_in_trait)]
pub trait TransactionManagement: Clone {
    /// Prices a checkout from current catalog data without changing anything.
    async fn quote_checkout(&self, checkout: &NewCheckout) -> Result<CheckoutQuote, TransactionFlowError>;

    /// In a single atomic transaction:
    /// * records the payment under `payment_id`,
    /// * re-prices the checkout and fails with `PriceChanged` if it no longer matches `quote`,
    /// * creates one transaction (with status and delivery rows) per merchant cart,
    /// * reserves stock, pending sales, promotion quota and voucher quota.
    ///
    /// Wallet checkouts are also paid from the buyer's wallet and confirmed in the same transaction.
    async fn insert_checkout(
        &self,
        checkout: &NewCheckout,
        quote: &CheckoutQuote,
        payment_id: &str,
        accounts: &PlatformAccounts,
    ) -> Result<Vec<Transaction>, TransactionFlowError>;

    /// Marks a pending payment as paid, every transaction it covers as waited, and moves the money into the platform
    /// account.
    async fn confirm_payment(
        &self,
        payment_id: &str,
        accounts: &PlatformAccounts,
    ) -> Result<Vec<Transaction>, TransactionFlowError>;

    /// Marks a pending payment as cancelled, soft-deletes its transactions and releases their reservations.
    async fn fail_payment(&self, payment_id: &str) -> Result<Vec<Transaction>, TransactionFlowError>;

    async fn fetch_payment(&self, payment_id: &str) -> Result<Option<PaymentRecord>, TransactionFlowError>;

    async fn fetch_transaction(&self, id: i64) -> Result<Option<TransactionRecord>, TransactionFlowError>;

    async fn fetch_transaction_by_invoice(
        &self,
        invoice: &InvoiceCode,
    ) -> Result<Option<TransactionRecord>, TransactionFlowError>;

    async fn fetch_transactions_for_payment(&self, payment_id: &str) -> Result<Vec<Transaction>, TransactionFlowError>;

    async fn set_receipt_number(
        &self,
        id: i64,
        receipt_number: &str,
    ) -> Result<TransactionDeliveryStatus, TransactionFlowError>;

    /// Moves the transaction to `target`, which must be the milestone immediately after its current one.
    async fn advance_milestone(&self, id: i64, target: Milestone) -> Result<TransactionStatus, TransactionFlowError>;

    /// Takes the transaction to a terminal state and, in the same database transaction, moves the money and
    /// inventory that go with it. A second settlement of the same transaction fails with a conflict.
    async fn settle_transaction(
        &self,
        id: i64,
        outcome: SettlementOutcome,
        trigger: SettlementTrigger,
        note: Option<&str>,
        accounts: &PlatformAccounts,
    ) -> Result<SettledTransaction, TransactionFlowError>;
}
