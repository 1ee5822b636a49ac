//! `SqliteDatabase` is the SQLite implementation of the settlement engine backend.
//!
//! It composes the low-level functions in [`super::db`] into the traits defined in [`crate::traits`]. Anything that
//! has to commit as a unit runs inside one sqlx transaction, which rolls back when dropped uncommitted.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{
    checkout,
    db_url,
    escalation,
    ledger,
    new_pool,
    payments,
    refunds,
    settlement,
    transactions,
    SqliteDatabaseError,
};
use crate::{
    config::SweepKind,
    db_types::{
        AccountSelector,
        AppliedRefundDecision,
        CheckoutQuote,
        InvoiceCode,
        LedgerMove,
        MerchantHoldingAccount,
        MerchantHoldingAccountHistory,
        Milestone,
        Money,
        NewCheckout,
        NewRefundRequest,
        PaymentMethod,
        PaymentRecord,
        PlatformAccounts,
        RefundDecision,
        RefundRequest,
        RefundRequestStatus,
        SettledTransaction,
        SettlementOutcome,
        SettlementTrigger,
        Transaction,
        TransactionDeliveryStatus,
        TransactionRecord,
        TransactionStatus,
        Wallet,
        WalletHistory,
    },
    se_api::errors::{EscalationError, LedgerError, RefundFlowError, TransactionFlowError},
    traits::{EscalationManagement, LedgerManagement, RefundManagement, TransactionManagement},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using `MSE_DATABASE_URL` or the default URL.
    pub async fn new(max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date.
    pub async fn migrate(&self) -> Result<(), SqliteDatabaseError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }
}

impl LedgerManagement for SqliteDatabase {
    async fn open_wallet(&self, user_id: i64) -> Result<Wallet, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        let wallet = ledger::open_wallet(user_id, Self::now(), &mut conn).await?;
        debug!("🗃️ Wallet #{} opened for user #{user_id}", wallet.id);
        Ok(wallet)
    }

    async fn open_holding_account(&self, merchant_id: i64) -> Result<MerchantHoldingAccount, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        let account = ledger::open_holding_account(merchant_id, Self::now(), &mut conn).await?;
        debug!("🗃️ Holding account #{} opened for merchant #{merchant_id}", account.id);
        Ok(account)
    }

    async fn fetch_wallet(&self, account: AccountSelector) -> Result<Option<Wallet>, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(ledger::fetch_wallet(account, &mut conn).await?)
    }

    async fn fetch_holding_account(&self, merchant_id: i64) -> Result<Option<MerchantHoldingAccount>, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(ledger::fetch_holding_account(merchant_id, &mut conn).await?)
    }

    async fn balance(&self, account: AccountSelector) -> Result<Money, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(ledger::balance(account, &mut conn).await?)
    }

    async fn adjust_balance(&self, account: AccountSelector, delta: Money) -> Result<Money, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        let (_, balance) = ledger::adjust_balance(account, delta, Self::now(), &mut conn).await?;
        Ok(balance)
    }

    async fn apply_moves(&self, moves: &[LedgerMove]) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await.map_err(SqliteDatabaseError::from)?;
        let now = Self::now();
        for mv in moves {
            ledger::apply_move(mv, now, &mut tx).await?;
        }
        tx.commit().await.map_err(SqliteDatabaseError::from)?;
        Ok(())
    }

    async fn top_up_wallet(&self, user_id: i64, amount: Money) -> Result<Money, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(SqliteDatabaseError::from)?;
        let balance = ledger::top_up_wallet(user_id, amount, Self::now(), &mut tx).await?;
        tx.commit().await.map_err(SqliteDatabaseError::from)?;
        Ok(balance)
    }

    async fn withdraw_merchant_funds(&self, merchant_id: i64, amount: Money) -> Result<Money, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(SqliteDatabaseError::from)?;
        let balance = ledger::withdraw_merchant_funds(merchant_id, amount, Self::now(), &mut tx).await?;
        tx.commit().await.map_err(SqliteDatabaseError::from)?;
        Ok(balance)
    }

    async fn fetch_holding_history(&self, merchant_id: i64) -> Result<Vec<MerchantHoldingAccountHistory>, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(ledger::holding_history(merchant_id, &mut conn).await?)
    }

    async fn fetch_wallet_history(&self, account: AccountSelector) -> Result<Vec<WalletHistory>, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(ledger::wallet_history(account, &mut conn).await?)
    }
}

impl TransactionManagement for SqliteDatabase {
    async fn quote_checkout(&self, checkout: &NewCheckout) -> Result<CheckoutQuote, TransactionFlowError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(checkout::quote_checkout(checkout, Self::now(), &mut conn).await?)
    }

    async fn insert_checkout(
        &self,
        checkout: &NewCheckout,
        quote: &CheckoutQuote,
        payment_id: &str,
        accounts: &PlatformAccounts,
    ) -> Result<Vec<Transaction>, TransactionFlowError> {
        let mut tx = self.pool.begin().await.map_err(SqliteDatabaseError::from)?;
        let now = Self::now();
        let txs = match checkout.method {
            PaymentMethod::Gateway => checkout::insert_checkout(checkout, quote, payment_id, now, &mut tx).await?,
            PaymentMethod::Wallet => {
                checkout::insert_wallet_checkout(checkout, quote, payment_id, accounts, now, &mut tx).await?
            },
        };
        tx.commit().await.map_err(SqliteDatabaseError::from)?;
        Ok(txs)
    }

    async fn confirm_payment(
        &self,
        payment_id: &str,
        accounts: &PlatformAccounts,
    ) -> Result<Vec<Transaction>, TransactionFlowError> {
        let mut tx = self.pool.begin().await.map_err(SqliteDatabaseError::from)?;
        let txs = settlement::confirm_payment(payment_id, accounts, Self::now(), &mut tx).await?;
        tx.commit().await.map_err(SqliteDatabaseError::from)?;
        Ok(txs)
    }

    async fn fail_payment(&self, payment_id: &str) -> Result<Vec<Transaction>, TransactionFlowError> {
        let mut tx = self.pool.begin().await.map_err(SqliteDatabaseError::from)?;
        let txs = settlement::fail_payment(payment_id, Self::now(), &mut tx).await?;
        tx.commit().await.map_err(SqliteDatabaseError::from)?;
        Ok(txs)
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<Option<PaymentRecord>, TransactionFlowError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(payments::fetch_payment(payment_id, &mut conn).await?)
    }

    async fn fetch_transaction(&self, id: i64) -> Result<Option<TransactionRecord>, TransactionFlowError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(transactions::fetch_record(id, &mut conn).await?)
    }

    async fn fetch_transaction_by_invoice(
        &self,
        invoice: &InvoiceCode,
    ) -> Result<Option<TransactionRecord>, TransactionFlowError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        let Some(tx) = transactions::fetch_transaction_by_invoice(invoice, &mut conn).await? else {
            return Ok(None);
        };
        Ok(transactions::fetch_record(tx.id, &mut conn).await?)
    }

    async fn fetch_transactions_for_payment(&self, payment_id: &str) -> Result<Vec<Transaction>, TransactionFlowError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(transactions::fetch_transactions_for_payment(payment_id, &mut conn).await?)
    }

    async fn set_receipt_number(
        &self,
        id: i64,
        receipt_number: &str,
    ) -> Result<TransactionDeliveryStatus, TransactionFlowError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(transactions::set_receipt_number(id, receipt_number, &mut conn).await?)
    }

    async fn advance_milestone(&self, id: i64, target: Milestone) -> Result<TransactionStatus, TransactionFlowError> {
        let mut tx = self.pool.begin().await.map_err(SqliteDatabaseError::from)?;
        let status = transactions::advance_milestone(id, target, Self::now(), &mut tx).await?;
        tx.commit().await.map_err(SqliteDatabaseError::from)?;
        Ok(status)
    }

    async fn settle_transaction(
        &self,
        id: i64,
        outcome: SettlementOutcome,
        trigger: SettlementTrigger,
        note: Option<&str>,
        accounts: &PlatformAccounts,
    ) -> Result<SettledTransaction, TransactionFlowError> {
        let mut tx = self.pool.begin().await.map_err(SqliteDatabaseError::from)?;
        let settled = settlement::settle_transaction(id, outcome, trigger, note, accounts, Self::now(), &mut tx).await?;
        tx.commit().await.map_err(SqliteDatabaseError::from)?;
        Ok(settled)
    }
}

impl RefundManagement for SqliteDatabase {
    async fn open_refund_request(&self, request: &NewRefundRequest) -> Result<RefundRequest, RefundFlowError> {
        let mut tx = self.pool.begin().await.map_err(SqliteDatabaseError::from)?;
        let refund = refunds::open_refund_request(request, Self::now(), &mut tx).await?;
        tx.commit().await.map_err(SqliteDatabaseError::from)?;
        Ok(refund)
    }

    async fn apply_refund_decision(
        &self,
        request_id: i64,
        decision: RefundDecision,
        max_buyer_rejections: u32,
        accounts: &PlatformAccounts,
    ) -> Result<AppliedRefundDecision, RefundFlowError> {
        let mut tx = self.pool.begin().await.map_err(SqliteDatabaseError::from)?;
        let applied =
            refunds::apply_decision(request_id, decision, max_buyer_rejections, accounts, Self::now(), &mut tx).await?;
        tx.commit().await.map_err(SqliteDatabaseError::from)?;
        Ok(applied)
    }

    async fn fetch_refund_request(&self, id: i64) -> Result<Option<RefundRequest>, RefundFlowError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(refunds::fetch_refund_request(id, &mut conn).await?)
    }

    async fn fetch_refund_request_for_transaction(
        &self,
        transaction_id: i64,
    ) -> Result<Option<RefundRequest>, RefundFlowError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(refunds::fetch_refund_request_for_transaction(transaction_id, &mut conn).await?)
    }

    async fn fetch_refund_history(&self, id: i64) -> Result<Vec<RefundRequestStatus>, RefundFlowError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(refunds::fetch_history(id, &mut conn).await?)
    }
}

impl EscalationManagement for SqliteDatabase {
    async fn fetch_stalled(
        &self,
        kind: SweepKind,
        cutoff: DateTime<Utc>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<i64>, EscalationError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        Ok(escalation::fetch_stalled(kind, cutoff, limit, offset, &mut conn).await?)
    }
}
