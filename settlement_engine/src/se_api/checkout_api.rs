use std::fmt::Debug;

use chrono::Utc;
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    config::EngineConfig,
    db_types::{CheckoutQuote, Money, NewCheckout, PaymentMethod, Transaction},
    external::{PaymentGateway, PaymentRedirect},
    helpers::new_wallet_payment_id,
    se_api::errors::TransactionFlowError,
    traits::TransactionManagement,
};

/// The result of a successful checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutReceipt {
    pub payment_id: String,
    pub total: Money,
    /// Where the buyer completes a gateway payment. `None` for wallet payments, which are already paid.
    pub redirect: Option<PaymentRedirect>,
    pub transactions: Vec<Transaction>,
}

/// `CheckoutApi` turns a buyer's carts into transactions, and handles the payment gateway's callbacks.
pub struct CheckoutApi<B, G> {
    db: B,
    gateway: G,
    config: EngineConfig,
}

impl<B, G> Debug for CheckoutApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutApi")
    }
}

impl<B, G> CheckoutApi<B, G> {
    pub fn new(db: B, gateway: G, config: EngineConfig) -> Self {
        Self { db, gateway, config }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, G> CheckoutApi<B, G>
where
    B: TransactionManagement,
    G: PaymentGateway,
{
    /// Prices the checkout without reserving anything.
    pub async fn quote(&self, checkout: &NewCheckout) -> Result<CheckoutQuote, TransactionFlowError> {
        self.db.quote_checkout(checkout).await
    }

    /// Creates one transaction per merchant cart and reserves their stock, promotion and voucher quota.
    ///
    /// * Gateway checkouts ask the gateway to collect the total from `source_account` first. The transactions stay
    ///   unpaid until the gateway calls back through [`Self::confirm_payment`] or [`Self::fail_payment`].
    /// * Wallet checkouts are paid from the buyer's wallet within the same database transaction, so they come back
    ///   already waited. `source_account` is ignored.
    ///
    /// If prices change between quoting and reserving, nothing is created and `PriceChanged` is returned.
    pub async fn checkout(
        &self,
        checkout: &NewCheckout,
        source_account: Option<&str>,
    ) -> Result<CheckoutReceipt, TransactionFlowError> {
        let quote = self.db.quote_checkout(checkout).await?;
        let total = quote.total();
        let (payment_id, redirect) = match checkout.method {
            PaymentMethod::Gateway => {
                let source = source_account.ok_or_else(|| {
                    TransactionFlowError::InvalidCheckout("Gateway payments need a source account".into())
                })?;
                let redirect = self.gateway.request_payment(source, total).await?;
                debug!("🔄️🛒️ Gateway opened payment {} for {total}", redirect.payment_id);
                (redirect.payment_id.clone(), Some(redirect))
            },
            PaymentMethod::Wallet => (new_wallet_payment_id(checkout.buyer_id, Utc::now()), None),
        };
        let transactions = match self.db.insert_checkout(checkout, &quote, &payment_id, &self.config.accounts).await {
            Ok(txs) => txs,
            Err(e) => {
                if redirect.is_some() {
                    warn!("🔄️🛒️ Payment {payment_id} was opened with the gateway but the checkout failed: {e}");
                }
                return Err(e);
            },
        };
        info!(
            "🔄️🛒️ Buyer #{} checked out {} transactions for {total} ({} payment {payment_id})",
            checkout.buyer_id,
            transactions.len(),
            checkout.method
        );
        Ok(CheckoutReceipt { payment_id, total, redirect, transactions })
    }

    /// The gateway reports that the buyer paid. Every transaction on the payment becomes waited.
    pub async fn confirm_payment(&self, payment_id: &str) -> Result<Vec<Transaction>, TransactionFlowError> {
        trace!("🔄️✅️ Payment {payment_id} is being marked as paid");
        let txs = self.db.confirm_payment(payment_id, &self.config.accounts).await?;
        info!("🔄️✅️ Payment {payment_id} confirmed. {} transactions are now waited", txs.len());
        Ok(txs)
    }

    /// The gateway reports that the payment failed. The transactions are withdrawn and their reservations released.
    pub async fn fail_payment(&self, payment_id: &str) -> Result<Vec<Transaction>, TransactionFlowError> {
        trace!("🔄️❌️ Payment {payment_id} is being marked as failed");
        let txs = self.db.fail_payment(payment_id).await?;
        info!("🔄️❌️ Payment {payment_id} failed. {} transactions withdrawn", txs.len());
        Ok(txs)
    }
}
