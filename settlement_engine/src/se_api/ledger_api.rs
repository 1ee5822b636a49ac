use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{AccountSelector, MerchantHoldingAccount, MerchantHoldingAccountHistory, Money, Wallet, WalletHistory},
    se_api::errors::LedgerError,
    traits::LedgerManagement,
};

/// Balances of wallets and merchant holding accounts.
pub struct LedgerApi<B> {
    db: B,
}

impl<B> Debug for LedgerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LedgerApi")
    }
}

impl<B> LedgerApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> LedgerApi<B>
where B: LedgerManagement
{
    pub async fn open_wallet(&self, user_id: i64) -> Result<Wallet, LedgerError> {
        self.db.open_wallet(user_id).await
    }

    pub async fn open_holding_account(&self, merchant_id: i64) -> Result<MerchantHoldingAccount, LedgerError> {
        self.db.open_holding_account(merchant_id).await
    }

    pub async fn wallet(&self, account: AccountSelector) -> Result<Wallet, LedgerError> {
        self.db.fetch_wallet(account).await?.ok_or(LedgerError::AccountNotFound(account))
    }

    pub async fn holding_account(&self, merchant_id: i64) -> Result<MerchantHoldingAccount, LedgerError> {
        self.db
            .fetch_holding_account(merchant_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(AccountSelector::ByMerchantId(merchant_id)))
    }

    pub async fn balance(&self, account: AccountSelector) -> Result<Money, LedgerError> {
        self.db.balance(account).await
    }

    /// Adds `delta` (which may be negative) to the account balance, as long as the balance stays non-negative.
    ///
    /// This is the raw ledger primitive. It leaves no history; flows that move money for a reason go through the
    /// dedicated methods instead.
    pub async fn adjust_balance(&self, account: AccountSelector, delta: Money) -> Result<Money, LedgerError> {
        let balance = self.db.adjust_balance(account, delta).await?;
        trace!("🔄️💰️ {account} adjusted by {delta}. Balance is now {balance}");
        Ok(balance)
    }

    pub async fn top_up_wallet(&self, user_id: i64, amount: Money) -> Result<Money, LedgerError> {
        if amount <= Money::ZERO {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let balance = self.db.top_up_wallet(user_id, amount).await?;
        info!("🔄️💰️ Wallet of user #{user_id} topped up with {amount}. Balance is now {balance}");
        Ok(balance)
    }

    pub async fn withdraw_merchant_funds(&self, merchant_id: i64, amount: Money) -> Result<Money, LedgerError> {
        if amount <= Money::ZERO {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let balance = self.db.withdraw_merchant_funds(merchant_id, amount).await?;
        info!("🔄️💰️ Merchant #{merchant_id} withdrew {amount}. Balance is now {balance}");
        Ok(balance)
    }

    pub async fn holding_history(&self, merchant_id: i64) -> Result<Vec<MerchantHoldingAccountHistory>, LedgerError> {
        self.db.fetch_holding_history(merchant_id).await
    }

    pub async fn wallet_history(&self, account: AccountSelector) -> Result<Vec<WalletHistory>, LedgerError> {
        self.db.fetch_wallet_history(account).await
    }
}
