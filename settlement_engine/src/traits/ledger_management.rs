use crate::{
    db_types::{
        AccountSelector,
        LedgerMove,
        MerchantHoldingAccount,
        MerchantHoldingAccountHistory,
        Money,
        Wallet,
        WalletHistory,
    },
    se_api::errors::LedgerError,
};

#[allow(async_fn_in_trait)]
pub trait LedgerManagement: Clone {
    async fn open_wallet(&self, user_id: i64) -> Result<Wallet, LedgerError>;

    async fn open_holding_account(&self, merchant_id: i64) -> Result<MerchantHoldingAccount, LedgerError>;

    /// Fetches a wallet by wallet id or by owner. `ByMerchantId` never matches a wallet.
    async fn fetch_wallet(&self, account: AccountSelector) -> Result<Option<Wallet>, LedgerError>;

    async fn fetch_holding_account(&self, merchant_id: i64) -> Result<Option<MerchantHoldingAccount>, LedgerError>;

    async fn balance(&self, account: AccountSelector) -> Result<Money, LedgerError>;

    /// Adds `delta` to the balance of `account` in a single atomic statement and returns the new balance.
    ///
    /// If the new balance would be negative nothing is changed and [`LedgerError::InsufficientFunds`] is returned.
    /// No history row is written; use [`Self::apply_moves`] for movements that should be recorded.
    async fn adjust_balance(&self, account: AccountSelector, delta: Money) -> Result<Money, LedgerError>;

    /// Applies a set of moves, with their history rows, in one database transaction.
    async fn apply_moves(&self, moves: &[LedgerMove]) -> Result<(), LedgerError>;

    async fn top_up_wallet(&self, user_id: i64, amount: Money) -> Result<Money, LedgerError>;

    async fn withdraw_merchant_funds(&self, merchant_id: i64, amount: Money) -> Result<Money, LedgerError>;

    async fn fetch_holding_history(&self, merchant_id: i64) -> Result<Vec<MerchantHoldingAccountHistory>, LedgerError>;

    async fn fetch_wallet_history(&self, account: AccountSelector) -> Result<Vec<WalletHistory>, LedgerError>;
}
