//! The ledger primitive.
//!
//! Every balance change is one `UPDATE` whose `WHERE` clause refuses to take a balance below zero, so concurrent
//! debits of the same account can never overdraw it, and nothing needs to be read before writing.
use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use super::{errors::is_unique_violation, SqliteDatabaseError};
use crate::db_types::{
    AccountSelector,
    LedgerMove,
    MerchantHoldingAccount,
    MerchantHoldingAccountHistory,
    Money,
    MovementReason,
    Wallet,
    WalletHistory,
};

pub async fn open_wallet(
    user_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Wallet, SqliteDatabaseError> {
    let result = sqlx::query_as(
        "INSERT INTO wallets (user_id, balance, created_at, updated_at) VALUES ($1, 0, $2, $2) RETURNING *",
    )
    .bind(user_id)
    .bind(now)
    .fetch_one(conn)
    .await;
    match result {
        Ok(wallet) => Ok(wallet),
        Err(e) if is_unique_violation(&e) => {
            Err(SqliteDatabaseError::DuplicateAccount(AccountSelector::ByUserId(user_id)))
        },
        Err(e) => Err(e.into()),
    }
}

/// Opens the wallet of `user_id` unless it already has one.
pub async fn ensure_wallet(
    user_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let result = sqlx::query(
        r#"
    INSERT INTO wallets (user_id, balance, created_at, updated_at)
    VALUES ($1, 0, $2, $2)
    ON CONFLICT (user_id) DO NOTHING
    "#,
    )
    .bind(user_id)
    .bind(now)
    .execute(conn)
    .await?;
    if result.rows_affected() > 0 {
        debug!("🗃️ Opened a wallet for user #{user_id}");
    }
    Ok(())
}

pub async fn open_holding_account(
    merchant_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<MerchantHoldingAccount, SqliteDatabaseError> {
    let result = sqlx::query_as(
        r#"
    INSERT INTO merchant_holding_accounts (merchant_id, balance, created_at, updated_at)
    VALUES ($1, 0, $2, $2)
    RETURNING *
    "#,
    )
    .bind(merchant_id)
    .bind(now)
    .fetch_one(conn)
    .await;
    match result {
        Ok(account) => Ok(account),
        Err(e) if is_unique_violation(&e) => {
            Err(SqliteDatabaseError::DuplicateAccount(AccountSelector::ByMerchantId(merchant_id)))
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_wallet(
    account: AccountSelector,
    conn: &mut SqliteConnection,
) -> Result<Option<Wallet>, SqliteDatabaseError> {
    let wallet = match account {
        AccountSelector::ByWalletId(id) => {
            sqlx::query_as("SELECT * FROM wallets WHERE id = $1").bind(id).fetch_optional(conn).await?
        },
        AccountSelector::ByUserId(id) => {
            sqlx::query_as("SELECT * FROM wallets WHERE user_id = $1").bind(id).fetch_optional(conn).await?
        },
        AccountSelector::ByMerchantId(_) => None,
    };
    Ok(wallet)
}

pub async fn fetch_holding_account(
    merchant_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<MerchantHoldingAccount>, SqliteDatabaseError> {
    let account = sqlx::query_as("SELECT * FROM merchant_holding_accounts WHERE merchant_id = $1")
        .bind(merchant_id)
        .fetch_optional(conn)
        .await?;
    Ok(account)
}

pub async fn balance(account: AccountSelector, conn: &mut SqliteConnection) -> Result<Money, SqliteDatabaseError> {
    let balance = match account {
        AccountSelector::ByMerchantId(id) => fetch_holding_account(id, conn).await?.map(|a| a.balance),
        _ => fetch_wallet(account, conn).await?.map(|w| w.balance),
    };
    balance.ok_or(SqliteDatabaseError::AccountNotFound(account))
}

async fn account_exists(account: AccountSelector, conn: &mut SqliteConnection) -> Result<bool, SqliteDatabaseError> {
    let sql = match account {
        AccountSelector::ByWalletId(_) => "SELECT COUNT(*) FROM wallets WHERE id = $1",
        AccountSelector::ByUserId(_) => "SELECT COUNT(*) FROM wallets WHERE user_id = $1",
        AccountSelector::ByMerchantId(_) => "SELECT COUNT(*) FROM merchant_holding_accounts WHERE merchant_id = $1",
    };
    let id = match account {
        AccountSelector::ByWalletId(id) | AccountSelector::ByUserId(id) | AccountSelector::ByMerchantId(id) => id,
    };
    let (count,): (i64,) = sqlx::query_as(sql).bind(id).fetch_one(conn).await?;
    Ok(count > 0)
}

/// Adds `delta` (which may be negative) to the balance of `account`.
///
/// Returns the id of the underlying account row and the new balance. If the result would be negative, nothing is
/// changed and `InsufficientFunds` is returned.
pub async fn adjust_balance(
    account: AccountSelector,
    delta: Money,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(i64, Money), SqliteDatabaseError> {
    let (sql, id) = match account {
        AccountSelector::ByWalletId(id) => (
            r#"UPDATE wallets SET balance = balance + $1, updated_at = $2
            WHERE id = $3 AND balance + $1 >= 0 RETURNING id, balance"#,
            id,
        ),
        AccountSelector::ByUserId(id) => (
            r#"UPDATE wallets SET balance = balance + $1, updated_at = $2
            WHERE user_id = $3 AND balance + $1 >= 0 RETURNING id, balance"#,
            id,
        ),
        AccountSelector::ByMerchantId(id) => (
            r#"UPDATE merchant_holding_accounts SET balance = balance + $1, updated_at = $2
            WHERE merchant_id = $3 AND balance + $1 >= 0 RETURNING id, balance"#,
            id,
        ),
    };
    let updated: Option<(i64, Money)> =
        sqlx::query_as(sql).bind(delta).bind(now).bind(id).fetch_optional(&mut *conn).await?;
    match updated {
        Some((row_id, balance)) => {
            trace!("🗃️ Adjusted {account} by {delta}. New balance: {balance}");
            Ok((row_id, balance))
        },
        None if account_exists(account, conn).await? => {
            debug!("🗃️ Rejected adjustment of {account} by {delta}: insufficient funds");
            Err(SqliteDatabaseError::InsufficientFunds(account))
        },
        None => Err(SqliteDatabaseError::AccountNotFound(account)),
    }
}

/// Applies one ledger move and writes its history row.
pub async fn apply_move(
    mv: &LedgerMove,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Money, SqliteDatabaseError> {
    let (row_id, balance) = adjust_balance(mv.account, mv.delta, now, conn).await?;
    match mv.account {
        AccountSelector::ByMerchantId(merchant_id) => {
            sqlx::query(
                r#"
            INSERT INTO merchant_holding_account_histories (merchant_id, transaction_id, amount, reason, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
            )
            .bind(merchant_id)
            .bind(mv.transaction_id)
            .bind(mv.delta)
            .bind(mv.reason)
            .bind(now)
            .execute(conn)
            .await?;
        },
        AccountSelector::ByWalletId(_) | AccountSelector::ByUserId(_) => {
            sqlx::query(
                r#"
            INSERT INTO wallet_histories (wallet_id, transaction_id, payment_id, amount, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
            )
            .bind(row_id)
            .bind(mv.transaction_id)
            .bind(mv.payment_id.as_deref())
            .bind(mv.delta)
            .bind(mv.reason)
            .bind(now)
            .execute(conn)
            .await?;
        },
    }
    Ok(balance)
}

/// Credits a user's wallet with money that entered from outside the marketplace.
pub async fn top_up_wallet(
    user_id: i64,
    amount: Money,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Money, SqliteDatabaseError> {
    let mv = LedgerMove::new(AccountSelector::ByUserId(user_id), amount, MovementReason::TopUp);
    apply_move(&mv, now, conn).await
}

/// Debits a merchant's holding account when funds are paid out.
pub async fn withdraw_merchant_funds(
    merchant_id: i64,
    amount: Money,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Money, SqliteDatabaseError> {
    let mv = LedgerMove::new(AccountSelector::ByMerchantId(merchant_id), -amount, MovementReason::Withdrawal);
    apply_move(&mv, now, conn).await
}

pub async fn holding_history(
    merchant_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<MerchantHoldingAccountHistory>, SqliteDatabaseError> {
    let history = sqlx::query_as("SELECT * FROM merchant_holding_account_histories WHERE merchant_id = $1 ORDER BY id")
        .bind(merchant_id)
        .fetch_all(conn)
        .await?;
    Ok(history)
}

pub async fn wallet_history(
    account: AccountSelector,
    conn: &mut SqliteConnection,
) -> Result<Vec<WalletHistory>, SqliteDatabaseError> {
    let wallet = fetch_wallet(account, &mut *conn).await?.ok_or(SqliteDatabaseError::AccountNotFound(account))?;
    let history = sqlx::query_as("SELECT * FROM wallet_histories WHERE wallet_id = $1 ORDER BY id")
        .bind(wallet.id)
        .fetch_all(conn)
        .await?;
    Ok(history)
}
