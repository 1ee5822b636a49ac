//! Voucher quota allocator.
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::SqliteDatabaseError;
use crate::{db_types::Money, se_api::errors::AllocationError};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Voucher {
    pub id: i64,
    pub code: String,
    pub nominal: Money,
    pub quota: i64,
    pub expired_at: Option<DateTime<Utc>>,
}

impl Voucher {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.quota > 0 && self.expired_at.map(|t| t > now).unwrap_or(true)
    }
}

pub async fn fetch_marketplace_voucher(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Voucher>, SqliteDatabaseError> {
    let voucher = sqlx::query_as("SELECT id, code, nominal, quota, expired_at FROM marketplace_vouchers WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(voucher)
}

pub async fn fetch_merchant_voucher(
    merchant_domain: &str,
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Voucher>, SqliteDatabaseError> {
    let voucher = sqlx::query_as(
        "SELECT id, code, nominal, quota, expired_at FROM merchant_vouchers WHERE id = $1 AND merchant_domain = $2",
    )
    .bind(id)
    .bind(merchant_domain)
    .fetch_optional(conn)
    .await?;
    Ok(voucher)
}

pub async fn decrease_marketplace_voucher_quota(
    id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let result = sqlx::query(
        r#"
    UPDATE marketplace_vouchers SET quota = quota - 1
    WHERE id = $1 AND quota > 0 AND (expired_at IS NULL OR expired_at > $2)
    "#,
    )
    .bind(id)
    .bind(now)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AllocationError::MarketplaceVoucherUnavailable(id).into());
    }
    Ok(())
}

/// Gives a use back to a marketplace voucher. Expiry is deliberately not checked: a released use is simply unusable
/// if the voucher has expired in the meantime.
pub async fn increase_marketplace_voucher_quota(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let result = sqlx::query("UPDATE marketplace_vouchers SET quota = quota + 1 WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AllocationError::MarketplaceVoucherUnavailable(id).into());
    }
    Ok(())
}

pub async fn decrease_merchant_voucher_quota(
    merchant_domain: &str,
    id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let result = sqlx::query(
        r#"
    UPDATE merchant_vouchers SET quota = quota - 1
    WHERE id = $1 AND merchant_domain = $2 AND quota > 0 AND (expired_at IS NULL OR expired_at > $3)
    "#,
    )
    .bind(id)
    .bind(merchant_domain)
    .bind(now)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        let merchant_domain = merchant_domain.to_string();
        return Err(AllocationError::MerchantVoucherUnavailable { merchant_domain, voucher_id: id }.into());
    }
    Ok(())
}

pub async fn increase_merchant_voucher_quota(
    merchant_domain: &str,
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let result = sqlx::query("UPDATE merchant_vouchers SET quota = quota + 1 WHERE id = $1 AND merchant_domain = $2")
        .bind(id)
        .bind(merchant_domain)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        let merchant_domain = merchant_domain.to_string();
        return Err(AllocationError::MerchantVoucherUnavailable { merchant_domain, voucher_id: id }.into());
    }
    Ok(())
}
