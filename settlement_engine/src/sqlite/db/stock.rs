//! Stock and promotion allocator.
//!
//! Every function takes the caller's connection so that it can run inside a larger database transaction. Decrements
//! are guarded in the `WHERE` clause; an update that touches no rows means the guard failed.
use log::*;
use sqlx::SqliteConnection;

use super::SqliteDatabaseError;
use crate::{
    db_types::Money,
    se_api::errors::AllocationError,
    settlement::AllocatorOp,
};

/// The catalog data needed to price one checkout line.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VariantPrice {
    pub product_id: i64,
    pub variant_id: i64,
    pub merchant_id: i64,
    pub product_name: String,
    pub price: Money,
    pub stock: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Promotion {
    pub id: i64,
    pub product_id: i64,
    pub discount: Money,
    pub quota: i64,
}

pub async fn fetch_variant(
    product_id: i64,
    variant_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<VariantPrice>, SqliteDatabaseError> {
    let variant = sqlx::query_as(
        r#"
    SELECT p.id AS product_id, v.id AS variant_id, p.merchant_id, p.name AS product_name, v.price, v.stock
    FROM product_variants v JOIN products p ON p.id = v.product_id
    WHERE p.id = $1 AND v.id = $2
    "#,
    )
    .bind(product_id)
    .bind(variant_id)
    .fetch_optional(conn)
    .await?;
    Ok(variant)
}

pub async fn fetch_promotion(
    promotion_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Promotion>, SqliteDatabaseError> {
    let promotion = sqlx::query_as("SELECT id, product_id, discount, quota FROM promotions WHERE id = $1")
        .bind(promotion_id)
        .fetch_optional(conn)
        .await?;
    Ok(promotion)
}

pub async fn variant_stock(
    product_id: i64,
    variant_id: i64,
    conn: &mut SqliteConnection,
) -> Result<i64, SqliteDatabaseError> {
    let stock: Option<(i64,)> = sqlx::query_as("SELECT stock FROM product_variants WHERE id = $1 AND product_id = $2")
        .bind(variant_id)
        .bind(product_id)
        .fetch_optional(conn)
        .await?;
    stock.map(|(s,)| s).ok_or_else(|| AllocationError::VariantNotFound { product_id, variant_id }.into())
}

/// Takes `quantity` units of a variant out of stock, along with the product's aggregate stock.
pub async fn decrease_stock(
    product_id: i64,
    variant_id: i64,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let result = sqlx::query(
        "UPDATE product_variants SET stock = stock - $1 WHERE id = $2 AND product_id = $3 AND stock >= $1",
    )
    .bind(quantity)
    .bind(variant_id)
    .bind(product_id)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        // Tell a missing variant apart from an empty one
        variant_stock(product_id, variant_id, conn).await?;
        return Err(AllocationError::InsufficientStock { product_id, variant_id }.into());
    }
    sqlx::query("UPDATE products SET total_stock = MAX(total_stock - $1, 0) WHERE id = $2")
        .bind(quantity)
        .bind(product_id)
        .execute(conn)
        .await?;
    trace!("🗃️ Took {quantity} units of variant #{variant_id} out of stock");
    Ok(())
}

pub async fn increase_stock(
    product_id: i64,
    variant_id: i64,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let result = sqlx::query("UPDATE product_variants SET stock = stock + $1 WHERE id = $2 AND product_id = $3")
        .bind(quantity)
        .bind(variant_id)
        .bind(product_id)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AllocationError::VariantNotFound { product_id, variant_id }.into());
    }
    sqlx::query("UPDATE products SET total_stock = total_stock + $1 WHERE id = $2")
        .bind(quantity)
        .bind(product_id)
        .execute(conn)
        .await?;
    trace!("🗃️ Returned {quantity} units of variant #{variant_id} to stock");
    Ok(())
}

/// Moves the product's pending-sale counter by `delta`, never below zero.
pub async fn change_pending_sale(
    product_id: i64,
    delta: i64,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let result = sqlx::query("UPDATE products SET pending_sale = MAX(pending_sale + $1, 0) WHERE id = $2")
        .bind(delta)
        .bind(product_id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AllocationError::ProductNotFound(product_id).into());
    }
    Ok(())
}

/// Records a completed sale on both the product and the merchant.
pub async fn increase_sale_count(
    product_id: i64,
    merchant_id: i64,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let result = sqlx::query("UPDATE products SET sale_count = sale_count + $1 WHERE id = $2")
        .bind(quantity)
        .bind(product_id)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AllocationError::ProductNotFound(product_id).into());
    }
    let result = sqlx::query("UPDATE merchants SET total_sale = total_sale + $1 WHERE id = $2")
        .bind(quantity)
        .bind(merchant_id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(SqliteDatabaseError::MerchantNotFound(merchant_id));
    }
    Ok(())
}

pub async fn decrease_promotion_quota(
    promotion_id: i64,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let result = sqlx::query("UPDATE promotions SET quota = quota - $1 WHERE id = $2 AND quota >= $1")
        .bind(quantity)
        .bind(promotion_id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AllocationError::PromotionUnavailable(promotion_id).into());
    }
    Ok(())
}

pub async fn increase_promotion_quota(
    promotion_id: i64,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let result = sqlx::query("UPDATE promotions SET quota = quota + $1 WHERE id = $2")
        .bind(quantity)
        .bind(promotion_id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AllocationError::PromotionUnavailable(promotion_id).into());
    }
    Ok(())
}

/// Runs one allocator operation, dispatching on the sign of its delta.
pub async fn apply_allocation(
    op: &AllocatorOp,
    now: chrono::DateTime<chrono::Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    use super::vouchers;
    match op {
        AllocatorOp::Stock { product_id, variant_id, delta } if *delta < 0 => {
            decrease_stock(*product_id, *variant_id, -delta, conn).await
        },
        AllocatorOp::Stock { product_id, variant_id, delta } => {
            increase_stock(*product_id, *variant_id, *delta, conn).await
        },
        AllocatorOp::PendingSale { product_id, delta } => change_pending_sale(*product_id, *delta, conn).await,
        AllocatorOp::SaleCount { product_id, merchant_id, quantity } => {
            increase_sale_count(*product_id, *merchant_id, *quantity, conn).await
        },
        AllocatorOp::PromotionQuota { promotion_id, delta } if *delta < 0 => {
            decrease_promotion_quota(*promotion_id, -delta, conn).await
        },
        AllocatorOp::PromotionQuota { promotion_id, delta } => {
            increase_promotion_quota(*promotion_id, *delta, conn).await
        },
        AllocatorOp::MarketplaceVoucherQuota { voucher_id, delta } if *delta < 0 => {
            vouchers::decrease_marketplace_voucher_quota(*voucher_id, now, conn).await
        },
        AllocatorOp::MarketplaceVoucherQuota { voucher_id, .. } => {
            vouchers::increase_marketplace_voucher_quota(*voucher_id, conn).await
        },
        AllocatorOp::MerchantVoucherQuota { merchant_domain, voucher_id, delta } if *delta < 0 => {
            vouchers::decrease_merchant_voucher_quota(merchant_domain, *voucher_id, now, conn).await
        },
        AllocatorOp::MerchantVoucherQuota { merchant_domain, voucher_id, .. } => {
            vouchers::increase_merchant_voucher_quota(merchant_domain, *voucher_id, conn).await
        },
    }
}
