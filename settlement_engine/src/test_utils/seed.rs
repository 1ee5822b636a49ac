//! Catalog rows and platform accounts for tests. The engine never creates catalog rows itself.
use chrono::{DateTime, Utc};

use crate::{
    db_types::{Money, PlatformAccounts},
    traits::LedgerManagement,
    SqliteDatabase,
};

/// User ids of the wallets that back the platform and promotion accounts.
pub const PLATFORM_USER_ID: i64 = -1;
pub const PROMOTION_USER_ID: i64 = -2;

/// Opens the platform and promotion wallets and funds the promotion wallet with `promotion_budget`.
pub async fn seed_platform_accounts(db: &SqliteDatabase, promotion_budget: Money) -> PlatformAccounts {
    let platform = db.open_wallet(PLATFORM_USER_ID).await.expect("Error opening platform wallet");
    let promotion = db.open_wallet(PROMOTION_USER_ID).await.expect("Error opening promotion wallet");
    if promotion_budget > Money::ZERO {
        db.top_up_wallet(PROMOTION_USER_ID, promotion_budget).await.expect("Error funding promotion wallet");
    }
    PlatformAccounts { platform_wallet_id: platform.id, promotion_wallet_id: promotion.id }
}

/// Inserts a merchant and opens its holding account.
pub async fn seed_merchant(db: &SqliteDatabase, domain: &str) -> i64 {
    let (id,): (i64,) =
        sqlx::query_as("INSERT INTO merchants (domain, name, created_at) VALUES ($1, $1, $2) RETURNING id")
            .bind(domain)
            .bind(Utc::now())
            .fetch_one(db.pool())
            .await
            .expect("Error inserting merchant");
    db.open_holding_account(id).await.expect("Error opening holding account");
    id
}

pub async fn seed_product(db: &SqliteDatabase, merchant_id: i64, name: &str) -> i64 {
    let (id,): (i64,) = sqlx::query_as("INSERT INTO products (merchant_id, name) VALUES ($1, $2) RETURNING id")
        .bind(merchant_id)
        .bind(name)
        .fetch_one(db.pool())
        .await
        .expect("Error inserting product");
    id
}

/// Inserts a variant and adds its stock to the product's total.
pub async fn seed_variant(db: &SqliteDatabase, product_id: i64, price: Money, stock: i64) -> i64 {
    let (id,): (i64,) =
        sqlx::query_as("INSERT INTO product_variants (product_id, price, stock) VALUES ($1, $2, $3) RETURNING id")
            .bind(product_id)
            .bind(price)
            .bind(stock)
            .fetch_one(db.pool())
            .await
            .expect("Error inserting variant");
    sqlx::query("UPDATE products SET total_stock = total_stock + $1 WHERE id = $2")
        .bind(stock)
        .bind(product_id)
        .execute(db.pool())
        .await
        .expect("Error updating total stock");
    id
}

pub async fn seed_promotion(db: &SqliteDatabase, product_id: i64, discount: Money, quota: i64) -> i64 {
    let (id,): (i64,) =
        sqlx::query_as("INSERT INTO promotions (product_id, discount, quota) VALUES ($1, $2, $3) RETURNING id")
            .bind(product_id)
            .bind(discount)
            .bind(quota)
            .fetch_one(db.pool())
            .await
            .expect("Error inserting promotion");
    id
}

pub async fn seed_marketplace_voucher(
    db: &SqliteDatabase,
    code: &str,
    nominal: Money,
    quota: i64,
    expired_at: Option<DateTime<Utc>>,
) -> i64 {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO marketplace_vouchers (code, nominal, quota, expired_at) VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(code)
    .bind(nominal)
    .bind(quota)
    .bind(expired_at)
    .fetch_one(db.pool())
    .await
    .expect("Error inserting marketplace voucher");
    id
}

pub async fn seed_merchant_voucher(
    db: &SqliteDatabase,
    merchant_domain: &str,
    code: &str,
    nominal: Money,
    quota: i64,
    expired_at: Option<DateTime<Utc>>,
) -> i64 {
    let (id,): (i64,) = sqlx::query_as(
        r#"INSERT INTO merchant_vouchers (merchant_domain, code, nominal, quota, expired_at)
        VALUES ($1, $2, $3, $4, $5) RETURNING id"#,
    )
    .bind(merchant_domain)
    .bind(code)
    .bind(nominal)
    .bind(quota)
    .bind(expired_at)
    .fetch_one(db.pool())
    .await
    .expect("Error inserting merchant voucher");
    id
}

/// A snapshot of every catalog counter the engine touches for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct ProductCounters {
    pub total_stock: i64,
    pub pending_sale: i64,
    pub sale_count: i64,
}

pub async fn product_counters(db: &SqliteDatabase, product_id: i64) -> ProductCounters {
    sqlx::query_as("SELECT total_stock, pending_sale, sale_count FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_one(db.pool())
        .await
        .expect("Error fetching product counters")
}

async fn fetch_count(db: &SqliteDatabase, sql: &str, id: i64) -> i64 {
    let (n,): (i64,) = sqlx::query_as(sql).bind(id).fetch_one(db.pool()).await.expect("Error fetching counter");
    n
}

pub async fn variant_stock(db: &SqliteDatabase, variant_id: i64) -> i64 {
    fetch_count(db, "SELECT stock FROM product_variants WHERE id = $1", variant_id).await
}

pub async fn promotion_quota(db: &SqliteDatabase, promotion_id: i64) -> i64 {
    fetch_count(db, "SELECT quota FROM promotions WHERE id = $1", promotion_id).await
}

pub async fn marketplace_voucher_quota(db: &SqliteDatabase, voucher_id: i64) -> i64 {
    fetch_count(db, "SELECT quota FROM marketplace_vouchers WHERE id = $1", voucher_id).await
}

pub async fn merchant_voucher_quota(db: &SqliteDatabase, voucher_id: i64) -> i64 {
    fetch_count(db, "SELECT quota FROM merchant_vouchers WHERE id = $1", voucher_id).await
}

pub async fn merchant_total_sale(db: &SqliteDatabase, merchant_id: i64) -> i64 {
    fetch_count(db, "SELECT total_sale FROM merchants WHERE id = $1", merchant_id).await
}
