//! Pricing a checkout from catalog data, and turning a priced checkout into transactions.
use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use super::{ledger, payments, settlement, stock, transactions, vouchers, SqliteDatabaseError};
use crate::{
    db_types::{
        CartItem,
        CheckoutQuote,
        MerchantCart,
        Money,
        NewCheckout,
        PaymentDetails,
        PaymentMethod,
        PlatformAccounts,
        QuotedCart,
        Transaction,
    },
    helpers::new_invoice_code,
    se_api::errors::AllocationError,
    settlement::SettlementPlan,
};

async fn fetch_merchant_domain(merchant_id: i64, conn: &mut SqliteConnection) -> Result<String, SqliteDatabaseError> {
    let domain: Option<(String,)> =
        sqlx::query_as("SELECT domain FROM merchants WHERE id = $1").bind(merchant_id).fetch_optional(conn).await?;
    domain.map(|(d,)| d).ok_or(SqliteDatabaseError::MerchantNotFound(merchant_id))
}

async fn quote_cart(
    cart: &MerchantCart,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<QuotedCart, SqliteDatabaseError> {
    if cart.lines.is_empty() {
        let reason = format!("The cart for merchant #{} is empty", cart.merchant_id);
        return Err(SqliteDatabaseError::InvalidCheckout(reason));
    }
    if cart.delivery_fee.is_negative() {
        return Err(SqliteDatabaseError::InvalidCheckout("Delivery fee cannot be negative".into()));
    }
    let merchant_domain = fetch_merchant_domain(cart.merchant_id, &mut *conn).await?;
    let mut items = Vec::with_capacity(cart.lines.len());
    for line in &cart.lines {
        if line.quantity <= 0 {
            return Err(SqliteDatabaseError::InvalidCheckout(format!("Invalid quantity {}", line.quantity)));
        }
        let (product_id, variant_id) = (line.product_id, line.variant_id);
        let variant = stock::fetch_variant(product_id, variant_id, &mut *conn)
            .await?
            .ok_or(AllocationError::VariantNotFound { product_id, variant_id })?;
        if variant.merchant_id != cart.merchant_id {
            return Err(SqliteDatabaseError::InvalidCheckout(format!(
                "Product #{product_id} is not sold by merchant #{}",
                cart.merchant_id
            )));
        }
        if variant.stock < line.quantity {
            return Err(AllocationError::InsufficientStock { product_id, variant_id }.into());
        }
        let discount = match line.promotion_id {
            Some(promotion_id) => {
                let promotion = stock::fetch_promotion(promotion_id, &mut *conn)
                    .await?
                    .filter(|p| p.product_id == product_id && p.quota >= line.quantity)
                    .ok_or(AllocationError::PromotionUnavailable(promotion_id))?;
                promotion.discount.min(variant.price)
            },
            None => Money::ZERO,
        };
        items.push(CartItem {
            product_id,
            variant_id,
            promotion_id: line.promotion_id,
            product_name: variant.product_name,
            unit_price: variant.price,
            discount,
            quantity: line.quantity,
        });
    }
    let merchant_voucher = match cart.merchant_voucher_id {
        Some(id) => {
            vouchers::fetch_merchant_voucher(&merchant_domain, id, &mut *conn)
                .await?
                .filter(|v| v.is_usable(now))
                .ok_or_else(|| AllocationError::MerchantVoucherUnavailable {
                    merchant_domain: merchant_domain.clone(),
                    voucher_id: id,
                })?
                .nominal
        },
        None => Money::ZERO,
    };
    let marketplace_voucher = match cart.marketplace_voucher_id {
        Some(id) => {
            vouchers::fetch_marketplace_voucher(id, &mut *conn)
                .await?
                .filter(|v| v.is_usable(now))
                .ok_or(AllocationError::MarketplaceVoucherUnavailable(id))?
                .nominal
        },
        None => Money::ZERO,
    };
    let details = PaymentDetails::compute(&items, cart.delivery_fee, merchant_voucher, marketplace_voucher);
    Ok(QuotedCart {
        merchant_id: cart.merchant_id,
        merchant_domain,
        items,
        details,
        merchant_voucher_id: cart.merchant_voucher_id,
        marketplace_voucher_id: cart.marketplace_voucher_id,
    })
}

/// Prices every merchant cart of a checkout. Read-only.
pub async fn quote_checkout(
    checkout: &NewCheckout,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<CheckoutQuote, SqliteDatabaseError> {
    if checkout.carts.is_empty() {
        return Err(SqliteDatabaseError::InvalidCheckout("A checkout needs at least one cart".into()));
    }
    let mut carts = Vec::with_capacity(checkout.carts.len());
    for cart in &checkout.carts {
        carts.push(quote_cart(cart, now, &mut *conn).await?);
    }
    Ok(CheckoutQuote { carts })
}

/// Records the payment, opens the buyer's wallet if needed, creates one transaction per merchant cart and reserves
/// their inventory.
///
/// The checkout is re-priced first; if anything moved since `quote` was produced, the whole checkout is refused.
pub async fn insert_checkout(
    checkout: &NewCheckout,
    quote: &CheckoutQuote,
    payment_id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, SqliteDatabaseError> {
    payments::insert_payment(payment_id, checkout.buyer_id, quote.total(), checkout.method, now, &mut *conn).await?;
    // Cancellations and refunds are credited to the buyer's wallet, however the order was paid
    ledger::ensure_wallet(checkout.buyer_id, now, &mut *conn).await?;
    let current = quote_checkout(checkout, now, &mut *conn).await?;
    if current != *quote {
        warn!("🗃️ Checkout for payment {payment_id} was priced at {} but now costs {}", quote.total(), current.total());
        return Err(SqliteDatabaseError::PriceChanged);
    }
    let mut txs = Vec::with_capacity(quote.carts.len());
    for cart in &quote.carts {
        let invoice = new_invoice_code(cart.merchant_id, now);
        let tx =
            transactions::insert_transaction(cart, checkout.buyer_id, payment_id, &invoice, now, &mut *conn).await?;
        for op in SettlementPlan::reservations(&tx) {
            stock::apply_allocation(&op, now, &mut *conn).await?;
        }
        txs.push(tx);
    }
    debug!("🗃️ Checkout for payment {payment_id} created {} transactions", txs.len());
    Ok(txs)
}

/// As [`insert_checkout`], but pays from the buyer's wallet and confirms the payment straight away.
pub async fn insert_wallet_checkout(
    checkout: &NewCheckout,
    quote: &CheckoutQuote,
    payment_id: &str,
    accounts: &PlatformAccounts,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, SqliteDatabaseError> {
    if checkout.method != PaymentMethod::Wallet {
        return Err(SqliteDatabaseError::InvalidCheckout("Not a wallet checkout".into()));
    }
    insert_checkout(checkout, quote, payment_id, now, &mut *conn).await?;
    settlement::confirm_payment(payment_id, accounts, now, conn).await
}
