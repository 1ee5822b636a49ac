#![allow(dead_code)]
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use settlement_engine::{
    db_types::{
        CheckoutLine,
        MerchantCart,
        Milestone,
        Money,
        NewCheckout,
        NewRefundRequest,
        PaymentMethod,
        PlatformAccounts,
        Transaction,
    },
    external::{GatewayError, PaymentGateway, PaymentRedirect},
    test_utils::{prepare_env::*, seed::*},
    CheckoutApi,
    EngineConfig,
    EventProducers,
    LedgerManagement,
    RefundApi,
    SqliteDatabase,
    TransactionFlowApi,
};

pub const UNIT_PRICE: i64 = 50_000;
pub const DISCOUNT: i64 = 5_000;
pub const DELIVERY_FEE: i64 = 9_000;
pub const MERCHANT_VOUCHER: i64 = 4_000;
pub const MARKETPLACE_VOUCHER: i64 = 10_000;
pub const INITIAL_STOCK: i64 = 10;
pub const PROMOTION_QUOTA: i64 = 5;
pub const VOUCHER_QUOTA: i64 = 3;
pub const BUYER_ID: i64 = 500;
pub const BUYER_FUNDS: i64 = 1_000_000;
pub const PROMOTION_BUDGET: i64 = 1_000_000;

/// A gateway that accepts every payment request.
#[derive(Debug, Clone, Default)]
pub struct AcceptingGateway {
    counter: Arc<AtomicU64>,
}

impl PaymentGateway for AcceptingGateway {
    async fn request_payment(&self, source_account: &str, amount: Money) -> Result<PaymentRedirect, GatewayError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let payment_id = format!("GW-{n:04}");
        let redirect_url = format!("https://pay.example.com/{payment_id}?from={source_account}&amount={amount}");
        Ok(PaymentRedirect { redirect_url, payment_id })
    }
}

/// One merchant with one product on promotion, a voucher of each kind, and a funded buyer.
pub struct Marketplace {
    pub url: String,
    pub db: SqliteDatabase,
    pub config: EngineConfig,
    pub merchant_id: i64,
    pub merchant_domain: String,
    pub product_id: i64,
    pub variant_id: i64,
    pub promotion_id: i64,
    pub marketplace_voucher_id: i64,
    pub merchant_voucher_id: i64,
}

impl Marketplace {
    pub async fn new() -> Self {
        let (url, db) = fresh_database(5).await;
        let accounts = seed_platform_accounts(&db, Money::from(PROMOTION_BUDGET)).await;
        let merchant_domain = "teakhouse".to_string();
        let merchant_id = seed_merchant(&db, &merchant_domain).await;
        let product_id = seed_product(&db, merchant_id, "Teak chair").await;
        let variant_id = seed_variant(&db, product_id, Money::from(UNIT_PRICE), INITIAL_STOCK).await;
        let promotion_id = seed_promotion(&db, product_id, Money::from(DISCOUNT), PROMOTION_QUOTA).await;
        let marketplace_voucher_id =
            seed_marketplace_voucher(&db, "MARKET10", Money::from(MARKETPLACE_VOUCHER), VOUCHER_QUOTA, None).await;
        let merchant_voucher_id =
            seed_merchant_voucher(&db, &merchant_domain, "TEAK4", Money::from(MERCHANT_VOUCHER), VOUCHER_QUOTA, None)
                .await;
        db.open_wallet(BUYER_ID).await.expect("Error opening buyer wallet");
        db.top_up_wallet(BUYER_ID, Money::from(BUYER_FUNDS)).await.expect("Error funding buyer wallet");
        Self {
            url,
            db,
            config: EngineConfig::new(accounts),
            merchant_id,
            merchant_domain,
            product_id,
            variant_id,
            promotion_id,
            marketplace_voucher_id,
            merchant_voucher_id,
        }
    }

    pub fn accounts(&self) -> PlatformAccounts {
        self.config.accounts
    }

    /// `quantity` promoted chairs with both vouchers applied.
    pub fn checkout(&self, method: PaymentMethod, quantity: i64) -> NewCheckout {
        let line = CheckoutLine::new(self.product_id, self.variant_id, quantity).with_promotion(self.promotion_id);
        let cart = MerchantCart::new(self.merchant_id, Money::from(DELIVERY_FEE))
            .with_line(line)
            .with_merchant_voucher(self.merchant_voucher_id)
            .with_marketplace_voucher(self.marketplace_voucher_id);
        NewCheckout::new(BUYER_ID, method).with_cart(cart)
    }

    pub fn checkout_api(&self) -> CheckoutApi<SqliteDatabase, AcceptingGateway> {
        CheckoutApi::new(self.db.clone(), AcceptingGateway::default(), self.config.clone())
    }

    pub fn flow_api(&self) -> TransactionFlowApi<SqliteDatabase> {
        TransactionFlowApi::new(self.db.clone(), self.config.clone(), EventProducers::default())
    }

    pub fn refund_api(&self) -> RefundApi<SqliteDatabase> {
        RefundApi::new(self.db.clone(), self.config.clone(), EventProducers::default())
    }

    /// A wallet-paid transaction for two chairs, already waited.
    pub async fn paid_transaction(&self) -> Transaction {
        let receipt = self
            .checkout_api()
            .checkout(&self.checkout(PaymentMethod::Wallet, 2), None)
            .await
            .expect("Error checking out");
        receipt.transactions.into_iter().next().expect("No transaction created")
    }

    /// A paid transaction moved along to `milestone`.
    pub async fn transaction_at(&self, milestone: Milestone) -> Transaction {
        let tx = self.paid_transaction().await;
        let api = self.flow_api();
        for target in [Milestone::Processed, Milestone::OnDelivery, Milestone::Delivered] {
            if target > milestone {
                break;
            }
            if target == Milestone::OnDelivery {
                api.set_receipt_number(tx.id, "jne-0012345").await.expect("Error setting receipt");
            }
            api.advance(tx.id, target).await.expect("Error advancing transaction");
        }
        tx
    }

    /// A delivered transaction with a refund request open on it.
    pub async fn refund_request(&self) -> (Transaction, i64) {
        let tx = self.transaction_at(Milestone::Delivered).await;
        let request = NewRefundRequest::new(tx.id, BUYER_ID, "The chair arrived with a cracked leg")
            .with_image_url("https://img.example.com/leg.jpg");
        let refund = self.refund_api().open(request).await.expect("Error opening refund request");
        (tx, refund.id)
    }

    pub async fn tear_down(self) {
        remove_database(&self.url, self.db).await;
    }
}

/// Paid total of one [`Marketplace::checkout`] of two chairs.
pub fn expected_total() -> Money {
    Money::from(2 * (UNIT_PRICE - DISCOUNT) + DELIVERY_FEE - MERCHANT_VOUCHER - MARKETPLACE_VOUCHER)
}

/// What the merchant is owed for one [`Marketplace::checkout`] of two chairs.
pub fn expected_settlement() -> Money {
    Money::from(2 * (UNIT_PRICE - DISCOUNT) + DELIVERY_FEE - MERCHANT_VOUCHER)
}
