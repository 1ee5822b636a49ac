use chrono::{Duration, Utc};
use settlement_engine::{
    db_types::{AccountSelector, Milestone, Money, PaymentMethod, RefundResolution, RefundStage, Transaction},
    test_utils::seed::*,
    EscalationApi,
    EscalationConfig,
    EventProducers,
    LedgerManagement,
    SqliteDatabase,
    SweepKind,
    SweepResult,
};
use support::*;

mod support;

fn escalation_api(market: &Marketplace, config: EscalationConfig) -> EscalationApi<SqliteDatabase> {
    EscalationApi::new(market.db.clone(), market.config.clone(), config, EventProducers::default())
}

const WALLETLESS_BUYER: i64 = 777;

fn hours_from_now(hours: i64) -> chrono::DateTime<Utc> {
    Utc::now() + Duration::hours(hours)
}

/// A confirmed gateway order of `quantity` chairs from a buyer who had no wallet before checking out.
async fn walletless_gateway_order(market: &Marketplace, quantity: i64) -> Transaction {
    let mut order = market.checkout(PaymentMethod::Gateway, quantity);
    order.buyer_id = WALLETLESS_BUYER;
    let api = market.checkout_api();
    let receipt = api.checkout(&order, Some("BCA-9876")).await.expect("Error checking out");
    let mut txs = api.confirm_payment(&receipt.payment_id).await.expect("Error confirming payment");
    txs.remove(0)
}

#[tokio::test]
async fn unprocessed_transactions_are_cancelled() {
    let market = Marketplace::new().await;
    let tx = market.paid_transaction().await;
    let config = EscalationConfig::default();
    let api = escalation_api(&market, config.clone());

    let early = api.run_sweep(SweepKind::Waited, 0, Utc::now()).await.unwrap();
    assert_eq!(early, SweepResult::default());

    let result = api.run_sweep(SweepKind::Waited, 0, hours_from_now(25)).await.unwrap();
    assert_eq!(result, SweepResult { fetched: 1, processed: 1, failed: vec![] });
    let record = market.flow_api().fetch(tx.id).await.unwrap();
    assert!(record.status.canceled_at.is_some());
    assert_eq!(record.status.notes.as_deref(), Some(config.system_note.as_str()));

    let buyer = market.db.balance(AccountSelector::ByUserId(BUYER_ID)).await.unwrap();
    assert_eq!(buyer, Money::from(BUYER_FUNDS));
    let platform = market.db.balance(AccountSelector::ByWalletId(market.accounts().platform_wallet_id)).await.unwrap();
    assert_eq!(platform, Money::ZERO);
    assert_eq!(variant_stock(&market.db, market.variant_id).await, INITIAL_STOCK);
    assert_eq!(promotion_quota(&market.db, market.promotion_id).await, PROMOTION_QUOTA);
    assert_eq!(marketplace_voucher_quota(&market.db, market.marketplace_voucher_id).await, VOUCHER_QUOTA);
    assert_eq!(merchant_voucher_quota(&market.db, market.merchant_voucher_id).await, VOUCHER_QUOTA);

    // Nothing left to do on a second pass
    let again = api.run_sweep(SweepKind::Waited, 0, hours_from_now(25)).await.unwrap();
    assert_eq!(again.fetched, 0);
    market.tear_down().await;
}

#[tokio::test]
async fn disabled_sweeps_do_nothing() {
    let market = Marketplace::new().await;
    let tx = market.paid_transaction().await;
    let mut config = EscalationConfig::default();
    config.sweep_mut(SweepKind::Waited).enabled = false;
    let api = escalation_api(&market, config);

    let result = api.run_sweep(SweepKind::Waited, 0, hours_from_now(100)).await.unwrap();
    assert_eq!(result, SweepResult::default());
    let record = market.flow_api().fetch(tx.id).await.unwrap();
    assert!(record.status.terminal().is_none());
    market.tear_down().await;
}

#[tokio::test]
async fn unshipped_transactions_are_cancelled() {
    let market = Marketplace::new().await;
    let tx = market.transaction_at(Milestone::Processed).await;
    let api = escalation_api(&market, EscalationConfig::default());

    // The waited sweep no longer applies once the seller has processed the order
    let result = api.run_sweep(SweepKind::Waited, 0, hours_from_now(100)).await.unwrap();
    assert_eq!(result.fetched, 0);
    let result = api.run_sweep(SweepKind::Processed, 0, hours_from_now(47)).await.unwrap();
    assert_eq!(result.fetched, 0);
    let result = api.run_sweep(SweepKind::Processed, 0, hours_from_now(49)).await.unwrap();
    assert_eq!(result.processed, 1);
    let record = market.flow_api().fetch(tx.id).await.unwrap();
    assert!(record.status.canceled_at.is_some());
    assert_eq!(variant_stock(&market.db, market.variant_id).await, INITIAL_STOCK);
    market.tear_down().await;
}

#[tokio::test]
async fn delivered_transactions_are_completed() {
    let market = Marketplace::new().await;
    let tx = market.transaction_at(Milestone::Delivered).await;
    let api = escalation_api(&market, EscalationConfig::default());

    let result = api.run_sweep(SweepKind::Delivered, 0, hours_from_now(73)).await.unwrap();
    assert_eq!(result, SweepResult { fetched: 1, processed: 1, failed: vec![] });
    let record = market.flow_api().fetch(tx.id).await.unwrap();
    assert!(record.status.completed_at.is_some());
    let merchant = market.db.balance(AccountSelector::ByMerchantId(market.merchant_id)).await.unwrap();
    assert_eq!(merchant, expected_settlement());
    market.tear_down().await;
}

#[tokio::test]
async fn transactions_in_dispute_are_left_to_the_refund_sweeps() {
    let market = Marketplace::new().await;
    let (tx, request_id) = market.refund_request().await;
    let api = escalation_api(&market, EscalationConfig::default());

    let result = api.run_sweep(SweepKind::Delivered, 0, hours_from_now(100)).await.unwrap();
    assert_eq!(result.fetched, 0);
    let record = market.flow_api().fetch(tx.id).await.unwrap();
    assert!(record.status.terminal().is_none());

    let result = api.run_sweep(SweepKind::SellerRefund, 0, hours_from_now(1)).await.unwrap();
    assert_eq!(result.fetched, 0);
    let result = api.run_sweep(SweepKind::SellerRefund, 0, hours_from_now(25)).await.unwrap();
    assert_eq!(result.processed, 1);
    let refunds = market.refund_api();
    assert_eq!(refunds.current_stage(request_id).await.unwrap(), RefundStage::AwaitingAdmin);
    let again = api.run_sweep(SweepKind::SellerRefund, 0, hours_from_now(25)).await.unwrap();
    assert_eq!(again.fetched, 0);
    market.tear_down().await;
}

#[tokio::test]
async fn silent_buyers_accept_the_admin_rejection() {
    let market = Marketplace::new().await;
    let (tx, request_id) = market.refund_request().await;
    let refunds = market.refund_api();
    refunds.seller_decide(request_id, market.merchant_id, true).await.unwrap();
    let api = escalation_api(&market, EscalationConfig::default());

    // Waiting on the admin is not the buyer's fault
    let result = api.run_sweep(SweepKind::BuyerRefund, 0, hours_from_now(100)).await.unwrap();
    assert_eq!(result.fetched, 0);

    refunds.admin_decide(request_id, false).await.unwrap();
    let result = api.run_sweep(SweepKind::BuyerRefund, 0, hours_from_now(25)).await.unwrap();
    assert_eq!(result.processed, 1);
    assert_eq!(refunds.current_stage(request_id).await.unwrap(), RefundStage::Closed(RefundResolution::Withdrawn));
    let record = market.flow_api().fetch(tx.id).await.unwrap();
    assert!(record.status.completed_at.is_some());
    market.tear_down().await;
}

#[tokio::test]
async fn drain_reads_every_page() {
    let market = Marketplace::new().await;
    let checkout = market.checkout_api();
    for _ in 0..3 {
        checkout.checkout(&market.checkout(PaymentMethod::Wallet, 1), None).await.unwrap();
    }
    let mut config = EscalationConfig::default();
    config.sweep_mut(SweepKind::Waited).batch_size = 2;
    let api = escalation_api(&market, config);

    let result = api.drain(SweepKind::Waited, hours_from_now(25), 10).await.unwrap();
    assert_eq!(result, SweepResult { fetched: 3, processed: 3, failed: vec![] });
    assert_eq!(variant_stock(&market.db, market.variant_id).await, INITIAL_STOCK);
    let buyer = market.db.balance(AccountSelector::ByUserId(BUYER_ID)).await.unwrap();
    assert_eq!(buyer, Money::from(BUYER_FUNDS));
    market.tear_down().await;
}

#[tokio::test]
async fn gateway_orders_from_buyers_without_a_wallet_are_cancelled() {
    let market = Marketplace::new().await;
    let tx = walletless_gateway_order(&market, 2).await;
    let buyer = AccountSelector::ByUserId(WALLETLESS_BUYER);
    assert_eq!(market.db.balance(buyer).await.unwrap(), Money::ZERO);
    assert_eq!(variant_stock(&market.db, market.variant_id).await, INITIAL_STOCK - 2);
    let api = escalation_api(&market, EscalationConfig::default());

    let result = api.run_sweep(SweepKind::Waited, 0, hours_from_now(25)).await.unwrap();
    assert_eq!(result, SweepResult { fetched: 1, processed: 1, failed: vec![] });
    let record = market.flow_api().fetch(tx.id).await.unwrap();
    assert!(record.status.canceled_at.is_some());
    assert_eq!(market.db.balance(buyer).await.unwrap(), expected_total());
    assert_eq!(variant_stock(&market.db, market.variant_id).await, INITIAL_STOCK);
    assert_eq!(promotion_quota(&market.db, market.promotion_id).await, PROMOTION_QUOTA);
    assert_eq!(marketplace_voucher_quota(&market.db, market.marketplace_voucher_id).await, VOUCHER_QUOTA);
    assert_eq!(merchant_voucher_quota(&market.db, market.merchant_voucher_id).await, VOUCHER_QUOTA);
    market.tear_down().await;
}

#[tokio::test]
async fn drain_steps_past_records_that_fail() {
    let market = Marketplace::new().await;
    let stuck = walletless_gateway_order(&market, 1).await;
    // Without a wallet to credit, this cancellation can only fail
    sqlx::query("DELETE FROM wallets WHERE user_id = $1")
        .bind(WALLETLESS_BUYER)
        .execute(market.db.pool())
        .await
        .unwrap();
    let checkout = market.checkout_api();
    let mut others = vec![];
    for _ in 0..2 {
        let receipt = checkout.checkout(&market.checkout(PaymentMethod::Wallet, 1), None).await.unwrap();
        others.push(receipt.transactions[0].id);
    }
    let mut config = EscalationConfig::default();
    config.sweep_mut(SweepKind::Waited).batch_size = 2;
    let api = escalation_api(&market, config);

    let result = api.drain(SweepKind::Waited, hours_from_now(25), 10).await.unwrap();
    assert_eq!(result, SweepResult { fetched: 3, processed: 2, failed: vec![stuck.id] });
    for id in others {
        let record = market.flow_api().fetch(id).await.unwrap();
        assert!(record.status.canceled_at.is_some(), "transaction #{id} should be cancelled");
    }
    let record = market.flow_api().fetch(stuck.id).await.unwrap();
    assert!(record.status.terminal().is_none());
    assert_eq!(variant_stock(&market.db, market.variant_id).await, INITIAL_STOCK - 1);

    // The next call retries the failed record first
    let again = api.drain(SweepKind::Waited, hours_from_now(25), 10).await.unwrap();
    assert_eq!(again, SweepResult { fetched: 1, processed: 0, failed: vec![stuck.id] });
    market.tear_down().await;
}
