use settlement_engine::{
    db_types::{AccountSelector, InvoiceCode, Milestone, Money, SettlementOutcome, TransitionError},
    test_utils::seed::*,
    ErrorKind,
    LedgerManagement,
    TransactionFlowError,
};
use support::*;

mod support;

fn transition(err: &TransactionFlowError) -> TransitionError {
    match err {
        TransactionFlowError::Transition(e) => *e,
        e => panic!("Expected a transition error, got {e}"),
    }
}

#[tokio::test]
async fn milestones_advance_in_order() {
    let market = Marketplace::new().await;
    let api = market.flow_api();
    let tx = market.paid_transaction().await;
    let found = api.fetch_by_invoice(&tx.invoice_code).await.unwrap().expect("invoice should resolve");
    assert_eq!(found.transaction.id, tx.id);
    let err = api.fetch_by_invoice(&InvoiceCode("INV-12".into())).await.unwrap_err();
    assert!(matches!(err, TransactionFlowError::InvalidInvoiceCode(_)));
    assert_eq!(err.kind(), ErrorKind::Validation);
    let unknown = InvoiceCode(format!("INV/20240601/{}/ZZZZZZ", market.merchant_id));
    assert!(api.fetch_by_invoice(&unknown).await.unwrap().is_none());

    let err = api.advance(tx.id, Milestone::OnDelivery).await.unwrap_err();
    assert!(matches!(transition(&err), TransitionError::CannotSkip { to: Milestone::OnDelivery, .. }));
    let err = api.advance(tx.id, Milestone::Waited).await.unwrap_err();
    assert_eq!(transition(&err), TransitionError::WaitedRequiresPayment);

    let status = api.advance(tx.id, Milestone::Processed).await.unwrap();
    assert!(status.processed_at.is_some());
    let err = api.advance(tx.id, Milestone::Processed).await.unwrap_err();
    assert!(matches!(transition(&err), TransitionError::CannotReverse { .. }));
    assert_eq!(err.kind(), ErrorKind::Validation);
    market.tear_down().await;
}

#[tokio::test]
async fn receipt_required_before_delivery() {
    let market = Marketplace::new().await;
    let api = market.flow_api();
    let tx = market.paid_transaction().await;

    // Too early for a receipt
    let err = api.set_receipt_number(tx.id, "JNE-0012345").await.unwrap_err();
    assert_eq!(transition(&err), TransitionError::ReceiptNotAllowed);

    api.advance(tx.id, Milestone::Processed).await.unwrap();
    let err = api.advance(tx.id, Milestone::OnDelivery).await.unwrap_err();
    assert_eq!(transition(&err), TransitionError::ReceiptNumberRequired);
    let record = api.fetch(tx.id).await.unwrap();
    assert!(record.status.on_delivery_at.is_none());

    let err = api.set_receipt_number(tx.id, "  ").await.unwrap_err();
    assert!(matches!(err, TransactionFlowError::InvalidReceiptNumber));
    let delivery = api.set_receipt_number(tx.id, " jne-0012345 ").await.unwrap();
    assert_eq!(delivery.receipt_number.as_deref(), Some("JNE-0012345"));

    api.advance(tx.id, Milestone::OnDelivery).await.unwrap();
    api.advance(tx.id, Milestone::Delivered).await.unwrap();
    let record = api.fetch(tx.id).await.unwrap();
    assert!(record.delivery.on_delivery_at.is_some());
    assert!(record.delivery.on_delivered_at.is_some());
    assert_eq!(record.status.last_milestone(), Some(Milestone::Delivered));

    // Once shipped the receipt is frozen
    let err = api.set_receipt_number(tx.id, "JNE-9999999").await.unwrap_err();
    assert_eq!(transition(&err), TransitionError::AlreadyShipped);
    market.tear_down().await;
}

#[tokio::test]
async fn completion_pays_the_merchant_once() {
    let market = Marketplace::new().await;
    let api = market.flow_api();
    let tx = market.transaction_at(Milestone::OnDelivery).await;

    let err = api.complete(tx.id).await.unwrap_err();
    assert_eq!(transition(&err), TransitionError::NotDelivered);

    api.advance(tx.id, Milestone::Delivered).await.unwrap();
    let settled = api.complete(tx.id).await.unwrap();
    assert_eq!(settled.outcome, SettlementOutcome::Completed);
    assert!(settled.status.completed_at.is_some());

    let merchant = market.db.balance(AccountSelector::ByMerchantId(market.merchant_id)).await.unwrap();
    assert_eq!(merchant, expected_settlement());
    let platform = market.db.balance(market.accounts().platform()).await.unwrap();
    assert_eq!(platform, Money::ZERO);
    let counters = product_counters(&market.db, market.product_id).await;
    assert_eq!(counters.pending_sale, 0);
    assert_eq!(counters.sale_count, 2);
    assert_eq!(counters.total_stock, INITIAL_STOCK - 2);
    assert_eq!(merchant_total_sale(&market.db, market.merchant_id).await, 2);

    // A second settlement of any kind is a conflict and moves no money
    let err = api.complete(tx.id).await.unwrap_err();
    assert_eq!(transition(&err), TransitionError::AlreadyTerminal(SettlementOutcome::Completed));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let err = api.cancel(tx.id, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let err = api.advance(tx.id, Milestone::Delivered).await.unwrap_err();
    assert!(matches!(transition(&err), TransitionError::AlreadyTerminal(_) | TransitionError::CannotReverse { .. }));
    let merchant = market.db.balance(AccountSelector::ByMerchantId(market.merchant_id)).await.unwrap();
    assert_eq!(merchant, expected_settlement());

    let record = api.fetch(tx.id).await.unwrap();
    assert_eq!(record.status.terminal(), Some(SettlementOutcome::Completed));
    assert!(record.status.canceled_at.is_none() && record.status.refunded_at.is_none());
    market.tear_down().await;
}

#[tokio::test]
async fn cancellation_refunds_the_buyer_and_restores_inventory() {
    let market = Marketplace::new().await;
    let api = market.flow_api();
    let tx = market.transaction_at(Milestone::Processed).await;

    let settled = api.cancel(tx.id, Some("Out of teak")).await.unwrap();
    assert_eq!(settled.outcome, SettlementOutcome::Canceled);
    assert_eq!(settled.status.notes.as_deref(), Some("Out of teak"));

    let buyer = market.db.balance(AccountSelector::ByUserId(BUYER_ID)).await.unwrap();
    assert_eq!(buyer, Money::from(BUYER_FUNDS));
    let promotion = market.db.balance(market.accounts().promotion()).await.unwrap();
    assert_eq!(promotion, Money::from(PROMOTION_BUDGET));
    assert_eq!(market.db.balance(market.accounts().platform()).await.unwrap(), Money::ZERO);

    assert_eq!(variant_stock(&market.db, market.variant_id).await, INITIAL_STOCK);
    assert_eq!(product_counters(&market.db, market.product_id).await.pending_sale, 0);
    assert_eq!(promotion_quota(&market.db, market.promotion_id).await, PROMOTION_QUOTA);
    assert_eq!(marketplace_voucher_quota(&market.db, market.marketplace_voucher_id).await, VOUCHER_QUOTA);
    assert_eq!(merchant_voucher_quota(&market.db, market.merchant_voucher_id).await, VOUCHER_QUOTA);
    market.tear_down().await;
}

#[tokio::test]
async fn shipped_transactions_cannot_be_cancelled() {
    let market = Marketplace::new().await;
    let api = market.flow_api();
    let tx = market.transaction_at(Milestone::OnDelivery).await;
    let err = api.cancel(tx.id, None).await.unwrap_err();
    assert_eq!(transition(&err), TransitionError::AlreadyShipped);
    assert_eq!(variant_stock(&market.db, market.variant_id).await, INITIAL_STOCK - 2);
    market.tear_down().await;
}

#[tokio::test]
async fn unpaid_transactions_cannot_be_settled() {
    let market = Marketplace::new().await;
    let receipt = market
        .checkout_api()
        .checkout(&market.checkout(settlement_engine::db_types::PaymentMethod::Gateway, 1), Some("BCA-1"))
        .await
        .unwrap();
    let id = receipt.transactions[0].id;
    let api = market.flow_api();
    let err = api.cancel(id, None).await.unwrap_err();
    assert_eq!(transition(&err), TransitionError::NotPaid);
    let err = api.advance(id, Milestone::Processed).await.unwrap_err();
    assert!(matches!(transition(&err), TransitionError::CannotSkip { from: None, .. }));

    let err = api.complete(9_999).await.unwrap_err();
    assert!(matches!(err, TransactionFlowError::TransactionNotFound(9_999)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    market.tear_down().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_settlements_resolve_to_one_outcome() {
    let market = Marketplace::new().await;
    let tx = market.transaction_at(Milestone::Processed).await;
    let a = market.flow_api();
    let b = market.flow_api();
    let (first, second) = tokio::join!(a.cancel(tx.id, None), b.cancel(tx.id, None));
    assert!(first.is_ok() ^ second.is_ok(), "exactly one cancellation must win");
    let buyer = market.db.balance(AccountSelector::ByUserId(BUYER_ID)).await.unwrap();
    assert_eq!(buyer, Money::from(BUYER_FUNDS));
    market.tear_down().await;
}
