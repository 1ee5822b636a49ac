use chrono::Duration;
use settlement_engine::{
    db_types::{
        AccountSelector,
        Milestone,
        Money,
        NewRefundRequest,
        RefundRequestStatus,
        RefundResolution,
        RefundStage,
        RefundStageError,
        SettlementOutcome,
        TransitionError,
    },
    external::MemoryCache,
    test_utils::seed::*,
    ErrorKind,
    LedgerManagement,
    RefundApi,
    RefundFlowError,
    TransactionFlowError,
};
use support::*;

mod support;

fn reason() -> &'static str {
    "Wrong colour"
}

#[tokio::test]
async fn only_delivered_transactions_can_be_disputed() {
    let market = Marketplace::new().await;
    let api = market.refund_api();
    let tx = market.transaction_at(Milestone::OnDelivery).await;
    let err = api.open(NewRefundRequest::new(tx.id, BUYER_ID, reason())).await.unwrap_err();
    assert!(matches!(err, RefundFlowError::Flow(TransactionFlowError::Transition(TransitionError::NotDelivered))));
    assert!(api.fetch_request_for_transaction(tx.id).await.unwrap().is_none());

    market.flow_api().advance(tx.id, Milestone::Delivered).await.unwrap();
    let err = api.open(NewRefundRequest::new(tx.id, BUYER_ID, "   ")).await.unwrap_err();
    assert!(matches!(err, RefundFlowError::ReasonRequired));
    let err = api.open(NewRefundRequest::new(tx.id, BUYER_ID + 1, reason())).await.unwrap_err();
    assert!(matches!(err, RefundFlowError::NotAParty));

    let refund = api.open(NewRefundRequest::new(tx.id, BUYER_ID, reason())).await.unwrap();
    assert_eq!(api.current_stage(refund.id).await.unwrap(), RefundStage::AwaitingSeller);
    let err = api.open(NewRefundRequest::new(tx.id, BUYER_ID, reason())).await.unwrap_err();
    assert!(matches!(err, RefundFlowError::DuplicateRefundRequest(id) if id == tx.id), "{err}");
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // A refund in flight blocks a direct completion
    let err = market.flow_api().complete(tx.id).await.unwrap_err();
    assert!(matches!(err, TransactionFlowError::Transition(TransitionError::RefundInProgress)));
    market.tear_down().await;
}

#[tokio::test]
async fn seller_rejection_starts_a_new_round() {
    let market = Marketplace::new().await;
    let api = market.refund_api();
    let (_, id) = market.refund_request().await;

    let applied = api.seller_decide(id, market.merchant_id, false).await.unwrap();
    assert_eq!(applied.transition.next_stage, RefundStage::AwaitingSeller);
    assert!(applied.settled.is_none());

    let history = api.history(id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].rejected_by_seller_at.is_some() && history[0].closed_at.is_some());
    assert!(history[1].is_open());
    assert!(history[1].accepted_by_seller_at.is_none());
    assert_eq!(api.current_stage(id).await.unwrap(), RefundStage::AwaitingSeller);
    market.tear_down().await;
}

#[tokio::test]
async fn admin_approval_refunds_the_buyer() {
    let market = Marketplace::new().await;
    let api = market.refund_api();
    let (tx, id) = market.refund_request().await;

    let err = api.admin_decide(id, true).await.unwrap_err();
    assert!(matches!(
        err,
        RefundFlowError::Stage(RefundStageError::WrongStage { stage: RefundStage::AwaitingSeller, .. })
    ));
    assert_eq!(err.kind(), ErrorKind::Validation);

    api.seller_decide(id, market.merchant_id, true).await.unwrap();
    let applied = api.admin_decide(id, true).await.unwrap();
    let settled = applied.settled.expect("the transaction should be settled");
    assert_eq!(settled.outcome, SettlementOutcome::Refunded);
    assert_eq!(api.current_stage(id).await.unwrap(), RefundStage::Closed(RefundResolution::Refunded));
    assert!(api.history(id).await.unwrap().iter().all(|row| !row.is_open()));

    let buyer = market.db.balance(AccountSelector::ByUserId(BUYER_ID)).await.unwrap();
    assert_eq!(buyer, Money::from(BUYER_FUNDS));
    let merchant = market.db.balance(AccountSelector::ByMerchantId(market.merchant_id)).await.unwrap();
    assert_eq!(merchant, Money::ZERO);
    assert_eq!(variant_stock(&market.db, market.variant_id).await, INITIAL_STOCK);
    let record = market.flow_api().fetch(tx.id).await.unwrap();
    assert!(record.status.refunded_at.is_some());

    let err = api.admin_decide(id, false).await.unwrap_err();
    assert!(matches!(err, RefundFlowError::Stage(RefundStageError::RequestClosed(RefundResolution::Refunded))));
    market.tear_down().await;
}

#[tokio::test]
async fn buyer_accepting_the_rejection_pays_the_merchant() {
    let market = Marketplace::new().await;
    let api = market.refund_api();
    let (_, id) = market.refund_request().await;
    api.seller_decide(id, market.merchant_id, true).await.unwrap();
    api.admin_decide(id, false).await.unwrap();
    assert_eq!(api.current_stage(id).await.unwrap(), RefundStage::AwaitingBuyer);

    let err = api.buyer_decide(id, BUYER_ID + 1, true).await.unwrap_err();
    assert!(matches!(err, RefundFlowError::NotAParty));
    let applied = api.buyer_decide(id, BUYER_ID, true).await.unwrap();
    assert_eq!(applied.settled.map(|s| s.outcome), Some(SettlementOutcome::Completed));
    assert_eq!(api.current_stage(id).await.unwrap(), RefundStage::Closed(RefundResolution::Withdrawn));
    let merchant = market.db.balance(AccountSelector::ByMerchantId(market.merchant_id)).await.unwrap();
    assert_eq!(merchant, expected_settlement());
    market.tear_down().await;
}

#[tokio::test]
async fn third_buyer_rejection_dismisses_the_request() {
    let market = Marketplace::new().await;
    let api = market.refund_api();
    let (tx, id) = market.refund_request().await;
    api.seller_decide(id, market.merchant_id, true).await.unwrap();

    for round in 1..=2 {
        api.admin_decide(id, false).await.unwrap();
        let applied = api.buyer_decide(id, BUYER_ID, false).await.unwrap();
        assert_eq!(applied.transition.next_stage, RefundStage::AwaitingAdmin, "round {round}");
        assert!(applied.settled.is_none());
        // The new row carries the seller's acceptance forward
        let history = api.history(id).await.unwrap();
        let open = history.last().unwrap();
        assert!(open.is_open() && open.accepted_by_seller_at.is_some());
    }
    api.admin_decide(id, false).await.unwrap();
    let applied = api.buyer_decide(id, BUYER_ID, false).await.unwrap();
    assert_eq!(applied.transition.next_stage, RefundStage::Closed(RefundResolution::Dismissed));
    assert_eq!(applied.settled.as_ref().map(|s| s.outcome), Some(SettlementOutcome::Completed));

    let history = api.history(id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history.iter().filter(|r| r.rejected_by_buyer_at.is_some()).count(), 3);
    assert!(history.iter().all(|r| !r.is_open()));
    let stages = RefundRequestStatus::stages(&history);
    assert_eq!(stages, vec![
        RefundStage::Closed(RefundResolution::Superseded),
        RefundStage::Closed(RefundResolution::Superseded),
        RefundStage::Closed(RefundResolution::Dismissed),
    ]);
    let record = market.flow_api().fetch(tx.id).await.unwrap();
    assert_eq!(record.status.terminal(), Some(SettlementOutcome::Completed));
    let merchant = market.db.balance(AccountSelector::ByMerchantId(market.merchant_id)).await.unwrap();
    assert_eq!(merchant, expected_settlement());
    market.tear_down().await;
}

#[tokio::test]
async fn buyer_may_cancel_only_before_the_seller_decides() {
    let market = Marketplace::new().await;
    let api = market.refund_api();

    let (tx, id) = market.refund_request().await;
    let applied = api.buyer_cancel(id, BUYER_ID).await.unwrap();
    assert_eq!(applied.transition.next_stage, RefundStage::Closed(RefundResolution::CanceledByBuyer));
    let record = market.flow_api().fetch(tx.id).await.unwrap();
    assert!(record.status.completed_at.is_some());

    let (_, id) = market.refund_request().await;
    let err = api.seller_decide(id, market.merchant_id + 1, true).await.unwrap_err();
    assert!(matches!(err, RefundFlowError::NotAParty));
    api.seller_decide(id, market.merchant_id, true).await.unwrap();
    let err = api.buyer_cancel(id, BUYER_ID).await.unwrap_err();
    assert!(matches!(
        err,
        RefundFlowError::Stage(RefundStageError::WrongStage { stage: RefundStage::AwaitingAdmin, .. })
    ));
    market.tear_down().await;
}

#[tokio::test]
async fn refund_requests_are_throttled_per_buyer() {
    let market = Marketplace::new().await;
    let config = market.config.clone().with_refund_request_cooldown(Some(Duration::minutes(10)));
    let cache = MemoryCache::new();
    let api = RefundApi::new(market.db.clone(), config, Default::default()).with_cache(cache.clone());

    let first = market.transaction_at(Milestone::Delivered).await;
    let second = market.transaction_at(Milestone::Delivered).await;
    api.open(NewRefundRequest::new(first.id, BUYER_ID, reason())).await.unwrap();
    let err = api.open(NewRefundRequest::new(second.id, BUYER_ID, reason())).await.unwrap_err();
    match err {
        RefundFlowError::TooManyRequests { retry_after_secs } => {
            assert!(retry_after_secs > 0 && retry_after_secs <= 600)
        },
        e => panic!("Expected TooManyRequests, got {e}"),
    }
    assert!(api.fetch_request_for_transaction(second.id).await.unwrap().is_none());

    use settlement_engine::external::KeyValueCache;
    cache.delete(&format!("refund-request:{BUYER_ID}")).await.unwrap();
    api.open(NewRefundRequest::new(second.id, BUYER_ID, reason())).await.unwrap();
    market.tear_down().await;
}

#[tokio::test]
async fn unknown_requests() {
    let market = Marketplace::new().await;
    let api = market.refund_api();
    let err = api.current_stage(404).await.unwrap_err();
    assert!(matches!(err, RefundFlowError::RefundRequestNotFound(404)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = api.admin_decide(404, true).await.unwrap_err();
    assert!(matches!(err, RefundFlowError::RefundRequestNotFound(404)));
    market.tear_down().await;
}
