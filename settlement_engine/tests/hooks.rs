use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
};

use chrono::{Duration, Utc};
use futures_util::FutureExt;
use log::*;
use settlement_engine::{
    db_types::{Milestone, NewRefundRequest, RefundResolution, RefundStage, SettlementOutcome},
    events::RefundUpdatedEvent,
    EscalationApi,
    EscalationConfig,
    EventHandlers,
    EventHooks,
    RefundApi,
    SweepKind,
    TransactionFlowApi,
};
use support::*;
use tokio::sync::Mutex;

mod support;

#[derive(Default, Clone)]
struct HookCalled {
    called: Arc<AtomicI32>,
}

impl HookCalled {
    pub fn called(&self) {
        let _ = self.called.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> i32 {
        self.called.load(Ordering::Relaxed)
    }
}

#[tokio::test]
async fn settlement_hooks_fire_once_per_settlement() {
    let market = Marketplace::new().await;
    let settled = HookCalled::default();
    let settled_copy = settled.clone();
    let mut hooks = EventHooks::default();
    hooks.on_transaction_settled(move |ev| {
        info!("🪝️ {ev:?}");
        assert_eq!(ev.outcome, SettlementOutcome::Completed);
        settled_copy.called();
        async {}.boxed()
    });
    let mut handlers = EventHandlers::new(8, hooks);
    let api = TransactionFlowApi::new(market.db.clone(), market.config.clone(), handlers.producers());
    let handler = handlers.on_transaction_settled.take().expect("No settled handler");
    let task = tokio::spawn(handler.start_handler());

    let first = market.transaction_at(Milestone::Delivered).await;
    let second = market.transaction_at(Milestone::Delivered).await;
    api.complete(first.id).await.unwrap();
    api.complete(second.id).await.unwrap();
    // A failed settlement publishes nothing
    assert!(api.complete(first.id).await.is_err());

    drop(api);
    drop(handlers);
    task.await.unwrap();
    assert_eq!(settled.count(), 2);
    market.tear_down().await;
}

#[tokio::test]
async fn refund_hooks_follow_the_negotiation() {
    let market = Marketplace::new().await;
    let stages = Arc::new(Mutex::new(Vec::<RefundStage>::new()));
    let stages_copy = Arc::clone(&stages);
    let settled = HookCalled::default();
    let settled_copy = settled.clone();
    let mut hooks = EventHooks::default();
    hooks
        .on_refund_updated(move |ev: RefundUpdatedEvent| {
            let stages = Arc::clone(&stages_copy);
            async move {
                stages.lock().await.push(ev.stage);
            }
            .boxed()
        })
        .on_transaction_settled(move |ev| {
            assert_eq!(ev.outcome, SettlementOutcome::Refunded);
            settled_copy.called();
            async {}.boxed()
        });
    let mut handlers = EventHandlers::new(8, hooks);
    let api = RefundApi::new(market.db.clone(), market.config.clone(), handlers.producers());
    let refund_handler = handlers.on_refund_updated.take().expect("No refund handler");
    let settled_handler = handlers.on_transaction_settled.take().expect("No settled handler");
    let tasks = [tokio::spawn(refund_handler.start_handler()), tokio::spawn(settled_handler.start_handler())];

    let tx = market.transaction_at(Milestone::Delivered).await;
    let request = NewRefundRequest::new(tx.id, BUYER_ID, "Broken on arrival");
    let refund = api.open(request).await.unwrap();
    api.seller_decide(refund.id, market.merchant_id, true).await.unwrap();
    api.admin_decide(refund.id, true).await.unwrap();

    drop(api);
    drop(handlers);
    for task in tasks {
        task.await.unwrap();
    }
    // Handlers run concurrently, so only the set of stages is fixed
    let mut seen = stages.lock().await.clone();
    seen.sort_by_key(|s| s.to_string());
    let mut expected = vec![
        RefundStage::AwaitingSeller,
        RefundStage::AwaitingAdmin,
        RefundStage::Closed(RefundResolution::Refunded),
    ];
    expected.sort_by_key(|s| s.to_string());
    assert_eq!(seen, expected);
    assert_eq!(settled.count(), 1);
    market.tear_down().await;
}

#[tokio::test]
async fn escalated_refund_decisions_publish_once() {
    let market = Marketplace::new().await;
    let stages = Arc::new(Mutex::new(Vec::<RefundStage>::new()));
    let stages_copy = Arc::clone(&stages);
    let settled = HookCalled::default();
    let settled_copy = settled.clone();
    let mut hooks = EventHooks::default();
    hooks
        .on_refund_updated(move |ev: RefundUpdatedEvent| {
            let stages = Arc::clone(&stages_copy);
            async move {
                stages.lock().await.push(ev.stage);
            }
            .boxed()
        })
        .on_transaction_settled(move |ev| {
            assert_eq!(ev.outcome, SettlementOutcome::Completed);
            settled_copy.called();
            async {}.boxed()
        });
    let mut handlers = EventHandlers::new(8, hooks);
    let api = EscalationApi::new(
        market.db.clone(),
        market.config.clone(),
        EscalationConfig::default(),
        handlers.producers(),
    );
    let refund_handler = handlers.on_refund_updated.take().expect("No refund handler");
    let settled_handler = handlers.on_transaction_settled.take().expect("No settled handler");
    let tasks = [tokio::spawn(refund_handler.start_handler()), tokio::spawn(settled_handler.start_handler())];

    let (_, request_id) = market.refund_request().await;
    let later = Utc::now() + Duration::hours(25);
    assert_eq!(api.run_sweep(SweepKind::SellerRefund, 0, later).await.unwrap().processed, 1);
    market.refund_api().admin_decide(request_id, false).await.unwrap();
    let later = Utc::now() + Duration::hours(25);
    assert_eq!(api.run_sweep(SweepKind::BuyerRefund, 0, later).await.unwrap().processed, 1);

    drop(api);
    drop(handlers);
    for task in tasks {
        task.await.unwrap();
    }
    let mut seen = stages.lock().await.clone();
    seen.sort_by_key(|s| s.to_string());
    let mut expected = vec![RefundStage::AwaitingAdmin, RefundStage::Closed(RefundResolution::Withdrawn)];
    expected.sort_by_key(|s| s.to_string());
    assert_eq!(seen, expected);
    assert_eq!(settled.count(), 1);
    market.tear_down().await;
}
