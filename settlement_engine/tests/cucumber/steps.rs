use cucumber::{then, when};
use settlement_engine::{
    db_types::{AccountSelector, Money, NewRefundRequest, RefundResolution, RefundStage, RefundStageError},
    LedgerManagement,
    RefundFlowError,
};

use crate::{
    cucumber::RefundWorld,
    support::{expected_settlement, BUYER_FUNDS, BUYER_ID},
};

fn accepts(verb: &str) -> bool {
    match verb {
        "accepts" => true,
        "rejects" => false,
        other => panic!("Expected 'accepts' or 'rejects', got '{other}'"),
    }
}

fn record(world: &mut RefundWorld, result: Result<impl Sized, RefundFlowError>) {
    world.system_mut().last_error = result.err();
}

#[when(expr = "the buyer asks for a refund on {word} because {string}")]
async fn open_request(world: &mut RefundWorld, name: String, reason: String) {
    let tx_id = world.transaction_id(&name);
    let request = NewRefundRequest::new(tx_id, BUYER_ID, reason);
    let refund = world.refunds().open(request).await.expect("Error opening refund request");
    world.system_mut().requests.insert(name, refund.id);
}

#[when(expr = "the seller {word} the refund on {word}")]
async fn seller_decides(world: &mut RefundWorld, verb: String, name: String) {
    let id = world.request_id(&name);
    let merchant_id = world.system().market.merchant_id;
    let result = world.refunds().seller_decide(id, merchant_id, accepts(&verb)).await;
    record(world, result);
}

#[when(expr = "an admin {word} the refund on {word}")]
async fn admin_decides(world: &mut RefundWorld, verb: String, name: String) {
    let id = world.request_id(&name);
    let result = world.refunds().admin_decide(id, accepts(&verb)).await;
    record(world, result);
}

#[when(expr = "the buyer {word} the admin decision on {word}")]
async fn buyer_decides(world: &mut RefundWorld, verb: String, name: String) {
    let id = world.request_id(&name);
    let result = world.refunds().buyer_decide(id, BUYER_ID, accepts(&verb)).await;
    record(world, result);
}

#[when(expr = "the buyer withdraws the refund on {word}")]
async fn buyer_cancels(world: &mut RefundWorld, name: String) {
    let id = world.request_id(&name);
    let result = world.refunds().buyer_cancel(id, BUYER_ID).await;
    record(world, result);
}

#[then(expr = "the refund on {word} is waiting for the {word}")]
async fn waiting_for(world: &mut RefundWorld, name: String, actor: String) {
    assert!(world.system().last_error.is_none(), "Unexpected error: {:?}", world.system().last_error);
    let expected = match actor.as_str() {
        "seller" => RefundStage::AwaitingSeller,
        "admin" => RefundStage::AwaitingAdmin,
        "buyer" => RefundStage::AwaitingBuyer,
        other => panic!("Unknown actor: {other}"),
    };
    let stage = world.refunds().current_stage(world.request_id(&name)).await.expect("Error fetching stage");
    assert_eq!(stage, expected);
}

#[then(expr = "the refund on {word} is closed as {word}")]
async fn closed_as(world: &mut RefundWorld, name: String, resolution: String) {
    let expected = match resolution.as_str() {
        "refunded" => RefundResolution::Refunded,
        "withdrawn" => RefundResolution::Withdrawn,
        "dismissed" => RefundResolution::Dismissed,
        "canceled" => RefundResolution::CanceledByBuyer,
        other => panic!("Unknown resolution: {other}"),
    };
    let stage = world.refunds().current_stage(world.request_id(&name)).await.expect("Error fetching stage");
    assert_eq!(stage, RefundStage::Closed(expected));
}

#[then(expr = "the refund on {word} has {int} status rows")]
async fn status_rows(world: &mut RefundWorld, name: String, count: usize) {
    let history = world.refunds().history(world.request_id(&name)).await.expect("Error fetching history");
    assert_eq!(history.len(), count);
    assert!(history.iter().filter(|row| row.is_open()).count() <= 1);
}

#[then(expr = "transaction {word} is {word}")]
async fn transaction_outcome(world: &mut RefundWorld, name: String, outcome: String) {
    let record = world.flow().fetch(world.transaction_id(&name)).await.expect("Error fetching transaction");
    let status = record.status;
    match outcome.as_str() {
        "completed" => assert!(status.completed_at.is_some()),
        "refunded" => assert!(status.refunded_at.is_some()),
        "open" => assert!(status.terminal().is_none()),
        other => panic!("Unknown outcome: {other}"),
    }
}

#[then("the buyer has all their money back")]
async fn buyer_made_whole(world: &mut RefundWorld) {
    let db = &world.system().market.db;
    let balance = db.balance(AccountSelector::ByUserId(BUYER_ID)).await.expect("Error fetching balance");
    assert_eq!(balance, Money::from(BUYER_FUNDS));
}

#[then(expr = "the merchant has been paid for {int} transaction(s)")]
async fn merchant_paid(world: &mut RefundWorld, count: i64) {
    let market = &world.system().market;
    let balance =
        market.db.balance(AccountSelector::ByMerchantId(market.merchant_id)).await.expect("Error fetching balance");
    assert_eq!(balance, expected_settlement() * count);
}

#[then("the decision is refused as out of turn")]
async fn out_of_turn(world: &mut RefundWorld) {
    let err = world.system_mut().last_error.take().expect("The decision should have failed");
    assert!(matches!(err, RefundFlowError::Stage(RefundStageError::WrongStage { .. })), "{err}");
}
