use cucumber::given;
use settlement_engine::db_types::Milestone;

use crate::cucumber::{world::NegotiationSystem, RefundWorld};

#[given("a fresh marketplace")]
async fn fresh_marketplace(world: &mut RefundWorld) {
    world.system = Some(NegotiationSystem::new().await);
}

#[given(expr = "a delivered transaction {word}")]
async fn delivered_transaction(world: &mut RefundWorld, name: String) {
    let tx = world.system().market.transaction_at(Milestone::Delivered).await;
    world.system_mut().transactions.insert(name, tx.id);
}
