use std::{collections::HashMap, fmt::Debug};

use cucumber::World;
use log::*;
use settlement_engine::{RefundApi, RefundFlowError, SqliteDatabase, TransactionFlowApi};

use crate::support::Marketplace;

#[derive(Default, Debug, World)]
pub struct RefundWorld {
    pub system: Option<NegotiationSystem>,
}

/// A seeded marketplace plus the names the scenario gave to its transactions.
pub struct NegotiationSystem {
    pub market: Marketplace,
    pub transactions: HashMap<String, i64>,
    pub requests: HashMap<String, i64>,
    pub last_error: Option<RefundFlowError>,
}

impl Debug for NegotiationSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NegotiationSystem({}, {} transactions)", self.market.url, self.transactions.len())
    }
}

impl RefundWorld {
    pub fn system(&self) -> &NegotiationSystem {
        self.system.as_ref().expect("Marketplace not initialised")
    }

    pub fn system_mut(&mut self) -> &mut NegotiationSystem {
        self.system.as_mut().expect("Marketplace not initialised")
    }

    pub fn refunds(&self) -> RefundApi<SqliteDatabase> {
        self.system().market.refund_api()
    }

    pub fn flow(&self) -> TransactionFlowApi<SqliteDatabase> {
        self.system().market.flow_api()
    }

    pub fn transaction_id(&self, name: &str) -> i64 {
        *self.system().transactions.get(name).unwrap_or_else(|| panic!("No transaction called {name}"))
    }

    pub fn request_id(&self, name: &str) -> i64 {
        *self.system().requests.get(name).unwrap_or_else(|| panic!("No refund request on {name}"))
    }
}

impl NegotiationSystem {
    pub async fn new() -> Self {
        let market = Marketplace::new().await;
        debug!("🚀️ Created marketplace database: {}", market.url);
        Self { market, transactions: HashMap::new(), requests: HashMap::new(), last_error: None }
    }
}
