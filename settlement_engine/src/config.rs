//! Runtime settings for the engine.
//!
//! Nothing in the engine reads the environment. The server assembles these values (see `settlement_server::config`)
//! and hands them to the APIs by value.
use std::{fmt::Display, str::FromStr};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::db_types::PlatformAccounts;

pub const DEFAULT_MAX_BUYER_REJECTIONS: u32 = 3;
pub const DEFAULT_BATCH_SIZE: i64 = 25;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub accounts: PlatformAccounts,
    /// The buyer rejection that reaches this count dismisses the refund request.
    pub max_buyer_rejections: u32,
    /// Minimum time between two refund requests from the same buyer. `None` disables the throttle.
    pub refund_request_cooldown: Option<Duration>,
}

impl EngineConfig {
    pub fn new(accounts: PlatformAccounts) -> Self {
        Self { accounts, max_buyer_rejections: DEFAULT_MAX_BUYER_REJECTIONS, refund_request_cooldown: None }
    }

    pub fn with_max_buyer_rejections(mut self, max: u32) -> Self {
        self.max_buyer_rejections = max.max(1);
        self
    }

    pub fn with_refund_request_cooldown(mut self, cooldown: Option<Duration>) -> Self {
        self.refund_request_cooldown = cooldown.filter(|d| *d > Duration::zero());
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(PlatformAccounts { platform_wallet_id: 1, promotion_wallet_id: 2 })
    }
}

//--------------------------------------      SweepKind      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SweepKind {
    /// Paid but never processed: cancel.
    Waited,
    /// Processed but never shipped: cancel.
    Processed,
    /// Delivered and left alone: complete.
    Delivered,
    /// Refund request ignored by the seller: accept on the seller's behalf.
    SellerRefund,
    /// Admin rejection ignored by the buyer: accept the rejection on the buyer's behalf.
    BuyerRefund,
}

impl SweepKind {
    pub const ALL: [SweepKind; 5] = [
        SweepKind::Waited,
        SweepKind::Processed,
        SweepKind::Delivered,
        SweepKind::SellerRefund,
        SweepKind::BuyerRefund,
    ];

    pub fn default_sla_hours(&self) -> i64 {
        match self {
            SweepKind::Waited => 24,
            SweepKind::Processed => 48,
            SweepKind::Delivered => 72,
            SweepKind::SellerRefund => 24,
            SweepKind::BuyerRefund => 24,
        }
    }

    /// The upper-case fragment used in environment variable names, e.g. `SELLER_REFUND`.
    pub fn env_name(&self) -> &'static str {
        match self {
            SweepKind::Waited => "WAITED",
            SweepKind::Processed => "PROCESSED",
            SweepKind::Delivered => "DELIVERED",
            SweepKind::SellerRefund => "SELLER_REFUND",
            SweepKind::BuyerRefund => "BUYER_REFUND",
        }
    }
}

impl Display for SweepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SweepKind::Waited => write!(f, "waited"),
            SweepKind::Processed => write!(f, "processed"),
            SweepKind::Delivered => write!(f, "delivered"),
            SweepKind::SellerRefund => write!(f, "seller-refund"),
            SweepKind::BuyerRefund => write!(f, "buyer-refund"),
        }
    }
}

impl FromStr for SweepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "waited" => Ok(Self::Waited),
            "processed" => Ok(Self::Processed),
            "delivered" => Ok(Self::Delivered),
            "seller-refund" => Ok(Self::SellerRefund),
            "buyer-refund" => Ok(Self::BuyerRefund),
            other => Err(format!("Unknown sweep: {other}")),
        }
    }
}

//--------------------------------------     SweepConfig     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepConfig {
    pub enabled: bool,
    pub batch_size: i64,
    pub sla: Duration,
}

impl SweepConfig {
    pub fn default_for(kind: SweepKind) -> Self {
        Self { enabled: true, batch_size: DEFAULT_BATCH_SIZE, sla: Duration::hours(kind.default_sla_hours()) }
    }
}

#[derive(Debug, Clone)]
pub struct EscalationConfig {
    pub waited: SweepConfig,
    pub processed: SweepConfig,
    pub delivered: SweepConfig,
    pub seller_refund: SweepConfig,
    pub buyer_refund: SweepConfig,
    /// Note written on transactions cancelled by a sweep.
    pub system_note: String,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            waited: SweepConfig::default_for(SweepKind::Waited),
            processed: SweepConfig::default_for(SweepKind::Processed),
            delivered: SweepConfig::default_for(SweepKind::Delivered),
            seller_refund: SweepConfig::default_for(SweepKind::SellerRefund),
            buyer_refund: SweepConfig::default_for(SweepKind::BuyerRefund),
            system_note: "Canceled automatically by the system".to_string(),
        }
    }
}

impl EscalationConfig {
    pub fn sweep(&self, kind: SweepKind) -> &SweepConfig {
        match kind {
            SweepKind::Waited => &self.waited,
            SweepKind::Processed => &self.processed,
            SweepKind::Delivered => &self.delivered,
            SweepKind::SellerRefund => &self.seller_refund,
            SweepKind::BuyerRefund => &self.buyer_refund,
        }
    }

    pub fn sweep_mut(&mut self, kind: SweepKind) -> &mut SweepConfig {
        match kind {
            SweepKind::Waited => &mut self.waited,
            SweepKind::Processed => &mut self.processed,
            SweepKind::Delivered => &mut self.delivered,
            SweepKind::SellerRefund => &mut self.seller_refund,
            SweepKind::BuyerRefund => &mut self.buyer_refund,
        }
    }
}
