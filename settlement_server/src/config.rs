//! Server configuration, read from `MSE_*` environment variables.
//!
//! Every setting has a default. A missing variable is logged at `info`, an unparseable one at `warn`, and the default
//! is used in both cases.
//!
//! | Variable                                | Default                       |
//! |-----------------------------------------|-------------------------------|
//! | `MSE_DATABASE_URL`                      | `sqlite://data/settlement.db` |
//! | `MSE_DB_MAX_CONNECTIONS`                | 25                            |
//! | `MSE_PLATFORM_WALLET_ID`                | 1                             |
//! | `MSE_PROMOTION_WALLET_ID`               | 2                             |
//! | `MSE_MAX_BUYER_REJECTIONS`              | 3                             |
//! | `MSE_REFUND_REQUEST_COOLDOWN_MINS`      | 0 (no throttle)               |
//! | `MSE_ESCALATION_INTERVAL_SECS`          | 60                            |
//! | `MSE_ESCALATION_MAX_BATCHES_PER_TICK`   | 10                            |
//! | `MSE_SWEEP_<KIND>_ENABLED`              | true                          |
//! | `MSE_SWEEP_<KIND>_BATCH_SIZE`           | 25                            |
//! | `MSE_SWEEP_<KIND>_SLA_HOURS`            | 24, 48, 72, 24, 24            |
//!
//! `<KIND>` is one of `WAITED`, `PROCESSED`, `DELIVERED`, `SELLER_REFUND` or `BUYER_REFUND`.
use std::env;

use chrono::Duration;
use log::*;
use mse_common::helpers::{parse_boolean_flag, parse_positive_i64};
use settlement_engine::{
    config::DEFAULT_MAX_BUYER_REJECTIONS,
    db_types::PlatformAccounts,
    EngineConfig,
    EscalationConfig,
    SweepKind,
};

use crate::errors::ServerError;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/settlement.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_PLATFORM_WALLET_ID: i64 = 1;
const DEFAULT_PROMOTION_WALLET_ID: i64 = 2;
const DEFAULT_ESCALATION_INTERVAL: Duration = Duration::seconds(60);
const DEFAULT_MAX_BATCHES_PER_TICK: u32 = 10;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub engine: EngineConfig,
    pub escalation: EscalationConfig,
    /// Time between two rounds of escalation sweeps.
    pub escalation_interval: Duration,
    /// The most pages a single sweep may read in one round.
    pub max_batches_per_tick: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let accounts = PlatformAccounts {
            platform_wallet_id: DEFAULT_PLATFORM_WALLET_ID,
            promotion_wallet_id: DEFAULT_PROMOTION_WALLET_ID,
        };
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            engine: EngineConfig::new(accounts),
            escalation: EscalationConfig::default(),
            escalation_interval: DEFAULT_ESCALATION_INTERVAL,
            max_batches_per_tick: DEFAULT_MAX_BATCHES_PER_TICK,
        }
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from `lookup`, which maps a variable name to its value, if set.
    pub fn from_lookup<F>(lookup: F) -> Self
    where F: Fn(&str) -> Option<String> {
        let defaults = Self::default();
        let database_url = lookup("MSE_DATABASE_URL").unwrap_or_else(|| {
            info!("🪛️ MSE_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let max_connections = positive(&lookup, "MSE_DB_MAX_CONNECTIONS", i64::from(DEFAULT_MAX_CONNECTIONS));
        let accounts = PlatformAccounts {
            platform_wallet_id: positive(&lookup, "MSE_PLATFORM_WALLET_ID", DEFAULT_PLATFORM_WALLET_ID),
            promotion_wallet_id: positive(&lookup, "MSE_PROMOTION_WALLET_ID", DEFAULT_PROMOTION_WALLET_ID),
        };
        let max_buyer_rejections =
            positive(&lookup, "MSE_MAX_BUYER_REJECTIONS", i64::from(DEFAULT_MAX_BUYER_REJECTIONS));
        // Zero is a valid setting here: it turns the throttle off.
        let cooldown_mins = match lookup("MSE_REFUND_REQUEST_COOLDOWN_MINS") {
            Some(s) => s.trim().parse::<i64>().unwrap_or_else(|e| {
                warn!("🪛️ Invalid configuration value for MSE_REFUND_REQUEST_COOLDOWN_MINS. {e}. The throttle is off.");
                0
            }),
            None => 0,
        };
        let engine = EngineConfig::new(accounts)
            .with_max_buyer_rejections(u32::try_from(max_buyer_rejections).unwrap_or(DEFAULT_MAX_BUYER_REJECTIONS))
            .with_refund_request_cooldown(Some(Duration::minutes(cooldown_mins)));

        let mut escalation = EscalationConfig::default();
        for kind in SweepKind::ALL {
            let sweep = escalation.sweep_mut(kind);
            let prefix = format!("MSE_SWEEP_{}", kind.env_name());
            sweep.enabled = parse_boolean_flag(lookup(&format!("{prefix}_ENABLED")), true);
            sweep.batch_size = positive(&lookup, &format!("{prefix}_BATCH_SIZE"), sweep.batch_size);
            let sla_hours = positive(&lookup, &format!("{prefix}_SLA_HOURS"), sweep.sla.num_hours());
            sweep.sla = Duration::hours(sla_hours);
        }
        let interval_secs =
            positive(&lookup, "MSE_ESCALATION_INTERVAL_SECS", defaults.escalation_interval.num_seconds());
        let max_batches_per_tick =
            positive(&lookup, "MSE_ESCALATION_MAX_BATCHES_PER_TICK", i64::from(DEFAULT_MAX_BATCHES_PER_TICK));
        Self {
            database_url,
            max_connections: u32::try_from(max_connections).unwrap_or(DEFAULT_MAX_CONNECTIONS),
            engine,
            escalation,
            escalation_interval: Duration::seconds(interval_secs),
            max_batches_per_tick: u32::try_from(max_batches_per_tick).unwrap_or(DEFAULT_MAX_BATCHES_PER_TICK),
        }
    }

    /// Checks the settings that can be wrong even when each one parsed.
    pub fn validate(&self) -> Result<(), ServerError> {
        let accounts = &self.engine.accounts;
        if accounts.platform_wallet_id == accounts.promotion_wallet_id {
            return Err(ServerError::ConfigurationError(format!(
                "The platform and promotion wallets must be different accounts, but both are #{}",
                accounts.platform_wallet_id
            )));
        }
        if self.database_url.trim().is_empty() {
            return Err(ServerError::ConfigurationError("MSE_DATABASE_URL is empty".into()));
        }
        Ok(())
    }
}

fn positive<F>(lookup: &F, name: &str, default: i64) -> i64
where F: Fn(&str) -> Option<String> {
    match lookup(name) {
        None => {
            debug!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
        Some(s) => parse_positive_i64(&s).unwrap_or_else(|| {
            warn!("🪛️ Invalid configuration value for {name}: '{s}'. Using the default value of {default}.");
            default
        }),
    }
}
