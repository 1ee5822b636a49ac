use std::{env, env::VarError};

use clap::{Args, Parser, Subcommand};
use settlement_engine::SweepKind;

use crate::config::ServerConfig;

#[derive(Parser, Debug)]
#[command(version, about = "Settles marketplace transactions and escalates the ones left waiting")]
pub struct Arguments {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Migrate the database, then run the escalation worker until interrupted
    #[clap(name = "run")]
    Run,
    /// Run a single page of one escalation sweep
    #[clap(name = "sweep")]
    Sweep(SweepParams),
    /// Print the current configuration
    #[clap(name = "env")]
    Env,
}

#[derive(Debug, Args)]
pub struct SweepParams {
    /// waited, processed, delivered, seller-refund or buyer-refund
    pub kind: SweepKind,
    /// The page to run. The page starts at batch × batch size
    #[arg(short = 'b', long = "batch", default_value = "0")]
    pub batch: i64,
}

pub fn display_envs(config: &ServerConfig) {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 9] = [
        "RUST_LOG",
        "MSE_DATABASE_URL",
        "MSE_DB_MAX_CONNECTIONS",
        "MSE_PLATFORM_WALLET_ID",
        "MSE_PROMOTION_WALLET_ID",
        "MSE_MAX_BUYER_REJECTIONS",
        "MSE_REFUND_REQUEST_COOLDOWN_MINS",
        "MSE_ESCALATION_INTERVAL_SECS",
        "MSE_ESCALATION_MAX_BATCHES_PER_TICK",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<40} {val:<15}");
    });
    println!("\nEscalation sweeps in effect:");
    for kind in SweepKind::ALL {
        let sweep = config.escalation.sweep(kind);
        let state = if sweep.enabled { "enabled" } else { "disabled" };
        println!(
            "  {:<15} {state:<10} batch size {:<5} SLA {} hrs",
            kind.to_string(),
            sweep.batch_size,
            sweep.sla.num_hours()
        );
    }
}
