use chrono::Utc;
use log::*;
use settlement_engine::{
    events::{RefundUpdatedEvent, TransactionSettledEvent},
    EscalationApi,
    EventHandlers,
    EventHooks,
    EventProducers,
    SqliteDatabase,
    SweepKind,
};

use crate::{config::ServerConfig, errors::ServerError, escalation_worker::start_escalation_worker};

/// Connects to the database and brings its schema up to date.
pub async fn prepare_database(config: &ServerConfig) -> Result<SqliteDatabase, ServerError> {
    config.validate()?;
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections).await?;
    db.migrate().await?;
    info!("🚀️ Database {} is ready", db.url());
    Ok(db)
}

/// Runs the escalation worker until the process receives Ctrl-C.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = prepare_database(&config).await?;
    let handlers = EventHandlers::new(128, logging_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let api = EscalationApi::new(db.clone(), config.engine.clone(), config.escalation.clone(), producers);
    let worker = start_escalation_worker(api, config.escalation_interval, config.max_batches_per_tick);
    tokio::signal::ctrl_c().await?;
    info!("🚀️ Shutting down");
    worker.abort();
    db.close().await;
    Ok(())
}

/// Runs one page of one sweep, prints the result as JSON and exits.
pub async fn run_single_sweep(config: ServerConfig, kind: SweepKind, batch: i64) -> Result<(), ServerError> {
    let db = prepare_database(&config).await?;
    let api = EscalationApi::new(db.clone(), config.engine, config.escalation, EventProducers::default());
    let result = api.run_sweep(kind, batch, Utc::now()).await;
    db.close().await;
    let result = result?;
    let json = serde_json::to_string_pretty(&result).map_err(|e| ServerError::BackendError(e.to_string()))?;
    println!("{json}");
    Ok(())
}

/// Hooks that record every settlement and refund update in the log.
fn logging_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks
        .on_transaction_settled(|ev: TransactionSettledEvent| {
            Box::pin(async move {
                info!(
                    "📬️ Transaction #{} ({}) {}. {} settled for merchant #{}",
                    ev.transaction_id, ev.invoice_code, ev.outcome, ev.settlement_amount, ev.merchant_id
                );
            })
        })
        .on_refund_updated(|ev: RefundUpdatedEvent| {
            Box::pin(async move {
                info!(
                    "📬️ Refund request #{} on transaction #{} is now {}",
                    ev.refund_request_id, ev.transaction_id, ev.stage
                );
            })
        });
    hooks
}
