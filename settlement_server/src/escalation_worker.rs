use chrono::{DateTime, Duration, Utc};
use log::*;
use settlement_engine::{
    EscalationApi,
    EscalationManagement,
    RefundManagement,
    SqliteDatabase,
    SweepKind,
    SweepResult,
    TransactionManagement,
};
use tokio::task::JoinHandle;

/// Starts the escalation worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_escalation_worker(
    api: EscalationApi<SqliteDatabase>,
    interval: Duration,
    max_batches_per_tick: u32,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = interval.to_std().unwrap_or(std::time::Duration::from_secs(60));
        let mut timer = tokio::time::interval(period);
        info!("🕰️ Escalation worker started. Sweeping every {}s", period.as_secs());
        loop {
            timer.tick().await;
            debug!("🕰️ Running escalation sweeps");
            let _ = run_escalation_round(&api, Utc::now(), max_batches_per_tick).await;
        }
    })
}

/// Drains every enabled sweep once, as of `now`. A sweep that fails is logged and the round moves on to the next one.
pub async fn run_escalation_round<B>(api: &EscalationApi<B>, now: DateTime<Utc>, max_batches: u32) -> SweepResult
where B: EscalationManagement + TransactionManagement + RefundManagement {
    let mut round = SweepResult::default();
    for kind in SweepKind::ALL {
        match api.drain(kind, now, max_batches).await {
            Ok(result) => {
                if !result.failed.is_empty() {
                    warn!("🕰️ The {kind} sweep left {} records behind: {:?}", result.failed.len(), result.failed);
                }
                round.merge(result);
            },
            Err(e) => {
                error!("🕰️ Error running the {kind} sweep: {e}");
            },
        }
    }
    if round.fetched > 0 {
        info!("🕰️ {} stalled records found, {} moved on", round.fetched, round.processed);
    }
    round
}
