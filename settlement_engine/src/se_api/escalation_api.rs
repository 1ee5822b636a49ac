//! Time-driven sweeps that push stalled records past their SLA window.
//!
//! | Sweep           | Stalled when                                      | Action                        |
//! |-----------------|---------------------------------------------------|-------------------------------|
//! | `waited`        | paid, not processed within the SLA                | cancel with the system note   |
//! | `processed`     | processed, not shipped within the SLA             | cancel with the system note   |
//! | `delivered`     | delivered, not completed within the SLA           | complete                      |
//! | `seller-refund` | refund request untouched by the seller            | seller accepts                |
//! | `buyer-refund`  | admin rejection unanswered by the buyer           | buyer accepts the rejection   |
//!
//! None of the sweeps touch a transaction that has a refund in flight; the refund sweeps deal with those.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use serde::Serialize;

use crate::{
    config::{EngineConfig, EscalationConfig, SweepKind},
    db_types::{RefundDecision, SettlementOutcome, SettlementTrigger},
    events::{EventProducers, TransactionSettledEvent},
    se_api::{
        errors::{EscalationError, RefundFlowError},
        refund_api::RefundApi,
    },
    traits::{EscalationManagement, RefundManagement, TransactionManagement},
};

/// What one page of a sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepResult {
    /// How many stalled records the page held.
    pub fetched: usize,
    pub processed: usize,
    /// Ids of the records that could not be moved on. They are left as they were.
    pub failed: Vec<i64>,
}

impl SweepResult {
    pub fn merge(&mut self, other: SweepResult) {
        self.fetched += other.fetched;
        self.processed += other.processed;
        self.failed.extend(other.failed);
    }
}

pub struct EscalationApi<B> {
    db: B,
    engine: EngineConfig,
    config: EscalationConfig,
    producers: EventProducers,
    refunds: RefundApi<B>,
}

impl<B> Debug for EscalationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EscalationApi")
    }
}

impl<B: Clone> EscalationApi<B> {
    pub fn new(db: B, engine: EngineConfig, config: EscalationConfig, producers: EventProducers) -> Self {
        let refunds = RefundApi::new(db.clone(), engine.clone(), producers.clone());
        Self { db, engine, config, producers, refunds }
    }
}

impl<B> EscalationApi<B> {

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }
}

impl<B> EscalationApi<B>
where B: EscalationManagement + TransactionManagement + RefundManagement
{
    /// Runs one page of the `kind` sweep as of `now`. The page starts at `batch_number × batch_size`.
    ///
    /// Each record is handled in its own database transaction. A record that fails is logged, counted and skipped;
    /// only a failure to read the page fails the whole run.
    pub async fn run_sweep(
        &self,
        kind: SweepKind,
        batch_number: i64,
        now: DateTime<Utc>,
    ) -> Result<SweepResult, EscalationError> {
        let offset = batch_number.max(0) * self.config.sweep(kind).batch_size;
        self.run_page(kind, offset, now).await
    }

    /// Sweeps until a page comes back short, or `max_batches` pages have been read.
    ///
    /// Records that were moved on drop out of the sweep's query and failed ones stay in it, so every page starts just
    /// past the records that have failed so far. Those are not retried until the next call.
    pub async fn drain(
        &self,
        kind: SweepKind,
        now: DateTime<Utc>,
        max_batches: u32,
    ) -> Result<SweepResult, EscalationError> {
        let batch_size = usize::try_from(self.config.sweep(kind).batch_size).unwrap_or(0);
        let mut total = SweepResult::default();
        for _ in 0..max_batches {
            let offset = i64::try_from(total.failed.len()).unwrap_or(i64::MAX);
            let page = self.run_page(kind, offset, now).await?;
            let short = page.fetched < batch_size || page.fetched == 0;
            total.merge(page);
            if short {
                break;
            }
        }
        Ok(total)
    }

    async fn run_page(&self, kind: SweepKind, offset: i64, now: DateTime<Utc>) -> Result<SweepResult, EscalationError> {
        let sweep = self.config.sweep(kind);
        if !sweep.enabled {
            trace!("🕰️ The {kind} sweep is disabled");
            return Ok(SweepResult::default());
        }
        let cutoff = now - sweep.sla;
        let ids = self.db.fetch_stalled(kind, cutoff, sweep.batch_size, offset).await?;
        let mut result = SweepResult { fetched: ids.len(), ..Default::default() };
        for id in ids {
            match self.escalate(kind, id).await {
                Ok(()) => result.processed += 1,
                Err(e) => {
                    warn!("🕰️ The {kind} sweep could not move #{id} on: {e}");
                    result.failed.push(id);
                },
            }
        }
        if result.fetched > 0 {
            info!(
                "🕰️ {kind} sweep from offset {offset}: {} stalled, {} moved on, {} failed",
                result.fetched,
                result.processed,
                result.failed.len()
            );
        }
        Ok(result)
    }

    async fn escalate(&self, kind: SweepKind, id: i64) -> Result<(), RefundFlowError> {
        match kind {
            SweepKind::Waited | SweepKind::Processed => {
                let note = Some(self.config.system_note.as_str());
                self.settle(id, SettlementOutcome::Canceled, note).await
            },
            SweepKind::Delivered => self.settle(id, SettlementOutcome::Completed, None).await,
            SweepKind::SellerRefund => self.decide(id, RefundDecision::SellerAccept).await,
            SweepKind::BuyerRefund => self.decide(id, RefundDecision::BuyerAccept).await,
        }
    }

    async fn settle(&self, id: i64, outcome: SettlementOutcome, note: Option<&str>) -> Result<(), RefundFlowError> {
        let settled =
            self.db.settle_transaction(id, outcome, SettlementTrigger::Direct, note, &self.engine.accounts).await?;
        debug!("🕰️ Transaction #{id} {outcome} by the scheduler");
        self.producers.publish_transaction_settled(TransactionSettledEvent::from(&settled)).await;
        Ok(())
    }

    async fn decide(&self, request_id: i64, decision: RefundDecision) -> Result<(), RefundFlowError> {
        let applied = self.refunds.decide_on_behalf(request_id, decision).await?;
        debug!(
            "🕰️ Refund request #{request_id}: {decision} on behalf of a late party. Now {}",
            applied.transition.next_stage
        );
        Ok(())
    }
}
