use chrono::{DateTime, Utc};

use crate::{config::SweepKind, se_api::errors::EscalationError};

#[allow(async_fn_in_trait)]
pub trait EscalationManagement: Clone {
    /// One page of records the `kind` sweep should act on: those whose SLA clock started at or before `cutoff`.
    /// Transaction ids for the transaction sweeps, refund request ids for the refund sweeps.
    async fn fetch_stalled(
        &self,
        kind: SweepKind,
        cutoff: DateTime<Utc>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<i64>, EscalationError>;
}
