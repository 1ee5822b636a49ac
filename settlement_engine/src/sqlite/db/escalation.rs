//! Queries that find records stuck past their SLA window.
//!
//! Each query only matches records that the corresponding sweep would still change, so re-running a sweep over the
//! same window finds nothing new.
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::SqliteDatabaseError;
use crate::config::SweepKind;

fn stalled_query(kind: SweepKind) -> &'static str {
    match kind {
        SweepKind::Waited => {
            r#"
        SELECT s.transaction_id FROM transaction_statuses s JOIN transactions t ON t.id = s.transaction_id
        WHERE t.deleted_at IS NULL AND s.waited_at IS NOT NULL AND s.waited_at <= $1 AND s.processed_at IS NULL
          AND s.completed_at IS NULL AND s.canceled_at IS NULL AND s.refunded_at IS NULL
          AND s.request_refund_at IS NULL
        ORDER BY s.transaction_id LIMIT $2 OFFSET $3
        "#
        },
        SweepKind::Processed => {
            r#"
        SELECT s.transaction_id FROM transaction_statuses s JOIN transactions t ON t.id = s.transaction_id
        WHERE t.deleted_at IS NULL AND s.processed_at IS NOT NULL AND s.processed_at <= $1 AND s.on_delivery_at IS NULL
          AND s.completed_at IS NULL AND s.canceled_at IS NULL AND s.refunded_at IS NULL
          AND s.request_refund_at IS NULL
        ORDER BY s.transaction_id LIMIT $2 OFFSET $3
        "#
        },
        SweepKind::Delivered => {
            r#"
        SELECT s.transaction_id FROM transaction_statuses s JOIN transactions t ON t.id = s.transaction_id
        WHERE t.deleted_at IS NULL AND s.delivered_at IS NOT NULL AND s.delivered_at <= $1
          AND s.completed_at IS NULL AND s.canceled_at IS NULL AND s.refunded_at IS NULL
          AND s.request_refund_at IS NULL
        ORDER BY s.transaction_id LIMIT $2 OFFSET $3
        "#
        },
        SweepKind::SellerRefund => {
            r#"
        SELECT refund_request_id FROM refund_request_statuses
        WHERE closed_at IS NULL AND created_at <= $1
          AND accepted_by_seller_at IS NULL AND rejected_by_seller_at IS NULL AND canceled_by_buyer_at IS NULL
        ORDER BY refund_request_id LIMIT $2 OFFSET $3
        "#
        },
        SweepKind::BuyerRefund => {
            r#"
        SELECT refund_request_id FROM refund_request_statuses
        WHERE closed_at IS NULL AND rejected_by_admin_at IS NOT NULL AND rejected_by_admin_at <= $1
          AND accepted_by_buyer_at IS NULL AND rejected_by_buyer_at IS NULL
        ORDER BY refund_request_id LIMIT $2 OFFSET $3
        "#
        },
    }
}

/// One page of ids (transaction ids, or refund request ids for the refund sweeps) whose SLA clock started at or
/// before `cutoff`.
pub async fn fetch_stalled(
    kind: SweepKind,
    cutoff: DateTime<Utc>,
    limit: i64,
    offset: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<i64>, SqliteDatabaseError> {
    let rows: Vec<(i64,)> =
        sqlx::query_as(stalled_query(kind)).bind(cutoff).bind(limit).bind(offset).fetch_all(conn).await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}
