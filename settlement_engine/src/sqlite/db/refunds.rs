//! Refund requests and their decision history.
//!
//! A request owns an append-only list of status rows. The latest row is the current one; at most one row is open
//! (a partial unique index enforces it).
use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use super::{errors::is_unique_violation, settlement, transactions, SqliteDatabaseError};
use crate::db_types::{
    AppliedRefundDecision,
    NewRefundRequest,
    PlatformAccounts,
    RefundDecision,
    RefundRequest,
    RefundRequestStatus,
    SettlementTrigger,
};

pub async fn fetch_refund_request(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<RefundRequest>, SqliteDatabaseError> {
    let request = sqlx::query_as("SELECT * FROM refund_requests WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(request)
}

pub async fn fetch_refund_request_for_transaction(
    transaction_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<RefundRequest>, SqliteDatabaseError> {
    let request = sqlx::query_as("SELECT * FROM refund_requests WHERE transaction_id = $1")
        .bind(transaction_id)
        .fetch_optional(conn)
        .await?;
    Ok(request)
}

pub async fn fetch_history(
    request_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<RefundRequestStatus>, SqliteDatabaseError> {
    let rows = sqlx::query_as("SELECT * FROM refund_request_statuses WHERE refund_request_id = $1 ORDER BY id")
        .bind(request_id)
        .fetch_all(conn)
        .await?;
    Ok(rows)
}

pub async fn fetch_latest_status(
    request_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<RefundRequestStatus>, SqliteDatabaseError> {
    let row = sqlx::query_as(
        "SELECT * FROM refund_request_statuses WHERE refund_request_id = $1 ORDER BY id DESC LIMIT 1",
    )
    .bind(request_id)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

/// Counted from the history on every decision rather than kept in a counter column.
pub async fn count_buyer_rejections(request_id: i64, conn: &mut SqliteConnection) -> Result<u32, SqliteDatabaseError> {
    let (count,): (i64,) = sqlx::query_as(
        r#"
    SELECT COUNT(*) FROM refund_request_statuses
    WHERE refund_request_id = $1 AND rejected_by_buyer_at IS NOT NULL
    "#,
    )
    .bind(request_id)
    .fetch_one(conn)
    .await?;
    Ok(u32::try_from(count).unwrap_or(u32::MAX))
}

async fn insert_status_row(
    request_id: i64,
    accepted_by_seller_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<RefundRequestStatus, SqliteDatabaseError> {
    let row = sqlx::query_as(
        r#"
    INSERT INTO refund_request_statuses (refund_request_id, accepted_by_seller_at, created_at)
    VALUES ($1, $2, $3)
    RETURNING *
    "#,
    )
    .bind(request_id)
    .bind(accepted_by_seller_at)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

/// Opens a refund request on a delivered transaction and raises the transaction's refund flag.
pub async fn open_refund_request(
    request: &NewRefundRequest,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<RefundRequest, SqliteDatabaseError> {
    let transaction_id = request.transaction_id;
    transactions::lock_transaction(transaction_id, now, &mut *conn).await?;
    let inserted = sqlx::query_as(
        r#"
    INSERT INTO refund_requests (transaction_id, buyer_id, reason, image_url, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $5)
    RETURNING *
    "#,
    )
    .bind(transaction_id)
    .bind(request.buyer_id)
    .bind(request.reason.as_str())
    .bind(request.image_url.as_deref())
    .bind(now)
    .fetch_one(&mut *conn)
    .await;
    let refund: RefundRequest = match inserted {
        Ok(r) => r,
        Err(e) if is_unique_violation(&e) => return Err(SqliteDatabaseError::DuplicateRefundRequest(transaction_id)),
        Err(e) => return Err(e.into()),
    };
    transactions::mark_refund_requested(transaction_id, now, &mut *conn).await?;
    insert_status_row(refund.id, None, now, conn).await?;
    info!("🗃️ Refund request #{} opened on transaction #{transaction_id}", refund.id);
    Ok(refund)
}

/// Applies a decision to the current status row and carries out everything it implies, including settling the
/// transaction when the request resolves.
pub async fn apply_decision(
    request_id: i64,
    decision: RefundDecision,
    max_buyer_rejections: u32,
    accounts: &PlatformAccounts,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<AppliedRefundDecision, SqliteDatabaseError> {
    // Touch the request first so that we hold the write lock before reading its stage.
    let request: RefundRequest = sqlx::query_as("UPDATE refund_requests SET updated_at = $1 WHERE id = $2 RETURNING *")
        .bind(now)
        .bind(request_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(SqliteDatabaseError::RefundRequestNotFound(request_id))?;
    let current = fetch_latest_status(request_id, &mut *conn)
        .await?
        .ok_or(SqliteDatabaseError::MissingOpenStatus(request_id))?;
    let rejections = count_buyer_rejections(request_id, &mut *conn).await?;
    let transition = current.stage().apply(decision, rejections, max_buyer_rejections)?;

    let sql = if transition.close_row {
        format!(
            "UPDATE refund_request_statuses SET {col} = $1, closed_at = $1 \
             WHERE id = $2 AND closed_at IS NULL AND {col} IS NULL",
            col = transition.stamp.column()
        )
    } else {
        format!(
            "UPDATE refund_request_statuses SET {col} = $1 WHERE id = $2 AND closed_at IS NULL AND {col} IS NULL",
            col = transition.stamp.column()
        )
    };
    let result = sqlx::query(&sql).bind(now).bind(current.id).execute(&mut *conn).await?;
    if result.rows_affected() == 0 {
        return Err(SqliteDatabaseError::MissingOpenStatus(request_id));
    }
    if let Some(carry_seller_acceptance) = transition.append_row {
        let accepted = if carry_seller_acceptance { current.accepted_by_seller_at } else { None };
        insert_status_row(request_id, accepted, now, &mut *conn).await?;
    }
    let settled = match transition.settlement {
        Some(outcome) => Some(
            settlement::settle_transaction(
                request.transaction_id,
                outcome,
                SettlementTrigger::RefundResolution,
                None,
                accounts,
                now,
                conn,
            )
            .await?,
        ),
        None => None,
    };
    debug!("🗃️ Refund request #{request_id}: {decision} applied. Now {}", transition.next_stage);
    Ok(AppliedRefundDecision { request, transition, settled })
}
