use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use super::{errors::is_unique_violation, SqliteDatabaseError};
use crate::db_types::{Money, PaymentMethod, PaymentRecord};

pub async fn insert_payment(
    id: &str,
    buyer_id: i64,
    amount: Money,
    method: PaymentMethod,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<PaymentRecord, SqliteDatabaseError> {
    let result = sqlx::query_as(
        r#"
    INSERT INTO payments (id, buyer_id, amount, method, created_at)
    VALUES ($1, $2, $3, $4, $5)
    RETURNING *
    "#,
    )
    .bind(id)
    .bind(buyer_id)
    .bind(amount)
    .bind(method)
    .bind(now)
    .fetch_one(conn)
    .await;
    match result {
        Ok(payment) => {
            trace!("🗃️ Payment {id} of {amount} recorded for buyer #{buyer_id}");
            Ok(payment)
        },
        Err(e) if is_unique_violation(&e) => Err(SqliteDatabaseError::PaymentAlreadyResolved(id.to_string())),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_payment(
    id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRecord>, SqliteDatabaseError> {
    let payment = sqlx::query_as("SELECT * FROM payments WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(payment)
}

async fn resolve(
    id: &str,
    column: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<PaymentRecord, SqliteDatabaseError> {
    let sql = format!(
        "UPDATE payments SET {column} = $1 WHERE id = $2 AND paid_at IS NULL AND canceled_at IS NULL RETURNING *"
    );
    let payment: Option<PaymentRecord> = sqlx::query_as(&sql).bind(now).bind(id).fetch_optional(&mut *conn).await?;
    match payment {
        Some(p) => Ok(p),
        None if fetch_payment(id, conn).await?.is_some() => {
            Err(SqliteDatabaseError::PaymentAlreadyResolved(id.to_string()))
        },
        None => Err(SqliteDatabaseError::PaymentNotFound(id.to_string())),
    }
}

/// Marks a pending payment as paid. Fails if it was already paid or cancelled.
pub async fn mark_paid(
    id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<PaymentRecord, SqliteDatabaseError> {
    resolve(id, "paid_at", now, conn).await
}

/// Marks a pending payment as cancelled. Fails if it was already paid or cancelled.
pub async fn mark_canceled(
    id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<PaymentRecord, SqliteDatabaseError> {
    resolve(id, "canceled_at", now, conn).await
}
