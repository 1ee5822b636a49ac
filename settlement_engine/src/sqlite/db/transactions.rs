//! Transactions and their two status rows.
//!
//! Status changes are compare-and-set updates: the legality predicate is part of the `UPDATE`, so a change either
//! lands on the state it was validated against or touches no rows. When nothing was touched, the current state is
//! re-read to explain why.
use chrono::{DateTime, Utc};
use log::*;
use sqlx::{types::Json, SqliteConnection};

use super::SqliteDatabaseError;
use crate::db_types::{
    InvoiceCode,
    Milestone,
    QuotedCart,
    SettlementOutcome,
    SettlementTrigger,
    Transaction,
    TransactionDeliveryStatus,
    TransactionRecord,
    TransactionStatus,
    TransitionError,
};

const NOT_TERMINAL: &str = "completed_at IS NULL AND canceled_at IS NULL AND refunded_at IS NULL";

pub async fn fetch_transaction(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, SqliteDatabaseError> {
    let tx = sqlx::query_as("SELECT * FROM transactions WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(tx)
}

pub async fn fetch_transaction_by_invoice(
    invoice: &InvoiceCode,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, SqliteDatabaseError> {
    let tx = sqlx::query_as("SELECT * FROM transactions WHERE invoice_code = $1")
        .bind(invoice.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(tx)
}

/// The live (not soft-deleted) transactions paid for by `payment_id`.
pub async fn fetch_transactions_for_payment(
    payment_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, SqliteDatabaseError> {
    let txs = sqlx::query_as("SELECT * FROM transactions WHERE payment_id = $1 AND deleted_at IS NULL ORDER BY id")
        .bind(payment_id)
        .fetch_all(conn)
        .await?;
    Ok(txs)
}

pub async fn fetch_status(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<TransactionStatus>, SqliteDatabaseError> {
    let status = sqlx::query_as("SELECT * FROM transaction_statuses WHERE transaction_id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(status)
}

pub async fn fetch_delivery_status(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<TransactionDeliveryStatus>, SqliteDatabaseError> {
    let status = sqlx::query_as("SELECT * FROM transaction_delivery_statuses WHERE transaction_id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(status)
}

pub async fn fetch_record(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<TransactionRecord>, SqliteDatabaseError> {
    let Some(transaction) = fetch_transaction(id, &mut *conn).await? else {
        return Ok(None);
    };
    let status = fetch_status(id, &mut *conn).await?.ok_or(SqliteDatabaseError::TransactionNotFound(id))?;
    let delivery = fetch_delivery_status(id, conn).await?.ok_or(SqliteDatabaseError::TransactionNotFound(id))?;
    Ok(Some(TransactionRecord { transaction, status, delivery }))
}

/// Inserts a priced merchant cart as a new transaction, together with its empty status and delivery rows.
pub async fn insert_transaction(
    cart: &QuotedCart,
    buyer_id: i64,
    payment_id: &str,
    invoice_code: &InvoiceCode,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Transaction, SqliteDatabaseError> {
    let tx: Transaction = sqlx::query_as(
        r#"
    INSERT INTO transactions (
        invoice_code, buyer_id, merchant_id, merchant_domain, payment_id, marketplace_voucher_id,
        merchant_voucher_id, cart_items, payment_details, created_at, updated_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
    RETURNING *
    "#,
    )
    .bind(invoice_code.as_str())
    .bind(buyer_id)
    .bind(cart.merchant_id)
    .bind(cart.merchant_domain.as_str())
    .bind(payment_id)
    .bind(cart.marketplace_voucher_id)
    .bind(cart.merchant_voucher_id)
    .bind(Json(&cart.items))
    .bind(Json(&cart.details))
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;
    sqlx::query("INSERT INTO transaction_statuses (transaction_id) VALUES ($1)").bind(tx.id).execute(&mut *conn).await?;
    sqlx::query("INSERT INTO transaction_delivery_statuses (transaction_id) VALUES ($1)")
        .bind(tx.id)
        .execute(conn)
        .await?;
    debug!("🗃️ Transaction #{} [{}] created for buyer #{buyer_id}", tx.id, tx.invoice_code);
    Ok(tx)
}

/// Takes the write lock for a transaction by touching its row. Fails if the transaction does not exist or was
/// soft-deleted.
pub async fn lock_transaction(
    id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let result = sqlx::query("UPDATE transactions SET updated_at = $1 WHERE id = $2 AND deleted_at IS NULL")
        .bind(now)
        .bind(id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(SqliteDatabaseError::TransactionNotFound(id));
    }
    Ok(())
}

pub async fn soft_delete(id: i64, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<(), SqliteDatabaseError> {
    sqlx::query("UPDATE transactions SET deleted_at = $1, updated_at = $1 WHERE id = $2 AND deleted_at IS NULL")
        .bind(now)
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Re-reads the state of a transaction after a compare-and-set missed, and turns it into the most specific error.
async fn explain_miss(
    id: i64,
    check: impl FnOnce(&TransactionRecord) -> Result<(), TransitionError>,
    conn: &mut SqliteConnection,
) -> SqliteDatabaseError {
    match fetch_record(id, conn).await {
        Ok(Some(record)) if record.transaction.deleted_at.is_none() => match check(&record) {
            Err(e) => e.into(),
            Ok(()) => SqliteDatabaseError::StaleStatus(id),
        },
        Ok(_) => SqliteDatabaseError::TransactionNotFound(id),
        Err(e) => e,
    }
}

/// Marks a freshly paid transaction as waited. Only payment confirmation gets here.
pub async fn mark_waited(id: i64, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<(), SqliteDatabaseError> {
    let sql = format!(
        "UPDATE transaction_statuses SET waited_at = $1 WHERE transaction_id = $2 AND waited_at IS NULL AND \
         {NOT_TERMINAL}"
    );
    let result = sqlx::query(&sql).bind(now).bind(id).execute(&mut *conn).await?;
    if result.rows_affected() == 0 {
        return Err(explain_miss(id, |r| r.status.validate_advance(Milestone::Waited, false), conn).await);
    }
    Ok(())
}

/// Moves a transaction to the milestone immediately after its current one.
pub async fn advance_milestone(
    id: i64,
    target: Milestone,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<TransactionStatus, SqliteDatabaseError> {
    let Some(previous) = target.predecessor() else {
        return Err(TransitionError::WaitedRequiresPayment.into());
    };
    let receipt_guard = if target == Milestone::OnDelivery {
        r#"AND EXISTS (
            SELECT 1 FROM transaction_delivery_statuses d
            WHERE d.transaction_id = $2 AND d.receipt_number IS NOT NULL AND TRIM(d.receipt_number) <> ''
        )"#
    } else {
        ""
    };
    let sql = format!(
        r#"
    UPDATE transaction_statuses SET {col} = $1
    WHERE transaction_id = $2 AND {col} IS NULL AND {prev} IS NOT NULL AND {NOT_TERMINAL} {receipt_guard}
    RETURNING *
    "#,
        col = target.column(),
        prev = previous.column(),
    );
    let status: Option<TransactionStatus> = sqlx::query_as(&sql).bind(now).bind(id).fetch_optional(&mut *conn).await?;
    let Some(status) = status else {
        return Err(explain_miss(id, |r| r.status.validate_advance(target, r.delivery.has_receipt()), conn).await);
    };
    let delivery_col = match target {
        Milestone::OnDelivery => Some("on_delivery_at"),
        Milestone::Delivered => Some("on_delivered_at"),
        _ => None,
    };
    if let Some(col) = delivery_col {
        let sql = format!("UPDATE transaction_delivery_statuses SET {col} = $1 WHERE transaction_id = $2");
        sqlx::query(&sql).bind(now).bind(id).execute(conn).await?;
    }
    debug!("🗃️ Transaction #{id} is now {target}");
    Ok(status)
}

/// Records the carrier receipt. Only allowed while the transaction is processed and not yet shipped.
pub async fn set_receipt_number(
    id: i64,
    receipt_number: &str,
    conn: &mut SqliteConnection,
) -> Result<TransactionDeliveryStatus, SqliteDatabaseError> {
    let sql = format!(
        r#"
    UPDATE transaction_delivery_statuses SET receipt_number = $1
    WHERE transaction_id = $2 AND on_delivery_at IS NULL AND EXISTS (
        SELECT 1 FROM transaction_statuses s
        WHERE s.transaction_id = $2 AND s.processed_at IS NOT NULL AND s.on_delivery_at IS NULL AND {NOT_TERMINAL}
    )
    RETURNING *
    "#
    );
    let delivery: Option<TransactionDeliveryStatus> =
        sqlx::query_as(&sql).bind(receipt_number).bind(id).fetch_optional(&mut *conn).await?;
    match delivery {
        Some(d) => Ok(d),
        None => Err(explain_miss(id, |r| r.status.validate_receipt_update(), conn).await),
    }
}

/// Writes the terminal timestamp. The caller must hold the transaction lock and must already have validated the
/// transition; the terminal guard is repeated here so that a second settlement can never slip through.
pub async fn mark_terminal(
    id: i64,
    outcome: SettlementOutcome,
    trigger: SettlementTrigger,
    note: Option<&str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<TransactionStatus, SqliteDatabaseError> {
    let sql = format!(
        r#"
    UPDATE transaction_statuses SET {col} = $1, notes = COALESCE($2, notes)
    WHERE transaction_id = $3 AND {NOT_TERMINAL}
    RETURNING *
    "#,
        col = outcome.column()
    );
    let status: Option<TransactionStatus> =
        sqlx::query_as(&sql).bind(now).bind(note).bind(id).fetch_optional(&mut *conn).await?;
    match status {
        Some(s) => Ok(s),
        None => Err(explain_miss(id, |r| r.status.validate_settlement(outcome, trigger), conn).await),
    }
}

/// Raises the refund flag on a delivered, open transaction.
pub async fn mark_refund_requested(
    id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<TransactionStatus, SqliteDatabaseError> {
    let sql = format!(
        r#"
    UPDATE transaction_statuses SET request_refund_at = $1
    WHERE transaction_id = $2 AND request_refund_at IS NULL AND delivered_at IS NOT NULL AND {NOT_TERMINAL}
    RETURNING *
    "#
    );
    let status: Option<TransactionStatus> = sqlx::query_as(&sql).bind(now).bind(id).fetch_optional(&mut *conn).await?;
    match status {
        Some(s) => Ok(s),
        None => Err(explain_miss(id, |r| r.status.validate_refund_request(), conn).await),
    }
}
