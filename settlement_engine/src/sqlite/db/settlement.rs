//! Executes settlement plans. Every function here expects to run inside a database transaction opened by the caller;
//! an error anywhere means the caller drops the transaction and nothing is applied.
use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use super::{ledger, payments, stock, transactions, SqliteDatabaseError};
use crate::{
    db_types::{PlatformAccounts, SettledTransaction, SettlementOutcome, SettlementTrigger, Transaction},
    settlement::SettlementPlan,
};

pub async fn execute_plan(
    plan: &SettlementPlan,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    for mv in &plan.moves {
        ledger::apply_move(mv, now, &mut *conn).await?;
    }
    for op in &plan.allocations {
        stock::apply_allocation(op, now, &mut *conn).await?;
    }
    Ok(())
}

/// Confirms a pending payment: every transaction it covers becomes waited, and the paid money (plus any promotion
/// subsidy) lands in the platform account.
pub async fn confirm_payment(
    payment_id: &str,
    accounts: &PlatformAccounts,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, SqliteDatabaseError> {
    let payment = payments::mark_paid(payment_id, now, &mut *conn).await?;
    let txs = transactions::fetch_transactions_for_payment(payment_id, &mut *conn).await?;
    for tx in &txs {
        transactions::mark_waited(tx.id, now, &mut *conn).await?;
    }
    let plan = SettlementPlan::payment_confirmation(&payment, &txs, accounts);
    execute_plan(&plan, now, conn).await?;
    debug!("🗃️ Payment {payment_id} confirmed. {} transactions are now waited", txs.len());
    Ok(txs)
}

/// Fails a pending payment: its transactions are soft-deleted and every reservation they held is released.
pub async fn fail_payment(
    payment_id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, SqliteDatabaseError> {
    payments::mark_canceled(payment_id, now, &mut *conn).await?;
    let txs = transactions::fetch_transactions_for_payment(payment_id, &mut *conn).await?;
    for tx in &txs {
        transactions::soft_delete(tx.id, now, &mut *conn).await?;
        execute_plan(&SettlementPlan::release(tx), now, &mut *conn).await?;
    }
    debug!("🗃️ Payment {payment_id} failed. Released the reservations of {} transactions", txs.len());
    Ok(txs)
}

/// Takes a transaction to a terminal state and moves the money and inventory that go with it.
pub async fn settle_transaction(
    id: i64,
    outcome: SettlementOutcome,
    trigger: SettlementTrigger,
    note: Option<&str>,
    accounts: &PlatformAccounts,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<SettledTransaction, SqliteDatabaseError> {
    transactions::lock_transaction(id, now, &mut *conn).await?;
    let current =
        transactions::fetch_status(id, &mut *conn).await?.ok_or(SqliteDatabaseError::TransactionNotFound(id))?;
    current.validate_settlement(outcome, trigger)?;
    let status = transactions::mark_terminal(id, outcome, trigger, note, now, &mut *conn).await?;
    let transaction =
        transactions::fetch_transaction(id, &mut *conn).await?.ok_or(SqliteDatabaseError::TransactionNotFound(id))?;
    let plan = SettlementPlan::settlement(&transaction, outcome, accounts);
    execute_plan(&plan, now, conn).await?;
    info!(
        "🗃️ Transaction #{id} [{}] {outcome}. Settlement amount: {}",
        transaction.invoice_code,
        transaction.settlement_amount()
    );
    Ok(SettledTransaction { transaction, status, outcome })
}
