//! Payment transaction persistence.
//!
//! Finalization writes the terminal transaction status and the status-sync
//! outbox record in one database transaction, so a crash between "payment
//! captured" and "order told about it" cannot lose the sync.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::OrderStatus;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub payment_gateway: String,
    pub gateway_transaction_id: String,
    #[serde(skip_serializing)]
    pub idempotency_key: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const STATUS_SUCCEEDED: &str = "succeeded";
pub const STATUS_FAILED: &str = "failed";

pub async fn find_by_idempotency_key(db: &PgPool, order_id: Uuid, key: &str) -> Result<Option<Transaction>> {
    Ok(sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE order_id = $1 AND idempotency_key = $2",
    )
    .bind(order_id)
    .bind(key)
    .fetch_optional(db)
    .await?)
}

pub async fn create_pending(
    db: &PgPool,
    order_id: Uuid,
    user_id: Uuid,
    amount: Decimal,
    currency: &str,
    gateway_transaction_id: &str,
    idempotency_key: Option<&str>,
) -> Result<Transaction> {
    let inserted = sqlx::query_as::<_, Transaction>(
        "INSERT INTO transactions
            (id, order_id, user_id, amount, currency, payment_gateway, gateway_transaction_id, idempotency_key, status)
         VALUES ($1, $2, $3, $4, $5, 'stripe_mock', $6, $7, 'pending')
         RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(order_id)
    .bind(user_id)
    .bind(amount)
    .bind(currency)
    .bind(gateway_transaction_id)
    .bind(idempotency_key)
    .fetch_one(db)
    .await;

    match inserted {
        Ok(txn) => Ok(txn),
        // Two retries racing on the same idempotency key: hand back the row
        // the winner inserted.
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            if let Some(key) = idempotency_key {
                if let Some(existing) = find_by_idempotency_key(db, order_id, key).await? {
                    return Ok(existing);
                }
            }
            Err(AppError::Validation("Duplicate payment intent.".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn find_for_finalize(db: &PgPool, gateway_transaction_id: &str, order_id: Uuid) -> Result<Option<Transaction>> {
    Ok(sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE gateway_transaction_id = $1 AND order_id = $2",
    )
    .bind(gateway_transaction_id)
    .bind(order_id)
    .fetch_optional(db)
    .await?)
}

/// Latest-transaction view for the order service's payment check.
pub async fn payment_state_for_order(db: &PgPool, order_id: Uuid) -> Result<(bool, Option<String>)> {
    let has_succeeded = sqlx::query_as::<_, (bool,)>(
        "SELECT EXISTS (SELECT 1 FROM transactions WHERE order_id = $1 AND status = 'succeeded')",
    )
    .bind(order_id)
    .fetch_one(db)
    .await?
    .0;

    let latest = sqlx::query_as::<_, (String,)>(
        "SELECT status FROM transactions WHERE order_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(order_id)
    .fetch_optional(db)
    .await?
    .map(|(s,)| s);

    Ok((has_succeeded, latest))
}

/// Moves a pending transaction to its terminal status. On success, an outbox
/// record targeting `placed` is written in the same database transaction;
/// failed payments leave the order `pending`, so there is nothing to sync.
pub async fn finalize(db: &PgPool, transaction_id: Uuid, succeeded: bool) -> Result<Transaction> {
    let new_status = if succeeded { STATUS_SUCCEEDED } else { STATUS_FAILED };
    let mut tx = db.begin().await?;

    let updated = sqlx::query_as::<_, Transaction>(
        "UPDATE transactions SET status = $2, updated_at = NOW()
         WHERE id = $1 AND status = 'pending'
         RETURNING *",
    )
    .bind(transaction_id)
    .bind(new_status)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::Validation("Transaction is already finalized.".to_string()))?;

    if succeeded {
        sqlx::query("INSERT INTO status_outbox (id, order_id, target_status) VALUES ($1, $2, $3)")
            .bind(Uuid::now_v7())
            .bind(updated.order_id)
            .bind(OrderStatus::Placed.as_str())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(updated)
}
