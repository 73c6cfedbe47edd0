//! Status-sync outbox delivery.
//!
//! A background task polls `status_outbox` and pushes each record to the
//! order service's internal status endpoint. Records are deleted only on
//! confirmed delivery; transient failures back off exponentially (capped),
//! and a 409 — the order already moved past the target status — retires the
//! record instead of retrying forever.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OutboxRecord {
    pub id: Uuid,
    pub order_id: Uuid,
    pub target_status: String,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

const BATCH_SIZE: i64 = 20;

/// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, capped.
pub fn backoff_secs(base: u64, cap: u64, attempt: u32) -> u64 {
    let exp = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u64 << exp).min(cap)
}

enum Delivery {
    Delivered,
    Rejected(reqwest::StatusCode),
    Failed(String),
}

pub fn spawn(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(state))
}

async fn run(state: AppState) {
    let mut ticker = tokio::time::interval(Duration::from_secs(state.config.outbox_poll_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(e) = drain_due(&state).await {
            tracing::error!(error = %e, "outbox drain failed");
        }
    }
}

async fn drain_due(state: &AppState) -> Result<()> {
    let due = sqlx::query_as::<_, OutboxRecord>(
        "SELECT * FROM status_outbox WHERE next_attempt_at <= NOW() ORDER BY created_at LIMIT $1",
    )
    .bind(BATCH_SIZE)
    .fetch_all(&state.db)
    .await?;

    for record in due {
        match deliver(state, &record).await {
            Delivery::Delivered => {
                delete_record(&state.db, record.id).await?;
                tracing::info!(order_id = %record.order_id, status = %record.target_status, "status sync delivered");
            }
            Delivery::Rejected(status) => {
                delete_record(&state.db, record.id).await?;
                tracing::warn!(
                    order_id = %record.order_id,
                    target = %record.target_status,
                    %status,
                    "status sync rejected by order service, retiring record"
                );
            }
            Delivery::Failed(reason) => {
                let attempt = record.attempts as u32 + 1;
                let delay = backoff_secs(
                    state.config.outbox_backoff_base_secs,
                    state.config.outbox_backoff_cap_secs,
                    attempt,
                );
                sqlx::query(
                    "UPDATE status_outbox
                     SET attempts = attempts + 1,
                         next_attempt_at = NOW() + ($2::bigint * INTERVAL '1 second')
                     WHERE id = $1",
                )
                .bind(record.id)
                .bind(delay as i64)
                .execute(&state.db)
                .await?;
                tracing::warn!(
                    order_id = %record.order_id,
                    attempt,
                    retry_in_secs = delay,
                    reason,
                    "status sync delivery failed, backing off"
                );
            }
        }
    }
    Ok(())
}

async fn deliver(state: &AppState, record: &OutboxRecord) -> Delivery {
    let url = format!("{}/api/orders/internal/status/{}", state.config.orders_url, record.order_id);
    let result = state
        .http
        .put(&url)
        .header("x-internal-token", &state.config.internal_api_token)
        .json(&json!({ "status": record.target_status }))
        .send()
        .await;

    match result {
        Ok(resp) if resp.status().is_success() => Delivery::Delivered,
        Ok(resp) if resp.status() == reqwest::StatusCode::CONFLICT => Delivery::Rejected(resp.status()),
        Ok(resp) => Delivery::Failed(format!("order service returned {}", resp.status())),
        Err(e) => Delivery::Failed(e.to_string()),
    }
}

async fn delete_record(db: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM status_outbox WHERE id = $1").bind(id).execute(db).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        assert_eq!(backoff_secs(2, 300, 1), 2);
        assert_eq!(backoff_secs(2, 300, 2), 4);
        assert_eq!(backoff_secs(2, 300, 3), 8);
        assert_eq!(backoff_secs(2, 300, 8), 256);
        assert_eq!(backoff_secs(2, 300, 9), 300);
        assert_eq!(backoff_secs(2, 300, 50), 300);
    }

    #[test]
    fn test_backoff_is_monotonic() {
        let mut last = 0;
        for attempt in 1..=20 {
            let delay = backoff_secs(2, 300, attempt);
            assert!(delay >= last);
            last = delay;
        }
    }
}
