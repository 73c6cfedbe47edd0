//! Best-effort order event publication over NATS.
//!
//! Publishing only happens when a broker is configured; a publish failure
//! never fails the request that produced the event.

use serde::Serialize;
use uuid::Uuid;

use crate::domain::OrderStatus;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    StatusChanged {
        order_id: Uuid,
        user_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
}

const ORDER_STATUS_SUBJECT: &str = "swiftmart.orders.status";

pub async fn publish_order_event(state: &AppState, event: &OrderEvent) {
    let Some(nats) = &state.nats else { return };
    let payload = match serde_json::to_vec(event) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize order event");
            return;
        }
    };
    if let Err(e) = nats.publish(ORDER_STATUS_SUBJECT, payload.into()).await {
        tracing::warn!(error = %e, "failed to publish order event");
    }
}
