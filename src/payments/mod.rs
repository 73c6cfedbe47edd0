//! Payment service: intent creation, finalization, and the payment-driven
//! order status sync.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::{AuthUser, Internal};
use crate::error::{AppError, Result};
use crate::state::AppState;

pub mod gateway;
pub mod outbox;
pub mod store;

pub use store::Transaction;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payments/intent", post(create_intent))
        .route("/payments/finalize", post(finalize_payment))
        .route("/payments/internal/order/:order_id", get(order_payment_state))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateIntentRequest {
    order_id: Uuid,
    amount: Decimal,
    #[serde(default = "default_currency")]
    currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Creates a pending transaction with fabricated gateway ids. A retried
/// call carrying the same `Idempotency-Key` header returns the original
/// transaction instead of minting a duplicate.
async fn create_intent(
    user: AuthUser,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateIntentRequest>,
) -> Result<Json<serde_json::Value>> {
    if req.amount <= Decimal::ZERO {
        return Err(AppError::Validation("Order ID and a valid amount are required.".to_string()));
    }

    let idempotency_key = headers.get("idempotency-key").and_then(|v| v.to_str().ok());
    if let Some(key) = idempotency_key {
        if let Some(existing) = store::find_by_idempotency_key(&state.db, req.order_id, key).await? {
            return Ok(Json(json!({
                "message": "Payment intent already exists.",
                "clientSecret": serde_json::Value::Null,
                "paymentIntentId": existing.gateway_transaction_id,
            })));
        }
    }

    let intent = gateway::create_intent();
    let txn = store::create_pending(
        &state.db,
        req.order_id,
        user.id,
        req.amount,
        &req.currency,
        &intent.payment_intent_id,
        idempotency_key,
    )
    .await?;

    Ok(Json(json!({
        "message": "Payment intent created successfully.",
        "clientSecret": intent.client_secret,
        "paymentIntentId": txn.gateway_transaction_id,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinalizeRequest {
    payment_intent_id: String,
    order_id: Uuid,
    final_status: String,
}

/// Finalizes a pending transaction. The response reflects the payment
/// outcome only; propagating the new order status is the outbox worker's
/// job and survives an unreachable order service.
async fn finalize_payment(
    _user: AuthUser,
    State(state): State<AppState>,
    Json(req): Json<FinalizeRequest>,
) -> Result<Response> {
    if req.payment_intent_id.trim().is_empty() || req.final_status.trim().is_empty() {
        return Err(AppError::Validation(
            "Payment Intent ID, Order ID, and finalStatus are required.".to_string(),
        ));
    }

    let txn = store::find_for_finalize(&state.db, &req.payment_intent_id, req.order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Transaction record not found.".to_string()))?;

    let succeeded = gateway::confirm(req.final_status == "succeeded");
    store::finalize(&state.db, txn.id, succeeded).await?;

    if succeeded {
        Ok(Json(json!({
            "message": "Payment successful. Order status updated to placed.",
            "status": "succeeded",
        }))
        .into_response())
    } else {
        Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "message": "Payment failed due to mock bank error.",
                "status": "failed",
            })),
        )
            .into_response())
    }
}

/// Internal: payment state for an order, used by `placeOrder`'s
/// payment-confirmation check.
async fn order_payment_state(
    _guard: Internal,
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let (has_succeeded, latest_status) = store::payment_state_for_order(&state.db, order_id).await?;
    Ok(Json(json!({
        "orderId": order_id,
        "hasSucceeded": has_succeeded,
        "latestStatus": latest_status,
    })))
}
