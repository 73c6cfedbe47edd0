//! HTTP clients for sibling services.
//!
//! Every call goes through the shared `reqwest` client, which carries a
//! request timeout from config. Best-effort calls (notifications) log and
//! swallow failures; everything else maps failures into the error taxonomy.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetails {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub image_url: Option<String>,
    pub is_available: bool,
}

/// Fetches the price/name snapshot for a product from the Product Catalog
/// service. Missing or unavailable products fail the cart operation.
pub async fn fetch_product(state: &AppState, product_id: Uuid) -> Result<ProductDetails> {
    let url = format!("{}/api/products/{}", state.config.product_catalog_url, product_id);
    let resp = state.http.get(&url).send().await?;
    if resp.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(AppError::NotFound("Product not found or unavailable.".to_string()));
    }
    if !resp.status().is_success() {
        return Err(AppError::Upstream(format!("product catalog returned {}", resp.status())));
    }
    let product: ProductDetails = resp.json().await?;
    if !product.is_available {
        return Err(AppError::NotFound("Product not found or unavailable.".to_string()));
    }
    Ok(product)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponValidation {
    pub discount_amount: Decimal,
}

#[derive(Debug, Deserialize)]
struct UpstreamMessage {
    message: Option<String>,
}

/// Delegates coupon validation to the Promotions service, forwarding the
/// caller's bearer token. 400s come back as `CouponInvalid` with the
/// service's reason, 404 as `NotFound`.
pub async fn validate_coupon(
    state: &AppState,
    bearer: &str,
    code: &str,
    order_total: Decimal,
    item_ids: &[Uuid],
) -> Result<CouponValidation> {
    let url = format!("{}/api/promotions/validate", state.config.promotions_url);
    let resp = state
        .http
        .post(&url)
        .header(reqwest::header::AUTHORIZATION, bearer)
        .json(&json!({ "code": code, "orderTotal": order_total, "itemIds": item_ids }))
        .send()
        .await?;

    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }
    let message = resp
        .json::<UpstreamMessage>()
        .await
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| "Failed to apply coupon.".to_string());
    match status {
        reqwest::StatusCode::NOT_FOUND => Err(AppError::NotFound(message)),
        reqwest::StatusCode::BAD_REQUEST => Err(AppError::CouponInvalid(message)),
        _ => Err(AppError::Upstream(format!("promotions service returned {}", status))),
    }
}

/// Marks a coupon as used after an order reaches `placed`. Best effort: the
/// conditional increment upstream makes retries safe, so a failure here is
/// logged and not propagated.
pub async fn mark_coupon_used(state: &AppState, code: &str) {
    let url = format!("{}/api/promotions/internal/use", state.config.promotions_url);
    let result = state
        .http
        .put(&url)
        .header("x-internal-token", &state.config.internal_api_token)
        .json(&json!({ "code": code }))
        .send()
        .await;
    match result {
        Ok(resp) if resp.status().is_success() => {}
        Ok(resp) => tracing::warn!(code, status = %resp.status(), "failed to mark coupon as used"),
        Err(e) => tracing::warn!(code, error = %e, "failed to mark coupon as used"),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeductFailure {
    #[serde(default)]
    out_of_stock_items: Vec<Uuid>,
}

/// Deducts stock for an order's lines through the Inventory service. The
/// whole batch is atomic on the inventory side; a shortfall surfaces as
/// `InsufficientStock` with the offending product ids.
pub async fn deduct_stock(state: &AppState, lines: &[(Uuid, i32)]) -> Result<()> {
    let items: Vec<_> = lines
        .iter()
        .map(|(product_id, quantity)| json!({ "productId": product_id, "quantity": quantity }))
        .collect();
    let url = format!("{}/api/inventory/internal/deduct", state.config.inventory_url);
    let resp = state
        .http
        .post(&url)
        .header("x-internal-token", &state.config.internal_api_token)
        .json(&json!({ "items": items }))
        .send()
        .await?;

    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    if status == reqwest::StatusCode::CONFLICT {
        let body: DeductFailure = resp.json().await.unwrap_or_default();
        return Err(AppError::InsufficientStock { out_of_stock: body.out_of_stock_items });
    }
    Err(AppError::Upstream(format!("inventory service returned {}", status)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPaymentState {
    pub has_succeeded: bool,
    pub latest_status: Option<String>,
}

/// Asks the Payment service whether an order has a succeeded transaction.
pub async fn order_payment_state(state: &AppState, order_id: Uuid) -> Result<OrderPaymentState> {
    let url = format!("{}/api/payments/internal/order/{}", state.config.payments_url, order_id);
    let resp = state
        .http
        .get(&url)
        .header("x-internal-token", &state.config.internal_api_token)
        .send()
        .await?;
    if !resp.status().is_success() {
        return Err(AppError::Upstream(format!("payment service returned {}", resp.status())));
    }
    Ok(resp.json().await?)
}

/// Fire-and-forget in-app notification for a user.
pub async fn send_notification(state: &AppState, user_id: Uuid, kind: &str, message: &str, data: serde_json::Value) {
    let url = format!("{}/api/notifications/send", state.config.notifications_url);
    let result = state
        .http
        .post(&url)
        .header("x-internal-token", &state.config.internal_api_token)
        .json(&json!({ "userId": user_id, "type": kind, "message": message, "data": data }))
        .send()
        .await;
    if let Err(e) = result {
        tracing::warn!(%user_id, kind, error = %e, "failed to send notification");
    }
}

/// Fire-and-forget order status broadcast to a connected WebSocket client.
pub async fn broadcast_order_status(state: &AppState, user_id: Uuid, order_id: Uuid, new_status: &str) {
    let url = format!("{}/api/notifications/broadcast", state.config.notifications_url);
    let result = state
        .http
        .post(&url)
        .header("x-internal-token", &state.config.internal_api_token)
        .json(&json!({ "userId": user_id, "orderId": order_id, "newStatus": new_status }))
        .send()
        .await;
    if let Err(e) = result {
        tracing::warn!(%order_id, error = %e, "failed to broadcast status update");
    }
}
