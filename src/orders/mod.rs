//! Order Management service: the cart/order state machine and its HTTP
//! surface. While an order is `pending` it is the user's cart; every later
//! status is read-only to the user and driven by admin or internal calls.

use axum::extract::{Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::auth::{AdminUser, AuthUser, Internal};
use crate::domain::OrderStatus;
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::{clients, events};

pub mod store;

pub use store::{Order, OrderItem};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders/cart", get(get_cart))
        .route("/orders/cart/items", post(add_item_to_cart))
        .route("/orders/cart/item", put(update_cart_item_quantity))
        .route("/orders/cart/item/:product_id", delete(remove_item_from_cart))
        .route("/orders/cart/coupon", post(apply_coupon_to_cart))
        .route("/orders/create-pending", post(create_pending_order))
        .route("/orders/place", post(place_order))
        .route("/orders", get(get_order_history))
        .route("/orders/pending/batch", get(get_pending_orders_for_batching))
        .route("/orders/batch/route", post(batch_orders_for_route))
        .route("/orders/admin/all", get(get_all_orders))
        .route("/orders/admin/:order_id/status", put(update_order_status))
        .route("/orders/internal/status/:order_id", put(update_order_status_internal))
        .route("/orders/:order_id", get(get_order_details))
}

// ---- views ----

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemView {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub image_url: Option<String>,
    pub price: Decimal,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

impl From<OrderItem> for OrderItemView {
    fn from(item: OrderItem) -> Self {
        Self {
            id: item.id,
            order_id: item.order_id,
            product_id: item.product_id,
            name: item.product_name,
            image_url: item.product_image_url,
            price: item.unit_price,
            quantity: item.quantity,
            created_at: item.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub total_amount: Decimal,
    pub coupon_code: Option<String>,
    pub discount_amount: Decimal,
    pub final_total: Decimal,
    pub shipping_address_id: Option<Uuid>,
    pub payment_method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItemView>,
}

impl OrderView {
    fn from_parts(order: Order, items: Vec<OrderItem>) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            status: order.status,
            total_amount: order.total_amount,
            coupon_code: order.coupon_code,
            discount_amount: order.discount_amount,
            final_total: order.final_total,
            shipping_address_id: order.shipping_address_id,
            payment_method: order.payment_method,
            created_at: order.created_at,
            updated_at: order.updated_at,
            items: items.into_iter().map(OrderItemView::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub order_id: Option<Uuid>,
    pub items: Vec<OrderItemView>,
    pub coupon_code: Option<String>,
    pub discount_amount: Decimal,
    pub final_total: Decimal,
}

impl CartView {
    /// "No cart yet" is a valid answer, not an error.
    fn empty() -> Self {
        Self {
            order_id: None,
            items: vec![],
            coupon_code: None,
            discount_amount: Decimal::ZERO,
            final_total: Decimal::ZERO,
        }
    }

    fn from_parts(order: Order, items: Vec<OrderItem>) -> Self {
        Self {
            order_id: Some(order.id),
            items: items.into_iter().map(OrderItemView::from).collect(),
            coupon_code: order.coupon_code,
            discount_amount: order.discount_amount,
            final_total: order.final_total,
        }
    }
}

// ---- cart handlers ----

async fn get_cart(user: AuthUser, State(state): State<AppState>) -> Result<Json<CartView>> {
    match store::find_pending(&state.db, user.id).await? {
        Some(order) => {
            let items = store::items_for(&state.db, order.id).await?;
            Ok(Json(CartView::from_parts(order, items)))
        }
        None => Ok(Json(CartView::empty())),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartItemRequest {
    product_id: Uuid,
    quantity: i32,
}

async fn add_item_to_cart(
    user: AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CartItemRequest>,
) -> Result<Json<serde_json::Value>> {
    if req.quantity <= 0 {
        return Err(AppError::Validation("Product ID and a positive quantity are required.".to_string()));
    }
    let product = clients::fetch_product(&state, req.product_id).await?;
    let (order, items) = store::add_item(&state.db, user.id, &product, req.quantity).await?;
    Ok(Json(json!({
        "message": "Item added/updated in cart successfully",
        "cart": CartView::from_parts(order, items),
    })))
}

async fn update_cart_item_quantity(
    user: AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CartItemRequest>,
) -> Result<Json<serde_json::Value>> {
    if req.quantity <= 0 {
        return Err(AppError::Validation("Product ID and a positive quantity are required.".to_string()));
    }
    let (order, items) = store::update_item_quantity(&state.db, user.id, req.product_id, req.quantity).await?;
    Ok(Json(json!({
        "message": "Cart item quantity updated successfully",
        "cart": CartView::from_parts(order, items),
    })))
}

async fn remove_item_from_cart(
    user: AuthUser,
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let (order, items) = store::remove_item(&state.db, user.id, product_id).await?;
    Ok(Json(json!({
        "message": "Item removed from cart successfully",
        "cart": CartView::from_parts(order, items),
    })))
}

#[derive(Debug, Deserialize)]
struct ApplyCouponRequest {
    code: String,
}

async fn apply_coupon_to_cart(
    user: AuthUser,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ApplyCouponRequest>,
) -> Result<Json<serde_json::Value>> {
    if req.code.trim().is_empty() {
        return Err(AppError::Validation("Coupon code is required.".to_string()));
    }
    let order = store::find_pending(&state.db, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("No pending order found to apply coupon.".to_string()))?;
    let items = store::items_for(&state.db, order.id).await?;
    let item_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();

    // Validation is the promotions service's call; the user's own bearer
    // token is forwarded with it.
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Auth("Not authorized, no token.".to_string()))?;
    let validation = clients::validate_coupon(&state, bearer, &req.code, order.total_amount, &item_ids).await?;

    let order = store::apply_coupon(&state.db, user.id, &req.code, validation.discount_amount).await?;
    Ok(Json(json!({
        "message": format!("Coupon {} applied. Discount: ${:.2}", req.code, validation.discount_amount),
        "orderId": order.id,
        "finalTotal": order.final_total,
        "discountAmount": order.discount_amount,
    })))
}

// ---- order lifecycle handlers ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePendingRequest {
    shipping_address_id: Option<Uuid>,
}

async fn create_pending_order(
    user: AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CreatePendingRequest>,
) -> Result<Json<serde_json::Value>> {
    let shipping_address_id = req
        .shipping_address_id
        .ok_or_else(|| AppError::Validation("Shipping address is required.".to_string()))?;

    let order = store::find_pending(&state.db, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("No pending order (cart) found to place.".to_string()))?;
    if order.total_amount <= Decimal::ZERO {
        return Err(AppError::Validation("Cannot place an empty order.".to_string()));
    }

    let order = store::set_shipping_address(&state.db, user.id, shipping_address_id).await?;
    let items = store::items_for(&state.db, order.id).await?;

    clients::send_notification(
        &state,
        order.user_id,
        "order_pending",
        &format!("Your order #{} is pending payment.", short_id(order.id)),
        json!({ "orderId": order.id, "status": order.status }),
    )
    .await;

    Ok(Json(json!({
        "message": "Order updated with shipping, pending payment.",
        "order": OrderView::from_parts(order, items),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaceOrderRequest {
    order_id: Option<Uuid>,
    payment_method: String,
}

/// Places the user's pending order: requires a confirmed payment, deducts
/// stock atomically on the inventory side, then runs the guarded
/// `pending → placed` transition.
async fn place_order(
    user: AuthUser,
    State(state): State<AppState>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<Json<serde_json::Value>> {
    if req.payment_method.trim().is_empty() {
        return Err(AppError::Validation("Payment method is required.".to_string()));
    }

    let order = store::find_pending(&state.db, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Pending order not found.".to_string()))?;
    if req.order_id.is_some_and(|id| id != order.id) {
        return Err(AppError::NotFound("Pending order not found.".to_string()));
    }

    let items = store::items_for(&state.db, order.id).await?;
    if items.is_empty() || order.total_amount <= Decimal::ZERO {
        return Err(AppError::Validation("Cannot place an empty order.".to_string()));
    }

    let payment = clients::order_payment_state(&state, order.id).await?;
    if !payment.has_succeeded {
        return Err(AppError::Validation("Order has no successful payment confirmation.".to_string()));
    }

    let lines: Vec<(Uuid, i32)> = items.iter().map(|i| (i.product_id, i.quantity)).collect();
    clients::deduct_stock(&state, &lines).await?;

    let order = store::mark_placed(&state.db, order.id, req.payment_method.trim()).await?;
    after_placement(&state, &order, OrderStatus::Pending).await;

    clients::send_notification(
        &state,
        order.user_id,
        "order_placed",
        &format!("Your order #{} has been placed successfully!", short_id(order.id)),
        json!({ "orderId": order.id, "status": order.status }),
    )
    .await;

    Ok(Json(json!({
        "message": "Order placed successfully",
        "order": OrderView::from_parts(order, items),
    })))
}

/// Side effects of reaching `placed`: consume the coupon and publish the
/// status event. All best-effort.
async fn after_placement(state: &AppState, order: &Order, previous: OrderStatus) {
    if let Some(code) = &order.coupon_code {
        clients::mark_coupon_used(state, code).await;
    }
    events::publish_order_event(
        state,
        &events::OrderEvent::StatusChanged {
            order_id: order.id,
            user_id: order.user_id,
            old_status: previous,
            new_status: OrderStatus::Placed,
        },
    )
    .await;
}

async fn get_order_history(user: AuthUser, State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let orders = store::history(&state.db, user.id).await?;
    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let mut items = store::items_for_orders(&state.db, &ids).await?;
    let views: Vec<OrderView> = orders
        .into_iter()
        .map(|o| {
            let order_items = items.remove(&o.id).unwrap_or_default();
            OrderView::from_parts(o, order_items)
        })
        .collect();
    Ok(Json(json!({ "message": "Order history fetched successfully", "orders": views })))
}

async fn get_order_details(
    user: AuthUser,
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let order = store::find_user_order(&state.db, user.id, order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found or does not belong to this user.".to_string()))?;
    let items = store::items_for(&state.db, order.id).await?;
    Ok(Json(json!({
        "message": "Order details fetched successfully",
        "order": OrderView::from_parts(order, items),
    })))
}

// ---- admin / internal handlers ----

async fn get_all_orders(_admin: AdminUser, State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let orders = store::all_orders(&state.db).await?;
    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let mut items = store::items_for_orders(&state.db, &ids).await?;
    let views: Vec<OrderView> = orders
        .into_iter()
        .map(|o| {
            let order_items = items.remove(&o.id).unwrap_or_default();
            OrderView::from_parts(o, order_items)
        })
        .collect();
    Ok(Json(json!({ "message": "All orders fetched successfully", "orders": views })))
}

#[derive(Debug, Deserialize)]
struct StatusUpdateRequest {
    status: String,
}

/// Shared by the admin and internal status routes: guarded transition,
/// then the downstream side effects when the status actually changed.
async fn apply_status_change(state: &AppState, order_id: Uuid, new_status: OrderStatus) -> Result<Order> {
    let outcome = store::transition(&state.db, order_id, new_status).await?;
    if outcome.changed {
        if new_status == OrderStatus::Placed {
            if let Some(code) = &outcome.order.coupon_code {
                clients::mark_coupon_used(state, code).await;
            }
        }
        clients::broadcast_order_status(state, outcome.order.user_id, outcome.order.id, new_status.as_str()).await;
        events::publish_order_event(
            state,
            &events::OrderEvent::StatusChanged {
                order_id: outcome.order.id,
                user_id: outcome.order.user_id,
                old_status: outcome.previous,
                new_status,
            },
        )
        .await;
    }
    Ok(outcome.order)
}

async fn update_order_status(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<StatusUpdateRequest>,
) -> Result<Json<serde_json::Value>> {
    let new_status: OrderStatus = req.status.parse()?;
    let order = apply_status_change(&state, order_id, new_status).await?;
    let items = store::items_for(&state.db, order.id).await?;
    Ok(Json(json!({
        "message": format!("Order {} status updated to {} successfully", order_id, new_status),
        "order": OrderView::from_parts(order, items),
    })))
}

/// Internal: the payment service's outbox worker lands here. Redelivery of
/// an already-applied status is a safe no-op.
async fn update_order_status_internal(
    _guard: Internal,
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<StatusUpdateRequest>,
) -> Result<Json<serde_json::Value>> {
    let new_status: OrderStatus = req.status.parse()?;
    let order = apply_status_change(&state, order_id, new_status).await?;
    Ok(Json(json!({
        "message": format!("Order {} status updated to {}.", order_id, new_status),
        "orderId": order.id,
        "status": order.status,
    })))
}

// ---- route batching ----

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteBatch {
    pub batch_id: Uuid,
    pub shipping_address_id: Uuid,
    pub order_ids: Vec<Uuid>,
}

/// Groups orders by shipping address, preserving first-seen address order.
/// Orders without an address cannot be routed and are skipped.
pub fn group_for_route(orders: &[(Uuid, Option<Uuid>)]) -> Vec<(Uuid, Vec<Uuid>)> {
    let mut batches: Vec<(Uuid, Vec<Uuid>)> = Vec::new();
    for (order_id, address) in orders {
        let Some(address) = address else { continue };
        match batches.iter_mut().find(|(a, _)| a == address) {
            Some((_, ids)) => ids.push(*order_id),
            None => batches.push((*address, vec![*order_id])),
        }
    }
    batches
}

async fn get_pending_orders_for_batching(
    _user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>> {
    let orders = store::batching_candidates(&state.db).await?;
    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let mut items = store::items_for_orders(&state.db, &ids).await?;
    let views: Vec<OrderView> = orders
        .into_iter()
        .map(|o| {
            let order_items = items.remove(&o.id).unwrap_or_default();
            OrderView::from_parts(o, order_items)
        })
        .collect();
    Ok(Json(json!({ "message": "Batching candidates fetched successfully", "orders": views })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchRouteRequest {
    #[serde(default)]
    order_ids: Option<Vec<Uuid>>,
}

async fn batch_orders_for_route(
    _user: AuthUser,
    State(state): State<AppState>,
    Json(req): Json<BatchRouteRequest>,
) -> Result<Json<serde_json::Value>> {
    let candidates = store::batching_candidates(&state.db).await?;
    let eligible: Vec<(Uuid, Option<Uuid>)> = candidates
        .iter()
        .filter(|o| req.order_ids.as_ref().map_or(true, |ids| ids.contains(&o.id)))
        .map(|o| (o.id, o.shipping_address_id))
        .collect();

    let batches: Vec<RouteBatch> = group_for_route(&eligible)
        .into_iter()
        .map(|(shipping_address_id, order_ids)| RouteBatch {
            batch_id: Uuid::new_v4(),
            shipping_address_id,
            order_ids,
        })
        .collect();

    Ok(Json(json!({ "message": "Orders batched for routing", "batches": batches })))
}

fn short_id(id: Uuid) -> String {
    id.to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_for_route_shares_address() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let (o1, o2, o3, o4) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let batches = group_for_route(&[
            (o1, Some(a)),
            (o2, Some(b)),
            (o3, Some(a)),
            (o4, None), // unroutable
        ]);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], (a, vec![o1, o3]));
        assert_eq!(batches[1], (b, vec![o2]));
    }

    #[test]
    fn test_group_for_route_empty() {
        assert!(group_for_route(&[]).is_empty());
        assert!(group_for_route(&[(Uuid::new_v4(), None)]).is_empty());
    }

    #[test]
    fn test_empty_cart_view() {
        let view = CartView::empty();
        assert!(view.order_id.is_none());
        assert!(view.items.is_empty());
        assert_eq!(view.final_total, Decimal::ZERO);
    }

    #[test]
    fn test_short_id() {
        let id: Uuid = "01234567-89ab-cdef-0123-456789abcdef".parse().unwrap();
        assert_eq!(short_id(id), "01234567");
    }
}
