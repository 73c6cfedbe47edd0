//! Inventory service: stock levels plus the append-only movement ledger.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{AdminUser, Internal};
use crate::error::{AppError, Result};
use crate::state::AppState;

pub mod store;

pub use store::{InventoryItem, StockMovement};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/inventory/items", get(list_items))
        .route("/inventory/items/:id", get(get_item))
        .route("/inventory/items/:id/movements", get(get_movements))
        .route("/inventory/admin/items", post(create_item))
        .route("/inventory/admin/items/:id", put(update_item))
        .route("/inventory/admin/items/:id/adjust", post(adjust_stock))
        .route("/inventory/alerts/low-stock", get(low_stock_alerts))
        .route("/inventory/internal/deduct", post(deduct))
}

async fn list_items(State(state): State<AppState>) -> Result<Json<Vec<InventoryItem>>> {
    Ok(Json(store::list_items(&state.db).await?))
}

async fn get_item(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<InventoryItem>> {
    Ok(Json(store::get_item(&state.db, id).await?))
}

async fn get_movements(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Vec<StockMovement>>> {
    // 404 for unknown items rather than an empty ledger.
    store::get_item(&state.db, id).await?;
    Ok(Json(store::movements_for_item(&state.db, id).await?))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateItemRequest {
    product_id: Uuid,
    #[validate(range(min = 0))]
    quantity: i32,
    #[validate(range(min = 0))]
    min_stock_level: i32,
    #[validate(range(min = 0))]
    max_stock_level: i32,
    location: Option<String>,
}

async fn create_item(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(req): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    req.validate().map_err(|e| AppError::Validation(e.to_string()))?;
    let item = store::create_item(
        &state.db,
        req.product_id,
        req.quantity,
        req.min_stock_level,
        req.max_stock_level,
        req.location.as_deref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(json!({ "message": "Inventory item created successfully.", "item": item }))))
}

async fn update_item(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateItemRequest>,
) -> Result<Json<serde_json::Value>> {
    req.validate().map_err(|e| AppError::Validation(e.to_string()))?;
    let item = store::update_item(
        &state.db,
        id,
        req.quantity,
        req.min_stock_level,
        req.max_stock_level,
        req.location.as_deref(),
    )
    .await?;
    Ok(Json(json!({ "message": "Inventory item updated.", "item": item })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdjustStockRequest {
    quantity_change: i32,
    reason: String,
    notes: Option<String>,
}

async fn adjust_stock(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AdjustStockRequest>,
) -> Result<Json<serde_json::Value>> {
    if req.reason.trim().is_empty() {
        return Err(AppError::Validation("Adjustment reason is required.".to_string()));
    }
    let item = store::adjust_stock(&state.db, id, req.quantity_change, &req.reason, req.notes.as_deref()).await?;
    Ok(Json(json!({ "message": "Stock adjusted successfully.", "item": item })))
}

async fn low_stock_alerts(_admin: AdminUser, State(state): State<AppState>) -> Result<Json<Vec<InventoryItem>>> {
    Ok(Json(store::low_stock_items(&state.db).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeductLine {
    product_id: Uuid,
    quantity: i32,
}

#[derive(Debug, Deserialize)]
struct DeductRequest {
    items: Vec<DeductLine>,
}

/// Internal: bulk stock deduction for order placement, all-or-nothing.
async fn deduct(
    _guard: Internal,
    State(state): State<AppState>,
    Json(req): Json<DeductRequest>,
) -> Result<Json<serde_json::Value>> {
    if req.items.is_empty() {
        return Err(AppError::Validation("At least one item is required.".to_string()));
    }
    if req.items.iter().any(|line| line.quantity <= 0) {
        return Err(AppError::Validation("Quantities must be positive.".to_string()));
    }
    let lines: Vec<(Uuid, i32)> = req.items.iter().map(|l| (l.product_id, l.quantity)).collect();
    store::deduct_for_order(&state.db, &lines).await?;
    Ok(Json(json!({ "message": "Stock deducted successfully." })))
}
