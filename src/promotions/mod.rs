//! Promotions service: coupon validation, admin management, and the
//! internal mark-as-used increment.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{AdminUser, AuthUser, Internal};
use crate::domain::coupon::{self, Coupon, DiscountType};
use crate::error::{AppError, Result};
use crate::state::AppState;

pub mod store;

pub use store::MarkUsedOutcome;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/promotions/validate", post(validate_coupon))
        .route("/promotions/admin/coupons", post(create_coupon).get(list_coupons))
        .route("/promotions/internal/use", put(mark_used))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateRequest {
    code: String,
    order_total: Decimal,
    // Declared scoping input; applicability filtering is not enforced.
    #[serde(default)]
    #[allow(dead_code)]
    item_ids: Vec<Uuid>,
}

async fn validate_coupon(
    _user: AuthUser,
    State(state): State<AppState>,
    Json(req): Json<ValidateRequest>,
) -> Result<Json<serde_json::Value>> {
    if req.code.trim().is_empty() {
        return Err(AppError::Validation("Coupon code and order total are required.".to_string()));
    }

    let coupon = store::find_by_code(&state.db, &req.code)
        .await?
        .ok_or_else(|| AppError::NotFound("Coupon not found.".to_string()))?;

    coupon::validate(&coupon, req.order_total, Utc::now())?;
    let discount_amount = coupon::discount_for(&coupon, req.order_total)?;

    Ok(Json(json!({
        "message": "Coupon validated and applied successfully.",
        "discountAmount": discount_amount,
        "couponDetails": {
            "code": coupon.code,
            "description": coupon.description,
            "type": coupon.discount_type,
            "value": coupon.discount_value,
        },
    })))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateCouponRequest {
    #[validate(length(min = 1, max = 64))]
    code: String,
    description: Option<String>,
    discount_type: String,
    discount_value: Decimal,
    #[serde(default)]
    minimum_order_amount: Decimal,
    #[validate(range(min = 1))]
    max_uses: i32,
    valid_from: DateTime<Utc>,
    valid_until: DateTime<Utc>,
    #[serde(default = "default_applicable_to")]
    applicable_to: String,
}

fn default_applicable_to() -> String {
    "all".to_string()
}

async fn create_coupon(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(req): Json<CreateCouponRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    req.validate().map_err(|e| AppError::Validation(e.to_string()))?;
    let discount_type = DiscountType::parse(&req.discount_type)?;
    if req.discount_value <= Decimal::ZERO {
        return Err(AppError::Validation("Discount value must be positive.".to_string()));
    }
    if req.minimum_order_amount < Decimal::ZERO {
        return Err(AppError::Validation("Minimum order amount cannot be negative.".to_string()));
    }
    if req.valid_from >= req.valid_until {
        return Err(AppError::Validation("validFrom must be before validUntil.".to_string()));
    }

    let coupon = store::create(
        &state.db,
        &store::NewCoupon {
            code: req.code.trim().to_string(),
            description: req.description,
            discount_type: discount_type.as_str().to_string(),
            discount_value: req.discount_value,
            minimum_order_amount: req.minimum_order_amount,
            max_uses: req.max_uses,
            valid_from: req.valid_from,
            valid_until: req.valid_until,
            applicable_to: req.applicable_to,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(json!({ "message": "Coupon created successfully.", "coupon": coupon }))))
}

async fn list_coupons(_admin: AdminUser, State(state): State<AppState>) -> Result<Json<Vec<Coupon>>> {
    Ok(Json(store::list(&state.db).await?))
}

#[derive(Debug, Deserialize)]
struct MarkUsedRequest {
    code: String,
}

/// Internal: called after an order carrying this coupon reaches `placed`.
async fn mark_used(
    _guard: Internal,
    State(state): State<AppState>,
    Json(req): Json<MarkUsedRequest>,
) -> Result<Json<serde_json::Value>> {
    match store::mark_used(&state.db, &req.code).await? {
        MarkUsedOutcome::Applied { new_uses_count } => Ok(Json(json!({
            "message": "Coupon marked as used.",
            "newUsesCount": new_uses_count,
        }))),
        MarkUsedOutcome::LimitReached => {
            Err(AppError::CouponInvalid("Coupon usage limit already reached.".to_string()))
        }
        MarkUsedOutcome::NotFound => Err(AppError::NotFound("Active coupon not found.".to_string())),
    }
}
