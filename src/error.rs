//! Error taxonomy shared by every service module.
//!
//! Handlers return `Result<_, AppError>`; the `IntoResponse` impl maps each
//! variant to a status code and a `{ "message": ... }` JSON body. Full error
//! detail stays in the server logs.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::status::OrderStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Insufficient stock.")]
    InsufficientStock { out_of_stock: Vec<Uuid> },

    #[error("{0}")]
    CouponInvalid(String),

    #[error("Cannot change order status from {from} to {to}.")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Upstream(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, Json(json!({ "message": m }))).into_response(),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, Json(json!({ "message": m }))).into_response(),
            AppError::InsufficientStock { out_of_stock } => (
                StatusCode::CONFLICT,
                Json(json!({ "message": "Insufficient stock.", "outOfStockItems": out_of_stock })),
            )
                .into_response(),
            AppError::CouponInvalid(m) => (StatusCode::BAD_REQUEST, Json(json!({ "message": m }))).into_response(),
            AppError::InvalidTransition { from, to } => (
                StatusCode::CONFLICT,
                Json(json!({ "message": format!("Cannot change order status from {} to {}.", from, to) })),
            )
                .into_response(),
            AppError::Auth(m) => (StatusCode::UNAUTHORIZED, Json(json!({ "message": m }))).into_response(),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, Json(json!({ "message": m }))).into_response(),
            AppError::Upstream(m) => {
                tracing::error!(error = %m, "upstream service call failed");
                (StatusCode::BAD_GATEWAY, Json(json!({ "message": "Upstream service error." }))).into_response()
            }
            AppError::Config(m) => {
                tracing::error!(error = %m, "configuration error");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "message": "Server misconfigured." }))).into_response()
            }
            AppError::Database(e) => {
                tracing::error!(error = %e, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "message": "Database operation failed." }))).into_response()
            }
        }
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
