//! Coupon persistence.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::coupon::Coupon;
use crate::error::{AppError, Result};

pub async fn find_by_code(db: &PgPool, code: &str) -> Result<Option<Coupon>> {
    Ok(sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE code = $1")
        .bind(code)
        .fetch_optional(db)
        .await?)
}

pub async fn list(db: &PgPool) -> Result<Vec<Coupon>> {
    Ok(sqlx::query_as::<_, Coupon>("SELECT * FROM coupons ORDER BY created_at DESC")
        .fetch_all(db)
        .await?)
}

#[derive(Debug, Clone)]
pub struct NewCoupon {
    pub code: String,
    pub description: Option<String>,
    pub discount_type: String,
    pub discount_value: Decimal,
    pub minimum_order_amount: Decimal,
    pub max_uses: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub applicable_to: String,
}

pub async fn create(db: &PgPool, new: &NewCoupon) -> Result<Coupon> {
    sqlx::query_as::<_, Coupon>(
        "INSERT INTO coupons
            (id, code, description, discount_type, discount_value, minimum_order_amount,
             max_uses, valid_from, valid_until, applicable_to)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(&new.code)
    .bind(&new.description)
    .bind(&new.discount_type)
    .bind(new.discount_value)
    .bind(new.minimum_order_amount)
    .bind(new.max_uses)
    .bind(new.valid_from)
    .bind(new.valid_until)
    .bind(&new.applicable_to)
    .fetch_one(db)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            AppError::Validation("Coupon code already exists.".to_string())
        }
        _ => e.into(),
    })
}

#[derive(Debug, PartialEq, Eq)]
pub enum MarkUsedOutcome {
    Applied { new_uses_count: i32 },
    LimitReached,
    NotFound,
}

/// Conditional increment in a single statement, so the usage-limit check
/// and the bump cannot interleave with a concurrent caller:
/// `uses_count <= max_uses` holds no matter how many finalizations race.
pub async fn mark_used(db: &PgPool, code: &str) -> Result<MarkUsedOutcome> {
    let updated = sqlx::query_as::<_, (i32,)>(
        "UPDATE coupons SET uses_count = uses_count + 1
         WHERE code = $1 AND is_active AND uses_count < max_uses
         RETURNING uses_count",
    )
    .bind(code)
    .fetch_optional(db)
    .await?;

    if let Some((new_uses_count,)) = updated {
        return Ok(MarkUsedOutcome::Applied { new_uses_count });
    }

    let exists = sqlx::query_as::<_, (i32,)>("SELECT uses_count FROM coupons WHERE code = $1 AND is_active")
        .bind(code)
        .fetch_optional(db)
        .await?;
    Ok(match exists {
        Some(_) => MarkUsedOutcome::LimitReached,
        None => MarkUsedOutcome::NotFound,
    })
}
