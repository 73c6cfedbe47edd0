//! Coupon validation and discount math.
//!
//! Validation is pure: the caller supplies the coupon row, the order total
//! and the current time. The `applicable_to` scoping field (`category` /
//! `product` / `all`) is stored and returned but not enforced.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::money::round2;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    FixedAmount,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::FixedAmount => "fixed_amount",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "percentage" => Ok(DiscountType::Percentage),
            "fixed_amount" => Ok(DiscountType::FixedAmount),
            other => Err(AppError::Validation(format!(
                "Invalid discount type: {}. Must be 'percentage' or 'fixed_amount'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub description: Option<String>,
    pub discount_type: String,
    pub discount_value: Decimal,
    pub minimum_order_amount: Decimal,
    pub max_uses: i32,
    pub uses_count: i32,
    pub is_active: bool,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub applicable_to: String,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    pub fn discount_type(&self) -> Result<DiscountType, AppError> {
        DiscountType::parse(&self.discount_type)
    }
}

/// Runs the validation checks in order, returning the first failure as a
/// [`AppError::CouponInvalid`] with a human-readable reason.
pub fn validate(coupon: &Coupon, order_total: Decimal, now: DateTime<Utc>) -> Result<(), AppError> {
    if !coupon.is_active {
        return Err(AppError::CouponInvalid("Coupon is not active.".to_string()));
    }
    if coupon.valid_from > now || coupon.valid_until < now {
        return Err(AppError::CouponInvalid("Coupon is expired or not yet valid.".to_string()));
    }
    if coupon.uses_count >= coupon.max_uses {
        return Err(AppError::CouponInvalid("Coupon usage limit reached.".to_string()));
    }
    if order_total < coupon.minimum_order_amount {
        return Err(AppError::CouponInvalid(format!(
            "Minimum order of ${:.2} required.",
            coupon.minimum_order_amount
        )));
    }
    Ok(())
}

/// Discount for an order total: percentage of the total, or a fixed amount
/// capped at the total so the final total never goes negative. Rounded to
/// 2 decimal places.
pub fn discount_for(coupon: &Coupon, order_total: Decimal) -> Result<Decimal, AppError> {
    let raw = match coupon.discount_type()? {
        DiscountType::Percentage => order_total * coupon.discount_value / Decimal::from(100),
        DiscountType::FixedAmount => coupon.discount_value,
    };
    Ok(round2(raw.min(order_total)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon(discount_type: &str, value: Decimal) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: Uuid::new_v4(),
            code: "SAVE10".to_string(),
            description: None,
            discount_type: discount_type.to_string(),
            discount_value: value,
            minimum_order_amount: Decimal::new(2000, 2),
            max_uses: 100,
            uses_count: 0,
            is_active: true,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(1),
            applicable_to: "all".to_string(),
            created_at: now,
        }
    }

    #[test]
    fn test_ten_percent_off_thirty() {
        let c = coupon("percentage", Decimal::new(10, 0));
        let total = Decimal::new(3000, 2); // 10.00 * 3
        validate(&c, total, Utc::now()).unwrap();
        let discount = discount_for(&c, total).unwrap();
        assert_eq!(discount, Decimal::new(300, 2)); // 3.00
        assert_eq!(total - discount, Decimal::new(2700, 2)); // 27.00
    }

    #[test]
    fn test_minimum_order_message() {
        let c = coupon("percentage", Decimal::new(10, 0));
        let err = validate(&c, Decimal::new(1500, 2), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::CouponInvalid(m) if m == "Minimum order of $20.00 required."));
    }

    #[test]
    fn test_inactive_coupon() {
        let mut c = coupon("percentage", Decimal::new(10, 0));
        c.is_active = false;
        let err = validate(&c, Decimal::new(5000, 2), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::CouponInvalid(m) if m == "Coupon is not active."));
    }

    #[test]
    fn test_expired_coupon() {
        let mut c = coupon("percentage", Decimal::new(10, 0));
        c.valid_until = Utc::now() - Duration::hours(1);
        let err = validate(&c, Decimal::new(5000, 2), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::CouponInvalid(m) if m == "Coupon is expired or not yet valid."));
    }

    #[test]
    fn test_not_yet_valid_coupon() {
        let mut c = coupon("percentage", Decimal::new(10, 0));
        c.valid_from = Utc::now() + Duration::hours(1);
        assert!(validate(&c, Decimal::new(5000, 2), Utc::now()).is_err());
    }

    #[test]
    fn test_usage_limit() {
        let mut c = coupon("percentage", Decimal::new(10, 0));
        c.uses_count = c.max_uses;
        let err = validate(&c, Decimal::new(5000, 2), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::CouponInvalid(m) if m == "Coupon usage limit reached."));
    }

    #[test]
    fn test_fixed_amount_capped_at_total() {
        let mut c = coupon("fixed_amount", Decimal::new(5000, 2)); // $50 off
        c.minimum_order_amount = Decimal::ZERO;
        let total = Decimal::new(3000, 2); // $30 order
        let discount = discount_for(&c, total).unwrap();
        assert_eq!(discount, total); // capped, never negative final total
    }

    #[test]
    fn test_discount_rounded_to_cents() {
        let c = coupon("percentage", Decimal::new(15, 0));
        let total = Decimal::new(3333, 2); // 33.33 * 15% = 4.9995
        let discount = discount_for(&c, total).unwrap();
        assert_eq!(discount, Decimal::new(500, 2));
    }

    #[test]
    fn test_unknown_discount_type_rejected() {
        let c = coupon("bogo", Decimal::new(10, 0));
        assert!(discount_for(&c, Decimal::new(3000, 2)).is_err());
    }
}
