//! Order status machine.
//!
//! While an order is `pending` it doubles as the owning user's cart. The
//! transition graph is `pending → placed → processing → shipped → delivered`,
//! with `cancelled` reachable from any state except `delivered`. A
//! transition to the current status is accepted as a no-op so that retried
//! status syncs stay idempotent.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Placed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Placed => "placed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (a, b) if a == b => true,
            (Pending, Placed) => true,
            (Placed, Processing) => true,
            (Processing, Shipped) => true,
            (Shipped, Delivered) => true,
            (from, Cancelled) => from != Delivered,
            _ => false,
        }
    }

    /// Validates a transition, returning whether it changes the status.
    pub fn transition_to(self, next: OrderStatus) -> Result<bool, AppError> {
        if !self.can_transition_to(next) {
            return Err(AppError::InvalidTransition { from: self, to: next });
        }
        Ok(self != next)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "placed" => Ok(OrderStatus::Placed),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(AppError::Validation(format!(
                "Invalid status provided: {}. Must be one of: pending, placed, processing, shipped, delivered, cancelled",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::OrderStatus::*;
    use super::*;

    #[test]
    fn test_happy_path_chain() {
        assert!(Pending.can_transition_to(Placed));
        assert!(Placed.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));
    }

    #[test]
    fn test_no_skipping_or_regression() {
        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Placed.can_transition_to(Delivered));
        assert!(!Shipped.can_transition_to(Placed));
        assert!(!Delivered.can_transition_to(Pending));
    }

    #[test]
    fn test_cancellation_reachability() {
        for from in [Pending, Placed, Processing, Shipped] {
            assert!(from.can_transition_to(Cancelled), "{from} should cancel");
        }
        assert!(!Delivered.can_transition_to(Cancelled));
    }

    #[test]
    fn test_same_status_is_noop() {
        assert_eq!(Placed.transition_to(Placed).unwrap(), false);
        assert_eq!(Pending.transition_to(Placed).unwrap(), true);
    }

    #[test]
    fn test_illegal_transition_errors() {
        let err = Delivered.transition_to(Cancelled).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    #[test]
    fn test_parse_round_trip() {
        for s in [Pending, Placed, Processing, Shipped, Delivered, Cancelled] {
            assert_eq!(s.as_str().parse::<OrderStatus>().unwrap(), s);
        }
        assert!("picked_up".parse::<OrderStatus>().is_err());
    }
}
