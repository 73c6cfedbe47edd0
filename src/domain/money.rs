//! Money arithmetic on [`Decimal`] values.

use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds to 2 decimal places for money presentation. Half-cents round away
/// from zero, matching how the amounts are displayed.
pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn line_total(unit_price: Decimal, quantity: i32) -> Decimal {
    unit_price * Decimal::from(quantity)
}

/// Order total: `Σ unit_price × quantity` over the line items.
pub fn order_total<'a, I>(items: I) -> Decimal
where
    I: IntoIterator<Item = (&'a Decimal, i32)>,
{
    items
        .into_iter()
        .fold(Decimal::ZERO, |acc, (price, qty)| acc + line_total(*price, qty))
}

/// Final total after discount. `final_total == total - discount` exactly.
pub fn final_total(total: Decimal, discount: Decimal) -> Decimal {
    total - discount
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(Decimal::new(12345, 3)), Decimal::new(1235, 2)); // 12.345 -> 12.35
        assert_eq!(round2(Decimal::new(10, 0)), Decimal::new(10, 0));
    }

    #[test]
    fn test_order_total() {
        let prices = [Decimal::new(1000, 2), Decimal::new(250, 2)];
        let total = order_total([(&prices[0], 3), (&prices[1], 2)]);
        assert_eq!(total, Decimal::new(3500, 2)); // 10.00*3 + 2.50*2
    }

    #[test]
    fn test_final_total_is_exact() {
        let total = Decimal::new(3000, 2);
        let discount = Decimal::new(300, 2);
        assert_eq!(final_total(total, discount), Decimal::new(2700, 2));
    }
}
