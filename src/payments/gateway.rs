//! Mock payment gateway.
//!
//! Stands in for a real PSP integration: fabricated intent ids and a
//! randomized confirmation outcome. A caller hint of `succeeded` forces
//! success so checkout flows can be exercised deterministically.

#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub payment_intent_id: String,
    pub client_secret: String,
}

pub fn create_intent() -> PaymentIntent {
    PaymentIntent {
        payment_intent_id: format!("pi_{:016x}", rand::random::<u64>()),
        client_secret: format!("sec_{:016x}", rand::random::<u64>()),
    }
}

/// Confirms a payment with the mock gateway: forced success when the caller
/// hints `succeeded`, otherwise a 90% success rate.
pub fn confirm(hint_succeeded: bool) -> bool {
    hint_succeeded || rand::random::<f64>() > 0.1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_forces_success() {
        for _ in 0..100 {
            assert!(confirm(true));
        }
    }

    #[test]
    fn test_intent_ids_are_unique() {
        let a = create_intent();
        let b = create_intent();
        assert_ne!(a.payment_intent_id, b.payment_intent_id);
        assert!(a.payment_intent_id.starts_with("pi_"));
        assert!(a.client_secret.starts_with("sec_"));
    }
}
