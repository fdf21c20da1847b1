//! Stock movement tests
//!
//! Manual entries, exits and adjustments, and the stock status shown
//! next to each product.

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    apply_manual_movement, is_in_alert, split_totals, stock_value, MovementType, StockError,
    StockLevel,
};

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn movement_types_are_lowercase() {
        let names: Vec<&str> = MovementType::ALL.iter().map(|t| t.as_str()).collect();
        assert_eq!(names, ["in", "out", "adjustment", "return"]);
    }

    #[test]
    fn exit_of_exact_stock_empties_product() {
        let change = apply_manual_movement(MovementType::Out, dec("18.250"), dec("18.25")).unwrap();
        assert_eq!(change.stock_after, Decimal::ZERO);
        assert_eq!(StockLevel::of(change.stock_after, dec("5")), StockLevel::OutOfStock);
    }

    #[test]
    fn adjustment_to_same_level_records_zero_delta() {
        let change = apply_manual_movement(MovementType::Adjustment, dec("12"), dec("12")).unwrap();
        assert_eq!(change.delta, Decimal::ZERO);
    }

    #[test]
    fn negative_exit_is_rejected() {
        assert_eq!(
            apply_manual_movement(MovementType::Out, dec("10"), dec("-2")),
            Err(StockError::NonPositiveQuantity)
        );
    }

    #[test]
    fn alert_is_inclusive_of_threshold() {
        assert!(is_in_alert(dec("10"), dec("10")));
        assert!(!is_in_alert(dec("10.01"), dec("10")));
        assert_eq!(StockLevel::of(dec("10"), dec("10")), StockLevel::Low);
    }

    #[test]
    fn stock_value_is_rounded() {
        assert_eq!(stock_value(dec("3.333"), dec("12.10")), dec("40.33"));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

/// Quantities in grams up to 100 tonnes
fn quantity_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..100_000_000).prop_map(|g| Decimal::new(g, 3))
}

fn movement_strategy() -> impl Strategy<Value = MovementType> {
    prop::sample::select(MovementType::ALL.to_vec())
}

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #[test]
        fn accepted_movements_never_leave_negative_stock(
            movement in movement_strategy(),
            on_hand in quantity_strategy(),
            quantity in quantity_strategy(),
        ) {
            if let Ok(change) = apply_manual_movement(movement, on_hand, quantity) {
                prop_assert!(change.stock_after >= Decimal::ZERO);
                prop_assert_eq!(change.stock_before, on_hand);
                prop_assert_eq!(change.stock_after, change.stock_before + change.delta);
            }
        }

        #[test]
        fn exits_fail_only_when_stock_is_short(
            on_hand in quantity_strategy(),
            quantity in quantity_strategy(),
        ) {
            prop_assume!(quantity > Decimal::ZERO);
            let result = apply_manual_movement(MovementType::Out, on_hand, quantity);
            prop_assert_eq!(result.is_ok(), on_hand >= quantity);
        }

        #[test]
        fn adjustment_lands_on_target(on_hand in quantity_strategy(), target in quantity_strategy()) {
            let change = apply_manual_movement(MovementType::Adjustment, on_hand, target).unwrap();
            prop_assert_eq!(change.stock_after, target);
        }

        #[test]
        fn totals_account_for_every_movement(
            deltas in prop::collection::vec((-1_000_000i64..1_000_000).prop_map(|g| Decimal::new(g, 3)), 0..50),
        ) {
            let (inbound, outbound) = split_totals(deltas.iter().copied());
            let net: Decimal = deltas.iter().sum();
            prop_assert!(inbound >= Decimal::ZERO);
            prop_assert!(outbound >= Decimal::ZERO);
            prop_assert_eq!(inbound - outbound, net);
        }
    }
}
