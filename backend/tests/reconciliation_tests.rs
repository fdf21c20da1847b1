//! Order lifecycle and stock reconciliation tests
//!
//! Walks orders through their statuses against an in-memory warehouse and
//! checks that:
//! - stock shipped from the warehouse never goes negative
//! - a product is deducted at most once per order
//! - cancelling releases exactly what the order moved

use std::collections::HashMap;

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    plan_status_change, LineDemand, MovementType, OrderStatus, OrderType, StatusChange,
    StockPlan, StockWarning, TransitionError,
};
use uuid::Uuid;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// Stock levels plus the per-order ledger the backend keeps in
/// `stock_movements`
#[derive(Debug, Clone)]
struct Warehouse {
    stock: HashMap<Uuid, Decimal>,
    ledger: HashMap<Uuid, Decimal>,
}

impl Warehouse {
    fn new(stock: HashMap<Uuid, Decimal>) -> Self {
        Self {
            stock,
            ledger: HashMap::new(),
        }
    }

    fn move_to(
        &mut self,
        order_type: OrderType,
        lines: &[LineDemand],
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<StockPlan, TransitionError> {
        let plan = plan_status_change(&StatusChange {
            order_number: "CMD20240101000000000",
            order_type,
            from,
            to,
            lines,
            on_hand: &self.stock,
            ledger: &self.ledger,
        })?;

        for m in &plan.movements {
            let on_hand = self.stock.entry(m.product_id).or_insert(Decimal::ZERO);
            assert_eq!(m.change.stock_before, *on_hand, "movement planned on stale stock");
            *on_hand = m.change.stock_after;
            *self.ledger.entry(m.product_id).or_insert(Decimal::ZERO) += m.change.delta;
        }
        Ok(plan)
    }
}

fn line(product_id: Uuid, quantity: Decimal) -> LineDemand {
    LineDemand {
        product_id,
        product_name: "Octopus".to_string(),
        unit: "KG".to_string(),
        quantity,
    }
}

const FORWARD: [OrderStatus; 5] = [
    OrderStatus::Draft,
    OrderStatus::Confirmed,
    OrderStatus::Preparation,
    OrderStatus::Shipped,
    OrderStatus::Delivered,
];

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn export_lifecycle_deducts_once() {
        let id = Uuid::new_v4();
        let lines = vec![line(id, dec("40"))];
        let mut wh = Warehouse::new(HashMap::from([(id, dec("100"))]));

        for pair in FORWARD.windows(2) {
            wh.move_to(OrderType::Export, &lines, pair[0], pair[1]).unwrap();
        }

        assert_eq!(wh.stock[&id], dec("60"));
        assert_eq!(wh.ledger[&id], dec("-40"));
    }

    #[test]
    fn short_stock_at_confirmation_is_deducted_on_delivery() {
        let id = Uuid::new_v4();
        let lines = vec![line(id, dec("40"))];
        let mut wh = Warehouse::new(HashMap::from([(id, dec("10"))]));

        let plan = wh
            .move_to(OrderType::Local, &lines, OrderStatus::Draft, OrderStatus::Confirmed)
            .unwrap();
        assert!(plan.movements.is_empty());
        assert!(matches!(plan.warnings[0], StockWarning::Insufficient { .. }));

        // Restocked before delivery
        wh.stock.insert(id, dec("50"));
        wh.move_to(OrderType::Local, &lines, OrderStatus::Confirmed, OrderStatus::Delivered)
            .unwrap();

        assert_eq!(wh.stock[&id], dec("10"));
        assert_eq!(wh.ledger[&id], dec("-40"));
    }

    #[test]
    fn import_cancel_restores_stock() {
        let id = Uuid::new_v4();
        let lines = vec![line(id, dec("25"))];
        let mut wh = Warehouse::new(HashMap::from([(id, dec("5"))]));

        wh.move_to(OrderType::Import, &lines, OrderStatus::Draft, OrderStatus::Confirmed)
            .unwrap();
        assert_eq!(wh.stock[&id], dec("30"));

        let plan = wh
            .move_to(OrderType::Import, &lines, OrderStatus::Confirmed, OrderStatus::Cancelled)
            .unwrap();
        assert_eq!(plan.movements[0].movement_type, MovementType::Adjustment);
        assert_eq!(wh.stock[&id], dec("5"));
        assert_eq!(wh.ledger[&id], Decimal::ZERO);
    }

    #[test]
    fn import_cancel_after_consumption_stops_at_zero() {
        let id = Uuid::new_v4();
        let lines = vec![line(id, dec("25"))];
        let mut wh = Warehouse::new(HashMap::from([(id, Decimal::ZERO)]));

        wh.move_to(OrderType::Import, &lines, OrderStatus::Draft, OrderStatus::Confirmed)
            .unwrap();
        // Another order ships most of it
        wh.stock.insert(id, dec("7"));

        let plan = wh
            .move_to(OrderType::Import, &lines, OrderStatus::Shipped, OrderStatus::Cancelled)
            .unwrap();
        assert_eq!(wh.stock[&id], Decimal::ZERO);
        assert!(matches!(
            plan.warnings[0],
            StockWarning::Clamped { applied, .. } if applied == dec("7")
        ));
    }

    #[test]
    fn draft_cannot_skip_confirmation() {
        let id = Uuid::new_v4();
        let lines = vec![line(id, dec("1"))];
        let mut wh = Warehouse::new(HashMap::from([(id, dec("10"))]));

        let err = wh
            .move_to(OrderType::Export, &lines, OrderStatus::Draft, OrderStatus::Shipped)
            .unwrap_err();
        assert_eq!(err, TransitionError::NotConfirmed(OrderStatus::Shipped));
        assert!(wh.ledger.is_empty());
    }

    #[test]
    fn cancelled_orders_stay_cancelled() {
        let err = OrderStatus::Cancelled
            .check_transition(OrderStatus::Confirmed)
            .unwrap_err();
        assert_eq!(err, TransitionError::Terminal(OrderStatus::Cancelled));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

fn order_type_strategy() -> impl Strategy<Value = OrderType> {
    prop_oneof![
        Just(OrderType::Export),
        Just(OrderType::Import),
        Just(OrderType::Local),
    ]
}

/// (initial stock, ordered quantity) per product, whole kilograms
fn products_strategy() -> impl Strategy<Value = Vec<(i64, i64)>> {
    prop::collection::vec((0i64..200, 1i64..100), 1..5)
}

fn setup(products: &[(i64, i64)]) -> (Warehouse, Vec<LineDemand>, HashMap<Uuid, Decimal>) {
    let mut stock = HashMap::new();
    let mut lines = Vec::new();
    for (initial, ordered) in products {
        let id = Uuid::new_v4();
        stock.insert(id, Decimal::from(*initial));
        lines.push(line(id, Decimal::from(*ordered)));
    }
    (Warehouse::new(stock.clone()), lines, stock)
}

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #[test]
        fn shipping_never_drives_stock_negative(
            order_type in prop_oneof![Just(OrderType::Export), Just(OrderType::Local)],
            products in products_strategy(),
        ) {
            let (mut wh, lines, _) = setup(&products);

            for pair in FORWARD.windows(2) {
                wh.move_to(order_type, &lines, pair[0], pair[1]).unwrap();
                for qty in wh.stock.values() {
                    prop_assert!(*qty >= Decimal::ZERO);
                }
            }
        }

        #[test]
        fn each_product_is_deducted_at_most_once(
            order_type in order_type_strategy(),
            products in products_strategy(),
        ) {
            let (mut wh, lines, _) = setup(&products);

            for pair in FORWARD.windows(2) {
                wh.move_to(order_type, &lines, pair[0], pair[1]).unwrap();
            }

            for l in &lines {
                let moved = wh.ledger.get(&l.product_id).copied().unwrap_or(Decimal::ZERO);
                if order_type.ships_from_stock() {
                    prop_assert!(moved == Decimal::ZERO || moved == -l.quantity);
                } else {
                    prop_assert_eq!(moved, l.quantity);
                }
            }
        }

        #[test]
        fn cancelling_releases_what_the_order_moved(
            order_type in order_type_strategy(),
            products in products_strategy(),
            reached in 1usize..4,
        ) {
            let (mut wh, lines, initial) = setup(&products);

            for pair in FORWARD[..=reached].windows(2) {
                wh.move_to(order_type, &lines, pair[0], pair[1]).unwrap();
            }
            wh.move_to(order_type, &lines, FORWARD[reached], OrderStatus::Cancelled).unwrap();

            for (id, qty) in &initial {
                prop_assert_eq!(wh.stock[id], *qty);
                prop_assert_eq!(wh.ledger.get(id).copied().unwrap_or(Decimal::ZERO), Decimal::ZERO);
            }
        }

        #[test]
        fn repeated_status_requests_change_nothing(
            order_type in order_type_strategy(),
            products in products_strategy(),
            reached in 1usize..5,
        ) {
            let (mut wh, lines, _) = setup(&products);

            for pair in FORWARD[..=reached].windows(2) {
                wh.move_to(order_type, &lines, pair[0], pair[1]).unwrap();
            }
            let before = wh.stock.clone();
            let plan = wh
                .move_to(order_type, &lines, FORWARD[reached], FORWARD[reached])
                .unwrap();

            prop_assert!(plan.is_empty());
            prop_assert_eq!(wh.stock, before);
        }

        #[test]
        fn status_never_moves_backward(from in 1usize..5, back in 0usize..4) {
            prop_assume!(back < from);
            let result = FORWARD[from].check_transition(FORWARD[back]);
            prop_assert!(result.is_err());
        }
    }
}
