//! Stock reconciliation for order status changes
//!
//! When an order changes status, stock moves according to its type:
//!
//! | transition | export / local                        | import                          |
//! |------------|---------------------------------------|---------------------------------|
//! | confirm    | `out` per product, if stock suffices  | `in` per product                |
//! | deliver    | `out` for products not yet deducted   | nothing                         |
//! | cancel     | `return` of what was deducted         | `adjustment` removing what was received, floored at zero |
//!
//! The planner is pure. It receives the order's *ledger*, the net signed
//! quantity this order has already moved for each product, and decides
//! from it. A product with a non-zero ledger is never deducted or received
//! twice, and a cancellation reverses exactly what the ledger holds.
//! The caller must load the ledger and stock levels under the same row
//! locks it writes with.

use std::collections::HashMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{MovementType, OrderStatus, OrderType, StockChange, TransitionError};

/// One order line as seen by the planner
#[derive(Debug, Clone)]
pub struct LineDemand {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit: String,
    pub quantity: Decimal,
}

/// Everything the planner needs to decide a status change
#[derive(Debug, Clone, Copy)]
pub struct StatusChange<'a> {
    pub order_number: &'a str,
    pub order_type: OrderType,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub lines: &'a [LineDemand],
    /// Stock on hand per product
    pub on_hand: &'a HashMap<Uuid, Decimal>,
    /// Net quantity already moved by this order, per product
    pub ledger: &'a HashMap<Uuid, Decimal>,
}

/// A stock movement the caller must persist
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedMovement {
    pub product_id: Uuid,
    pub movement_type: MovementType,
    #[serde(flatten)]
    pub change: StockChange,
    pub reason: String,
}

/// Something the user should know about a status change that still went through
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StockWarning {
    /// Not enough stock to ship; no movement was written for the product
    Insufficient {
        product_id: Uuid,
        product_name: String,
        unit: String,
        available: Decimal,
        requested: Decimal,
    },
    /// An import reversal would have taken stock below zero
    Clamped {
        product_id: Uuid,
        product_name: String,
        unit: String,
        requested: Decimal,
        applied: Decimal,
    },
}

impl fmt::Display for StockWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StockWarning::Insufficient {
                product_name,
                unit,
                available,
                requested,
                ..
            } => write!(
                f,
                "Insufficient stock for {}: {} {} available, {} {} requested",
                product_name, available, unit, requested, unit
            ),
            StockWarning::Clamped {
                product_name,
                unit,
                requested,
                applied,
                ..
            } => write!(
                f,
                "Stock for {} was short: removed {} {} instead of {} {}",
                product_name, applied, unit, requested, unit
            ),
        }
    }
}

/// Movements and warnings produced for one status change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StockPlan {
    pub movements: Vec<PlannedMovement>,
    pub warnings: Vec<StockWarning>,
}

impl StockPlan {
    pub fn is_empty(&self) -> bool {
        self.movements.is_empty() && self.warnings.is_empty()
    }
}

/// What a transition asks of the stock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StockEffect {
    None,
    Commit,
    Deliver,
    Release,
}

fn effect_of(change: &StatusChange<'_>) -> StockEffect {
    match change.to {
        OrderStatus::Confirmed => StockEffect::Commit,
        OrderStatus::Delivered if change.order_type.ships_from_stock() => StockEffect::Deliver,
        OrderStatus::Cancelled if change.from.holds_stock() => StockEffect::Release,
        _ => StockEffect::None,
    }
}

/// Sum line quantities per product, keeping first-seen order
fn aggregate(lines: &[LineDemand]) -> Vec<LineDemand> {
    let mut merged: Vec<LineDemand> = Vec::new();
    for line in lines {
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => existing.quantity += line.quantity,
            None => merged.push(line.clone()),
        }
    }
    merged
}

/// Decide the stock movements for an order status change.
///
/// Returns an empty plan for same-status requests and for transitions that
/// do not touch stock. Fails only when the transition itself is not allowed.
pub fn plan_status_change(change: &StatusChange<'_>) -> Result<StockPlan, TransitionError> {
    change.from.check_transition(change.to)?;
    if change.from == change.to {
        return Ok(StockPlan::default());
    }

    let effect = effect_of(change);
    if effect == StockEffect::None {
        return Ok(StockPlan::default());
    }

    let mut plan = StockPlan::default();
    for demand in aggregate(change.lines) {
        let on_hand = change
            .on_hand
            .get(&demand.product_id)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let committed = change
            .ledger
            .get(&demand.product_id)
            .copied()
            .unwrap_or(Decimal::ZERO);

        match effect {
            StockEffect::Commit | StockEffect::Deliver => {
                if !committed.is_zero() {
                    continue;
                }
                if change.order_type.ships_from_stock() {
                    let reason = match effect {
                        StockEffect::Commit => format!(
                            "Order confirmation {} {}",
                            change.order_type.label(),
                            change.order_number
                        ),
                        _ => format!("Order delivery {}", change.order_number),
                    };
                    ship(&mut plan, &demand, on_hand, reason);
                } else {
                    plan.movements.push(PlannedMovement {
                        product_id: demand.product_id,
                        movement_type: MovementType::In,
                        change: StockChange::new(on_hand, demand.quantity),
                        reason: format!(
                            "Order confirmation {} {}",
                            change.order_type.label(),
                            change.order_number
                        ),
                    });
                }
            }
            StockEffect::Release => release(&mut plan, change.order_number, &demand, on_hand, committed),
            StockEffect::None => {}
        }
    }

    Ok(plan)
}

fn ship(plan: &mut StockPlan, demand: &LineDemand, on_hand: Decimal, reason: String) {
    if demand.quantity <= Decimal::ZERO {
        return;
    }
    if on_hand >= demand.quantity {
        plan.movements.push(PlannedMovement {
            product_id: demand.product_id,
            movement_type: MovementType::Out,
            change: StockChange::new(on_hand, -demand.quantity),
            reason,
        });
    } else {
        plan.warnings.push(StockWarning::Insufficient {
            product_id: demand.product_id,
            product_name: demand.product_name.clone(),
            unit: demand.unit.clone(),
            available: on_hand,
            requested: demand.quantity,
        });
    }
}

fn release(
    plan: &mut StockPlan,
    order_number: &str,
    demand: &LineDemand,
    on_hand: Decimal,
    committed: Decimal,
) {
    if committed < Decimal::ZERO {
        // Goods left our stock for this order; bring them back.
        plan.movements.push(PlannedMovement {
            product_id: demand.product_id,
            movement_type: MovementType::Return,
            change: StockChange::new(on_hand, -committed),
            reason: format!("Order cancellation {} (return)", order_number),
        });
    } else if committed > Decimal::ZERO {
        // Goods were received for this order; take them out again, never below zero.
        let applied = committed.min(on_hand.max(Decimal::ZERO));
        if applied < committed {
            plan.warnings.push(StockWarning::Clamped {
                product_id: demand.product_id,
                product_name: demand.product_name.clone(),
                unit: demand.unit.clone(),
                requested: committed,
                applied,
            });
        }
        if applied > Decimal::ZERO {
            plan.movements.push(PlannedMovement {
                product_id: demand.product_id,
                movement_type: MovementType::Adjustment,
                change: StockChange::new(on_hand, -applied),
                reason: format!("Order cancellation {} (import reversal)", order_number),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    struct Fixture {
        lines: Vec<LineDemand>,
        on_hand: HashMap<Uuid, Decimal>,
        ledger: HashMap<Uuid, Decimal>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                lines: Vec::new(),
                on_hand: HashMap::new(),
                ledger: HashMap::new(),
            }
        }

        fn product(mut self, stock: &str, ordered: &str) -> (Self, Uuid) {
            let id = Uuid::new_v4();
            self.on_hand.insert(id, dec(stock));
            self.lines.push(LineDemand {
                product_id: id,
                product_name: format!("Sardine {}", self.lines.len()),
                unit: "KG".to_string(),
                quantity: dec(ordered),
            });
            (self, id)
        }

        fn plan(&self, order_type: OrderType, from: OrderStatus, to: OrderStatus) -> StockPlan {
            plan_status_change(&StatusChange {
                order_number: "CMD1",
                order_type,
                from,
                to,
                lines: &self.lines,
                on_hand: &self.on_hand,
                ledger: &self.ledger,
            })
            .unwrap()
        }
    }

    #[test]
    fn confirming_export_deducts_stock() {
        let (f, id) = Fixture::new().product("100", "30");
        let plan = f.plan(OrderType::Export, OrderStatus::Draft, OrderStatus::Confirmed);
        assert_eq!(plan.movements.len(), 1);
        let m = &plan.movements[0];
        assert_eq!(m.product_id, id);
        assert_eq!(m.movement_type, MovementType::Out);
        assert_eq!(m.change.delta, dec("-30"));
        assert_eq!(m.change.stock_after, dec("70"));
        assert_eq!(m.reason, "Order confirmation EXPORT CMD1");
    }

    #[test]
    fn confirming_with_short_stock_warns_instead() {
        let (f, _) = Fixture::new().product("10", "30");
        let plan = f.plan(OrderType::Local, OrderStatus::Draft, OrderStatus::Confirmed);
        assert!(plan.movements.is_empty());
        assert_eq!(plan.warnings.len(), 1);
        assert!(plan.warnings[0].to_string().contains("10 KG available"));
    }

    #[test]
    fn confirming_import_receives_stock() {
        let (f, _) = Fixture::new().product("5", "20");
        let plan = f.plan(OrderType::Import, OrderStatus::Draft, OrderStatus::Confirmed);
        assert_eq!(plan.movements[0].movement_type, MovementType::In);
        assert_eq!(plan.movements[0].change.stock_after, dec("25"));
    }

    #[test]
    fn duplicate_lines_are_checked_together() {
        let (mut f, id) = Fixture::new().product("50", "30");
        f.lines.push(LineDemand {
            product_id: id,
            product_name: "Sardine 0".to_string(),
            unit: "KG".to_string(),
            quantity: dec("30"),
        });
        let plan = f.plan(OrderType::Export, OrderStatus::Draft, OrderStatus::Confirmed);
        assert!(plan.movements.is_empty());
        match &plan.warnings[0] {
            StockWarning::Insufficient { requested, .. } => assert_eq!(*requested, dec("60")),
            other => panic!("unexpected warning {:?}", other),
        }
    }

    #[test]
    fn delivery_skips_products_already_deducted() {
        let (f, shipped) = Fixture::new().product("70", "30");
        let (mut f, pending) = f.product("40", "10");
        f.ledger.insert(shipped, dec("-30"));
        let plan = f.plan(OrderType::Export, OrderStatus::Shipped, OrderStatus::Delivered);
        assert_eq!(plan.movements.len(), 1);
        assert_eq!(plan.movements[0].product_id, pending);
        assert_eq!(plan.movements[0].reason, "Order delivery CMD1");
    }

    #[test]
    fn import_delivery_moves_nothing() {
        let (mut f, id) = Fixture::new().product("70", "30");
        f.ledger.insert(id, dec("30"));
        let plan = f.plan(OrderType::Import, OrderStatus::Shipped, OrderStatus::Delivered);
        assert!(plan.is_empty());
    }

    #[test]
    fn cancelling_export_returns_what_was_deducted() {
        let (mut f, id) = Fixture::new().product("70", "30");
        f.ledger.insert(id, dec("-30"));
        let plan = f.plan(OrderType::Export, OrderStatus::Preparation, OrderStatus::Cancelled);
        assert_eq!(plan.movements[0].movement_type, MovementType::Return);
        assert_eq!(plan.movements[0].change.stock_after, dec("100"));
    }

    #[test]
    fn cancelling_unshipped_export_returns_nothing() {
        let (f, _) = Fixture::new().product("10", "30");
        let plan = f.plan(OrderType::Export, OrderStatus::Confirmed, OrderStatus::Cancelled);
        assert!(plan.is_empty());
    }

    #[test]
    fn cancelling_import_is_floored_at_zero() {
        let (mut f, id) = Fixture::new().product("12", "20");
        f.ledger.insert(id, dec("20"));
        let plan = f.plan(OrderType::Import, OrderStatus::Confirmed, OrderStatus::Cancelled);
        let m = &plan.movements[0];
        assert_eq!(m.movement_type, MovementType::Adjustment);
        assert_eq!(m.change.delta, dec("-12"));
        assert_eq!(m.change.stock_after, Decimal::ZERO);
        assert!(matches!(plan.warnings[0], StockWarning::Clamped { .. }));
    }

    #[test]
    fn cancelling_import_with_empty_stock_only_warns() {
        let (mut f, id) = Fixture::new().product("0", "20");
        f.ledger.insert(id, dec("20"));
        let plan = f.plan(OrderType::Import, OrderStatus::Shipped, OrderStatus::Cancelled);
        assert!(plan.movements.is_empty());
        assert_eq!(plan.warnings.len(), 1);
        match &plan.warnings[0] {
            StockWarning::Clamped {
                product_id,
                requested,
                applied,
                ..
            } => {
                assert_eq!(*product_id, id);
                assert_eq!(*requested, dec("20"));
                assert_eq!(*applied, Decimal::ZERO);
            }
            other => panic!("unexpected warning {:?}", other),
        }
    }

    #[test]
    fn cancelling_draft_moves_nothing() {
        let (f, _) = Fixture::new().product("12", "20");
        assert!(f
            .plan(OrderType::Import, OrderStatus::Draft, OrderStatus::Cancelled)
            .is_empty());
    }

    #[test]
    fn same_status_is_a_no_op() {
        let (f, _) = Fixture::new().product("100", "30");
        assert!(f
            .plan(OrderType::Export, OrderStatus::Confirmed, OrderStatus::Confirmed)
            .is_empty());
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let (f, _) = Fixture::new().product("100", "30");
        let result = plan_status_change(&StatusChange {
            order_number: "CMD1",
            order_type: OrderType::Export,
            from: OrderStatus::Delivered,
            to: OrderStatus::Cancelled,
            lines: &f.lines,
            on_hand: &f.on_hand,
            ledger: &f.ledger,
        });
        assert_eq!(result, Err(TransitionError::Terminal(OrderStatus::Delivered)));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn demand(product_id: Uuid, quantity: i64) -> LineDemand {
        LineDemand {
            product_id,
            product_name: "Octopus".to_string(),
            unit: "KG".to_string(),
            quantity: Decimal::from(quantity),
        }
    }

    fn plan(
        order_type: OrderType,
        from: OrderStatus,
        to: OrderStatus,
        line: &LineDemand,
        stock: i64,
        committed: i64,
    ) -> StockPlan {
        let lines = [line.clone()];
        let on_hand = HashMap::from([(line.product_id, Decimal::from(stock))]);
        let ledger = HashMap::from([(line.product_id, Decimal::from(committed))]);
        plan_status_change(&StatusChange {
            order_number: "CMD1",
            order_type,
            from,
            to,
            lines: &lines,
            on_hand: &on_hand,
            ledger: &ledger,
        })
        .unwrap()
    }

    proptest! {
        #[test]
        fn confirming_never_plans_negative_stock(
            stock in 0i64..500,
            ordered in 1i64..500,
            local in any::<bool>(),
        ) {
            let order_type = if local { OrderType::Local } else { OrderType::Export };
            let line = demand(Uuid::new_v4(), ordered);
            let p = plan(order_type, OrderStatus::Draft, OrderStatus::Confirmed, &line, stock, 0);

            for m in &p.movements {
                prop_assert!(m.change.stock_after >= Decimal::ZERO);
            }
            prop_assert_eq!(p.movements.len() + p.warnings.len(), 1);
        }

        #[test]
        fn import_reversal_stays_within_stock(stock in 0i64..500, received in 1i64..500) {
            let line = demand(Uuid::new_v4(), received);
            let p = plan(
                OrderType::Import,
                OrderStatus::Shipped,
                OrderStatus::Cancelled,
                &line,
                stock,
                received,
            );

            let taken: Decimal = p.movements.iter().map(|m| -m.change.delta).sum();
            prop_assert_eq!(taken, Decimal::from(received.min(stock)));
            prop_assert_eq!(p.warnings.is_empty(), stock >= received);
            for m in &p.movements {
                prop_assert!(m.change.stock_after >= Decimal::ZERO);
            }
        }
    }
}
