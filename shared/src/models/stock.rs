//! Stock movement models and the rules for manual movements

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

text_enum! {
    /// Kind of stock movement
    pub enum MovementType {
        In => "in",
        Out => "out",
        Adjustment => "adjustment",
        Return => "return",
    }
}

/// Errors raised by stock rules
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockError {
    #[error("insufficient stock: {available} available, {requested} requested")]
    Insufficient {
        available: Decimal,
        requested: Decimal,
    },

    #[error("quantity must be greater than zero")]
    NonPositiveQuantity,

    #[error("adjusted stock cannot be negative")]
    NegativeTarget,
}

/// The effect of a movement on one product's stock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockChange {
    /// Signed quantity stored on the movement
    pub delta: Decimal,
    pub stock_before: Decimal,
    pub stock_after: Decimal,
}

impl StockChange {
    pub fn new(stock_before: Decimal, delta: Decimal) -> Self {
        Self {
            delta,
            stock_before,
            stock_after: stock_before + delta,
        }
    }
}

/// Apply a movement entered by hand.
///
/// `In` and `Return` add `quantity`. `Out` removes it and fails when the
/// stock is short. `Adjustment` treats `quantity` as the new absolute stock
/// level and records the difference.
pub fn apply_manual_movement(
    movement_type: MovementType,
    on_hand: Decimal,
    quantity: Decimal,
) -> Result<StockChange, StockError> {
    match movement_type {
        MovementType::In | MovementType::Return => {
            if quantity <= Decimal::ZERO {
                return Err(StockError::NonPositiveQuantity);
            }
            Ok(StockChange::new(on_hand, quantity))
        }
        MovementType::Out => {
            if quantity <= Decimal::ZERO {
                return Err(StockError::NonPositiveQuantity);
            }
            if on_hand < quantity {
                return Err(StockError::Insufficient {
                    available: on_hand,
                    requested: quantity,
                });
            }
            Ok(StockChange::new(on_hand, -quantity))
        }
        MovementType::Adjustment => {
            if quantity < Decimal::ZERO {
                return Err(StockError::NegativeTarget);
            }
            Ok(StockChange::new(on_hand, quantity - on_hand))
        }
    }
}

/// Inbound and outbound totals of a set of signed movement quantities
pub fn split_totals(deltas: impl IntoIterator<Item = Decimal>) -> (Decimal, Decimal) {
    deltas
        .into_iter()
        .fold((Decimal::ZERO, Decimal::ZERO), |(inbound, outbound), d| {
            if d >= Decimal::ZERO {
                (inbound + d, outbound)
            } else {
                (inbound, outbound - d)
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn inbound_movements_add() {
        let change = apply_manual_movement(MovementType::In, dec("10"), dec("2.5")).unwrap();
        assert_eq!(change.stock_after, dec("12.5"));
        let change = apply_manual_movement(MovementType::Return, dec("0"), dec("4")).unwrap();
        assert_eq!(change.delta, dec("4"));
    }

    #[test]
    fn out_requires_enough_stock() {
        let err = apply_manual_movement(MovementType::Out, dec("3"), dec("5")).unwrap_err();
        assert_eq!(
            err,
            StockError::Insufficient {
                available: dec("3"),
                requested: dec("5")
            }
        );
        let change = apply_manual_movement(MovementType::Out, dec("5"), dec("5")).unwrap();
        assert_eq!(change.stock_after, Decimal::ZERO);
        assert_eq!(change.delta, dec("-5"));
    }

    #[test]
    fn adjustment_sets_absolute_level() {
        let change = apply_manual_movement(MovementType::Adjustment, dec("40"), dec("32")).unwrap();
        assert_eq!(change.delta, dec("-8"));
        assert_eq!(change.stock_after, dec("32"));

        let change = apply_manual_movement(MovementType::Adjustment, dec("40"), dec("0")).unwrap();
        assert_eq!(change.stock_after, Decimal::ZERO);

        assert_eq!(
            apply_manual_movement(MovementType::Adjustment, dec("40"), dec("-1")),
            Err(StockError::NegativeTarget)
        );
    }

    #[test]
    fn zero_quantity_is_rejected() {
        assert_eq!(
            apply_manual_movement(MovementType::In, dec("1"), Decimal::ZERO),
            Err(StockError::NonPositiveQuantity)
        );
    }

    #[test]
    fn totals_split_by_sign() {
        let (inbound, outbound) = split_totals([dec("10"), dec("-4"), dec("2"), dec("-1.5")]);
        assert_eq!(inbound, dec("12"));
        assert_eq!(outbound, dec("5.5"));
    }
}
