//! Product (fish) models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Unit recorded when none is given
pub const DEFAULT_UNIT: &str = "KG";

/// Products below this quantity show up in the "low stock" filter
pub const LOW_STOCK_QUANTITY: Decimal = Decimal::TEN;

/// Traffic-light stock status shown next to a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockLevel {
    OutOfStock,
    Low,
    Ok,
}

impl StockLevel {
    pub fn of(quantity: Decimal, alert_threshold: Decimal) -> Self {
        if quantity <= Decimal::ZERO {
            StockLevel::OutOfStock
        } else if quantity <= alert_threshold {
            StockLevel::Low
        } else {
            StockLevel::Ok
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StockLevel::OutOfStock => "OUT OF STOCK",
            StockLevel::Low => "LOW",
            StockLevel::Ok => "OK",
        }
    }
}

/// A product is in alert when its stock is at or below its threshold
pub fn is_in_alert(quantity: Decimal, alert_threshold: Decimal) -> bool {
    quantity <= alert_threshold
}

/// Value of the stock on hand, rounded to cents
pub fn stock_value(quantity: Decimal, unit_price: Decimal) -> Decimal {
    (quantity * unit_price).round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn stock_level_thresholds() {
        assert_eq!(StockLevel::of(dec("0"), dec("5")), StockLevel::OutOfStock);
        assert_eq!(StockLevel::of(dec("-1"), dec("5")), StockLevel::OutOfStock);
        assert_eq!(StockLevel::of(dec("5"), dec("5")), StockLevel::Low);
        assert_eq!(StockLevel::of(dec("5.01"), dec("5")), StockLevel::Ok);
    }

    #[test]
    fn alert_includes_threshold() {
        assert!(is_in_alert(dec("10"), dec("10")));
        assert!(!is_in_alert(dec("10.5"), dec("10")));
    }

    #[test]
    fn stock_value_rounds_to_cents() {
        assert_eq!(stock_value(dec("12.5"), dec("3.333")), dec("41.66"));
    }
}
