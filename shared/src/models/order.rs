//! Order lifecycle models

use rust_decimal::Decimal;
use thiserror::Error;

text_enum! {
    /// Trade direction of an order
    pub enum OrderType {
        Export => "export",
        Import => "import",
        Local => "local",
    }
}

impl OrderType {
    /// Export and local orders ship goods out of our stock
    pub fn ships_from_stock(&self) -> bool {
        matches!(self, OrderType::Export | OrderType::Local)
    }

    /// Upper-case label used in movement reasons and PDFs
    pub fn label(&self) -> &'static str {
        match self {
            OrderType::Export => "EXPORT",
            OrderType::Import => "IMPORT",
            OrderType::Local => "LOCAL",
        }
    }
}

text_enum! {
    /// Order status
    pub enum OrderStatus {
        Draft => "draft",
        Confirmed => "confirmed",
        Preparation => "preparation",
        Shipped => "shipped",
        Delivered => "delivered",
        Cancelled => "cancelled",
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Draft
    }
}

text_enum! {
    /// International commercial terms
    pub enum Incoterm {
        Exw => "EXW",
        Fob => "FOB",
        Cif => "CIF",
        Ddp => "DDP",
    }
}

/// Errors raised by the order status graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("order is {0} and can no longer change status")]
    Terminal(OrderStatus),

    #[error("order cannot move back from {from} to {to}")]
    Backward { from: OrderStatus, to: OrderStatus },

    #[error("a draft order must be confirmed before it can move to {0}")]
    NotConfirmed(OrderStatus),
}

impl OrderStatus {
    /// Position along Draft → Confirmed → Preparation → Shipped → Delivered.
    /// Cancelled sits outside the sequence.
    fn stage(&self) -> Option<u8> {
        match self {
            OrderStatus::Draft => Some(0),
            OrderStatus::Confirmed => Some(1),
            OrderStatus::Preparation => Some(2),
            OrderStatus::Shipped => Some(3),
            OrderStatus::Delivered => Some(4),
            OrderStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Statuses in which stock has been committed to the order
    pub fn holds_stock(&self) -> bool {
        matches!(
            self,
            OrderStatus::Confirmed | OrderStatus::Preparation | OrderStatus::Shipped
        )
    }

    /// Order lines can only be edited before confirmation
    pub fn lines_editable(&self) -> bool {
        *self == OrderStatus::Draft
    }

    /// Check that `self → to` is allowed. Same-status requests are
    /// accepted here and treated as no-ops by callers.
    pub fn check_transition(&self, to: OrderStatus) -> Result<(), TransitionError> {
        if *self == to {
            return Ok(());
        }
        if self.is_terminal() {
            return Err(TransitionError::Terminal(*self));
        }
        if to == OrderStatus::Cancelled {
            return Ok(());
        }
        match (self.stage(), to.stage()) {
            (Some(0), Some(t)) if t > 1 => Err(TransitionError::NotConfirmed(to)),
            (Some(f), Some(t)) if t > f => Ok(()),
            _ => Err(TransitionError::Backward { from: *self, to }),
        }
    }
}

/// Total of one order line
pub fn line_total(quantity: Decimal, unit_price: Decimal) -> Decimal {
    (quantity * unit_price).round_dp(2)
}

/// Total of an order: sum of its line totals
pub fn order_total<'a>(line_totals: impl IntoIterator<Item = &'a Decimal>) -> Decimal {
    line_totals.into_iter().sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn forward_moves_are_allowed() {
        assert!(Draft.check_transition(Confirmed).is_ok());
        assert!(Confirmed.check_transition(Preparation).is_ok());
        assert!(Confirmed.check_transition(Delivered).is_ok());
        assert!(Shipped.check_transition(Delivered).is_ok());
    }

    #[test]
    fn draft_must_be_confirmed_first() {
        assert_eq!(
            Draft.check_transition(Shipped),
            Err(TransitionError::NotConfirmed(Shipped))
        );
        assert!(Draft.check_transition(Cancelled).is_ok());
    }

    #[test]
    fn backward_and_terminal_moves_are_rejected() {
        assert!(matches!(
            Shipped.check_transition(Confirmed),
            Err(TransitionError::Backward { .. })
        ));
        assert!(matches!(
            Confirmed.check_transition(Draft),
            Err(TransitionError::Backward { .. })
        ));
        assert_eq!(
            Delivered.check_transition(Cancelled),
            Err(TransitionError::Terminal(Delivered))
        );
        assert_eq!(
            Cancelled.check_transition(Confirmed),
            Err(TransitionError::Terminal(Cancelled))
        );
    }

    #[test]
    fn same_status_is_accepted() {
        for s in OrderStatus::ALL {
            assert!(s.check_transition(*s).is_ok());
        }
    }

    #[test]
    fn unknown_status_text_is_rejected() {
        let err = "archived".parse::<OrderStatus>().unwrap_err();
        assert_eq!(err.kind, "OrderStatus");
    }

    #[test]
    fn line_totals_sum() {
        let a = line_total("12.5".parse().unwrap(), "40".parse().unwrap());
        let b = line_total("3".parse().unwrap(), "19.99".parse().unwrap());
        assert_eq!(order_total([&a, &b]), "559.97".parse::<Decimal>().unwrap());
    }
}
