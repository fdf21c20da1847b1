//! Invoice models and amount computation

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// VAT rate applied when none is given, in percent
pub const DEFAULT_TAX_RATE: Decimal = Decimal::from_parts(20, 0, 0, false, 0);

/// Days between issue and due date when none is given
pub const DEFAULT_DUE_DAYS: i64 = 30;

text_enum! {
    /// How the client pays
    pub enum PaymentMethod {
        Card => "card",
        Transfer => "transfer",
        Cheque => "cheque",
        Cash => "cash",
    }
}

impl PaymentMethod {
    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "Bank card",
            PaymentMethod::Transfer => "Bank transfer",
            PaymentMethod::Cheque => "Cheque",
            PaymentMethod::Cash => "Cash",
        }
    }
}

text_enum! {
    /// Invoice status
    pub enum InvoiceStatus {
        Draft => "draft",
        Issued => "issued",
        Sent => "sent",
        Paid => "paid",
        Cancelled => "cancelled",
    }
}

impl InvoiceStatus {
    /// Issued or sent but not yet paid
    pub fn is_unpaid(&self) -> bool {
        matches!(self, InvoiceStatus::Issued | InvoiceStatus::Sent)
    }

    fn rank(&self) -> u8 {
        match self {
            InvoiceStatus::Draft => 0,
            InvoiceStatus::Issued => 1,
            InvoiceStatus::Sent => 2,
            InvoiceStatus::Paid => 3,
            InvoiceStatus::Cancelled => 4,
        }
    }

    pub fn check_transition(&self, to: InvoiceStatus) -> Result<(), InvoiceError> {
        let allowed = match (self, to) {
            (from, to) if *from == to => true,
            (InvoiceStatus::Paid | InvoiceStatus::Cancelled, _) => false,
            (_, InvoiceStatus::Cancelled) => true,
            (from, to) => to.rank() > from.rank(),
        };
        if allowed {
            Ok(())
        } else {
            Err(InvoiceError::Transition { from: *self, to })
        }
    }
}

/// Errors raised by invoice rules
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvoiceError {
    #[error("tax rate must be between 0 and 100")]
    TaxRateOutOfRange,

    #[error("invoice amount cannot be negative")]
    NegativeAmount,

    #[error("invoice cannot move from {from} to {to}")]
    Transition {
        from: InvoiceStatus,
        to: InvoiceStatus,
    },
}

/// Amounts printed on an invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceAmounts {
    pub amount_excl_tax: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub amount_incl_tax: Decimal,
}

impl InvoiceAmounts {
    /// Tax is `amount × rate / 100`, rounded to cents
    pub fn compute(amount_excl_tax: Decimal, tax_rate: Decimal) -> Result<Self, InvoiceError> {
        if tax_rate < Decimal::ZERO || tax_rate > Decimal::ONE_HUNDRED {
            return Err(InvoiceError::TaxRateOutOfRange);
        }
        if amount_excl_tax < Decimal::ZERO {
            return Err(InvoiceError::NegativeAmount);
        }
        let amount_excl_tax = amount_excl_tax.round_dp(2);
        let tax_amount = (amount_excl_tax * tax_rate / Decimal::ONE_HUNDRED).round_dp(2);
        Ok(Self {
            amount_excl_tax,
            tax_rate,
            tax_amount,
            amount_incl_tax: amount_excl_tax + tax_amount,
        })
    }
}

/// Due date when the user leaves it blank
pub fn default_due_date(issued_at: DateTime<Utc>, due_days: i64) -> DateTime<Utc> {
    issued_at + Duration::days(due_days.max(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn default_rate_is_twenty_percent() {
        assert_eq!(DEFAULT_TAX_RATE, dec("20"));
        let amounts = InvoiceAmounts::compute(dec("1000"), DEFAULT_TAX_RATE).unwrap();
        assert_eq!(amounts.tax_amount, dec("200"));
        assert_eq!(amounts.amount_incl_tax, dec("1200"));
    }

    #[test]
    fn tax_is_rounded_to_cents() {
        let amounts = InvoiceAmounts::compute(dec("99.99"), dec("7")).unwrap();
        assert_eq!(amounts.tax_amount, dec("7.00"));
        assert_eq!(amounts.amount_incl_tax, dec("106.99"));
    }

    #[test]
    fn rate_out_of_range_is_rejected() {
        assert_eq!(
            InvoiceAmounts::compute(dec("10"), dec("120")),
            Err(InvoiceError::TaxRateOutOfRange)
        );
        assert_eq!(
            InvoiceAmounts::compute(dec("10"), dec("-1")),
            Err(InvoiceError::TaxRateOutOfRange)
        );
    }

    #[test]
    fn invoice_status_moves_forward() {
        use InvoiceStatus::*;
        assert!(Draft.check_transition(Issued).is_ok());
        assert!(Issued.check_transition(Paid).is_ok());
        assert!(Sent.check_transition(Cancelled).is_ok());
        assert!(Sent.check_transition(Issued).is_err());
        assert!(Paid.check_transition(Cancelled).is_err());
        assert!(Cancelled.check_transition(Draft).is_err());
    }

    #[test]
    fn due_date_defaults_to_thirty_days() {
        let issued = Utc::now();
        assert_eq!((default_due_date(issued, DEFAULT_DUE_DAYS) - issued).num_days(), 30);
        assert_eq!(default_due_date(issued, -5), issued);
    }
}
