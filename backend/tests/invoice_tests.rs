//! Invoicing tests
//!
//! Tax computation, the invoice status graph and reference numbers.

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    default_due_date, line_total, order_total, InvoiceAmounts, InvoiceError, InvoiceStatus,
    NumberPrefix, DEFAULT_TAX_RATE,
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
    use chrono::{TimeZone, Utc};

    #[test]
    fn invoice_total_follows_order_lines() {
        let totals = [
            line_total(dec("120"), dec("45.50")),
            line_total(dec("12.5"), dec("80")),
        ];
        let amount = order_total(totals.iter());
        assert_eq!(amount, dec("6460"));

        let amounts = InvoiceAmounts::compute(amount, DEFAULT_TAX_RATE).unwrap();
        assert_eq!(amounts.tax_amount, dec("1292"));
        assert_eq!(amounts.amount_incl_tax, dec("7752"));
    }

    #[test]
    fn zero_rate_invoices_have_no_tax() {
        let amounts = InvoiceAmounts::compute(dec("850.40"), Decimal::ZERO).unwrap();
        assert_eq!(amounts.tax_amount, Decimal::ZERO);
        assert_eq!(amounts.amount_incl_tax, dec("850.40"));
    }

    #[test]
    fn negative_amounts_are_rejected() {
        assert_eq!(
            InvoiceAmounts::compute(dec("-1"), DEFAULT_TAX_RATE),
            Err(InvoiceError::NegativeAmount)
        );
    }

    #[test]
    fn paid_invoices_are_unpaid_no_more() {
        assert!(InvoiceStatus::Issued.is_unpaid());
        assert!(InvoiceStatus::Sent.is_unpaid());
        assert!(!InvoiceStatus::Paid.is_unpaid());
        assert!(!InvoiceStatus::Draft.is_unpaid());
    }

    #[test]
    fn due_date_uses_configured_days() {
        let issued = Utc.with_ymd_and_hms(2024, 1, 31, 10, 0, 0).unwrap();
        let due = default_due_date(issued, 45);
        assert_eq!(due, Utc.with_ymd_and_hms(2024, 3, 16, 10, 0, 0).unwrap());
    }

    #[test]
    fn invoice_numbers_use_fac_prefix() {
        let at = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        let number = NumberPrefix::Invoice.generate(at);
        assert!(number.starts_with("FAC20241231235959"));
        assert_eq!(number.len(), "FAC".len() + 17);
    }

    #[test]
    fn status_strings_parse() {
        assert_eq!("paid".parse::<InvoiceStatus>().unwrap(), InvoiceStatus::Paid);
        assert!("settled".parse::<InvoiceStatus>().is_err());
    }
}

// ============================================================================
// Property Tests
// ============================================================================

/// Amounts in cents up to ten million
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..1_000_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

/// Rates with up to two decimals in [0, 100]
fn rate_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..=10_000).prop_map(|hundredths| Decimal::new(hundredths, 2))
}

fn status_strategy() -> impl Strategy<Value = InvoiceStatus> {
    prop::sample::select(InvoiceStatus::ALL.to_vec())
}

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #[test]
        fn total_is_amount_plus_tax(amount in amount_strategy(), rate in rate_strategy()) {
            let a = InvoiceAmounts::compute(amount, rate).unwrap();
            prop_assert_eq!(a.amount_incl_tax, a.amount_excl_tax + a.tax_amount);
            prop_assert!(a.tax_amount >= Decimal::ZERO);
            prop_assert!(a.tax_amount <= a.amount_excl_tax);
            prop_assert!(a.tax_amount.scale() <= 2);
        }

        #[test]
        fn tax_grows_with_rate(amount in amount_strategy(), r1 in rate_strategy(), r2 in rate_strategy()) {
            let (low, high) = if r1 <= r2 { (r1, r2) } else { (r2, r1) };
            let a = InvoiceAmounts::compute(amount, low).unwrap();
            let b = InvoiceAmounts::compute(amount, high).unwrap();
            prop_assert!(a.tax_amount <= b.tax_amount);
        }

        #[test]
        fn settled_invoices_are_final(from in status_strategy(), to in status_strategy()) {
            prop_assume!(from != to);
            let result = from.check_transition(to);
            if matches!(from, InvoiceStatus::Paid | InvoiceStatus::Cancelled) {
                prop_assert!(result.is_err());
            } else if to == InvoiceStatus::Cancelled {
                prop_assert!(result.is_ok());
            }
        }

        #[test]
        fn same_status_is_always_accepted(status in status_strategy()) {
            prop_assert!(status.check_transition(status).is_ok());
        }
    }
}
