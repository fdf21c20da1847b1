//! Validation utilities for FishFlow Manager
//!
//! Includes Morocco-specific checks for company identifiers.

use rust_decimal::Decimal;

// ============================================================================
// General Validations
// ============================================================================

/// Validate email format
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    if validator::validate_email(email) {
        Ok(())
    } else {
        Err("Invalid email format")
    }
}

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters");
    }
    Ok(())
}

/// Validate a password and its confirmation
pub fn validate_password_pair(password: &str, confirmation: &str) -> Result<(), &'static str> {
    validate_password(password)?;
    if password != confirmation {
        return Err("Passwords do not match");
    }
    Ok(())
}

/// Validate username (1-150 chars, letters, digits and @.+-_)
pub fn validate_username(username: &str) -> Result<(), &'static str> {
    let len = username.chars().count();
    if len == 0 || len > 150 {
        return Err("Username must be between 1 and 150 characters");
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        return Err("Username may only contain letters, digits and @/./+/-/_");
    }
    Ok(())
}

/// Validate international phone number: optional leading +, 8-15 digits,
/// spaces, dashes, dots and parentheses allowed as separators
pub fn validate_phone(phone: &str) -> Result<(), &'static str> {
    let body = phone.trim().strip_prefix('+').unwrap_or(phone.trim());
    if !body
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '.' | '(' | ')'))
    {
        return Err("Phone number contains invalid characters");
    }
    let digits = body.chars().filter(|c| c.is_ascii_digit()).count();
    if !(8..=15).contains(&digits) {
        return Err("Phone number must have 8 to 15 digits");
    }
    Ok(())
}

// ============================================================================
// Quantity and Price Validations
// ============================================================================

/// Validate that a quantity is strictly positive
pub fn validate_positive_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("Quantity must be greater than zero");
    }
    Ok(())
}

/// Validate that an amount is zero or more
pub fn validate_non_negative(amount: Decimal) -> Result<(), &'static str> {
    if amount < Decimal::ZERO {
        return Err("Amount cannot be negative");
    }
    Ok(())
}

/// Validate a percentage rate
pub fn validate_tax_rate(rate: Decimal) -> Result<(), &'static str> {
    if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
        return Err("Tax rate must be between 0 and 100");
    }
    Ok(())
}

// ============================================================================
// Morocco-Specific Validations
// ============================================================================

/// Validate ICE (Identifiant Commun de l'Entreprise): exactly 15 digits
pub fn validate_ice(ice: &str) -> Result<(), &'static str> {
    if ice.len() == 15 && ice.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err("ICE must be exactly 15 digits")
    }
}

/// Validate trade register number (RC): 1-20 digits, optionally followed
/// by a slash and a city code
pub fn validate_trade_register(rc: &str) -> Result<(), &'static str> {
    let number = rc.split('/').next().unwrap_or_default();
    if number.is_empty() || number.len() > 20 || !number.chars().all(|c| c.is_ascii_digit()) {
        return Err("Trade register number must start with 1 to 20 digits");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(validate_email("achats@pecheriesatlas.ma").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("a@").is_err());
    }

    #[test]
    fn password_pair_validation() {
        assert!(validate_password_pair("longenough", "longenough").is_ok());
        assert_eq!(validate_password_pair("short", "short"), Err("Password must be at least 8 characters"));
        assert_eq!(validate_password_pair("longenough", "different"), Err("Passwords do not match"));
    }

    #[test]
    fn username_validation() {
        assert!(validate_username("k.benali").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("with space").is_err());
    }

    #[test]
    fn phone_validation() {
        assert!(validate_phone("+212 522-123456").is_ok());
        assert!(validate_phone("0612345678").is_ok());
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("06x2345678").is_err());
    }

    #[test]
    fn ice_validation() {
        assert!(validate_ice("001525473000089").is_ok());
        assert!(validate_ice("00152547300008").is_err());
        assert!(validate_ice("00152547300008A").is_err());
    }

    #[test]
    fn trade_register_validation() {
        assert!(validate_trade_register("123456").is_ok());
        assert!(validate_trade_register("123456/CASA").is_ok());
        assert!(validate_trade_register("RC123").is_err());
    }

    #[test]
    fn quantity_validation() {
        assert!(validate_positive_quantity(Decimal::ONE).is_ok());
        assert!(validate_positive_quantity(Decimal::ZERO).is_err());
        assert!(validate_non_negative(Decimal::ZERO).is_ok());
        assert!(validate_tax_rate(Decimal::from(101)).is_err());
    }
}
