//! Human-readable reference numbers for generated records

use chrono::{DateTime, Utc};

text_enum! {
    /// Prefix of each numbered record kind
    pub enum NumberPrefix {
        Client => "CLI",
        Product => "PROD",
        Order => "CMD",
        Invoice => "FAC",
        Delivery => "LIV",
    }
}

impl NumberPrefix {
    /// `{PREFIX}{YYYYmmddHHMMSS}{mmm}` in UTC
    pub fn generate(&self, at: DateTime<Utc>) -> String {
        format!("{}{}", self.as_str(), at.format("%Y%m%d%H%M%S%3f"))
    }

    pub fn generate_now(&self) -> String {
        self.generate(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn number_embeds_timestamp_with_millis() {
        let at = Utc.with_ymd_and_hms(2024, 5, 17, 9, 3, 7).unwrap()
            + chrono::Duration::milliseconds(42);
        assert_eq!(NumberPrefix::Order.generate(at), "CMD20240517090307042");
        assert_eq!(NumberPrefix::Invoice.generate(at), "FAC20240517090307042");
    }

    #[test]
    fn numbers_fit_column_width() {
        for prefix in NumberPrefix::ALL {
            assert!(prefix.generate_now().len() <= 30);
        }
    }
}
