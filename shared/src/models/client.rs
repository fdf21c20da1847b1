//! Client (buyer / supplier) models

text_enum! {
    /// Whether the company buys from us or sells to us
    pub enum ClientRole {
        Buyer => "buyer",
        Supplier => "supplier",
    }
}

/// Country recorded when none is given
pub const DEFAULT_COUNTRY: &str = "Morocco";

/// Label used in country breakdowns for clients without a country
pub const UNSPECIFIED_COUNTRY: &str = "Unspecified";
