//! Shared types and business rules for FishFlow Manager
//!
//! Everything in this crate is free of I/O: the backend loads rows, hands
//! them to the rules defined here, and persists whatever they decide.

#[macro_use]
pub mod types;

pub mod models;
pub mod numbering;
pub mod reconciliation;
pub mod validation;

pub use models::*;
pub use numbering::*;
pub use reconciliation::*;
pub use types::*;
pub use validation::*;
