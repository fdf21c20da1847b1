//! Domain models for FishFlow Manager

mod audit;
mod client;
mod document;
mod invoice;
mod logistics;
mod order;
mod product;
mod stock;
mod user;

pub use audit::*;
pub use client::*;
pub use document::*;
pub use invoice::*;
pub use logistics::*;
pub use order::*;
pub use product::*;
pub use stock::*;
pub use user::*;
