//! Business logic services for FishFlow Manager

pub mod audit;
pub mod auth;
pub mod client;
pub mod delivery;
pub mod document;
pub mod invoice;
pub mod order;
pub mod pdf;
pub mod product;
pub mod reporting;
pub mod stock;

pub use audit::AuditService;
pub use auth::AuthService;
pub use client::ClientService;
pub use delivery::DeliveryService;
pub use document::DocumentService;
pub use invoice::InvoiceService;
pub use order::OrderService;
pub use product::ProductService;
pub use reporting::ReportingService;
pub use stock::StockService;
