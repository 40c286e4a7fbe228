//! Business logic services for PharmaLink
//!
//! Each service owns a database pool clone and exposes the operations for
//! one slice of the domain. Handlers construct them per request.

pub mod auth;
pub mod billing;
pub mod connection;
pub mod notification;
pub mod order;
pub mod stock;
pub mod verification;

pub use auth::AuthService;
pub use billing::BillingService;
pub use connection::ConnectionService;
pub use notification::NotificationService;
pub use order::OrderService;
pub use stock::StockService;
pub use verification::VerificationService;
