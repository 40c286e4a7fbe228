//! HTTP handlers
//!
//! Thin translation layer between axum and the services: extract identity
//! and payload, call the service, wrap the result.

pub mod auth;
pub mod billing;
pub mod connection;
pub mod health;
pub mod notification;
pub mod order;
pub mod stock;
pub mod verification;

pub use auth::*;
pub use billing::*;
pub use connection::*;
pub use health::*;
pub use notification::*;
pub use order::*;
pub use stock::*;
pub use verification::*;
