//! Domain models for PharmaLink

mod connection;
mod dispute;
mod notification;
mod order;
mod stock;
mod user;

pub use connection::*;
pub use dispute::*;
pub use notification::*;
pub use order::*;
pub use stock::*;
pub use user::*;
