//! Shared types and models for PharmaLink
//!
//! This crate contains domain models, common types, and pure business-rule
//! helpers shared between the backend and any future components.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
