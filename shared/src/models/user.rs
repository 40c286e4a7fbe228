//! User account models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of an account, deciding which side of the supply chain it sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Distributor,
    Retailer,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Distributor => "distributor",
            UserRole::Retailer => "retailer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "distributor" => Some(UserRole::Distributor),
            "retailer" => Some(UserRole::Retailer),
            _ => None,
        }
    }

    /// The other side of a retailer-distributor pair
    pub fn counterparty(&self) -> Self {
        match self {
            UserRole::Distributor => UserRole::Retailer,
            UserRole::Retailer => UserRole::Distributor,
        }
    }
}

/// A user account on the platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub business_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public profile shown to the counterparty (directory listings)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub business_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}
