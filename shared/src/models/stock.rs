//! Stock ledger models
//!
//! Stock is tracked at batch level: the same product can exist as several
//! manufactured lots with their own expiry dates and quantities. Distributor
//! and retailer warehouses are disjoint ledgers.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status label on a stock batch
pub const BATCH_STATUS_IN_STOCK: &str = "In Stock";
pub const BATCH_STATUS_OUT_OF_STOCK: &str = "Out of Stock";

/// A product master record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub product_code: String,
    pub name: String,
    pub manufacturer: Option<String>,
    /// Drug schedule (e.g. "H", "H1", "None")
    pub schedule: Option<String>,
}

/// A batch of stock held by a distributor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributorBatch {
    pub id: Uuid,
    pub distributor_id: Uuid,
    pub product_code: String,
    pub product_name: String,
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub current_stock: i32,
    /// Price to retailer
    pub ptr: Decimal,
    /// Price to stockist
    pub pts: Decimal,
    /// GST percentage
    pub tax_rate: Decimal,
    pub is_expired: bool,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A batch of stock held by a retailer, credited from verified orders or
/// entered directly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetailerBatch {
    pub id: Uuid,
    pub retailer_id: Uuid,
    pub product_code: String,
    pub product_name: String,
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub current_stock: i32,
    pub ptr: Decimal,
    pub pts: Decimal,
    pub tax_rate: Decimal,
    pub schedule: Option<String>,
    pub is_expired: bool,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-product aggregate availability shown to a connected retailer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub product_code: String,
    pub product_name: String,
    /// Sum of live (non-expired, in-stock) batch quantities
    pub available_quantity: i64,
    /// PTR of the earliest-expiring live batch, used as the order price
    pub ptr: Decimal,
    pub tax_rate: Decimal,
}
