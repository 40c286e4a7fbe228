//! Order aggregate models
//!
//! An order is a retailer's request for product quantities from one
//! distributor. Orders are pooled: no batch is bound at creation, specific
//! batches are allocated at invoicing time.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Confirmed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "processing" => Some(OrderStatus::Processing),
            "confirmed" => Some(OrderStatus::Confirmed),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether a transition to `to` is permitted. Transitions are forward
    /// only, except the dispute reinvoice path which reopens a confirmed
    /// order for a fresh billing cycle.
    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        matches!(
            (self, to),
            (OrderStatus::Pending, OrderStatus::Processing)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Processing, OrderStatus::Confirmed)
                | (OrderStatus::Confirmed, OrderStatus::Processing)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled)
    }

    /// Whether a dispute resolution can reopen this order for a fresh
    /// billing cycle. A verified order is settled: the retailer's stock was
    /// already credited, so re-billing it would spend distributor stock a
    /// second time.
    pub fn can_reopen_for_billing(&self, is_verified: bool) -> bool {
        !is_verified && self.can_transition_to(OrderStatus::Processing)
    }
}

/// Where an order came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSource {
    /// Placed by a retailer against pooled stock; batches bound at invoicing
    Retailer,
    /// Entered by the distributor with batches named up front
    Manual,
}

impl OrderSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSource::Retailer => "retailer",
            OrderSource::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "retailer" => Some(OrderSource::Retailer),
            "manual" => Some(OrderSource::Manual),
            _ => None,
        }
    }

    /// Whether the billing engine still has to bind batches to line items.
    /// Manual orders are born with their batches allocated.
    pub fn needs_allocation(&self) -> bool {
        matches!(self, OrderSource::Retailer)
    }
}

/// An order between a retailer and a distributor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub retailer_id: Uuid,
    pub distributor_id: Uuid,
    pub source: OrderSource,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub total_items: i32,
    pub is_verified: bool,
    pub invoice_number: Option<String>,
    pub reject_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line item of an order. Batch fields stay NULL until invoicing binds a
/// specific batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_code: String,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
    pub total_price: Decimal,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// An order together with its line items
#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}
