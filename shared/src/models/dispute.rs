//! Dispute models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What went wrong with a delivered order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Shortage,
    Expired,
    WrongBatch,
    Damaged,
    Other,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Shortage => "shortage",
            IssueType::Expired => "expired",
            IssueType::WrongBatch => "wrong_batch",
            IssueType::Damaged => "damaged",
            IssueType::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "shortage" => Some(IssueType::Shortage),
            "expired" => Some(IssueType::Expired),
            "wrong_batch" => Some(IssueType::WrongBatch),
            "damaged" => Some(IssueType::Damaged),
            "other" => Some(IssueType::Other),
            _ => None,
        }
    }
}

/// Status of a dispute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisputeStatus {
    Open,
    Resolved,
    Rejected,
}

impl DisputeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeStatus::Open => "open",
            DisputeStatus::Resolved => "resolved",
            DisputeStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(DisputeStatus::Open),
            "resolved" => Some(DisputeStatus::Resolved),
            "rejected" => Some(DisputeStatus::Rejected),
            _ => None,
        }
    }
}

/// A dispute raised by a retailer against a confirmed order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    pub id: Uuid,
    pub order_id: Uuid,
    pub order_item_id: Option<Uuid>,
    pub raised_by: Uuid,
    pub issue_type: IssueType,
    pub description: String,
    pub status: DisputeStatus,
    pub resolution_notes: Option<String>,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
