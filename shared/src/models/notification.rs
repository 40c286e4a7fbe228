//! Notification models
//!
//! Notifications are an immutable record of state-transition messages. They
//! inform the counterparty; they are never central to correctness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UserRole;

/// Kind of event a notification announces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Placed,
    Accepted,
    Cancelled,
    Rejected,
    Invoiced,
    Verified,
    DisputeOpened,
    DisputeResolved,
    Reinvoice,
    ConnectionRequested,
    ConnectionAccepted,
    ConnectionRejected,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Placed => "placed",
            NotificationKind::Accepted => "accepted",
            NotificationKind::Cancelled => "cancelled",
            NotificationKind::Rejected => "rejected",
            NotificationKind::Invoiced => "invoiced",
            NotificationKind::Verified => "verified",
            NotificationKind::DisputeOpened => "dispute_opened",
            NotificationKind::DisputeResolved => "dispute_resolved",
            NotificationKind::Reinvoice => "reinvoice",
            NotificationKind::ConnectionRequested => "connection_requested",
            NotificationKind::ConnectionAccepted => "connection_accepted",
            NotificationKind::ConnectionRejected => "connection_rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "placed" => Some(NotificationKind::Placed),
            "accepted" => Some(NotificationKind::Accepted),
            "cancelled" => Some(NotificationKind::Cancelled),
            "rejected" => Some(NotificationKind::Rejected),
            "invoiced" => Some(NotificationKind::Invoiced),
            "verified" => Some(NotificationKind::Verified),
            "dispute_opened" => Some(NotificationKind::DisputeOpened),
            "dispute_resolved" => Some(NotificationKind::DisputeResolved),
            "reinvoice" => Some(NotificationKind::Reinvoice),
            "connection_requested" => Some(NotificationKind::ConnectionRequested),
            "connection_accepted" => Some(NotificationKind::ConnectionAccepted),
            "connection_rejected" => Some(NotificationKind::ConnectionRejected),
            _ => None,
        }
    }
}

/// A persisted notification addressed to one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role: UserRole,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationKind,
    pub related_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
