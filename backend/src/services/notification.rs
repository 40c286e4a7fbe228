//! Notification relay
//!
//! Every order/connection/dispute state transition persists exactly one
//! notification row for the counterparty. The row is written inside the same
//! transaction as the transition, so a committed transition has exactly one
//! notification and an aborted one has none. The real-time push to the
//! gateway happens after commit and is fire-and-forget: failures are logged
//! and swallowed, never retried, and never roll anything back.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use shared::models::{Notification, NotificationKind, UserRole};

/// Notification service for persisting and pushing notifications
#[derive(Clone)]
pub struct NotificationService {
    db: PgPool,
    push_client: Option<PushClient>,
}

/// Client for the real-time push gateway
#[derive(Clone)]
pub struct PushClient {
    gateway_url: String,
    signing_secret: String,
    http_client: reqwest::Client,
}

/// A notification about to be recorded
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub role: UserRole,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub related_id: Option<Uuid>,
}

/// Payload posted to the push gateway
#[derive(Debug, Serialize)]
struct PushPayload<'a> {
    channel: String,
    title: &'a str,
    message: &'a str,
    notification_type: &'a str,
    related_id: Option<Uuid>,
}

/// Database row for a notification
#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    role: String,
    title: String,
    message: String,
    notification_type: String,
    related_id: Option<Uuid>,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = AppError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let role = UserRole::from_str(&row.role)
            .ok_or_else(|| AppError::Internal(format!("Unknown role: {}", row.role)))?;
        let notification_type = NotificationKind::from_str(&row.notification_type).ok_or_else(
            || AppError::Internal(format!("Unknown notification type: {}", row.notification_type)),
        )?;
        Ok(Notification {
            id: row.id,
            user_id: row.user_id,
            role,
            title: row.title,
            message: row.message,
            notification_type,
            related_id: row.related_id,
            is_read: row.is_read,
            created_at: row.created_at,
        })
    }
}

impl PushClient {
    /// Create a new push gateway client
    pub fn new(gateway_url: String, signing_secret: String) -> Self {
        Self {
            gateway_url,
            signing_secret,
            http_client: reqwest::Client::new(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("PHL__PUSH__GATEWAY_URL").ok()?;
        if url.is_empty() {
            return None;
        }
        let secret = std::env::var("PHL__PUSH__SIGNING_SECRET").unwrap_or_default();
        Some(Self::new(url, secret))
    }

    /// POST a signed payload to the gateway
    async fn send(&self, payload: &PushPayload<'_>) -> Result<(), String> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| format!("Failed to serialize push payload: {}", e))?;
        let signature = self.sign(&body)?;

        let response = self
            .http_client
            .post(&self.gateway_url)
            .header("Content-Type", "application/json")
            .header("X-Push-Signature", signature)
            .body(body)
            .send()
            .await
            .map_err(|e| format!("Failed to reach push gateway: {}", e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("Push gateway returned {}", response.status()))
        }
    }

    /// HMAC-SHA256 signature of the request body, base64-encoded
    fn sign(&self, body: &[u8]) -> Result<String, String> {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.as_bytes())
            .map_err(|_| "Failed to create HMAC".to_string())?;
        mac.update(body);
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }
}

impl NotificationService {
    /// Create a new NotificationService instance
    pub fn new(db: PgPool) -> Self {
        Self {
            db,
            push_client: PushClient::from_env(),
        }
    }

    /// Create with explicit push client
    pub fn with_push_client(db: PgPool, push_client: PushClient) -> Self {
        Self {
            db,
            push_client: Some(push_client),
        }
    }

    // ========================================================================
    // Recording
    // ========================================================================

    /// Insert a notification inside the caller's transaction
    pub async fn notify_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        input: &NewNotification,
    ) -> AppResult<Notification> {
        let row = sqlx::query_as::<_, NotificationRow>(
            r#"
            INSERT INTO notifications (user_id, role, title, message, notification_type, related_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, role, title, message, notification_type, related_id,
                      is_read, created_at
            "#,
        )
        .bind(input.user_id)
        .bind(input.role.as_str())
        .bind(&input.title)
        .bind(&input.message)
        .bind(input.kind.as_str())
        .bind(input.related_id)
        .fetch_one(&mut **tx)
        .await?;

        row.try_into()
    }

    /// Insert a notification outside any transaction
    pub async fn notify(&self, input: &NewNotification) -> AppResult<Notification> {
        let mut tx = self.db.begin().await?;
        let notification = self.notify_in_tx(&mut tx, input).await?;
        tx.commit().await?;
        Ok(notification)
    }

    /// Best-effort real-time push for an already persisted notification.
    /// Never fails the caller.
    pub async fn push(&self, notification: &Notification) {
        let Some(client) = &self.push_client else {
            return;
        };

        let payload = PushPayload {
            channel: format!(
                "{}_{}",
                notification.role.as_str(),
                notification.user_id
            ),
            title: &notification.title,
            message: &notification.message,
            notification_type: notification.notification_type.as_str(),
            related_id: notification.related_id,
        };

        if let Err(e) = client.send(&payload).await {
            tracing::warn!(
                notification_id = %notification.id,
                "Push delivery failed: {}",
                e
            );
        }
    }

    // ========================================================================
    // Read Side
    // ========================================================================

    /// List notifications for a user, newest first
    pub async fn list(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
    ) -> AppResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, user_id, role, title, message, notification_type, related_id,
                   is_read, created_at
            FROM notifications
            WHERE user_id = $1 AND ($2 = false OR is_read = false)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Notification::try_from).collect()
    }

    /// Count unread notifications for a user
    pub async fn unread_count(&self, user_id: Uuid) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    /// Mark one notification as read
    pub async fn mark_read(&self, user_id: Uuid, notification_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = true WHERE id = $1 AND user_id = $2",
        )
        .bind(notification_id)
        .bind(user_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Notification".to_string()));
        }

        Ok(())
    }

    /// Mark all of a user's notifications as read, returning how many changed
    pub async fn mark_all_read(&self, user_id: Uuid) -> AppResult<i64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = true WHERE user_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() as i64)
    }
}
