//! Connection management service
//!
//! A connection is the approved retailer-distributor relationship that gates
//! catalog visibility and order placement. Retailers request, distributors
//! accept or reject.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::notification::{NewNotification, NotificationService};
use shared::models::{
    Connection, ConnectionStatus, ConnectionWithParty, NotificationKind, UserProfile, UserRole,
};

/// Connection service
#[derive(Clone)]
pub struct ConnectionService {
    db: PgPool,
    notifications: NotificationService,
}

/// Input for requesting a connection
#[derive(Debug, Deserialize)]
pub struct RequestConnectionInput {
    pub distributor_id: Uuid,
}

/// Input for responding to a connection request
#[derive(Debug, Deserialize)]
pub struct RespondConnectionInput {
    pub accept: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct ConnectionRow {
    id: Uuid,
    retailer_id: Uuid,
    distributor_id: Uuid,
    status: String,
    requested_at: DateTime<Utc>,
    responded_at: Option<DateTime<Utc>>,
}

impl TryFrom<ConnectionRow> for Connection {
    type Error = AppError;

    fn try_from(row: ConnectionRow) -> Result<Self, Self::Error> {
        let status = ConnectionStatus::from_str(&row.status)
            .ok_or_else(|| AppError::Internal(format!("Unknown connection status: {}", row.status)))?;
        Ok(Connection {
            id: row.id,
            retailer_id: row.retailer_id,
            distributor_id: row.distributor_id,
            status,
            requested_at: row.requested_at,
            responded_at: row.responded_at,
        })
    }
}

impl ConnectionService {
    /// Create a new ConnectionService instance
    pub fn new(db: PgPool) -> Self {
        let notifications = NotificationService::new(db.clone());
        Self { db, notifications }
    }

    /// Directory of active distributors a retailer can connect to
    pub async fn list_distributors(&self) -> AppResult<Vec<UserProfile>> {
        let rows = sqlx::query_as::<_, (Uuid, String, String, Option<String>, Option<String>)>(
            r#"
            SELECT id, name, business_name, phone, address
            FROM users
            WHERE role = 'distributor' AND is_active = true
            ORDER BY business_name
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, business_name, phone, address)| UserProfile {
                id,
                name,
                business_name,
                phone,
                address,
            })
            .collect())
    }

    /// Retailer requests a connection to a distributor
    pub async fn request_connection(
        &self,
        retailer_id: Uuid,
        input: RequestConnectionInput,
    ) -> AppResult<Connection> {
        // Target must be an active distributor
        let distributor = sqlx::query_scalar::<_, String>(
            "SELECT business_name FROM users WHERE id = $1 AND role = 'distributor' AND is_active = true",
        )
        .bind(input.distributor_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Distributor".to_string()))?;

        // A pending or accepted pair already exists
        let duplicate = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM connections
            WHERE retailer_id = $1 AND distributor_id = $2 AND status IN ('pending', 'accepted')
            "#,
        )
        .bind(retailer_id)
        .bind(input.distributor_id)
        .fetch_one(&self.db)
        .await?;

        if duplicate > 0 {
            return Err(AppError::Conflict {
                resource: "connection".to_string(),
                message: format!("A connection with {} already exists", distributor),
            });
        }

        let retailer_business = sqlx::query_scalar::<_, String>(
            "SELECT business_name FROM users WHERE id = $1",
        )
        .bind(retailer_id)
        .fetch_one(&self.db)
        .await?;

        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, ConnectionRow>(
            r#"
            INSERT INTO connections (retailer_id, distributor_id, status)
            VALUES ($1, $2, 'pending')
            RETURNING id, retailer_id, distributor_id, status, requested_at, responded_at
            "#,
        )
        .bind(retailer_id)
        .bind(input.distributor_id)
        .fetch_one(&mut *tx)
        .await?;

        let notification = self
            .notifications
            .notify_in_tx(
                &mut tx,
                &NewNotification {
                    user_id: input.distributor_id,
                    role: UserRole::Distributor,
                    title: "New connection request".to_string(),
                    message: format!("{} wants to connect with you", retailer_business),
                    kind: NotificationKind::ConnectionRequested,
                    related_id: Some(row.id),
                },
            )
            .await?;

        tx.commit().await?;

        self.notifications.push(&notification).await;

        row.try_into()
    }

    /// Connections of a retailer, with the distributor's details
    pub async fn list_for_retailer(&self, retailer_id: Uuid) -> AppResult<Vec<ConnectionWithParty>> {
        self.list_with_party(retailer_id, UserRole::Retailer).await
    }

    /// Connection requests a distributor received, with the retailer's details
    pub async fn list_for_distributor(
        &self,
        distributor_id: Uuid,
    ) -> AppResult<Vec<ConnectionWithParty>> {
        self.list_with_party(distributor_id, UserRole::Distributor)
            .await
    }

    async fn list_with_party(
        &self,
        user_id: Uuid,
        side: UserRole,
    ) -> AppResult<Vec<ConnectionWithParty>> {
        let (own_column, party_column) = match side {
            UserRole::Retailer => ("retailer_id", "distributor_id"),
            UserRole::Distributor => ("distributor_id", "retailer_id"),
        };

        let sql = format!(
            r#"
            SELECT c.id, c.retailer_id, c.distributor_id, c.status, c.requested_at,
                   c.responded_at, u.name, u.business_name
            FROM connections c
            JOIN users u ON u.id = c.{party}
            WHERE c.{own} = $1
            ORDER BY c.requested_at DESC
            "#,
            party = party_column,
            own = own_column,
        );

        let rows = sqlx::query_as::<
            _,
            (
                Uuid,
                Uuid,
                Uuid,
                String,
                DateTime<Utc>,
                Option<DateTime<Utc>>,
                String,
                String,
            ),
        >(&sql)
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(
                |(id, retailer_id, distributor_id, status, requested_at, responded_at, name, business)| {
                    let connection = Connection {
                        id,
                        retailer_id,
                        distributor_id,
                        status: ConnectionStatus::from_str(&status).ok_or_else(|| {
                            AppError::Internal(format!("Unknown connection status: {}", status))
                        })?,
                        requested_at,
                        responded_at,
                    };
                    Ok(ConnectionWithParty {
                        connection,
                        party_name: name,
                        party_business_name: business,
                    })
                },
            )
            .collect()
    }

    /// Distributor accepts or rejects a pending request
    pub async fn respond(
        &self,
        distributor_id: Uuid,
        connection_id: Uuid,
        input: RespondConnectionInput,
    ) -> AppResult<Connection> {
        let new_status = if input.accept {
            ConnectionStatus::Accepted
        } else {
            ConnectionStatus::Rejected
        };

        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, ConnectionRow>(
            r#"
            UPDATE connections
            SET status = $3, responded_at = NOW()
            WHERE id = $1 AND distributor_id = $2 AND status = 'pending'
            RETURNING id, retailer_id, distributor_id, status, requested_at, responded_at
            "#,
        )
        .bind(connection_id)
        .bind(distributor_id)
        .bind(new_status.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Connection request".to_string()))?;

        let distributor_business = sqlx::query_scalar::<_, String>(
            "SELECT business_name FROM users WHERE id = $1",
        )
        .bind(distributor_id)
        .fetch_one(&mut *tx)
        .await?;

        let (title, message, kind) = if input.accept {
            (
                "Connection accepted",
                format!("{} accepted your connection request", distributor_business),
                NotificationKind::ConnectionAccepted,
            )
        } else {
            (
                "Connection rejected",
                format!("{} rejected your connection request", distributor_business),
                NotificationKind::ConnectionRejected,
            )
        };

        let notification = self
            .notifications
            .notify_in_tx(
                &mut tx,
                &NewNotification {
                    user_id: row.retailer_id,
                    role: UserRole::Retailer,
                    title: title.to_string(),
                    message,
                    kind,
                    related_id: Some(row.id),
                },
            )
            .await?;

        tx.commit().await?;

        self.notifications.push(&notification).await;

        row.try_into()
    }

    /// Whether an accepted connection exists between the pair
    pub async fn is_connected(&self, retailer_id: Uuid, distributor_id: Uuid) -> AppResult<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM connections
            WHERE retailer_id = $1 AND distributor_id = $2 AND status = 'accepted'
            "#,
        )
        .bind(retailer_id)
        .bind(distributor_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count > 0)
    }
}
