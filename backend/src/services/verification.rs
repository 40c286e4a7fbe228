//! Delivery verification and disputes
//!
//! Verification is the retailer's acknowledgement that a confirmed order
//! arrived as invoiced. It flips is_verified, bulk-resolves any open disputes
//! and credits every line into the retailer's stock ledger, all in one
//! transaction. A second verification call finds nothing to verify and gets
//! a 404, so stock can never be credited twice.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::notification::{NewNotification, NotificationService};
use crate::services::order::{OrderItemRow, OrderRow, ORDER_COLUMNS, ORDER_ITEM_COLUMNS};
use crate::services::stock::StockService;
use shared::models::{
    Dispute, DisputeStatus, IssueType, NotificationKind, Order, OrderStatus, UserRole,
};

const AUTO_RESOLVE_NOTE: &str = "Resolved automatically on delivery verification";

/// Verification and dispute service
#[derive(Clone)]
pub struct VerificationService {
    db: PgPool,
    stock: StockService,
    notifications: NotificationService,
}

/// Input for raising a dispute
#[derive(Debug, Deserialize)]
pub struct CreateDisputeInput {
    pub order_id: Uuid,
    pub order_item_id: Option<Uuid>,
    pub issue_type: IssueType,
    pub description: String,
}

/// How the distributor settles a dispute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisputeAction {
    /// Close the dispute as settled
    Resolve,
    /// Close the dispute as declined
    Reject,
    /// Settle by reopening the order for a fresh billing cycle
    Reinvoice,
}

/// Input for resolving a dispute
#[derive(Debug, Deserialize)]
pub struct ResolveDisputeInput {
    pub action: DisputeAction,
    pub notes: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct DisputeRow {
    id: Uuid,
    order_id: Uuid,
    order_item_id: Option<Uuid>,
    raised_by: Uuid,
    issue_type: String,
    description: String,
    status: String,
    resolution_notes: Option<String>,
    resolved_by: Option<Uuid>,
    resolved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

const DISPUTE_COLUMNS: &str = "id, order_id, order_item_id, raised_by, issue_type, description, \
     status, resolution_notes, resolved_by, resolved_at, created_at";

impl TryFrom<DisputeRow> for Dispute {
    type Error = AppError;

    fn try_from(row: DisputeRow) -> Result<Self, Self::Error> {
        let issue_type = IssueType::from_str(&row.issue_type)
            .ok_or_else(|| AppError::Internal(format!("Unknown issue type: {}", row.issue_type)))?;
        let status = DisputeStatus::from_str(&row.status)
            .ok_or_else(|| AppError::Internal(format!("Unknown dispute status: {}", row.status)))?;
        Ok(Dispute {
            id: row.id,
            order_id: row.order_id,
            order_item_id: row.order_item_id,
            raised_by: row.raised_by,
            issue_type,
            description: row.description,
            status,
            resolution_notes: row.resolution_notes,
            resolved_by: row.resolved_by,
            resolved_at: row.resolved_at,
            created_at: row.created_at,
        })
    }
}

impl VerificationService {
    /// Create a new VerificationService instance
    pub fn new(db: PgPool) -> Self {
        let stock = StockService::new(db.clone());
        let notifications = NotificationService::new(db.clone());
        Self {
            db,
            stock,
            notifications,
        }
    }

    // ========================================================================
    // Verification
    // ========================================================================

    /// Verify a confirmed delivery: mark the order verified, auto-resolve its
    /// open disputes and credit every line into the retailer's stock, in one
    /// transaction. The is_verified flag is folded into the lookup, so
    /// verifying twice reads as not found.
    pub async fn verify_order(&self, retailer_id: Uuid, order_id: Uuid) -> AppResult<Order> {
        let mut tx = self.db.begin().await?;

        let order_row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            UPDATE orders SET is_verified = true, updated_at = NOW()
            WHERE id = $1 AND retailer_id = $2 AND status = 'confirmed'
              AND is_verified = false
            RETURNING {ORDER_COLUMNS}
            "#,
        ))
        .bind(order_id)
        .bind(retailer_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Verifiable order".to_string()))?;

        let order: Order = order_row.try_into()?;

        sqlx::query(
            r#"
            UPDATE disputes
            SET status = 'resolved', resolution_notes = $2, resolved_by = $3,
                resolved_at = NOW()
            WHERE order_id = $1 AND status = 'open'
            "#,
        )
        .bind(order_id)
        .bind(AUTO_RESOLVE_NOTE)
        .bind(retailer_id)
        .execute(&mut *tx)
        .await?;

        let items = sqlx::query_as::<_, OrderItemRow>(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = $1",
        ))
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await?;

        for item in &items {
            // Confirmed orders always carry bound batches; a hole here means
            // the order never went through invoicing and must not credit.
            let batch_number = item.batch_number.as_deref().ok_or_else(|| {
                AppError::Internal(format!(
                    "Order item {} of {} has no batch binding",
                    item.id, order.order_number
                ))
            })?;
            let expiry_date = item.expiry_date.ok_or_else(|| {
                AppError::Internal(format!(
                    "Order item {} of {} has no expiry date",
                    item.id, order.order_number
                ))
            })?;

            self.stock
                .credit_retailer_batch(
                    &mut tx,
                    retailer_id,
                    &item.product_code,
                    &item.product_name,
                    batch_number,
                    expiry_date,
                    item.quantity,
                    item.unit_price,
                    item.tax_rate,
                )
                .await?;
        }

        let notification = self
            .notifications
            .notify_in_tx(
                &mut tx,
                &NewNotification {
                    user_id: order.distributor_id,
                    role: UserRole::Distributor,
                    title: "Delivery verified".to_string(),
                    message: format!("Order {} was verified by the retailer", order.order_number),
                    kind: NotificationKind::Verified,
                    related_id: Some(order_id),
                },
            )
            .await?;

        tx.commit().await?;

        self.notifications.push(&notification).await;

        Ok(Order {
            is_verified: true,
            ..order
        })
    }

    // ========================================================================
    // Disputes
    // ========================================================================

    /// Retailer raises a dispute against one of their confirmed orders.
    /// Verified orders are settled and cannot be disputed; they read as not
    /// found, the same as a foreign order.
    pub async fn create_dispute(
        &self,
        retailer_id: Uuid,
        input: CreateDisputeInput,
    ) -> AppResult<Dispute> {
        if input.description.trim().is_empty() {
            return Err(AppError::Validation {
                field: "description".to_string(),
                message: "A description is required".to_string(),
            });
        }

        let order_row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE id = $1 AND retailer_id = $2 AND status = 'confirmed'
              AND is_verified = false
            "#,
        ))
        .bind(input.order_id)
        .bind(retailer_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        let order: Order = order_row.try_into()?;

        if let Some(item_id) = input.order_item_id {
            let belongs = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM order_items WHERE id = $1 AND order_id = $2",
            )
            .bind(item_id)
            .bind(input.order_id)
            .fetch_one(&self.db)
            .await?;

            if belongs == 0 {
                return Err(AppError::ValidationError(
                    "Order item does not belong to this order".to_string(),
                ));
            }
        }

        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, DisputeRow>(&format!(
            r#"
            INSERT INTO disputes (order_id, order_item_id, raised_by, issue_type, description, status)
            VALUES ($1, $2, $3, $4, $5, 'open')
            RETURNING {DISPUTE_COLUMNS}
            "#,
        ))
        .bind(input.order_id)
        .bind(input.order_item_id)
        .bind(retailer_id)
        .bind(input.issue_type.as_str())
        .bind(input.description.trim())
        .fetch_one(&mut *tx)
        .await?;

        let notification = self
            .notifications
            .notify_in_tx(
                &mut tx,
                &NewNotification {
                    user_id: order.distributor_id,
                    role: UserRole::Distributor,
                    title: "Dispute raised".to_string(),
                    message: format!(
                        "A {} dispute was raised on order {}",
                        input.issue_type.as_str(),
                        order.order_number
                    ),
                    kind: NotificationKind::DisputeOpened,
                    related_id: Some(row.id),
                },
            )
            .await?;

        tx.commit().await?;

        self.notifications.push(&notification).await;

        row.try_into()
    }

    /// Distributor settles an open dispute. The reinvoice action additionally
    /// reopens the parent order for a fresh billing cycle.
    pub async fn resolve_dispute(
        &self,
        distributor_id: Uuid,
        dispute_id: Uuid,
        input: ResolveDisputeInput,
    ) -> AppResult<Dispute> {
        let dispute_row = sqlx::query_as::<_, DisputeRow>(&format!(
            "SELECT {DISPUTE_COLUMNS} FROM disputes WHERE id = $1",
        ))
        .bind(dispute_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Dispute".to_string()))?;

        let order_row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1",
        ))
        .bind(dispute_row.order_id)
        .fetch_one(&self.db)
        .await?;

        let order: Order = order_row.try_into()?;

        if order.distributor_id != distributor_id {
            return Err(AppError::Forbidden(
                "This dispute belongs to another distributor".to_string(),
            ));
        }

        if dispute_row.status != DisputeStatus::Open.as_str() {
            return Err(AppError::ValidationError(
                "Dispute is already settled".to_string(),
            ));
        }

        let new_status = match input.action {
            DisputeAction::Resolve | DisputeAction::Reinvoice => DisputeStatus::Resolved,
            DisputeAction::Reject => DisputeStatus::Rejected,
        };

        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, DisputeRow>(&format!(
            r#"
            UPDATE disputes
            SET status = $2, resolution_notes = $3, resolved_by = $4, resolved_at = NOW()
            WHERE id = $1 AND status = 'open'
            RETURNING {DISPUTE_COLUMNS}
            "#,
        ))
        .bind(dispute_id)
        .bind(new_status.as_str())
        .bind(input.notes.as_deref().map(str::trim))
        .bind(distributor_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Dispute".to_string()))?;

        let reopened = if input.action == DisputeAction::Reinvoice {
            if !order.status.can_reopen_for_billing(order.is_verified) {
                return Err(AppError::ValidationError(format!(
                    "Order {} cannot be reopened for billing (order is {}{})",
                    order.order_number,
                    order.status.as_str(),
                    if order.is_verified { ", verified" } else { "" }
                )));
            }

            sqlx::query(
                r#"
                UPDATE orders SET status = 'processing', updated_at = NOW()
                WHERE id = $1 AND status = 'confirmed' AND is_verified = false
                "#,
            )
            .bind(order.id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
                == 1
        } else {
            false
        };

        let (title, message, kind) = if reopened {
            (
                "Order reopened for billing",
                format!(
                    "Order {} will be re-invoiced following your dispute",
                    order.order_number
                ),
                NotificationKind::Reinvoice,
            )
        } else {
            (
                "Dispute settled",
                format!(
                    "Your dispute on order {} was {}",
                    order.order_number,
                    new_status.as_str()
                ),
                NotificationKind::DisputeResolved,
            )
        };

        let notification = self
            .notifications
            .notify_in_tx(
                &mut tx,
                &NewNotification {
                    user_id: order.retailer_id,
                    role: UserRole::Retailer,
                    title: title.to_string(),
                    message,
                    kind,
                    related_id: Some(dispute_id),
                },
            )
            .await?;

        tx.commit().await?;

        self.notifications.push(&notification).await;

        row.try_into()
    }

    /// Disputes a retailer has raised, newest first
    pub async fn list_for_retailer(&self, retailer_id: Uuid) -> AppResult<Vec<Dispute>> {
        let rows = sqlx::query_as::<_, DisputeRow>(&format!(
            r#"
            SELECT {DISPUTE_COLUMNS} FROM disputes
            WHERE raised_by = $1
            ORDER BY created_at DESC
            "#,
        ))
        .bind(retailer_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Dispute::try_from).collect()
    }

    /// Disputes on a distributor's orders, newest first
    pub async fn list_for_distributor(&self, distributor_id: Uuid) -> AppResult<Vec<Dispute>> {
        let rows = sqlx::query_as::<_, DisputeRow>(
            r#"
            SELECT d.id, d.order_id, d.order_item_id, d.raised_by, d.issue_type,
                   d.description, d.status, d.resolution_notes, d.resolved_by,
                   d.resolved_at, d.created_at
            FROM disputes d
            JOIN orders o ON o.id = d.order_id
            WHERE o.distributor_id = $1
            ORDER BY d.created_at DESC
            "#,
        )
        .bind(distributor_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Dispute::try_from).collect()
    }
}
