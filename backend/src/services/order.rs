//! Order lifecycle service
//!
//! Retailer orders are pooled: creation validates against aggregate
//! availability and prices lines from the earliest-expiring batch, but binds
//! no batch and debits no stock. Stock only moves when the billing engine
//! allocates batches at invoicing. Cancelling a pending order is therefore a
//! stock no-op.
//!
//! Manual orders are the distributor-entered variant of the same entity:
//! batches are named up front, allocated and decremented atomically at
//! creation, and the order is born confirmed.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::connection::ConnectionService;
use crate::services::notification::{NewNotification, NotificationService};
use crate::services::stock::StockService;
use shared::models::{
    DistributorBatch, NotificationKind, Order, OrderItem, OrderSource, OrderStatus,
    OrderWithItems, UserRole,
};
use shared::types::{PaginatedResponse, Pagination, PaginationMeta};
use shared::validation::{invoice_number_for, is_batch_live, line_total, order_total};

/// Order service managing the pooled-order lifecycle and manual orders
#[derive(Clone)]
pub struct OrderService {
    db: PgPool,
    stock: StockService,
    connections: ConnectionService,
    notifications: NotificationService,
}

/// Input for placing a pooled retailer order
#[derive(Debug, Deserialize)]
pub struct CreateOrderInput {
    pub distributor_id: Uuid,
    pub items: Vec<OrderItemInput>,
}

/// One requested product line
#[derive(Debug, Deserialize)]
pub struct OrderItemInput {
    pub product_code: String,
    pub quantity: i32,
}

/// Input for rejecting a pending order
#[derive(Debug, Deserialize)]
pub struct RejectOrderInput {
    pub reason: String,
}

/// Input for a distributor-entered manual order
#[derive(Debug, Deserialize)]
pub struct CreateManualOrderInput {
    pub retailer_id: Uuid,
    pub items: Vec<ManualItemInput>,
}

/// One manual line, naming the exact batch to sell from
#[derive(Debug, Deserialize)]
pub struct ManualItemInput {
    pub stock_id: Uuid,
    pub quantity: i32,
}

/// Input for replacing the items of a manual order
#[derive(Debug, Deserialize)]
pub struct ReplaceManualItemsInput {
    pub items: Vec<ManualItemInput>,
}

/// Distributor view of an order item, carrying candidate batches while the
/// order awaits allocation
#[derive(Debug, Serialize)]
pub struct DistributorOrderItem {
    #[serde(flatten)]
    pub item: OrderItem,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub available_batches: Vec<DistributorBatch>,
}

/// Distributor view of an order
#[derive(Debug, Serialize)]
pub struct DistributorOrder {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<DistributorOrderItem>,
}

/// A batch allocation resolved inside a transaction
struct AllocatedLine {
    product_code: String,
    product_name: String,
    batch_number: String,
    expiry_date: NaiveDate,
    quantity: i32,
    unit_price: Decimal,
    tax_rate: Decimal,
    total_price: Decimal,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OrderRow {
    pub id: Uuid,
    pub order_number: String,
    pub retailer_id: Uuid,
    pub distributor_id: Uuid,
    pub source: String,
    pub status: String,
    pub total_amount: Decimal,
    pub total_items: i32,
    pub is_verified: bool,
    pub invoice_number: Option<String>,
    pub reject_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) const ORDER_COLUMNS: &str = "id, order_number, retailer_id, distributor_id, source, \
     status, total_amount, total_items, is_verified, invoice_number, reject_reason, \
     created_at, updated_at";

impl TryFrom<OrderRow> for Order {
    type Error = AppError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let source = OrderSource::from_str(&row.source)
            .ok_or_else(|| AppError::Internal(format!("Unknown order source: {}", row.source)))?;
        let status = OrderStatus::from_str(&row.status)
            .ok_or_else(|| AppError::Internal(format!("Unknown order status: {}", row.status)))?;
        Ok(Order {
            id: row.id,
            order_number: row.order_number,
            retailer_id: row.retailer_id,
            distributor_id: row.distributor_id,
            source,
            status,
            total_amount: row.total_amount,
            total_items: row.total_items,
            is_verified: row.is_verified,
            invoice_number: row.invoice_number,
            reject_reason: row.reject_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OrderItemRow {
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

pub(crate) const ORDER_ITEM_COLUMNS: &str = "id, order_id, product_code, product_name, quantity, \
     unit_price, tax_rate, total_price, batch_number, expiry_date, created_at";

impl From<OrderItemRow> for OrderItem {
    fn from(r: OrderItemRow) -> Self {
        OrderItem {
            id: r.id,
            order_id: r.order_id,
            product_code: r.product_code,
            product_name: r.product_name,
            quantity: r.quantity,
            unit_price: r.unit_price,
            tax_rate: r.tax_rate,
            total_price: r.total_price,
            batch_number: r.batch_number,
            expiry_date: r.expiry_date,
            created_at: r.created_at,
        }
    }
}

impl OrderService {
    /// Create a new OrderService instance
    pub fn new(db: PgPool) -> Self {
        let stock = StockService::new(db.clone());
        let connections = ConnectionService::new(db.clone());
        let notifications = NotificationService::new(db.clone());
        Self {
            db,
            stock,
            connections,
            notifications,
        }
    }

    /// Generate an order number: ORD-YYYYMMDD-xxxxxx
    fn generate_order_number() -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("ORD-{}-{}", Utc::now().format("%Y%m%d"), &suffix[..6])
    }

    // ========================================================================
    // Retailer Lifecycle
    // ========================================================================

    /// Place a pooled order against a connected distributor's stock.
    ///
    /// Validates each line against the distributor's aggregate availability
    /// at this moment but reserves nothing: availability can shrink before
    /// invoicing, in which case invoicing reports the shortage.
    pub async fn create_order(
        &self,
        retailer_id: Uuid,
        input: CreateOrderInput,
    ) -> AppResult<OrderWithItems> {
        if !self
            .connections
            .is_connected(retailer_id, input.distributor_id)
            .await?
        {
            return Err(AppError::ValidationError(
                "You are not connected to this distributor".to_string(),
            ));
        }

        if input.items.is_empty() {
            return Err(AppError::Validation {
                field: "items".to_string(),
                message: "Order must contain at least one item".to_string(),
            });
        }

        // Validate availability and resolve pricing per line
        let mut lines = Vec::with_capacity(input.items.len());
        for item in &input.items {
            if item.quantity <= 0 {
                return Err(AppError::Validation {
                    field: "quantity".to_string(),
                    message: format!("Quantity for {} must be positive", item.product_code),
                });
            }

            let available = self
                .stock
                .available_quantity(input.distributor_id, &item.product_code)
                .await?;
            if (item.quantity as i64) > available {
                return Err(AppError::InsufficientStock(format!(
                    "Insufficient stock for {}: requested {}, available {}",
                    item.product_code, item.quantity, available
                )));
            }

            let reference = self
                .stock
                .reference_batch(input.distributor_id, &item.product_code)
                .await?
                .ok_or_else(|| {
                    AppError::InsufficientStock(format!(
                        "Insufficient stock for {}: requested {}, available 0",
                        item.product_code, item.quantity
                    ))
                })?;

            let total = line_total(item.quantity, reference.ptr, reference.tax_rate);
            lines.push((item, reference, total));
        }

        let total_amount = order_total(lines.iter().map(|(_, _, t)| t));
        let total_items = input.items.len() as i32;
        let order_number = Self::generate_order_number();

        let mut tx = self.db.begin().await?;

        let order_row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            INSERT INTO orders
                (order_number, retailer_id, distributor_id, source, status, total_amount, total_items)
            VALUES ($1, $2, $3, 'retailer', 'pending', $4, $5)
            RETURNING {ORDER_COLUMNS}
            "#,
        ))
        .bind(&order_number)
        .bind(retailer_id)
        .bind(input.distributor_id)
        .bind(total_amount)
        .bind(total_items)
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(lines.len());
        for (item, reference, total) in &lines {
            let item_row = sqlx::query_as::<_, OrderItemRow>(&format!(
                r#"
                INSERT INTO order_items
                    (order_id, product_code, product_name, quantity, unit_price, tax_rate, total_price)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING {ORDER_ITEM_COLUMNS}
                "#,
            ))
            .bind(order_row.id)
            .bind(&item.product_code)
            .bind(&reference.product_name)
            .bind(item.quantity)
            .bind(reference.ptr)
            .bind(reference.tax_rate)
            .bind(total)
            .fetch_one(&mut *tx)
            .await?;
            items.push(OrderItem::from(item_row));
        }

        let notification = self
            .notifications
            .notify_in_tx(
                &mut tx,
                &NewNotification {
                    user_id: input.distributor_id,
                    role: UserRole::Distributor,
                    title: "New order received".to_string(),
                    message: format!(
                        "Order {} placed with {} items",
                        order_number, total_items
                    ),
                    kind: NotificationKind::Placed,
                    related_id: Some(order_row.id),
                },
            )
            .await?;

        tx.commit().await?;

        self.notifications.push(&notification).await;

        Ok(OrderWithItems {
            order: order_row.try_into()?,
            items,
        })
    }

    /// Retailer cancels a pending order. Nothing was debited at creation,
    /// so stock is untouched.
    pub async fn cancel_order(&self, retailer_id: Uuid, order_id: Uuid) -> AppResult<Order> {
        let order = self.fetch_order_for(order_id, retailer_id, UserRole::Retailer).await?;

        if order.status != OrderStatus::Pending {
            return Err(AppError::ValidationError(format!(
                "Only pending orders can be cancelled (order is {})",
                order.status.as_str()
            )));
        }

        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            UPDATE orders SET status = 'cancelled', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {ORDER_COLUMNS}
            "#,
        ))
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        let notification = self
            .notifications
            .notify_in_tx(
                &mut tx,
                &NewNotification {
                    user_id: order.distributor_id,
                    role: UserRole::Distributor,
                    title: "Order cancelled".to_string(),
                    message: format!("Order {} was cancelled by the retailer", order.order_number),
                    kind: NotificationKind::Cancelled,
                    related_id: Some(order_id),
                },
            )
            .await?;

        tx.commit().await?;

        self.notifications.push(&notification).await;

        row.try_into()
    }

    /// Retailer's paginated order listing, newest first
    pub async fn list_for_retailer(
        &self,
        retailer_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<OrderWithItems>> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM orders WHERE retailer_id = $1",
        )
        .bind(retailer_id)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE retailer_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        ))
        .bind(retailer_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let orders = self.attach_items(rows).await?;

        Ok(PaginatedResponse {
            data: orders,
            pagination: PaginationMeta::new(pagination, total as u64),
        })
    }

    /// One order of a retailer, with items
    pub async fn get_for_retailer(
        &self,
        retailer_id: Uuid,
        order_id: Uuid,
    ) -> AppResult<OrderWithItems> {
        let order = self.fetch_order_for(order_id, retailer_id, UserRole::Retailer).await?;
        let items = self.fetch_items(order.id).await?;
        Ok(OrderWithItems { order, items })
    }

    // ========================================================================
    // Distributor Lifecycle
    // ========================================================================

    /// Accept a pending order for processing. The invoice number is derived
    /// deterministically from the order number; no stock moves yet.
    pub async fn confirm_order(&self, distributor_id: Uuid, order_id: Uuid) -> AppResult<Order> {
        let order = self
            .fetch_order_for(order_id, distributor_id, UserRole::Distributor)
            .await?;

        if order.status != OrderStatus::Pending {
            return Err(AppError::ValidationError(format!(
                "Only pending orders can be confirmed (order is {})",
                order.status.as_str()
            )));
        }

        let invoice_number = invoice_number_for(&order.order_number);

        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            UPDATE orders SET status = 'processing', invoice_number = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {ORDER_COLUMNS}
            "#,
        ))
        .bind(order_id)
        .bind(&invoice_number)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        let notification = self
            .notifications
            .notify_in_tx(
                &mut tx,
                &NewNotification {
                    user_id: order.retailer_id,
                    role: UserRole::Retailer,
                    title: "Order accepted".to_string(),
                    message: format!("Order {} is being processed", order.order_number),
                    kind: NotificationKind::Accepted,
                    related_id: Some(order_id),
                },
            )
            .await?;

        tx.commit().await?;

        self.notifications.push(&notification).await;

        row.try_into()
    }

    /// Reject a pending order with a reason
    pub async fn reject_order(
        &self,
        distributor_id: Uuid,
        order_id: Uuid,
        input: RejectOrderInput,
    ) -> AppResult<Order> {
        let reason = input.reason.trim();
        if reason.is_empty() {
            return Err(AppError::Validation {
                field: "reason".to_string(),
                message: "A rejection reason is required".to_string(),
            });
        }

        let order = self
            .fetch_order_for(order_id, distributor_id, UserRole::Distributor)
            .await?;

        if order.status != OrderStatus::Pending {
            return Err(AppError::ValidationError(format!(
                "Only pending orders can be rejected (order is {})",
                order.status.as_str()
            )));
        }

        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            UPDATE orders SET status = 'cancelled', reject_reason = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {ORDER_COLUMNS}
            "#,
        ))
        .bind(order_id)
        .bind(reason)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        let notification = self
            .notifications
            .notify_in_tx(
                &mut tx,
                &NewNotification {
                    user_id: order.retailer_id,
                    role: UserRole::Retailer,
                    title: "Order rejected".to_string(),
                    message: format!("Order {} was rejected: {}", order.order_number, reason),
                    kind: NotificationKind::Rejected,
                    related_id: Some(order_id),
                },
            )
            .await?;

        tx.commit().await?;

        self.notifications.push(&notification).await;

        row.try_into()
    }

    /// Distributor's paginated order listing, newest first. Items of orders
    /// still awaiting allocation carry their candidate batches.
    pub async fn list_for_distributor(
        &self,
        distributor_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<DistributorOrder>> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM orders WHERE distributor_id = $1",
        )
        .bind(distributor_id)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE distributor_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        ))
        .bind(distributor_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let order: Order = row.try_into()?;
            let items = self.fetch_items(order.id).await?;

            let needs_batches =
                order.source.needs_allocation() && order.status == OrderStatus::Processing;

            let mut enriched = Vec::with_capacity(items.len());
            for item in items {
                let available_batches = if needs_batches {
                    self.stock
                        .available_batches(distributor_id, &item.product_code)
                        .await?
                } else {
                    Vec::new()
                };
                enriched.push(DistributorOrderItem {
                    item,
                    available_batches,
                });
            }

            orders.push(DistributorOrder {
                order,
                items: enriched,
            });
        }

        Ok(PaginatedResponse {
            data: orders,
            pagination: PaginationMeta::new(pagination, total as u64),
        })
    }

    // ========================================================================
    // Manual Orders
    // ========================================================================

    /// Distributor enters an order with batches named up front. Allocation,
    /// decrement and confirmation happen in one transaction; the order is
    /// born confirmed with its invoice number.
    pub async fn create_manual_order(
        &self,
        distributor_id: Uuid,
        input: CreateManualOrderInput,
    ) -> AppResult<OrderWithItems> {
        if !self
            .connections
            .is_connected(input.retailer_id, distributor_id)
            .await?
        {
            return Err(AppError::ValidationError(
                "No accepted connection with this retailer".to_string(),
            ));
        }

        if input.items.is_empty() {
            return Err(AppError::Validation {
                field: "items".to_string(),
                message: "Order must contain at least one item".to_string(),
            });
        }

        let order_number = Self::generate_order_number();
        let invoice_number = invoice_number_for(&order_number);

        let mut tx = self.db.begin().await?;

        let mut lines = Vec::with_capacity(input.items.len());
        for item in &input.items {
            lines.push(self.allocate_line(&mut tx, distributor_id, item).await?);
        }

        let total_amount = order_total(lines.iter().map(|l| &l.total_price));
        let total_items = lines.len() as i32;

        let order_row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            INSERT INTO orders
                (order_number, retailer_id, distributor_id, source, status, total_amount,
                 total_items, invoice_number)
            VALUES ($1, $2, $3, 'manual', 'confirmed', $4, $5, $6)
            RETURNING {ORDER_COLUMNS}
            "#,
        ))
        .bind(&order_number)
        .bind(input.retailer_id)
        .bind(distributor_id)
        .bind(total_amount)
        .bind(total_items)
        .bind(&invoice_number)
        .fetch_one(&mut *tx)
        .await?;

        let items = self
            .insert_allocated_items(&mut tx, order_row.id, &lines)
            .await?;

        let notification = self
            .notifications
            .notify_in_tx(
                &mut tx,
                &NewNotification {
                    user_id: input.retailer_id,
                    role: UserRole::Retailer,
                    title: "Invoice generated".to_string(),
                    message: format!(
                        "Invoice {} was generated for order {}",
                        invoice_number, order_number
                    ),
                    kind: NotificationKind::Invoiced,
                    related_id: Some(order_row.id),
                },
            )
            .await?;

        tx.commit().await?;

        self.notifications.push(&notification).await;

        Ok(OrderWithItems {
            order: order_row.try_into()?,
            items,
        })
    }

    /// Replace the items of a confirmed, unverified manual order. The old
    /// batches are credited back and the new set allocated in the same
    /// transaction.
    pub async fn replace_manual_order_items(
        &self,
        distributor_id: Uuid,
        order_id: Uuid,
        input: ReplaceManualItemsInput,
    ) -> AppResult<OrderWithItems> {
        let order = self
            .fetch_order_for(order_id, distributor_id, UserRole::Distributor)
            .await?;

        if order.source != OrderSource::Manual {
            return Err(AppError::ValidationError(
                "Only manual orders can have items replaced".to_string(),
            ));
        }
        if order.status != OrderStatus::Confirmed {
            return Err(AppError::ValidationError(format!(
                "Only confirmed orders can have items replaced (order is {})",
                order.status.as_str()
            )));
        }
        if order.is_verified {
            return Err(AppError::ValidationError(
                "Verified orders can no longer be changed".to_string(),
            ));
        }
        if input.items.is_empty() {
            return Err(AppError::Validation {
                field: "items".to_string(),
                message: "Order must contain at least one item".to_string(),
            });
        }

        let mut tx = self.db.begin().await?;

        // Credit the previous allocation back
        let old_items = sqlx::query_as::<_, OrderItemRow>(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = $1",
        ))
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await?;

        for item in &old_items {
            let batch_number = item.batch_number.as_deref().ok_or_else(|| {
                AppError::Internal(format!(
                    "Manual order item {} has no batch number",
                    item.id
                ))
            })?;
            self.stock
                .credit_distributor_batch(
                    &mut tx,
                    distributor_id,
                    &item.product_code,
                    batch_number,
                    item.quantity,
                )
                .await?;
        }

        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        // Allocate the replacement set
        let mut lines = Vec::with_capacity(input.items.len());
        for item in &input.items {
            lines.push(self.allocate_line(&mut tx, distributor_id, item).await?);
        }

        let total_amount = order_total(lines.iter().map(|l| &l.total_price));
        let total_items = lines.len() as i32;

        let items = self.insert_allocated_items(&mut tx, order_id, &lines).await?;

        let order_row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            UPDATE orders SET total_amount = $2, total_items = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#,
        ))
        .bind(order_id)
        .bind(total_amount)
        .bind(total_items)
        .fetch_one(&mut *tx)
        .await?;

        let notification = self
            .notifications
            .notify_in_tx(
                &mut tx,
                &NewNotification {
                    user_id: order.retailer_id,
                    role: UserRole::Retailer,
                    title: "Invoice updated".to_string(),
                    message: format!("Items of order {} were updated", order.order_number),
                    kind: NotificationKind::Invoiced,
                    related_id: Some(order_id),
                },
            )
            .await?;

        tx.commit().await?;

        self.notifications.push(&notification).await;

        Ok(OrderWithItems {
            order: order_row.try_into()?,
            items,
        })
    }

    // ========================================================================
    // Internal Helpers
    // ========================================================================

    /// Validate and decrement one named batch inside the transaction
    async fn allocate_line(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        distributor_id: Uuid,
        item: &ManualItemInput,
    ) -> AppResult<AllocatedLine> {
        if item.quantity <= 0 {
            return Err(AppError::Validation {
                field: "quantity".to_string(),
                message: "Quantity must be positive".to_string(),
            });
        }

        let batch = sqlx::query_as::<_, (String, String, String, NaiveDate, i32, Decimal, Decimal, bool)>(
            r#"
            SELECT product_code, product_name, batch_number, expiry_date, current_stock,
                   ptr, tax_rate, is_expired
            FROM distributor_stock
            WHERE id = $1 AND distributor_id = $2
            "#,
        )
        .bind(item.stock_id)
        .bind(distributor_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Stock batch".to_string()))?;

        let (product_code, product_name, batch_number, expiry_date, current_stock, ptr, tax_rate, is_expired) =
            batch;

        let today = Utc::now().date_naive();
        if is_expired || expiry_date < today {
            return Err(AppError::ValidationError(format!(
                "Batch {} of {} is expired",
                batch_number, product_code
            )));
        }

        if !is_batch_live(current_stock, expiry_date, today) {
            return Err(AppError::InsufficientStock(format!(
                "Batch {} of {} is out of stock",
                batch_number, product_code
            )));
        }

        if !self.stock.try_decrement(tx, item.stock_id, item.quantity).await? {
            return Err(AppError::InsufficientStock(format!(
                "Insufficient stock in batch {} of {}: requested {}, available {}",
                batch_number, product_code, item.quantity, current_stock
            )));
        }

        let total_price = line_total(item.quantity, ptr, tax_rate);

        Ok(AllocatedLine {
            product_code,
            product_name,
            batch_number,
            expiry_date,
            quantity: item.quantity,
            unit_price: ptr,
            tax_rate,
            total_price,
        })
    }

    async fn insert_allocated_items(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
        lines: &[AllocatedLine],
    ) -> AppResult<Vec<OrderItem>> {
        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let row = sqlx::query_as::<_, OrderItemRow>(&format!(
                r#"
                INSERT INTO order_items
                    (order_id, product_code, product_name, quantity, unit_price, tax_rate,
                     total_price, batch_number, expiry_date)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING {ORDER_ITEM_COLUMNS}
                "#,
            ))
            .bind(order_id)
            .bind(&line.product_code)
            .bind(&line.product_name)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.tax_rate)
            .bind(line.total_price)
            .bind(&line.batch_number)
            .bind(line.expiry_date)
            .fetch_one(&mut **tx)
            .await?;
            items.push(row.into());
        }
        Ok(items)
    }

    /// Fetch an order scoped to its owner on the given side
    async fn fetch_order_for(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        side: UserRole,
    ) -> AppResult<Order> {
        let owner_column = match side {
            UserRole::Retailer => "retailer_id",
            UserRole::Distributor => "distributor_id",
        };

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND {owner_column} = $2",
        ))
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        row.try_into()
    }

    async fn fetch_items(&self, order_id: Uuid) -> AppResult<Vec<OrderItem>> {
        let rows = sqlx::query_as::<_, OrderItemRow>(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY created_at",
        ))
        .bind(order_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn attach_items(&self, rows: Vec<OrderRow>) -> AppResult<Vec<OrderWithItems>> {
        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let order: Order = row.try_into()?;
            let items = self.fetch_items(order.id).await?;
            orders.push(OrderWithItems { order, items });
        }
        Ok(orders)
    }
}
