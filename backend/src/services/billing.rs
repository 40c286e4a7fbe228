//! Billing engine
//!
//! Invoicing is where stock actually moves. The distributor binds one batch
//! to each line of a processing order; the engine validates every binding,
//! decrements every batch and confirms the order in a single transaction.
//! Any failed line aborts the whole invoice, so a partially billed order
//! cannot exist.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::notification::{NewNotification, NotificationService};
use crate::services::order::{OrderItemRow, OrderRow, ORDER_COLUMNS, ORDER_ITEM_COLUMNS};
use crate::services::stock::StockService;
use shared::models::{
    DistributorBatch, NotificationKind, Order, OrderItem, OrderStatus, OrderWithItems, UserRole,
};
use shared::validation::{check_allocation, invoice_number_for, line_total, order_total, AllocationError};

/// Billing service allocating batches to order lines
#[derive(Clone)]
pub struct BillingService {
    db: PgPool,
    stock: StockService,
    notifications: NotificationService,
}

/// Input for generating an invoice: one batch binding per order line
#[derive(Debug, Deserialize)]
pub struct GenerateInvoiceInput {
    pub order_id: Uuid,
    pub allocations: Vec<AllocationInput>,
}

/// Binds one order line to one stock batch
#[derive(Debug, Deserialize)]
pub struct AllocationInput {
    pub order_item_id: Uuid,
    pub stock_id: Uuid,
    pub quantity: i32,
}

/// An order awaiting billing, each line carrying its candidate batches
#[derive(Debug, Serialize)]
pub struct BillingOrder {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<BillingOrderItem>,
}

/// One line of an order awaiting billing
#[derive(Debug, Serialize)]
pub struct BillingOrderItem {
    #[serde(flatten)]
    pub item: OrderItem,
    pub available_batches: Vec<DistributorBatch>,
}

#[derive(Debug, sqlx::FromRow)]
struct BatchSnapshot {
    product_code: String,
    batch_number: String,
    expiry_date: NaiveDate,
    current_stock: i32,
    ptr: Decimal,
    tax_rate: Decimal,
}

impl BillingService {
    /// Create a new BillingService instance
    pub fn new(db: PgPool) -> Self {
        let stock = StockService::new(db.clone());
        let notifications = NotificationService::new(db.clone());
        Self {
            db,
            stock,
            notifications,
        }
    }

    /// Fetch a processing order for the billing screen, with the candidate
    /// batches per line. Status and ownership are folded into the lookup:
    /// anything not billable reads as not found.
    pub async fn order_for_billing(
        &self,
        distributor_id: Uuid,
        order_id: Uuid,
    ) -> AppResult<BillingOrder> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE id = $1 AND distributor_id = $2 AND status = 'processing'
            "#,
        ))
        .bind(order_id)
        .bind(distributor_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Billable order".to_string()))?;

        let order: Order = row.try_into()?;

        let item_rows = sqlx::query_as::<_, OrderItemRow>(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY created_at",
        ))
        .bind(order_id)
        .fetch_all(&self.db)
        .await?;

        let mut items = Vec::with_capacity(item_rows.len());
        for row in item_rows {
            let item = OrderItem::from(row);
            let available_batches = self
                .stock
                .available_batches(distributor_id, &item.product_code)
                .await?;
            items.push(BillingOrderItem {
                item,
                available_batches,
            });
        }

        Ok(BillingOrder { order, items })
    }

    /// Generate the invoice for a processing order.
    ///
    /// Every line must be bound to exactly one batch of the same product,
    /// covering the ordered quantity in full. Lines are repriced from their
    /// bound batch, decrements go through the conditional guard, and the
    /// order flips to confirmed. All of it commits together or not at all.
    pub async fn generate_invoice(
        &self,
        distributor_id: Uuid,
        input: GenerateInvoiceInput,
    ) -> AppResult<OrderWithItems> {
        let mut tx = self.db.begin().await?;

        let order_row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE id = $1 AND distributor_id = $2
            FOR UPDATE
            "#,
        ))
        .bind(input.order_id)
        .bind(distributor_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        let order: Order = order_row.try_into()?;

        if order.status != OrderStatus::Processing {
            return Err(AppError::ValidationError(format!(
                "Only processing orders can be invoiced (order is {})",
                order.status.as_str()
            )));
        }

        let item_rows = sqlx::query_as::<_, OrderItemRow>(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY created_at",
        ))
        .bind(input.order_id)
        .fetch_all(&mut *tx)
        .await?;

        // Every line allocated exactly once, no stray allocations
        if input.allocations.len() != item_rows.len() {
            return Err(AppError::ValidationError(format!(
                "Expected {} allocations, got {}",
                item_rows.len(),
                input.allocations.len()
            )));
        }

        let today = Utc::now().date_naive();
        let mut items = Vec::with_capacity(item_rows.len());

        for item in &item_rows {
            let allocation = input
                .allocations
                .iter()
                .find(|a| a.order_item_id == item.id)
                .ok_or_else(|| {
                    AppError::ValidationError(format!(
                        "No allocation for {} ({} units)",
                        item.product_name, item.quantity
                    ))
                })?;

            let batch = sqlx::query_as::<_, BatchSnapshot>(
                r#"
                SELECT product_code, batch_number, expiry_date, current_stock, ptr, tax_rate
                FROM distributor_stock
                WHERE id = $1 AND distributor_id = $2
                "#,
            )
            .bind(allocation.stock_id)
            .bind(distributor_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Stock batch".to_string()))?;

            if batch.product_code != item.product_code {
                return Err(allocation_error(
                    &item.product_name,
                    AllocationError::ProductMismatch {
                        line_product: item.product_code.clone(),
                        batch_product: batch.product_code.clone(),
                    },
                ));
            }

            check_allocation(
                item.quantity,
                allocation.quantity,
                batch.current_stock,
                batch.expiry_date,
                today,
            )
            .map_err(|e| allocation_error(&item.product_name, e))?;

            if !self
                .stock
                .try_decrement(&mut tx, allocation.stock_id, allocation.quantity)
                .await?
            {
                // The availability check above passed, so a concurrent
                // invoice spent these units between read and update.
                return Err(AppError::InsufficientStock(format!(
                    "Batch {} of {} was depleted by a concurrent invoice",
                    batch.batch_number, item.product_code
                )));
            }

            let total_price = line_total(item.quantity, batch.ptr, batch.tax_rate);

            let updated = sqlx::query_as::<_, OrderItemRow>(&format!(
                r#"
                UPDATE order_items
                SET batch_number = $2, expiry_date = $3, unit_price = $4, tax_rate = $5,
                    total_price = $6
                WHERE id = $1
                RETURNING {ORDER_ITEM_COLUMNS}
                "#,
            ))
            .bind(item.id)
            .bind(&batch.batch_number)
            .bind(batch.expiry_date)
            .bind(batch.ptr)
            .bind(batch.tax_rate)
            .bind(total_price)
            .fetch_one(&mut *tx)
            .await?;

            items.push(OrderItem::from(updated));
        }

        let total_amount = order_total(items.iter().map(|i| &i.total_price));

        let invoice_number = order
            .invoice_number
            .clone()
            .unwrap_or_else(|| invoice_number_for(&order.order_number));

        let updated_order = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            UPDATE orders
            SET status = 'confirmed', total_amount = $2, invoice_number = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#,
        ))
        .bind(input.order_id)
        .bind(total_amount)
        .bind(&invoice_number)
        .fetch_one(&mut *tx)
        .await?;

        let notification = self
            .notifications
            .notify_in_tx(
                &mut tx,
                &NewNotification {
                    user_id: order.retailer_id,
                    role: UserRole::Retailer,
                    title: "Invoice generated".to_string(),
                    message: format!(
                        "Invoice {} was generated for order {}",
                        invoice_number, order.order_number
                    ),
                    kind: NotificationKind::Invoiced,
                    related_id: Some(input.order_id),
                },
            )
            .await?;

        tx.commit().await?;

        self.notifications.push(&notification).await;

        Ok(OrderWithItems {
            order: updated_order.try_into()?,
            items,
        })
    }
}

fn allocation_error(product_name: &str, e: AllocationError) -> AppError {
    match e {
        AllocationError::InsufficientStock { .. } => {
            AppError::InsufficientStock(format!("{}: {}", product_name, e))
        }
        _ => AppError::ValidationError(format!("{}: {}", product_name, e)),
    }
}
