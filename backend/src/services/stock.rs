//! Stock ledger service
//!
//! Batch-level inventory for both sides of the supply chain: distributor
//! batches feed orders and invoices, retailer batches are credited from
//! verified deliveries. All decrements go through the conditional-update
//! guard so current_stock can never go negative, even under concurrent
//! invoicing.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use shared::models::{
    CatalogEntry, DistributorBatch, RetailerBatch, BATCH_STATUS_IN_STOCK,
    BATCH_STATUS_OUT_OF_STOCK,
};
use shared::validation::{derive_pts, parse_expiry, validate_product_code};

/// Stock service managing distributor and retailer batch ledgers
#[derive(Clone)]
pub struct StockService {
    db: PgPool,
}

/// Input for adding a distributor stock batch
#[derive(Debug, Deserialize, Validate)]
pub struct CreateBatchInput {
    pub product_code: String,
    #[validate(length(min = 1, message = "Product name cannot be empty"))]
    pub product_name: String,
    pub manufacturer: Option<String>,
    pub schedule: Option<String>,
    #[validate(length(min = 1, message = "Batch number cannot be empty"))]
    pub batch_number: String,
    /// Expiry as printed on the strip: ISO, day-first or month/year
    pub expiry_date: String,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
    pub ptr: Decimal,
    pub pts: Decimal,
    pub tax_rate: Decimal,
}

/// Input for updating a distributor stock batch
#[derive(Debug, Deserialize)]
pub struct UpdateBatchInput {
    pub quantity: Option<i32>,
    pub ptr: Option<Decimal>,
    pub pts: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub expiry_date: Option<String>,
}

/// Pricing snapshot of the earliest-expiring live batch for a product
#[derive(Debug, Clone)]
pub struct ReferenceBatch {
    pub product_name: String,
    pub ptr: Decimal,
    pub tax_rate: Decimal,
}

#[derive(Debug, sqlx::FromRow)]
struct DistributorBatchRow {
    id: Uuid,
    distributor_id: Uuid,
    product_code: String,
    product_name: String,
    batch_number: String,
    expiry_date: NaiveDate,
    current_stock: i32,
    ptr: Decimal,
    pts: Decimal,
    tax_rate: Decimal,
    is_expired: bool,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DistributorBatchRow> for DistributorBatch {
    fn from(r: DistributorBatchRow) -> Self {
        DistributorBatch {
            id: r.id,
            distributor_id: r.distributor_id,
            product_code: r.product_code,
            product_name: r.product_name,
            batch_number: r.batch_number,
            expiry_date: r.expiry_date,
            current_stock: r.current_stock,
            ptr: r.ptr,
            pts: r.pts,
            tax_rate: r.tax_rate,
            is_expired: r.is_expired,
            status: r.status,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RetailerBatchRow {
    id: Uuid,
    retailer_id: Uuid,
    product_code: String,
    product_name: String,
    batch_number: String,
    expiry_date: NaiveDate,
    current_stock: i32,
    ptr: Decimal,
    pts: Decimal,
    tax_rate: Decimal,
    schedule: Option<String>,
    is_expired: bool,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RetailerBatchRow> for RetailerBatch {
    fn from(r: RetailerBatchRow) -> Self {
        RetailerBatch {
            id: r.id,
            retailer_id: r.retailer_id,
            product_code: r.product_code,
            product_name: r.product_name,
            batch_number: r.batch_number,
            expiry_date: r.expiry_date,
            current_stock: r.current_stock,
            ptr: r.ptr,
            pts: r.pts,
            tax_rate: r.tax_rate,
            schedule: r.schedule,
            is_expired: r.is_expired,
            status: r.status,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

impl StockService {
    /// Create a new StockService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    // ========================================================================
    // Distributor Ledger
    // ========================================================================

    /// Add a stock batch, upserting the product master row
    pub async fn add_batch(
        &self,
        distributor_id: Uuid,
        input: CreateBatchInput,
    ) -> AppResult<DistributorBatch> {
        input
            .validate()
            .map_err(|e| AppError::ValidationError(e.to_string()))?;

        validate_product_code(&input.product_code).map_err(|msg| AppError::Validation {
            field: "product_code".to_string(),
            message: msg.to_string(),
        })?;

        let expiry_date = parse_expiry(&input.expiry_date).map_err(|msg| AppError::Validation {
            field: "expiry_date".to_string(),
            message: msg.to_string(),
        })?;

        let today = Utc::now().date_naive();
        if expiry_date < today {
            return Err(AppError::Validation {
                field: "expiry_date".to_string(),
                message: "Expiry date cannot be in the past".to_string(),
            });
        }

        if input.ptr < Decimal::ZERO || input.pts < Decimal::ZERO || input.tax_rate < Decimal::ZERO
        {
            return Err(AppError::ValidationError(
                "Prices and tax rate cannot be negative".to_string(),
            ));
        }

        let mut tx = self.db.begin().await?;

        // Keep the product master current
        sqlx::query(
            r#"
            INSERT INTO products (product_code, name, manufacturer, schedule)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (product_code) DO UPDATE
            SET name = EXCLUDED.name,
                manufacturer = COALESCE(EXCLUDED.manufacturer, products.manufacturer),
                schedule = COALESCE(EXCLUDED.schedule, products.schedule)
            "#,
        )
        .bind(&input.product_code)
        .bind(&input.product_name)
        .bind(&input.manufacturer)
        .bind(&input.schedule)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, DistributorBatchRow>(
            r#"
            INSERT INTO distributor_stock
                (distributor_id, product_code, product_name, batch_number, expiry_date,
                 current_stock, ptr, pts, tax_rate, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, distributor_id, product_code, product_name, batch_number,
                      expiry_date, current_stock, ptr, pts, tax_rate, is_expired, status,
                      created_at, updated_at
            "#,
        )
        .bind(distributor_id)
        .bind(&input.product_code)
        .bind(&input.product_name)
        .bind(&input.batch_number)
        .bind(expiry_date)
        .bind(input.quantity)
        .bind(input.ptr)
        .bind(input.pts)
        .bind(input.tax_rate)
        .bind(BATCH_STATUS_IN_STOCK)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict {
                resource: "batch".to_string(),
                message: format!(
                    "Batch {} of {} already exists",
                    input.batch_number, input.product_code
                ),
            },
            _ => AppError::DatabaseError(e),
        })?;

        tx.commit().await?;

        Ok(row.into())
    }

    /// Update quantity or pricing on an existing batch
    pub async fn update_batch(
        &self,
        distributor_id: Uuid,
        stock_id: Uuid,
        input: UpdateBatchInput,
    ) -> AppResult<DistributorBatch> {
        if let Some(quantity) = input.quantity {
            if quantity < 0 {
                return Err(AppError::Validation {
                    field: "quantity".to_string(),
                    message: "Quantity cannot be negative".to_string(),
                });
            }
        }

        let expiry_date = input
            .expiry_date
            .as_deref()
            .map(parse_expiry)
            .transpose()
            .map_err(|msg| AppError::Validation {
                field: "expiry_date".to_string(),
                message: msg.to_string(),
            })?;

        let row = sqlx::query_as::<_, DistributorBatchRow>(
            r#"
            UPDATE distributor_stock SET
                current_stock = COALESCE($3, current_stock),
                ptr = COALESCE($4, ptr),
                pts = COALESCE($5, pts),
                tax_rate = COALESCE($6, tax_rate),
                expiry_date = COALESCE($7, expiry_date),
                status = CASE WHEN COALESCE($3, current_stock) > 0 THEN $8 ELSE $9 END,
                updated_at = NOW()
            WHERE id = $1 AND distributor_id = $2
            RETURNING id, distributor_id, product_code, product_name, batch_number,
                      expiry_date, current_stock, ptr, pts, tax_rate, is_expired, status,
                      created_at, updated_at
            "#,
        )
        .bind(stock_id)
        .bind(distributor_id)
        .bind(input.quantity)
        .bind(input.ptr)
        .bind(input.pts)
        .bind(input.tax_rate)
        .bind(expiry_date)
        .bind(BATCH_STATUS_IN_STOCK)
        .bind(BATCH_STATUS_OUT_OF_STOCK)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Stock batch".to_string()))?;

        Ok(row.into())
    }

    /// List a distributor's batches, newest first
    pub async fn list_batches(&self, distributor_id: Uuid) -> AppResult<Vec<DistributorBatch>> {
        let rows = sqlx::query_as::<_, DistributorBatchRow>(
            r#"
            SELECT id, distributor_id, product_code, product_name, batch_number,
                   expiry_date, current_stock, ptr, pts, tax_rate, is_expired, status,
                   created_at, updated_at
            FROM distributor_stock
            WHERE distributor_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(distributor_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Aggregate availability for a product: live batches only
    pub async fn available_quantity(
        &self,
        distributor_id: Uuid,
        product_code: &str,
    ) -> AppResult<i64> {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(current_stock), 0)
            FROM distributor_stock
            WHERE distributor_id = $1
              AND product_code = $2
              AND current_stock > 0
              AND is_expired = false
              AND expiry_date >= CURRENT_DATE
            "#,
        )
        .bind(distributor_id)
        .bind(product_code)
        .fetch_one(&self.db)
        .await?;

        Ok(total)
    }

    /// Candidate batches for allocating a product: live batches offered
    /// oldest-expiry first. The FIFO ordering is an offer order only; which
    /// batch gets consumed is the distributor's choice at invoicing.
    pub async fn available_batches(
        &self,
        distributor_id: Uuid,
        product_code: &str,
    ) -> AppResult<Vec<DistributorBatch>> {
        let rows = sqlx::query_as::<_, DistributorBatchRow>(
            r#"
            SELECT id, distributor_id, product_code, product_name, batch_number,
                   expiry_date, current_stock, ptr, pts, tax_rate, is_expired, status,
                   created_at, updated_at
            FROM distributor_stock
            WHERE distributor_id = $1
              AND product_code = $2
              AND current_stock > 0
              AND is_expired = false
              AND expiry_date >= CURRENT_DATE
            ORDER BY expiry_date ASC
            "#,
        )
        .bind(distributor_id)
        .bind(product_code)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Pricing reference for order creation: the earliest-expiring live batch
    /// of a product. Orders are priced from this one batch, not per batch.
    pub async fn reference_batch(
        &self,
        distributor_id: Uuid,
        product_code: &str,
    ) -> AppResult<Option<ReferenceBatch>> {
        let row = sqlx::query_as::<_, (String, Decimal, Decimal)>(
            r#"
            SELECT product_name, ptr, tax_rate
            FROM distributor_stock
            WHERE distributor_id = $1
              AND product_code = $2
              AND current_stock > 0
              AND is_expired = false
              AND expiry_date >= CURRENT_DATE
            ORDER BY expiry_date ASC
            LIMIT 1
            "#,
        )
        .bind(distributor_id)
        .bind(product_code)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|(product_name, ptr, tax_rate)| ReferenceBatch {
            product_name,
            ptr,
            tax_rate,
        }))
    }

    /// Product catalog a connected retailer sees: per-product aggregate
    /// availability with the earliest-expiring batch's PTR as the quote
    pub async fn catalog(&self, distributor_id: Uuid) -> AppResult<Vec<CatalogEntry>> {
        let rows = sqlx::query_as::<_, (String, String, i64, Decimal, Decimal)>(
            r#"
            SELECT s.product_code,
                   MIN(s.product_name) AS product_name,
                   SUM(s.current_stock)::BIGINT AS available_quantity,
                   first_batch.ptr,
                   first_batch.tax_rate
            FROM distributor_stock s
            JOIN LATERAL (
                SELECT ptr, tax_rate
                FROM distributor_stock f
                WHERE f.distributor_id = s.distributor_id
                  AND f.product_code = s.product_code
                  AND f.current_stock > 0
                  AND f.is_expired = false
                  AND f.expiry_date >= CURRENT_DATE
                ORDER BY f.expiry_date ASC
                LIMIT 1
            ) first_batch ON true
            WHERE s.distributor_id = $1
              AND s.current_stock > 0
              AND s.is_expired = false
              AND s.expiry_date >= CURRENT_DATE
            GROUP BY s.product_code, first_batch.ptr, first_batch.tax_rate
            ORDER BY s.product_code
            "#,
        )
        .bind(distributor_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(product_code, product_name, available_quantity, ptr, tax_rate)| CatalogEntry {
                    product_code,
                    product_name,
                    available_quantity,
                    ptr,
                    tax_rate,
                },
            )
            .collect())
    }

    // ========================================================================
    // Transactional Mutations
    // ========================================================================

    /// Conditionally decrement a batch inside the caller's transaction.
    ///
    /// The WHERE clause re-checks sufficiency at update time, so two
    /// concurrent invoices cannot both spend the same units: the loser sees
    /// zero rows affected and must abort.
    pub async fn try_decrement(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        stock_id: Uuid,
        quantity: i32,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE distributor_stock
            SET current_stock = current_stock - $2,
                status = CASE WHEN current_stock - $2 > 0 THEN $3 ELSE $4 END,
                updated_at = NOW()
            WHERE id = $1 AND current_stock >= $2
            "#,
        )
        .bind(stock_id)
        .bind(quantity)
        .bind(BATCH_STATUS_IN_STOCK)
        .bind(BATCH_STATUS_OUT_OF_STOCK)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Credit a distributor batch back inside the caller's transaction
    /// (manual order item replacement)
    pub async fn credit_distributor_batch(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        distributor_id: Uuid,
        product_code: &str,
        batch_number: &str,
        quantity: i32,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE distributor_stock
            SET current_stock = current_stock + $4,
                status = $5,
                updated_at = NOW()
            WHERE distributor_id = $1 AND product_code = $2 AND batch_number = $3
            "#,
        )
        .bind(distributor_id)
        .bind(product_code)
        .bind(batch_number)
        .bind(quantity)
        .bind(BATCH_STATUS_IN_STOCK)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Stock batch {} of {}",
                batch_number, product_code
            )));
        }

        Ok(())
    }

    // ========================================================================
    // Retailer Ledger
    // ========================================================================

    /// List a retailer's batches, newest first
    pub async fn list_retailer_stock(&self, retailer_id: Uuid) -> AppResult<Vec<RetailerBatch>> {
        let rows = sqlx::query_as::<_, RetailerBatchRow>(
            r#"
            SELECT id, retailer_id, product_code, product_name, batch_number,
                   expiry_date, current_stock, ptr, pts, tax_rate, schedule, is_expired,
                   status, created_at, updated_at
            FROM retailer_stock
            WHERE retailer_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(retailer_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Credit retailer stock from a verified order line, inside the caller's
    /// transaction.
    ///
    /// Merges by batch identity (product_code, batch_number, expiry_date);
    /// a new row is seeded In Stock with PTS at the 0.9x markdown and the
    /// schedule inherited from the product master.
    pub async fn credit_retailer_batch(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        retailer_id: Uuid,
        product_code: &str,
        product_name: &str,
        batch_number: &str,
        expiry_date: NaiveDate,
        quantity: i32,
        unit_price: Decimal,
        tax_rate: Decimal,
    ) -> AppResult<()> {
        let existing = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM retailer_stock
            WHERE retailer_id = $1 AND product_code = $2 AND batch_number = $3
              AND expiry_date = $4
            "#,
        )
        .bind(retailer_id)
        .bind(product_code)
        .bind(batch_number)
        .bind(expiry_date)
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(id) = existing {
            sqlx::query(
                r#"
                UPDATE retailer_stock
                SET current_stock = current_stock + $2, status = $3, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(quantity)
            .bind(BATCH_STATUS_IN_STOCK)
            .execute(&mut **tx)
            .await?;

            return Ok(());
        }

        let schedule = sqlx::query_scalar::<_, Option<String>>(
            "SELECT schedule FROM products WHERE product_code = $1",
        )
        .bind(product_code)
        .fetch_optional(&mut **tx)
        .await?
        .flatten()
        .unwrap_or_else(|| "None".to_string());

        sqlx::query(
            r#"
            INSERT INTO retailer_stock
                (retailer_id, product_code, product_name, batch_number, expiry_date,
                 current_stock, ptr, pts, tax_rate, schedule, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(retailer_id)
        .bind(product_code)
        .bind(product_name)
        .bind(batch_number)
        .bind(expiry_date)
        .bind(quantity)
        .bind(unit_price)
        .bind(derive_pts(unit_price))
        .bind(tax_rate)
        .bind(schedule)
        .bind(BATCH_STATUS_IN_STOCK)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}
