//! Pure business rules for PharmaLink
//!
//! Everything here is side-effect free so the rules can be tested without a
//! database: pricing arithmetic, invoice numbering, batch allocation checks
//! and expiry normalization.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

// ============================================================================
// Allocation Rules
// ============================================================================

/// Why a batch cannot be allocated to an order line
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("allocated quantity {allocated} must equal ordered quantity {ordered}")]
    QuantityMismatch { ordered: i32, allocated: i32 },

    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i32, available: i32 },

    #[error("batch expired on {expiry}")]
    BatchExpired { expiry: NaiveDate },

    #[error("quantity must be positive")]
    NonPositiveQuantity,

    #[error("batch product {batch_product} does not match line product {line_product}")]
    ProductMismatch {
        line_product: String,
        batch_product: String,
    },
}

/// Check a single batch allocation against an order line.
///
/// An allocation must cover the ordered quantity exactly: a line cannot be
/// split across batches, nor partially fulfilled.
pub fn check_allocation(
    ordered: i32,
    allocated: i32,
    available: i32,
    expiry: NaiveDate,
    today: NaiveDate,
) -> Result<(), AllocationError> {
    if allocated <= 0 {
        return Err(AllocationError::NonPositiveQuantity);
    }
    if allocated != ordered {
        return Err(AllocationError::QuantityMismatch { ordered, allocated });
    }
    if expiry < today {
        return Err(AllocationError::BatchExpired { expiry });
    }
    if available < allocated {
        return Err(AllocationError::InsufficientStock {
            requested: allocated,
            available,
        });
    }
    Ok(())
}

/// Whether a batch is still sellable on `today`
pub fn is_batch_live(current_stock: i32, expiry: NaiveDate, today: NaiveDate) -> bool {
    current_stock > 0 && expiry >= today
}

// ============================================================================
// Pricing
// ============================================================================

/// Line total: quantity x unit price, plus tax
pub fn line_total(quantity: i32, unit_price: Decimal, tax_rate: Decimal) -> Decimal {
    let base = Decimal::from(quantity) * unit_price;
    let tax = base * tax_rate / Decimal::from(100);
    (base + tax).round_dp(2)
}

/// Order total as the sum of line totals
pub fn order_total<'a, I>(line_totals: I) -> Decimal
where
    I: IntoIterator<Item = &'a Decimal>,
{
    line_totals.into_iter().sum()
}

/// Default PTS for a retailer batch credited from an invoice: 0.9x the
/// invoiced unit price. A markdown convention, not authoritative pricing.
pub fn derive_pts(unit_price: Decimal) -> Decimal {
    (unit_price * Decimal::new(9, 1)).round_dp(2)
}

// ============================================================================
// Numbering
// ============================================================================

/// Derive the invoice number from an order number: ORD-... becomes INV-...
pub fn invoice_number_for(order_number: &str) -> String {
    match order_number.strip_prefix("ORD-") {
        Some(rest) => format!("INV-{}", rest),
        None => format!("INV-{}", order_number),
    }
}

// ============================================================================
// Expiry Dates
// ============================================================================

/// Normalize an expiry date string.
///
/// Accepts ISO dates (2026-03-31), day-first dates (31-03-2026) and the
/// month/year form printed on most strips (03/2026, taken as the first of
/// the month).
pub fn parse_expiry(raw: &str) -> Result<NaiveDate, &'static str> {
    let s = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%d-%m-%Y") {
        return Ok(d);
    }
    if let Some((month, year)) = s.split_once('/') {
        let month: u32 = month.parse().map_err(|_| "Invalid expiry date")?;
        let year: i32 = year.parse().map_err(|_| "Invalid expiry date")?;
        return NaiveDate::from_ymd_opt(year, month, 1).ok_or("Invalid expiry date");
    }
    Err("Invalid expiry date")
}

// ============================================================================
// General Validations
// ============================================================================

/// Validate a product code: 3-20 uppercase alphanumeric
pub fn validate_product_code(code: &str) -> Result<(), &'static str> {
    if code.len() < 3 {
        return Err("Product code must be at least 3 characters");
    }
    if code.len() > 20 {
        return Err("Product code must be at most 20 characters");
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err("Product code must be uppercase alphanumeric only");
    }
    Ok(())
}
