//! HTTP handlers for billing endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentDistributor;
use crate::services::billing::{BillingOrder, BillingService, GenerateInvoiceInput};
use crate::AppState;

/// Response after generating an invoice
#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub order_id: Uuid,
    pub invoice_number: Option<String>,
}

/// Billing screen for a processing order: items with candidate batches
pub async fn get_order_for_billing(
    State(state): State<AppState>,
    distributor: CurrentDistributor,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<BillingOrder>> {
    let service = BillingService::new(state.db);
    let order = service
        .order_for_billing(distributor.0.user_id, order_id)
        .await?;
    Ok(Json(order))
}

/// Allocate batches to every line of a processing order and confirm it
pub async fn generate_invoice(
    State(state): State<AppState>,
    distributor: CurrentDistributor,
    Json(input): Json<GenerateInvoiceInput>,
) -> AppResult<Json<InvoiceResponse>> {
    let service = BillingService::new(state.db);
    let invoiced = service.generate_invoice(distributor.0.user_id, input).await?;
    Ok(Json(InvoiceResponse {
        order_id: invoiced.order.id,
        invoice_number: invoiced.order.invoice_number,
    }))
}
