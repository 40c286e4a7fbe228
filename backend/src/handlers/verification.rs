//! HTTP handlers for delivery verification and dispute endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::{CurrentDistributor, CurrentRetailer};
use crate::services::verification::{
    CreateDisputeInput, ResolveDisputeInput, VerificationService,
};
use crate::AppState;
use shared::models::{Dispute, Order};

/// Verify a confirmed delivery, crediting the retailer's stock
pub async fn verify_order(
    State(state): State<AppState>,
    retailer: CurrentRetailer,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<Order>> {
    let service = VerificationService::new(state.db);
    let order = service.verify_order(retailer.0.user_id, order_id).await?;
    Ok(Json(order))
}

/// Raise a dispute against a confirmed order
pub async fn create_dispute(
    State(state): State<AppState>,
    retailer: CurrentRetailer,
    Json(input): Json<CreateDisputeInput>,
) -> AppResult<(StatusCode, Json<Dispute>)> {
    let service = VerificationService::new(state.db);
    let dispute = service.create_dispute(retailer.0.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(dispute)))
}

/// Disputes the retailer has raised
pub async fn list_retailer_disputes(
    State(state): State<AppState>,
    retailer: CurrentRetailer,
) -> AppResult<Json<Vec<Dispute>>> {
    let service = VerificationService::new(state.db);
    let disputes = service.list_for_retailer(retailer.0.user_id).await?;
    Ok(Json(disputes))
}

/// Disputes on the distributor's orders
pub async fn list_distributor_disputes(
    State(state): State<AppState>,
    distributor: CurrentDistributor,
) -> AppResult<Json<Vec<Dispute>>> {
    let service = VerificationService::new(state.db);
    let disputes = service.list_for_distributor(distributor.0.user_id).await?;
    Ok(Json(disputes))
}

/// Settle an open dispute, optionally reopening the order for billing
pub async fn resolve_dispute(
    State(state): State<AppState>,
    distributor: CurrentDistributor,
    Path(dispute_id): Path<Uuid>,
    Json(input): Json<ResolveDisputeInput>,
) -> AppResult<Json<Dispute>> {
    let service = VerificationService::new(state.db);
    let dispute = service
        .resolve_dispute(distributor.0.user_id, dispute_id, input)
        .await?;
    Ok(Json(dispute))
}
