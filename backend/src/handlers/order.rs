//! HTTP handlers for order lifecycle endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::{CurrentDistributor, CurrentRetailer};
use crate::services::order::{
    CreateManualOrderInput, CreateOrderInput, DistributorOrder, OrderService, RejectOrderInput,
    ReplaceManualItemsInput,
};
use crate::AppState;
use shared::models::{Order, OrderWithItems};
use shared::types::{PaginatedResponse, Pagination};

// ============================================================================
// Retailer Endpoints
// ============================================================================

/// Place a pooled order against a connected distributor
pub async fn create_order(
    State(state): State<AppState>,
    retailer: CurrentRetailer,
    Json(input): Json<CreateOrderInput>,
) -> AppResult<(StatusCode, Json<OrderWithItems>)> {
    let service = OrderService::new(state.db);
    let order = service.create_order(retailer.0.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Retailer's paginated order listing
pub async fn list_retailer_orders(
    State(state): State<AppState>,
    retailer: CurrentRetailer,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<OrderWithItems>>> {
    let service = OrderService::new(state.db);
    let orders = service
        .list_for_retailer(retailer.0.user_id, &pagination)
        .await?;
    Ok(Json(orders))
}

/// One order of the retailer, with items
pub async fn get_retailer_order(
    State(state): State<AppState>,
    retailer: CurrentRetailer,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderWithItems>> {
    let service = OrderService::new(state.db);
    let order = service.get_for_retailer(retailer.0.user_id, order_id).await?;
    Ok(Json(order))
}

/// Cancel a pending order
pub async fn cancel_order(
    State(state): State<AppState>,
    retailer: CurrentRetailer,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<Order>> {
    let service = OrderService::new(state.db);
    let order = service.cancel_order(retailer.0.user_id, order_id).await?;
    Ok(Json(order))
}

// ============================================================================
// Distributor Endpoints
// ============================================================================

/// Distributor's paginated order listing, with candidate batches on
/// allocation-pending orders
pub async fn list_distributor_orders(
    State(state): State<AppState>,
    distributor: CurrentDistributor,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<DistributorOrder>>> {
    let service = OrderService::new(state.db);
    let orders = service
        .list_for_distributor(distributor.0.user_id, &pagination)
        .await?;
    Ok(Json(orders))
}

/// Accept a pending order for processing
pub async fn confirm_order(
    State(state): State<AppState>,
    distributor: CurrentDistributor,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<Order>> {
    let service = OrderService::new(state.db);
    let order = service.confirm_order(distributor.0.user_id, order_id).await?;
    Ok(Json(order))
}

/// Reject a pending order with a reason
pub async fn reject_order(
    State(state): State<AppState>,
    distributor: CurrentDistributor,
    Path(order_id): Path<Uuid>,
    Json(input): Json<RejectOrderInput>,
) -> AppResult<Json<Order>> {
    let service = OrderService::new(state.db);
    let order = service
        .reject_order(distributor.0.user_id, order_id, input)
        .await?;
    Ok(Json(order))
}

/// Enter a manual order with batches named up front
pub async fn create_manual_order(
    State(state): State<AppState>,
    distributor: CurrentDistributor,
    Json(input): Json<CreateManualOrderInput>,
) -> AppResult<(StatusCode, Json<OrderWithItems>)> {
    let service = OrderService::new(state.db);
    let order = service
        .create_manual_order(distributor.0.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Replace the items of a confirmed, unverified manual order
pub async fn replace_manual_order_items(
    State(state): State<AppState>,
    distributor: CurrentDistributor,
    Path(order_id): Path<Uuid>,
    Json(input): Json<ReplaceManualItemsInput>,
) -> AppResult<Json<OrderWithItems>> {
    let service = OrderService::new(state.db);
    let order = service
        .replace_manual_order_items(distributor.0.user_id, order_id, input)
        .await?;
    Ok(Json(order))
}
