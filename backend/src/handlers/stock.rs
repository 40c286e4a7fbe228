//! HTTP handlers for stock ledger endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::{CurrentDistributor, CurrentRetailer};
use crate::services::stock::{CreateBatchInput, StockService, UpdateBatchInput};
use crate::services::ConnectionService;
use crate::AppState;
use shared::models::{CatalogEntry, DistributorBatch, RetailerBatch};

/// Add a stock batch to the distributor's ledger
pub async fn add_batch(
    State(state): State<AppState>,
    distributor: CurrentDistributor,
    Json(input): Json<CreateBatchInput>,
) -> AppResult<(StatusCode, Json<DistributorBatch>)> {
    let service = StockService::new(state.db);
    let batch = service.add_batch(distributor.0.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(batch)))
}

/// Update quantity or pricing on a batch
pub async fn update_batch(
    State(state): State<AppState>,
    distributor: CurrentDistributor,
    Path(stock_id): Path<Uuid>,
    Json(input): Json<UpdateBatchInput>,
) -> AppResult<Json<DistributorBatch>> {
    let service = StockService::new(state.db);
    let batch = service
        .update_batch(distributor.0.user_id, stock_id, input)
        .await?;
    Ok(Json(batch))
}

/// List the distributor's stock batches
pub async fn list_batches(
    State(state): State<AppState>,
    distributor: CurrentDistributor,
) -> AppResult<Json<Vec<DistributorBatch>>> {
    let service = StockService::new(state.db);
    let batches = service.list_batches(distributor.0.user_id).await?;
    Ok(Json(batches))
}

/// Live batches of one product, earliest expiry first
pub async fn available_batches(
    State(state): State<AppState>,
    distributor: CurrentDistributor,
    Path(product_code): Path<String>,
) -> AppResult<Json<Vec<DistributorBatch>>> {
    let service = StockService::new(state.db);
    let batches = service
        .available_batches(distributor.0.user_id, &product_code)
        .await?;
    Ok(Json(batches))
}

/// Product catalog of a connected distributor
pub async fn get_catalog(
    State(state): State<AppState>,
    retailer: CurrentRetailer,
    Path(distributor_id): Path<Uuid>,
) -> AppResult<Json<Vec<CatalogEntry>>> {
    // Catalog visibility is gated on an accepted connection; an unconnected
    // distributor reads as not found.
    let connections = ConnectionService::new(state.db.clone());
    if !connections
        .is_connected(retailer.0.user_id, distributor_id)
        .await?
    {
        return Err(AppError::NotFound("Distributor".to_string()));
    }

    let service = StockService::new(state.db);
    let catalog = service.catalog(distributor_id).await?;
    Ok(Json(catalog))
}

/// List the retailer's own stock batches
pub async fn list_retailer_stock(
    State(state): State<AppState>,
    retailer: CurrentRetailer,
) -> AppResult<Json<Vec<RetailerBatch>>> {
    let service = StockService::new(state.db);
    let stock = service.list_retailer_stock(retailer.0.user_id).await?;
    Ok(Json(stock))
}
