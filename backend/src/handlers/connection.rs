//! HTTP handlers for connection management endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::{CurrentDistributor, CurrentRetailer};
use crate::services::connection::{
    ConnectionService, RequestConnectionInput, RespondConnectionInput,
};
use crate::AppState;
use shared::models::{Connection, ConnectionWithParty, UserProfile};

/// Directory of distributors a retailer can connect to
pub async fn list_distributors(
    State(state): State<AppState>,
    _retailer: CurrentRetailer,
) -> AppResult<Json<Vec<UserProfile>>> {
    let service = ConnectionService::new(state.db);
    let distributors = service.list_distributors().await?;
    Ok(Json(distributors))
}

/// Retailer requests a connection to a distributor
pub async fn request_connection(
    State(state): State<AppState>,
    retailer: CurrentRetailer,
    Json(input): Json<RequestConnectionInput>,
) -> AppResult<(StatusCode, Json<Connection>)> {
    let service = ConnectionService::new(state.db);
    let connection = service.request_connection(retailer.0.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(connection)))
}

/// Retailer's connections with distributor details
pub async fn list_retailer_connections(
    State(state): State<AppState>,
    retailer: CurrentRetailer,
) -> AppResult<Json<Vec<ConnectionWithParty>>> {
    let service = ConnectionService::new(state.db);
    let connections = service.list_for_retailer(retailer.0.user_id).await?;
    Ok(Json(connections))
}

/// Distributor's incoming connection requests with retailer details
pub async fn list_distributor_connections(
    State(state): State<AppState>,
    distributor: CurrentDistributor,
) -> AppResult<Json<Vec<ConnectionWithParty>>> {
    let service = ConnectionService::new(state.db);
    let connections = service.list_for_distributor(distributor.0.user_id).await?;
    Ok(Json(connections))
}

/// Distributor accepts or rejects a pending connection request
pub async fn respond_connection(
    State(state): State<AppState>,
    distributor: CurrentDistributor,
    Path(connection_id): Path<Uuid>,
    Json(input): Json<RespondConnectionInput>,
) -> AppResult<Json<Connection>> {
    let service = ConnectionService::new(state.db);
    let connection = service
        .respond(distributor.0.user_id, connection_id, input)
        .await?;
    Ok(Json(connection))
}
