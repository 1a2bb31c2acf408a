//! HTTP handlers for shortage and proxy-shipment endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::shortage::{
    CreateShortageInput, ProxyShipmentOutcome, ShortageDetail, ShortageService,
};
use crate::AppState;
use crate::models::{Shortage, ShortageAllocation};

/// Query parameters for listing shortages
#[derive(Debug, Deserialize)]
pub struct ShortageListQuery {
    pub warehouse_id: Option<Uuid>,
}

/// Request body for proposing a proxy shipment
#[derive(Debug, Deserialize)]
pub struct ProposeProxyRequest {
    pub donor_warehouse_id: Uuid,
    pub quantity: i64,
}

/// Request body for confirming a proxy shipment
#[derive(Debug, Deserialize)]
pub struct ConfirmProxyRequest {
    pub approver_id: Uuid,
}

fn shortage_service(state: AppState) -> ShortageService {
    ShortageService::new(state.db, state.clock.clone())
        .with_approval_required(state.config.proxy.approval_required)
        .with_max_retries(state.config.allocation.max_retries)
}

/// Record a shortage
pub async fn create_shortage(
    State(state): State<AppState>,
    Json(input): Json<CreateShortageInput>,
) -> AppResult<Json<Shortage>> {
    let shortage = shortage_service(state).create_shortage(input).await?;
    Ok(Json(shortage))
}

/// List shortages, optionally filtered by warehouse
pub async fn list_shortages(
    State(state): State<AppState>,
    Query(query): Query<ShortageListQuery>,
) -> AppResult<Json<Vec<Shortage>>> {
    let shortages = shortage_service(state)
        .list_shortages(query.warehouse_id)
        .await?;
    Ok(Json(shortages))
}

/// Get a shortage with its allocations and shortfall figures
pub async fn get_shortage(
    State(state): State<AppState>,
    Path(shortage_id): Path<Uuid>,
) -> AppResult<Json<ShortageDetail>> {
    let detail = shortage_service(state).get_shortage(shortage_id).await?;
    Ok(Json(detail))
}

/// Cancel a shortage before picking starts
pub async fn cancel_shortage(
    State(state): State<AppState>,
    Path(shortage_id): Path<Uuid>,
) -> AppResult<Json<Shortage>> {
    let shortage = shortage_service(state).cancel_shortage(shortage_id).await?;
    Ok(Json(shortage))
}

/// Propose compensating stock from a donor warehouse
pub async fn propose_proxy_shipment(
    State(state): State<AppState>,
    Path(shortage_id): Path<Uuid>,
    Json(input): Json<ProposeProxyRequest>,
) -> AppResult<Json<ProxyShipmentOutcome>> {
    let outcome = shortage_service(state)
        .propose_proxy_shipment(shortage_id, input.donor_warehouse_id, input.quantity)
        .await?;
    Ok(Json(outcome))
}

/// Approve a pending proxy shipment
pub async fn confirm_proxy_shipment(
    State(state): State<AppState>,
    Path(allocation_id): Path<Uuid>,
    Json(input): Json<ConfirmProxyRequest>,
) -> AppResult<Json<ShortageAllocation>> {
    let allocation = shortage_service(state)
        .confirm_proxy_shipment(allocation_id, input.approver_id)
        .await?;
    Ok(Json(allocation))
}

/// Cancel a proxy shipment before picking starts
pub async fn cancel_proxy_allocation(
    State(state): State<AppState>,
    Path(allocation_id): Path<Uuid>,
) -> AppResult<Json<ShortageAllocation>> {
    let allocation = shortage_service(state)
        .cancel_allocation(allocation_id)
        .await?;
    Ok(Json(allocation))
}
