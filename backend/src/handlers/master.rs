//! HTTP handlers for master data endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::master::{
    CreateItemInput, CreateLocationInput, CreateOutboundLineInput, CreateRouteInput,
    CreateWarehouseInput, MasterDataService,
};
use crate::AppState;
use crate::models::{DeliveryRoute, Item, Location, OutboundLine, Warehouse};

/// Query parameters for listing outbound lines
#[derive(Debug, Deserialize)]
pub struct OutboundLinesQuery {
    pub warehouse_id: Uuid,
    pub shipping_date: NaiveDate,
}

/// Create a warehouse
pub async fn create_warehouse(
    State(state): State<AppState>,
    Json(input): Json<CreateWarehouseInput>,
) -> AppResult<Json<Warehouse>> {
    let service = MasterDataService::new(state.db, state.clock.clone());
    let warehouse = service.create_warehouse(input).await?;
    Ok(Json(warehouse))
}

/// Create an item
pub async fn create_item(
    State(state): State<AppState>,
    Json(input): Json<CreateItemInput>,
) -> AppResult<Json<Item>> {
    let service = MasterDataService::new(state.db, state.clock.clone());
    let item = service.create_item(input).await?;
    Ok(Json(item))
}

/// Create a location
pub async fn create_location(
    State(state): State<AppState>,
    Json(input): Json<CreateLocationInput>,
) -> AppResult<Json<Location>> {
    let service = MasterDataService::new(state.db, state.clock.clone());
    let location = service.create_location(input).await?;
    Ok(Json(location))
}

/// Create a delivery route
pub async fn create_route(
    State(state): State<AppState>,
    Json(input): Json<CreateRouteInput>,
) -> AppResult<Json<DeliveryRoute>> {
    let service = MasterDataService::new(state.db, state.clock.clone());
    let route = service.create_route(input).await?;
    Ok(Json(route))
}

/// Create an outbound line awaiting wave generation
pub async fn create_outbound_line(
    State(state): State<AppState>,
    Json(input): Json<CreateOutboundLineInput>,
) -> AppResult<Json<OutboundLine>> {
    let service = MasterDataService::new(state.db, state.clock.clone());
    let line = service.create_outbound_line(input).await?;
    Ok(Json(line))
}

/// List outbound lines for a warehouse and shipping date
pub async fn list_outbound_lines(
    State(state): State<AppState>,
    Query(query): Query<OutboundLinesQuery>,
) -> AppResult<Json<Vec<OutboundLine>>> {
    let service = MasterDataService::new(state.db, state.clock.clone());
    let lines = service
        .list_outbound_lines(query.warehouse_id, query.shipping_date)
        .await?;
    Ok(Json(lines))
}
