//! HTTP handlers for stock ledger endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::stock::{ConfirmReceiptInput, StockService};
use crate::services::AllocationService;
use crate::AppState;
use crate::models::{Lot, Reservation, StockPosition};

/// Confirm a stock receipt, creating a lot
pub async fn confirm_receipt(
    State(state): State<AppState>,
    Json(input): Json<ConfirmReceiptInput>,
) -> AppResult<Json<Lot>> {
    let service = StockService::new(state.db, state.clock.clone());
    let lot = service.confirm_receipt(input).await?;
    Ok(Json(lot))
}

/// Get the stock position for a warehouse/item pair
pub async fn get_position(
    State(state): State<AppState>,
    Path((warehouse_id, item_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<StockPosition>> {
    let service = StockService::new(state.db, state.clock.clone());
    let position = service.get_position(warehouse_id, item_id).await?;
    Ok(Json(position))
}

/// List all stock positions of a warehouse
pub async fn list_positions(
    State(state): State<AppState>,
    Path(warehouse_id): Path<Uuid>,
) -> AppResult<Json<Vec<StockPosition>>> {
    let service = StockService::new(state.db, state.clock.clone());
    let positions = service.list_positions(warehouse_id).await?;
    Ok(Json(positions))
}

/// List lots of a warehouse/item pair in FEFO order
pub async fn list_lots(
    State(state): State<AppState>,
    Path((warehouse_id, item_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Vec<Lot>>> {
    let service = StockService::new(state.db, state.clock.clone());
    let lots = service.list_lots(warehouse_id, item_id).await?;
    Ok(Json(lots))
}

/// List the active reservations against a lot
pub async fn list_lot_reservations(
    State(state): State<AppState>,
    Path(lot_id): Path<Uuid>,
) -> AppResult<Json<Vec<Reservation>>> {
    let service = StockService::new(state.db, state.clock.clone());
    let reservations = service.list_lot_reservations(lot_id).await?;
    Ok(Json(reservations))
}

/// Cancel a reservation while picking has not started
pub async fn cancel_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<i64>,
) -> AppResult<Json<()>> {
    let service = AllocationService::new(state.db, state.clock.clone())
        .with_max_retries(state.config.allocation.max_retries);
    service.cancel_reservation(reservation_id).await?;
    Ok(Json(()))
}
