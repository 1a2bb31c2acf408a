//! HTTP handlers for picking and delivery confirmation endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::picking::{PickingService, PickingTaskDetail};
use crate::AppState;
use crate::models::{PickingItemResult, PickingTask, PickingTaskStatus};

/// Request body for pick confirmation
#[derive(Debug, Deserialize)]
pub struct ConfirmPickRequest {
    pub picked_qty: i64,
}

/// Request body for picker assignment
#[derive(Debug, Deserialize)]
pub struct AssignPickerRequest {
    pub picker_id: Uuid,
}

/// Request body for the force-ship override
#[derive(Debug, Deserialize)]
pub struct ForceShipRequest {
    pub user_id: Uuid,
}

/// Response for completion triggers
#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub task_id: Uuid,
    pub status: PickingTaskStatus,
}

/// Record a picked quantity for one item result
pub async fn confirm_pick(
    State(state): State<AppState>,
    Path(result_id): Path<Uuid>,
    Json(input): Json<ConfirmPickRequest>,
) -> AppResult<Json<PickingItemResult>> {
    let service = PickingService::new(state.db, state.clock.clone())
        .with_max_retries(state.config.allocation.max_retries);
    let result = service.confirm_pick(result_id, input.picked_qty).await?;
    Ok(Json(result))
}

/// Get a picking task with its item results
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<PickingTaskDetail>> {
    let service = PickingService::new(state.db, state.clock.clone());
    let detail = service.get_task(task_id).await?;
    Ok(Json(detail))
}

/// Assign a picker to a task
pub async fn assign_picker(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Json(input): Json<AssignPickerRequest>,
) -> AppResult<Json<PickingTask>> {
    let service = PickingService::new(state.db, state.clock.clone());
    let task = service.assign_picker(task_id, input.picker_id).await?;
    Ok(Json(task))
}

/// Complete a picking task, finalizing the stock decrement
pub async fn complete_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<TaskStatusResponse>> {
    let service = PickingService::new(state.db, state.clock.clone())
        .with_max_retries(state.config.allocation.max_retries);
    let status = service.complete_task(task_id).await?;
    Ok(Json(TaskStatusResponse { task_id, status }))
}

/// Force-ship a task: picked quantities are set to planned unconditionally
pub async fn force_ship(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Json(input): Json<ForceShipRequest>,
) -> AppResult<Json<TaskStatusResponse>> {
    let service = PickingService::new(state.db, state.clock.clone())
        .with_max_retries(state.config.allocation.max_retries);
    let status = service.force_ship(task_id, input.user_id).await?;
    Ok(Json(TaskStatusResponse { task_id, status }))
}
