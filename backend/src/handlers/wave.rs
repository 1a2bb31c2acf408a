//! HTTP handlers for wave generation endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::wave::{
    GenerateWavesInput, GenerateWavesManualInput, WaveGenerationSummary, WaveService,
};
use crate::AppState;
use crate::models::{PickingTask, Wave};

/// Generate waves for a warehouse and shipping date
pub async fn generate_waves(
    State(state): State<AppState>,
    Json(input): Json<GenerateWavesInput>,
) -> AppResult<Json<WaveGenerationSummary>> {
    let service = WaveService::new(state.db, state.clock.clone())
        .with_max_retries(state.config.allocation.max_retries);
    let summary = service.generate_waves(input).await?;
    Ok(Json(summary))
}

/// Generate waves for an explicit set of outbound lines
pub async fn generate_waves_manual(
    State(state): State<AppState>,
    Json(input): Json<GenerateWavesManualInput>,
) -> AppResult<Json<WaveGenerationSummary>> {
    let service = WaveService::new(state.db, state.clock.clone())
        .with_max_retries(state.config.allocation.max_retries);
    let summary = service.generate_waves_manual(input).await?;
    Ok(Json(summary))
}

/// Get a wave by id
pub async fn get_wave(
    State(state): State<AppState>,
    Path(wave_id): Path<Uuid>,
) -> AppResult<Json<Wave>> {
    let service = WaveService::new(state.db, state.clock.clone());
    let wave = service.get_wave(wave_id).await?;
    Ok(Json(wave))
}

/// List the picking tasks of a wave
pub async fn list_wave_tasks(
    State(state): State<AppState>,
    Path(wave_id): Path<Uuid>,
) -> AppResult<Json<Vec<PickingTask>>> {
    let service = WaveService::new(state.db, state.clock.clone());
    let tasks = service.list_wave_tasks(wave_id).await?;
    Ok(Json(tasks))
}
