//! HTTP handlers for the lot archival trigger

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::error::AppResult;
use crate::services::archival::{ArchivalReport, ArchivalService};
use crate::AppState;

/// Request body for an archival run
#[derive(Debug, Default, Deserialize)]
pub struct RunArchivalRequest {
    /// Override of the configured retention window, in days
    pub retention_days: Option<i64>,
}

/// Run one archival sweep
pub async fn run_archival(
    State(state): State<AppState>,
    Json(input): Json<RunArchivalRequest>,
) -> AppResult<Json<ArchivalReport>> {
    let service = ArchivalService::new(state.db, state.clock.clone())
        .with_retention_days(state.config.archival.retention_days)
        .with_batch_size(state.config.archival.batch_size);
    let report = service.archive_lots(input.retention_days).await?;
    Ok(Json(report))
}
