//! Wave and picking-task orchestration
//!
//! Groups eligible outbound lines by delivery route into waves, allocates
//! stock per line, and regroups the results by physical floor into
//! picking tasks. Each route group commits or fails as one unit.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::TimeProvider;
use crate::error::{AppError, AppResult};
use crate::services::allocation::{is_lock_conflict, AllocateRequest, AllocationService};
use shared::models::{
    generate_wave_no, primary_reservation_index, PickingTask, PickingTaskStatus, QuantityType,
    SourceType, Wave, WaveStatus,
};

const DEFAULT_MAX_RETRIES: u32 = 3;

/// Wave service orchestrating wave generation and task layout
#[derive(Clone)]
pub struct WaveService {
    db: PgPool,
    clock: Arc<dyn TimeProvider>,
    max_retries: u32,
}

/// Input for scheduled wave generation
#[derive(Debug, Deserialize)]
pub struct GenerateWavesInput {
    pub warehouse_id: Uuid,
    pub shipping_date: NaiveDate,
}

/// Input for manual wave generation over pre-selected lines
#[derive(Debug, Deserialize)]
pub struct GenerateWavesManualInput {
    pub line_ids: Vec<Uuid>,
}

/// Result of one generated wave
#[derive(Debug, Serialize)]
pub struct WaveResult {
    pub wave_id: Uuid,
    pub wave_no: String,
    pub warehouse_id: Uuid,
    pub route_id: Uuid,
    pub shipping_date: NaiveDate,
    pub line_count: i64,
    pub task_count: i64,
    pub fully_allocated_lines: i64,
    pub short_lines: i64,
}

/// A route group that failed to generate; other groups are unaffected
#[derive(Debug, Serialize)]
pub struct FailedGroup {
    pub warehouse_id: Uuid,
    pub route_id: Uuid,
    pub shipping_date: NaiveDate,
    pub reason: String,
}

/// Summary returned to the wave-generation trigger
#[derive(Debug, Serialize)]
pub struct WaveGenerationSummary {
    pub waves: Vec<WaveResult>,
    pub failed_groups: Vec<FailedGroup>,
}

/// Eligible outbound line joined with its item's unit configuration
#[derive(Debug, Clone, sqlx::FromRow)]
struct EligibleLineRow {
    id: Uuid,
    warehouse_id: Uuid,
    item_id: Uuid,
    buyer_id: Option<Uuid>,
    route_id: Uuid,
    quantity: i64,
    shipping_date: NaiveDate,
    item_code: String,
    quantity_type: Option<String>,
}

/// Per-line allocation outcome carried into task layout
#[derive(Debug)]
struct PlannedLine {
    line_id: Uuid,
    item_id: Uuid,
    ordered_pieces: i64,
    allocated: i64,
    lot_id: Option<Uuid>,
    reservation_id: Option<i64>,
    location_id: Option<Uuid>,
}

/// Warehouse attributes needed for wave derivation
#[derive(Debug, sqlx::FromRow)]
struct WarehouseRow {
    code: String,
    default_area: String,
}

const ELIGIBLE_LINE_QUERY: &str = r#"
    SELECT ol.id, ol.warehouse_id, ol.item_id, ol.buyer_id, ol.route_id, ol.quantity,
           ol.shipping_date, i.code AS item_code, i.quantity_type
    FROM outbound_lines ol
    JOIN items i ON i.id = ol.item_id
"#;

impl WaveService {
    /// Create a new WaveService instance
    pub fn new(db: PgPool, clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            db,
            clock,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Override the number of lock-conflict retry attempts (from configuration)
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Generate waves for every route with pending lines on the given
    /// warehouse and shipping date.
    pub async fn generate_waves(
        &self,
        input: GenerateWavesInput,
    ) -> AppResult<WaveGenerationSummary> {
        let lines = sqlx::query_as::<_, EligibleLineRow>(&format!(
            r#"
            {ELIGIBLE_LINE_QUERY}
            WHERE ol.warehouse_id = $1 AND ol.shipping_date = $2 AND ol.status = 'pending'
            ORDER BY ol.item_id ASC, ol.id ASC
            "#,
        ))
        .bind(input.warehouse_id)
        .bind(input.shipping_date)
        .fetch_all(&self.db)
        .await?;

        self.process_groups(lines).await
    }

    /// Generate waves for an explicit, pre-selected set of lines
    pub async fn generate_waves_manual(
        &self,
        input: GenerateWavesManualInput,
    ) -> AppResult<WaveGenerationSummary> {
        if input.line_ids.is_empty() {
            return Err(AppError::Validation {
                field: "line_ids".to_string(),
                message: "At least one outbound line is required".to_string(),
                message_th: "ต้องเลือกรายการส่งออกอย่างน้อยหนึ่งรายการ".to_string(),
            });
        }

        let lines = sqlx::query_as::<_, EligibleLineRow>(&format!(
            r#"
            {ELIGIBLE_LINE_QUERY}
            WHERE ol.id = ANY($1) AND ol.status = 'pending'
            ORDER BY ol.item_id ASC, ol.id ASC
            "#,
        ))
        .bind(&input.line_ids)
        .fetch_all(&self.db)
        .await?;

        if lines.len() != input.line_ids.len() {
            return Err(AppError::Validation {
                field: "line_ids".to_string(),
                message: "Some outbound lines do not exist or are not pending".to_string(),
                message_th: "บางรายการส่งออกไม่มีอยู่หรือไม่อยู่ในสถานะรอดำเนินการ".to_string(),
            });
        }

        self.process_groups(lines).await
    }

    /// Group lines by (warehouse, route, date) and generate one wave per
    /// group. Failure of one group is logged and does not abort the rest.
    async fn process_groups(
        &self,
        lines: Vec<EligibleLineRow>,
    ) -> AppResult<WaveGenerationSummary> {
        let mut groups: BTreeMap<(Uuid, Uuid, NaiveDate), Vec<EligibleLineRow>> = BTreeMap::new();
        for line in lines {
            groups
                .entry((line.warehouse_id, line.route_id, line.shipping_date))
                .or_default()
                .push(line);
        }

        let mut waves = Vec::new();
        let mut failed_groups = Vec::new();

        for ((warehouse_id, route_id, shipping_date), group) in groups {
            match self
                .generate_wave_for_group(warehouse_id, route_id, shipping_date, &group)
                .await
            {
                Ok(result) => waves.push(result),
                Err(err) => {
                    tracing::error!(
                        %warehouse_id,
                        %route_id,
                        %shipping_date,
                        error = %err,
                        "wave generation failed for route group"
                    );
                    failed_groups.push(FailedGroup {
                        warehouse_id,
                        route_id,
                        shipping_date,
                        reason: err.to_string(),
                    });
                }
            }
        }

        Ok(WaveGenerationSummary {
            waves,
            failed_groups,
        })
    }

    async fn generate_wave_for_group(
        &self,
        warehouse_id: Uuid,
        route_id: Uuid,
        shipping_date: NaiveDate,
        lines: &[EligibleLineRow],
    ) -> AppResult<WaveResult> {
        // Quantity units must be explicit at this layer; reject the whole
        // group before any mutation.
        let mut typed_lines = Vec::with_capacity(lines.len());
        for line in lines {
            let quantity_type = match line.quantity_type.as_deref() {
                Some(s) => QuantityType::from_str(s).ok_or_else(|| AppError::Validation {
                    field: "quantity_type".to_string(),
                    message: format!("Item {} has an unknown quantity type", line.item_code),
                    message_th: format!("สินค้า {} มีประเภทหน่วยนับที่ไม่รู้จัก", line.item_code),
                })?,
                None => {
                    return Err(AppError::Validation {
                        field: "quantity_type".to_string(),
                        message: format!("Item {} has no quantity type configured", line.item_code),
                        message_th: format!("สินค้า {} ไม่ได้กำหนดประเภทหน่วยนับ", line.item_code),
                    })
                }
            };
            typed_lines.push((line, quantity_type));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .try_generate_wave(warehouse_id, route_id, shipping_date, &typed_lines)
                .await
            {
                Ok(result) => return Ok(result),
                Err(err) if is_lock_conflict(&err) && attempt < self.max_retries => {
                    tracing::debug!(attempt, %route_id, "wave generation lock conflict, retrying");
                }
                Err(err) if is_lock_conflict(&err) => {
                    return Err(AppError::ConcurrencyConflict(format!(
                        "wave generation for route {} did not settle after {} attempts",
                        route_id, attempt
                    )));
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_generate_wave(
        &self,
        warehouse_id: Uuid,
        route_id: Uuid,
        shipping_date: NaiveDate,
        typed_lines: &[(&EligibleLineRow, QuantityType)],
    ) -> AppResult<WaveResult> {
        let warehouse = sqlx::query_as::<_, WarehouseRow>(
            "SELECT code, default_area FROM warehouses WHERE id = $1",
        )
        .bind(warehouse_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Warehouse".to_string()))?;

        let route_code = sqlx::query_scalar::<_, String>(
            "SELECT code FROM delivery_routes WHERE id = $1",
        )
        .bind(route_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Delivery route".to_string()))?;

        let now = self.clock.now();
        let allocation = AllocationService::new(self.db.clone(), self.clock.clone());

        let mut tx = self.db.begin().await?;

        // Wave sequence is per warehouse and shipping date; the unique
        // index on wave_no catches races, which the retry loop absorbs.
        let sequence = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) + 1 FROM waves WHERE warehouse_id = $1 AND shipping_date = $2",
        )
        .bind(warehouse_id)
        .bind(shipping_date)
        .fetch_one(&mut *tx)
        .await?;

        let wave_no = generate_wave_no(&warehouse.code, &route_code, shipping_date, sequence);

        let wave_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO waves (wave_no, warehouse_id, route_id, shipping_date, status,
                               created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'pending', $5, $5)
            RETURNING id
            "#,
        )
        .bind(&wave_no)
        .bind(warehouse_id)
        .bind(route_id)
        .bind(shipping_date)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        // Allocate per line in the stable (item, line) order of the query
        let mut planned_lines = Vec::with_capacity(typed_lines.len());
        for (line, quantity_type) in typed_lines {
            let request = AllocateRequest {
                warehouse_id,
                item_id: line.item_id,
                quantity: line.quantity,
                quantity_type: *quantity_type,
                buyer_id: line.buyer_id,
                wave_id: Some(wave_id),
                source_type: SourceType::OutboundLine,
                source_id: line.id,
            };
            let result = allocation.allocate_within(&mut tx, &request).await?;

            let pairs: Vec<(i64, i64)> = result
                .reservations
                .iter()
                .map(|r| (r.reservation_id, r.quantity))
                .collect();
            let (lot_id, reservation_id, location_id) = match primary_reservation_index(&pairs) {
                Some(idx) => {
                    let primary = &result.reservations[idx];
                    (
                        Some(primary.lot_id),
                        Some(primary.reservation_id),
                        primary.location_id,
                    )
                }
                None => (None, None, None),
            };

            planned_lines.push(PlannedLine {
                line_id: line.id,
                item_id: line.item_id,
                ordered_pieces: result.requested_qty,
                allocated: result.allocated_qty,
                lot_id,
                reservation_id,
                location_id,
            });
        }

        // Resolve floors for the chosen locations
        let location_ids: Vec<Uuid> = planned_lines.iter().filter_map(|l| l.location_id).collect();
        let locations: HashMap<Uuid, (String, bool)> = if location_ids.is_empty() {
            HashMap::new()
        } else {
            sqlx::query_as::<_, (Uuid, String, bool)>(
                "SELECT id, floor, is_restricted FROM locations WHERE id = ANY($1)",
            )
            .bind(&location_ids)
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .map(|(id, floor, restricted)| (id, (floor, restricted)))
            .collect()
        };

        // Regroup by physical floor, warehouse default area as fallback
        let mut floor_groups: BTreeMap<String, Vec<&PlannedLine>> = BTreeMap::new();
        for line in &planned_lines {
            let floor = line
                .location_id
                .and_then(|id| locations.get(&id))
                .map(|(floor, _)| floor.clone())
                .unwrap_or_else(|| warehouse.default_area.clone());
            floor_groups.entry(floor).or_default().push(line);
        }

        let mut task_count = 0i64;
        for (floor, group) in &floor_groups {
            let is_restricted_area = group.iter().any(|line| {
                line.location_id
                    .and_then(|id| locations.get(&id))
                    .map(|(_, restricted)| *restricted)
                    .unwrap_or(false)
            });

            let task_id = sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO picking_tasks (wave_id, warehouse_id, floor, status,
                                           is_restricted_area, created_at, updated_at)
                VALUES ($1, $2, $3, 'pending', $4, $5, $5)
                RETURNING id
                "#,
            )
            .bind(wave_id)
            .bind(warehouse_id)
            .bind(floor)
            .bind(is_restricted_area)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

            for line in group {
                sqlx::query(
                    r#"
                    INSERT INTO picking_item_results (picking_task_id, outbound_line_id,
                                                      item_id, lot_id, reservation_id,
                                                      location_id, ordered_qty, planned_qty,
                                                      shortage_qty, status, created_at,
                                                      updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, 'pending', $9, $9)
                    "#,
                )
                .bind(task_id)
                .bind(line.line_id)
                .bind(line.item_id)
                .bind(line.lot_id)
                .bind(line.reservation_id)
                .bind(line.location_id)
                .bind(line.ordered_pieces)
                .bind(line.allocated)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }

            task_count += 1;
        }

        // Lines are picking-prepared once all their results exist
        let line_ids: Vec<Uuid> = planned_lines.iter().map(|l| l.line_id).collect();
        sqlx::query(
            "UPDATE outbound_lines SET status = 'picking_prepared', updated_at = $2 WHERE id = ANY($1)",
        )
        .bind(&line_ids)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let fully_allocated_lines = planned_lines
            .iter()
            .filter(|l| l.allocated == l.ordered_pieces)
            .count() as i64;
        let short_lines = planned_lines.len() as i64 - fully_allocated_lines;

        tracing::info!(
            %wave_no,
            lines = planned_lines.len(),
            tasks = task_count,
            short_lines,
            "wave generated"
        );

        Ok(WaveResult {
            wave_id,
            wave_no,
            warehouse_id,
            route_id,
            shipping_date,
            line_count: planned_lines.len() as i64,
            task_count,
            fully_allocated_lines,
            short_lines,
        })
    }

    /// Get a wave by id
    pub async fn get_wave(&self, wave_id: Uuid) -> AppResult<Wave> {
        let row = sqlx::query_as::<_, WaveRow>(
            r#"
            SELECT id, wave_no, warehouse_id, route_id, shipping_date, status,
                   created_at, updated_at
            FROM waves
            WHERE id = $1
            "#,
        )
        .bind(wave_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Wave".to_string()))?;

        row.into_wave()
    }

    /// List the picking tasks of a wave
    pub async fn list_wave_tasks(&self, wave_id: Uuid) -> AppResult<Vec<PickingTask>> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM waves WHERE id = $1)")
            .bind(wave_id)
            .fetch_one(&self.db)
            .await?;
        if !exists {
            return Err(AppError::NotFound("Wave".to_string()));
        }

        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, wave_id, warehouse_id, floor, status, picker_id,
                   is_restricted_area, created_at, updated_at
            FROM picking_tasks
            WHERE wave_id = $1
            ORDER BY floor ASC
            "#,
        )
        .bind(wave_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TaskRow::into_task).collect()
    }
}

/// Database row for a wave
#[derive(Debug, sqlx::FromRow)]
struct WaveRow {
    id: Uuid,
    wave_no: String,
    warehouse_id: Uuid,
    route_id: Uuid,
    shipping_date: NaiveDate,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WaveRow {
    fn into_wave(self) -> AppResult<Wave> {
        let status = WaveStatus::from_str(&self.status)
            .ok_or_else(|| AppError::Internal(format!("unknown wave status '{}'", self.status)))?;
        Ok(Wave {
            id: self.id,
            wave_no: self.wave_no,
            warehouse_id: self.warehouse_id,
            route_id: self.route_id,
            shipping_date: self.shipping_date,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Database row for a picking task
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TaskRow {
    pub id: Uuid,
    pub wave_id: Option<Uuid>,
    pub warehouse_id: Uuid,
    pub floor: String,
    pub status: String,
    pub picker_id: Option<Uuid>,
    pub is_restricted_area: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRow {
    pub(crate) fn into_task(self) -> AppResult<PickingTask> {
        let status = PickingTaskStatus::from_str(&self.status).ok_or_else(|| {
            AppError::Internal(format!("unknown picking task status '{}'", self.status))
        })?;
        Ok(PickingTask {
            id: self.id,
            wave_id: self.wave_id,
            warehouse_id: self.warehouse_id,
            floor: self.floor,
            status,
            picker_id: self.picker_id,
            is_restricted_area: self.is_restricted_area,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
