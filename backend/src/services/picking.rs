//! Delivery confirmation and stock depletion
//!
//! Records picked quantities and, on task completion, converts the
//! reservations into permanent stock decrements. Completion is guarded by
//! the task state machine so a retry can never double-decrement.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::TimeProvider;
use crate::error::{AppError, AppResult};
use crate::services::allocation::is_lock_conflict;
use crate::services::wave::TaskRow;
use shared::models::{
    distribute_picked, shortage_qty, unresolved_qty, OutboundLineStatus, PickingItemResult,
    PickingItemStatus, PickingTask, PickingTaskStatus, ShortageStatus, SourceType,
};
use shared::validation::validate_picked_quantity;

const DEFAULT_MAX_RETRIES: u32 = 3;

/// Picking service handling pick confirmation and task completion
#[derive(Clone)]
pub struct PickingService {
    db: PgPool,
    clock: Arc<dyn TimeProvider>,
    max_retries: u32,
}

/// A picking task with its item results
#[derive(Debug, Serialize)]
pub struct PickingTaskDetail {
    #[serde(flatten)]
    pub task: PickingTask,
    pub items: Vec<PickingItemResult>,
}

/// Database row for a picking item result
#[derive(Debug, sqlx::FromRow)]
struct ItemResultRow {
    id: Uuid,
    picking_task_id: Uuid,
    outbound_line_id: Option<Uuid>,
    shortage_allocation_id: Option<Uuid>,
    item_id: Uuid,
    lot_id: Option<Uuid>,
    reservation_id: Option<i64>,
    location_id: Option<Uuid>,
    ordered_qty: i64,
    planned_qty: i64,
    picked_qty: Option<i64>,
    shortage_qty: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ItemResultRow {
    fn into_result(self) -> AppResult<PickingItemResult> {
        let status = PickingItemStatus::from_str(&self.status).ok_or_else(|| {
            AppError::Internal(format!("unknown picking item status '{}'", self.status))
        })?;
        Ok(PickingItemResult {
            id: self.id,
            picking_task_id: self.picking_task_id,
            outbound_line_id: self.outbound_line_id,
            shortage_allocation_id: self.shortage_allocation_id,
            item_id: self.item_id,
            lot_id: self.lot_id,
            reservation_id: self.reservation_id,
            location_id: self.location_id,
            ordered_qty: self.ordered_qty,
            planned_qty: self.planned_qty,
            picked_qty: self.picked_qty,
            shortage_qty: self.shortage_qty,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const ITEM_RESULT_COLUMNS: &str = "id, picking_task_id, outbound_line_id, shortage_allocation_id, \
     item_id, lot_id, reservation_id, location_id, ordered_qty, planned_qty, picked_qty, \
     shortage_qty, status, created_at, updated_at";

/// Reservation joined with its lot, locked during depletion
#[derive(Debug, sqlx::FromRow)]
struct DepletionReservationRow {
    id: i64,
    lot_id: Uuid,
    quantity_each: i64,
    stock_position_id: Uuid,
}

impl PickingService {
    /// Create a new PickingService instance
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

    /// Record a picked quantity for one item result. Repeating the call
    /// before completion overwrites the previous value; stock moves only
    /// on task completion.
    pub async fn confirm_pick(
        &self,
        result_id: Uuid,
        picked_qty: i64,
    ) -> AppResult<PickingItemResult> {
        validate_picked_quantity(picked_qty).map_err(|message| AppError::Validation {
            field: "picked_qty".to_string(),
            message: message.to_string(),
            message_th: "จำนวนที่หยิบต้องไม่ติดลบ".to_string(),
        })?;

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, (Uuid, Option<Uuid>, i64, String, Option<Uuid>)>(
            r#"
            SELECT pir.picking_task_id, pt.wave_id, pir.ordered_qty, pt.status,
                   pir.shortage_allocation_id
            FROM picking_item_results pir
            JOIN picking_tasks pt ON pt.id = pir.picking_task_id
            WHERE pir.id = $1
            FOR UPDATE OF pir, pt
            "#,
        )
        .bind(result_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Picking item result".to_string()))?;

        let (task_id, wave_id, ordered_qty, task_status, allocation_id) = row;
        let task_status = PickingTaskStatus::from_str(&task_status).ok_or_else(|| {
            AppError::Internal(format!("unknown picking task status '{}'", task_status))
        })?;

        if task_status.is_terminal() {
            return Err(AppError::InvalidStateTransition(format!(
                "task is already {}",
                task_status.as_str()
            )));
        }

        let shortage = shortage_qty(ordered_qty, picked_qty);
        let item_status = if shortage > 0 {
            PickingItemStatus::Shortage
        } else {
            PickingItemStatus::Picked
        };

        let updated = sqlx::query_as::<_, ItemResultRow>(&format!(
            r#"
            UPDATE picking_item_results
            SET picked_qty = $2, shortage_qty = $3, status = $4, updated_at = $5
            WHERE id = $1
            RETURNING {ITEM_RESULT_COLUMNS}
            "#,
        ))
        .bind(result_id)
        .bind(picked_qty)
        .bind(shortage)
        .bind(item_status.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        // First confirmation starts the physical picking phase
        if task_status == PickingTaskStatus::Pending {
            sqlx::query("UPDATE picking_tasks SET status = 'picking', updated_at = $2 WHERE id = $1")
                .bind(task_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;

            if let Some(wave_id) = wave_id {
                sqlx::query(
                    "UPDATE waves SET status = 'picking', updated_at = $2 WHERE id = $1 AND status = 'pending'",
                )
                .bind(wave_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }

        // A proxy shipment entering physical picking can no longer be cancelled
        if let Some(allocation_id) = allocation_id {
            sqlx::query(
                "UPDATE shortage_allocations SET status = 'picking', updated_at = $2 WHERE id = $1 AND status = 'reserved'",
            )
            .bind(allocation_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                UPDATE shortages SET status = 'picking', updated_at = $2
                WHERE id = (SELECT shortage_id FROM shortage_allocations WHERE id = $1)
                  AND status = 'reserved'
                "#,
            )
            .bind(allocation_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        updated.into_result()
    }

    /// Complete a picking task: permanently decrement stock by the picked
    /// quantities, release residual reservations, and spawn shortage
    /// records for shorted lines. A second completion call is rejected.
    pub async fn complete_task(&self, task_id: Uuid) -> AppResult<PickingTaskStatus> {
        self.complete_with_retry(task_id, None).await
    }

    /// Privileged override: set every line's picked quantity to its
    /// planned quantity and complete the task, bypassing the normal
    /// pick-confirmation loop.
    pub async fn force_ship(&self, task_id: Uuid, user_id: Uuid) -> AppResult<PickingTaskStatus> {
        self.complete_with_retry(task_id, Some(user_id)).await
    }

    async fn complete_with_retry(
        &self,
        task_id: Uuid,
        force_user: Option<Uuid>,
    ) -> AppResult<PickingTaskStatus> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_complete(task_id, force_user).await {
                Ok(status) => return Ok(status),
                Err(err) if is_lock_conflict(&err) && attempt < self.max_retries => {
                    tracing::debug!(attempt, %task_id, "task completion lock conflict, retrying");
                }
                Err(err) if is_lock_conflict(&err) => {
                    return Err(AppError::ConcurrencyConflict(format!(
                        "completion of task {} did not settle after {} attempts",
                        task_id, attempt
                    )));
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_complete(
        &self,
        task_id: Uuid,
        force_user: Option<Uuid>,
    ) -> AppResult<PickingTaskStatus> {
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let task = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, wave_id, warehouse_id, floor, status, picker_id,
                   is_restricted_area, created_at, updated_at
            FROM picking_tasks
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(task_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Picking task".to_string()))?;

        let task_status = PickingTaskStatus::from_str(&task.status).ok_or_else(|| {
            AppError::Internal(format!("unknown picking task status '{}'", task.status))
        })?;

        if task_status.is_terminal() {
            return Err(AppError::InvalidStateTransition(format!(
                "task is already {}",
                task_status.as_str()
            )));
        }

        if let Some(user_id) = force_user {
            tracing::warn!(
                %task_id,
                user = %user_id,
                "force-ship override: setting picked quantities to planned"
            );
            sqlx::query(
                r#"
                UPDATE picking_item_results
                SET picked_qty = planned_qty,
                    shortage_qty = GREATEST(ordered_qty - planned_qty, 0),
                    status = CASE WHEN ordered_qty > planned_qty THEN 'shortage' ELSE 'picked' END,
                    updated_at = $2
                WHERE picking_task_id = $1
                "#,
            )
            .bind(task_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let results = sqlx::query_as::<_, ItemResultRow>(&format!(
            r#"
            SELECT {ITEM_RESULT_COLUMNS}
            FROM picking_item_results
            WHERE picking_task_id = $1
            ORDER BY created_at ASC, id ASC
            FOR UPDATE
            "#,
        ))
        .bind(task_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut any_shortage = false;
        // Accumulated (picked, planned) deltas per stock position
        let mut position_deltas: HashMap<Uuid, (i64, i64)> = HashMap::new();

        for result in &results {
            // Unconfirmed lines close at zero picked, full shortage
            let picked = result.picked_qty.unwrap_or(0);
            let shortage = shortage_qty(result.ordered_qty, picked);
            if shortage > 0 {
                any_shortage = true;
            }

            let item_status = if shortage > 0 {
                PickingItemStatus::Shortage
            } else {
                PickingItemStatus::Picked
            };
            sqlx::query(
                r#"
                UPDATE picking_item_results
                SET picked_qty = $2, shortage_qty = $3, status = $4, updated_at = $5
                WHERE id = $1
                "#,
            )
            .bind(result.id)
            .bind(picked)
            .bind(shortage)
            .bind(item_status.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;

            let (source_type, source_id) = match (result.outbound_line_id, result.shortage_allocation_id)
            {
                (Some(line_id), _) => (SourceType::OutboundLine, line_id),
                (None, Some(allocation_id)) => (SourceType::ShortageAllocation, allocation_id),
                (None, None) => {
                    return Err(AppError::InvariantViolation(format!(
                        "picking item result {} has no demand source",
                        result.id
                    )))
                }
            };

            self.deplete_line(&mut tx, source_type, source_id, picked, &mut position_deltas, now)
                .await?;

            match source_type {
                SourceType::OutboundLine => {
                    let line_status = if shortage > 0 {
                        OutboundLineStatus::ShippedShort
                    } else {
                        OutboundLineStatus::Shipped
                    };
                    sqlx::query(
                        "UPDATE outbound_lines SET status = $2, updated_at = $3 WHERE id = $1",
                    )
                    .bind(source_id)
                    .bind(line_status.as_str())
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;

                    if shortage > 0 {
                        sqlx::query(
                            r#"
                            INSERT INTO shortages (wave_id, warehouse_id, item_id,
                                                   outbound_line_id, quantity, status,
                                                   created_at, updated_at)
                            VALUES ($1, $2, $3, $4, $5, 'pending', $6, $6)
                            "#,
                        )
                        .bind(task.wave_id)
                        .bind(task.warehouse_id)
                        .bind(result.item_id)
                        .bind(source_id)
                        .bind(shortage)
                        .bind(now)
                        .execute(&mut *tx)
                        .await?;

                        tracing::info!(
                            line = %source_id,
                            item = %result.item_id,
                            shortage,
                            "shortage recorded on task completion"
                        );
                    }
                }
                SourceType::ShortageAllocation => {
                    self.settle_proxy_allocation(&mut tx, source_id, picked, now)
                        .await?;
                }
            }
        }

        for (position_id, (picked_total, planned_total)) in &position_deltas {
            let updated = sqlx::query(
                r#"
                UPDATE stock_positions
                SET current_quantity = current_quantity - $1,
                    reserved_quantity = reserved_quantity - $2,
                    available_quantity = available_quantity - $1 + $2,
                    updated_at = $4
                WHERE id = $3 AND current_quantity >= $1 AND reserved_quantity >= $2
                "#,
            )
            .bind(picked_total)
            .bind(planned_total)
            .bind(position_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                return Err(AppError::InvariantViolation(format!(
                    "depletion of {} (reserved {}) exceeds quantities on position {}",
                    picked_total, planned_total, position_id
                )));
            }
        }

        let final_status = if any_shortage {
            PickingTaskStatus::Shortage
        } else {
            PickingTaskStatus::Completed
        };
        sqlx::query("UPDATE picking_tasks SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(task_id)
            .bind(final_status.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;

        // The wave completes once every task reached a terminal state
        if let Some(wave_id) = task.wave_id {
            let open_tasks = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM picking_tasks WHERE wave_id = $1 AND status IN ('pending', 'picking')",
            )
            .bind(wave_id)
            .fetch_one(&mut *tx)
            .await?;

            if open_tasks == 0 {
                sqlx::query("UPDATE waves SET status = 'completed', updated_at = $2 WHERE id = $1")
                    .bind(wave_id)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;

        tracing::info!(%task_id, status = final_status.as_str(), "picking task completed");
        Ok(final_status)
    }

    /// Convert a line's reservations into permanent decrements: current
    /// quantity drops by the picked share, the full reserved quantity is
    /// released, and exhausted lots flip to depleted.
    async fn deplete_line(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        source_type: SourceType,
        source_id: Uuid,
        picked: i64,
        position_deltas: &mut HashMap<Uuid, (i64, i64)>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let reservations = sqlx::query_as::<_, DepletionReservationRow>(
            r#"
            SELECT r.id, r.lot_id, r.quantity_each, l.stock_position_id
            FROM reservations r
            JOIN lots l ON l.id = r.lot_id
            WHERE r.source_type = $1 AND r.source_id = $2
            ORDER BY r.id ASC
            FOR UPDATE OF r, l
            "#,
        )
        .bind(source_type.as_str())
        .bind(source_id)
        .fetch_all(&mut **tx)
        .await?;

        let planned: Vec<(i64, i64)> = reservations
            .iter()
            .map(|r| (r.id, r.quantity_each))
            .collect();
        let shares = distribute_picked(&planned, picked);

        for (reservation, (_, picked_share)) in reservations.iter().zip(shares) {
            let updated = sqlx::query(
                r#"
                UPDATE lots
                SET current_quantity = current_quantity - $1,
                    reserved_quantity = reserved_quantity - $2,
                    available_quantity = available_quantity - $1 + $2,
                    status = CASE WHEN current_quantity - $1 = 0 THEN 'depleted' ELSE status END,
                    updated_at = $4
                WHERE id = $3 AND current_quantity >= $1 AND reserved_quantity >= $2
                "#,
            )
            .bind(picked_share)
            .bind(reservation.quantity_each)
            .bind(reservation.lot_id)
            .bind(now)
            .execute(&mut **tx)
            .await?;

            if updated.rows_affected() == 0 {
                return Err(AppError::InvariantViolation(format!(
                    "depletion of {} (reserved {}) exceeds quantities on lot {}",
                    picked_share, reservation.quantity_each, reservation.lot_id
                )));
            }

            sqlx::query("DELETE FROM reservations WHERE id = $1")
                .bind(reservation.id)
                .execute(&mut **tx)
                .await?;

            let delta = position_deltas
                .entry(reservation.stock_position_id)
                .or_insert((0, 0));
            delta.0 += picked_share;
            delta.1 += reservation.quantity_each;
        }

        Ok(())
    }

    /// Advance a shortage allocation after its donor task completed, and
    /// reconcile the parent shortage. Confirmation and completion may
    /// collapse into one step (force-ship), so the transition is applied
    /// directly rather than gated per edge.
    async fn settle_proxy_allocation(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        allocation_id: Uuid,
        picked: i64,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let (shortage_id, assign_qty) = sqlx::query_as::<_, (Uuid, i64)>(
            "SELECT shortage_id, assign_qty FROM shortage_allocations WHERE id = $1 FOR UPDATE",
        )
        .bind(allocation_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Shortage allocation".to_string()))?;

        let next = if picked >= assign_qty {
            ShortageStatus::Fulfilled
        } else {
            ShortageStatus::Shortage
        };

        sqlx::query(
            "UPDATE shortage_allocations SET picked_qty = $2, status = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(allocation_id)
        .bind(picked)
        .bind(next.as_str())
        .bind(now)
        .execute(&mut **tx)
        .await?;

        let (shortage_qty, shortage_status) = sqlx::query_as::<_, (i64, String)>(
            "SELECT quantity, status FROM shortages WHERE id = $1 FOR UPDATE",
        )
        .bind(shortage_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Shortage".to_string()))?;

        let shortage_status = ShortageStatus::from_str(&shortage_status).ok_or_else(|| {
            AppError::Internal(format!("unknown shortage status '{}'", shortage_status))
        })?;

        let picked_list: Vec<i64> = sqlx::query_scalar(
            "SELECT picked_qty FROM shortage_allocations WHERE shortage_id = $1 AND status <> 'cancelled'",
        )
        .bind(shortage_id)
        .fetch_all(&mut **tx)
        .await?;

        let unresolved = unresolved_qty(shortage_qty, &picked_list);

        let open_allocations = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM shortage_allocations
            WHERE shortage_id = $1 AND status IN ('pending', 'reserved', 'picking')
            "#,
        )
        .bind(shortage_id)
        .fetch_one(&mut **tx)
        .await?;

        let shortage_next = if unresolved == 0 {
            Some(ShortageStatus::Fulfilled)
        } else if open_allocations == 0 {
            // Every compensating attempt is settled and the shortfall remains
            Some(ShortageStatus::Shortage)
        } else {
            None
        };

        if let Some(next) = shortage_next {
            if next != shortage_status {
                sqlx::query("UPDATE shortages SET status = $2, updated_at = $3 WHERE id = $1")
                    .bind(shortage_id)
                    .bind(next.as_str())
                    .bind(now)
                    .execute(&mut **tx)
                    .await?;

                tracing::info!(
                    shortage = %shortage_id,
                    status = next.as_str(),
                    unresolved,
                    "shortage reconciled from proxy shipment"
                );
            }
        }

        Ok(())
    }

    /// Get a picking task with its item results
    pub async fn get_task(&self, task_id: Uuid) -> AppResult<PickingTaskDetail> {
        let task = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, wave_id, warehouse_id, floor, status, picker_id,
                   is_restricted_area, created_at, updated_at
            FROM picking_tasks
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Picking task".to_string()))?
        .into_task()?;

        let rows = sqlx::query_as::<_, ItemResultRow>(&format!(
            r#"
            SELECT {ITEM_RESULT_COLUMNS}
            FROM picking_item_results
            WHERE picking_task_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        ))
        .bind(task_id)
        .fetch_all(&self.db)
        .await?;

        let items = rows
            .into_iter()
            .map(ItemResultRow::into_result)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PickingTaskDetail { task, items })
    }

    /// Assign a picker to a task before or during picking
    pub async fn assign_picker(&self, task_id: Uuid, picker_id: Uuid) -> AppResult<PickingTask> {
        let now = self.clock.now();

        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            UPDATE picking_tasks
            SET picker_id = $2, updated_at = $3
            WHERE id = $1 AND status IN ('pending', 'picking')
            RETURNING id, wave_id, warehouse_id, floor, status, picker_id,
                      is_restricted_area, created_at, updated_at
            "#,
        )
        .bind(task_id)
        .bind(picker_id)
        .bind(now)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| {
            AppError::InvalidStateTransition(
                "picker can only be assigned while the task is open".to_string(),
            )
        })?;

        row.into_task()
    }
}
