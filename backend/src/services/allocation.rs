//! FEFO stock allocation engine
//!
//! Converts abstract demand (item, quantity, unit, warehouse) into concrete
//! lot reservations. Candidate selection and the reservation write are
//! serialized per stock position via row locks; a partial allocation is a
//! first-class result, not an error.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::TimeProvider;
use crate::error::{AppError, AppResult};
use crate::services::stock::{fetch_item, unit_error};
use shared::models::{
    plan_fefo, planned_total, LotCandidate, PickingTaskStatus, QuantityType, SourceType,
};

const DEFAULT_MAX_RETRIES: u32 = 3;

/// Allocation service implementing the FEFO reservation policy
#[derive(Clone)]
pub struct AllocationService {
    db: PgPool,
    clock: Arc<dyn TimeProvider>,
    max_retries: u32,
}

/// One demand to allocate
#[derive(Debug, Clone, Deserialize)]
pub struct AllocateRequest {
    pub warehouse_id: Uuid,
    pub item_id: Uuid,
    /// Quantity in `quantity_type` units; normalized to pieces internally
    pub quantity: i64,
    pub quantity_type: QuantityType,
    /// Requesting buyer, checked against lot buyer restrictions
    pub buyer_id: Option<Uuid>,
    pub wave_id: Option<Uuid>,
    pub source_type: SourceType,
    pub source_id: Uuid,
}

/// One reservation created by an allocation
#[derive(Debug, Clone, Serialize)]
pub struct ReservationLine {
    pub reservation_id: i64,
    pub lot_id: Uuid,
    pub location_id: Option<Uuid>,
    pub quantity: i64,
}

/// Outcome of an allocation. `allocated_qty` may be less than
/// `requested_qty`; the difference is the shortage signal.
#[derive(Debug, Clone, Serialize)]
pub struct AllocationResult {
    pub requested_qty: i64,
    pub allocated_qty: i64,
    pub reservations: Vec<ReservationLine>,
}

impl AllocationResult {
    pub fn shortage_qty(&self) -> i64 {
        self.requested_qty - self.allocated_qty
    }

    pub fn is_full(&self) -> bool {
        self.shortage_qty() == 0
    }
}

/// Locked stock position row
#[derive(Debug, sqlx::FromRow)]
struct PositionRow {
    id: Uuid,
}

/// Candidate lot row under lock
#[derive(Debug, sqlx::FromRow)]
struct CandidateRow {
    id: Uuid,
    expiration_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    available_quantity: i64,
    location_id: Option<Uuid>,
}

/// Reservation row joined with its lot, used for cancellation
#[derive(Debug, sqlx::FromRow)]
struct ReservationRow {
    id: i64,
    lot_id: Uuid,
    quantity_each: i64,
    source_id: Uuid,
    stock_position_id: Uuid,
}

/// Whether an error is a Postgres serialization/deadlock/lock failure that
/// a bounded retry may resolve
pub(crate) fn is_lock_conflict(err: &AppError) -> bool {
    match err {
        AppError::DatabaseError(sqlx::Error::Database(db)) => matches!(
            db.code().as_deref(),
            Some("40001") | Some("40P01") | Some("55P03")
        ),
        _ => false,
    }
}

/// Release a reservation's quantity back to availability on its lot and
/// position. Current quantity is untouched; only the reservation melts.
pub(crate) async fn release_reserved(
    tx: &mut Transaction<'_, Postgres>,
    lot_id: Uuid,
    position_id: Uuid,
    quantity: i64,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let lot = sqlx::query(
        r#"
        UPDATE lots
        SET reserved_quantity = reserved_quantity - $1,
            available_quantity = available_quantity + $1,
            updated_at = $3
        WHERE id = $2 AND reserved_quantity >= $1
        "#,
    )
    .bind(quantity)
    .bind(lot_id)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    if lot.rows_affected() == 0 {
        return Err(AppError::InvariantViolation(format!(
            "release of {} exceeds reserved quantity on lot {}",
            quantity, lot_id
        )));
    }

    let position = sqlx::query(
        r#"
        UPDATE stock_positions
        SET reserved_quantity = reserved_quantity - $1,
            available_quantity = available_quantity + $1,
            updated_at = $3
        WHERE id = $2 AND reserved_quantity >= $1
        "#,
    )
    .bind(quantity)
    .bind(position_id)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    if position.rows_affected() == 0 {
        return Err(AppError::InvariantViolation(format!(
            "release of {} exceeds reserved quantity on position {}",
            quantity, position_id
        )));
    }

    Ok(())
}

impl AllocationService {
    /// Create a new AllocationService instance
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

    /// Allocate stock for one demand in its own transaction, retrying
    /// bounded on lock conflicts.
    pub async fn allocate(&self, input: AllocateRequest) -> AppResult<AllocationResult> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_allocate(&input).await {
                Ok(result) => return Ok(result),
                Err(err) if is_lock_conflict(&err) && attempt < self.max_retries => {
                    tracing::debug!(
                        attempt,
                        item = %input.item_id,
                        "allocation lock conflict, retrying"
                    );
                }
                Err(err) if is_lock_conflict(&err) => {
                    return Err(AppError::ConcurrencyConflict(format!(
                        "allocation for item {} in warehouse {} did not settle after {} attempts",
                        input.item_id, input.warehouse_id, attempt
                    )));
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_allocate(&self, input: &AllocateRequest) -> AppResult<AllocationResult> {
        let mut tx = self.db.begin().await?;
        let result = self.allocate_within(&mut tx, input).await?;
        tx.commit().await?;
        Ok(result)
    }

    /// Allocate inside a caller-owned transaction. Used by the wave
    /// orchestrator and the proxy-shipment resolver so the reservation
    /// commits or rolls back with the caller's unit of work.
    pub async fn allocate_within(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        input: &AllocateRequest,
    ) -> AppResult<AllocationResult> {
        let item = fetch_item(&mut **tx, input.item_id).await?;
        let requested_pieces = item
            .to_pieces(input.quantity, input.quantity_type)
            .map_err(unit_error)?;

        let now = self.clock.now();

        // Serialize all allocations for this warehouse/item pair
        let position = sqlx::query_as::<_, PositionRow>(
            r#"
            SELECT id
            FROM stock_positions
            WHERE warehouse_id = $1 AND item_id = $2
            FOR UPDATE
            "#,
        )
        .bind(input.warehouse_id)
        .bind(input.item_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Stock position".to_string()))?;

        // FEFO candidates: active, available, permitted for the buyer
        let candidates = sqlx::query_as::<_, CandidateRow>(
            r#"
            SELECT l.id, l.expiration_date, l.created_at, l.available_quantity, l.location_id
            FROM lots l
            WHERE l.stock_position_id = $1
              AND l.status = 'active'
              AND l.available_quantity > 0
              AND (NOT EXISTS (SELECT 1 FROM lot_buyer_restrictions br WHERE br.lot_id = l.id)
                   OR ($2::uuid IS NOT NULL AND EXISTS (
                           SELECT 1 FROM lot_buyer_restrictions br
                           WHERE br.lot_id = l.id AND br.buyer_id = $2)))
            ORDER BY l.expiration_date ASC NULLS LAST, l.created_at ASC, l.id ASC
            FOR UPDATE OF l
            "#,
        )
        .bind(position.id)
        .bind(input.buyer_id)
        .fetch_all(&mut **tx)
        .await?;

        let lot_candidates: Vec<LotCandidate> = candidates
            .into_iter()
            .map(|row| LotCandidate {
                lot_id: row.id,
                expiration_date: row.expiration_date,
                created_at: row.created_at,
                available_quantity: row.available_quantity,
                location_id: row.location_id,
            })
            .collect();

        let plan = plan_fefo(&lot_candidates, requested_pieces);
        let allocated = planned_total(&plan);

        let mut reservations = Vec::with_capacity(plan.len());
        for take in &plan {
            let reservation_id = sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO reservations (lot_id, wave_id, item_id, source_type, source_id,
                                          quantity_each, location_id, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING id
                "#,
            )
            .bind(take.lot_id)
            .bind(input.wave_id)
            .bind(input.item_id)
            .bind(input.source_type.as_str())
            .bind(input.source_id)
            .bind(take.quantity)
            .bind(take.location_id)
            .bind(now)
            .fetch_one(&mut **tx)
            .await?;

            let updated = sqlx::query(
                r#"
                UPDATE lots
                SET reserved_quantity = reserved_quantity + $1,
                    available_quantity = available_quantity - $1,
                    updated_at = $3
                WHERE id = $2 AND available_quantity >= $1
                "#,
            )
            .bind(take.quantity)
            .bind(take.lot_id)
            .bind(now)
            .execute(&mut **tx)
            .await?;

            if updated.rows_affected() == 0 {
                return Err(AppError::InvariantViolation(format!(
                    "reservation of {} exceeds available quantity on lot {}",
                    take.quantity, take.lot_id
                )));
            }

            reservations.push(ReservationLine {
                reservation_id,
                lot_id: take.lot_id,
                location_id: take.location_id,
                quantity: take.quantity,
            });
        }

        if allocated > 0 {
            let updated = sqlx::query(
                r#"
                UPDATE stock_positions
                SET reserved_quantity = reserved_quantity + $1,
                    available_quantity = available_quantity - $1,
                    updated_at = $3
                WHERE id = $2 AND available_quantity >= $1
                "#,
            )
            .bind(allocated)
            .bind(position.id)
            .bind(now)
            .execute(&mut **tx)
            .await?;

            if updated.rows_affected() == 0 {
                return Err(AppError::InvariantViolation(format!(
                    "reservation of {} exceeds available quantity on position {}",
                    allocated, position.id
                )));
            }
        }

        tracing::debug!(
            warehouse = %input.warehouse_id,
            item = %input.item_id,
            requested = requested_pieces,
            allocated,
            lots = reservations.len(),
            "allocation planned"
        );

        Ok(AllocationResult {
            requested_qty: requested_pieces,
            allocated_qty: allocated,
            reservations,
        })
    }

    /// Cancel a reservation, releasing its quantity back to availability.
    /// Rejected once the owning picking task has started.
    pub async fn cancel_reservation(&self, reservation_id: i64) -> AppResult<()> {
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let reservation = sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT r.id, r.lot_id, r.quantity_each, r.source_id, l.stock_position_id
            FROM reservations r
            JOIN lots l ON l.id = r.lot_id
            WHERE r.id = $1
            FOR UPDATE OF r, l
            "#,
        )
        .bind(reservation_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Reservation".to_string()))?;

        let task_statuses: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT pt.status
            FROM picking_item_results pir
            JOIN picking_tasks pt ON pt.id = pir.picking_task_id
            WHERE pir.outbound_line_id = $1 OR pir.shortage_allocation_id = $1
            "#,
        )
        .bind(reservation.source_id)
        .fetch_all(&mut *tx)
        .await?;

        for status in &task_statuses {
            let status = PickingTaskStatus::from_str(status).ok_or_else(|| {
                AppError::Internal(format!("unknown picking task status '{}'", status))
            })?;
            if !matches!(
                status,
                PickingTaskStatus::Pending | PickingTaskStatus::Cancelled
            ) {
                return Err(AppError::InvalidStateTransition(
                    "reservation cannot be cancelled once picking has started".to_string(),
                ));
            }
        }

        sqlx::query("DELETE FROM reservations WHERE id = $1")
            .bind(reservation.id)
            .execute(&mut *tx)
            .await?;

        release_reserved(
            &mut tx,
            reservation.lot_id,
            reservation.stock_position_id,
            reservation.quantity_each,
            now,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(reservation = reservation.id, lot = %reservation.lot_id, "reservation cancelled");
        Ok(())
    }
}
