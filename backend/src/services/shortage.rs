//! Shortage lifecycle and proxy-shipment resolution
//!
//! A shortage is resolved by reserving compensating stock from donor
//! warehouses. Aggregate assignments never exceed the outstanding
//! shortfall; cancellation is possible until physical picking starts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::TimeProvider;
use crate::error::{AppError, AppResult};
use crate::services::allocation::{
    is_lock_conflict, release_reserved, AllocateRequest, AllocationService, ReservationLine,
};
use shared::models::{
    clip_assign_qty, outstanding_qty, primary_reservation_index, unresolved_qty, QuantityType,
    Shortage, ShortageAllocation, ShortageStatus, SourceType,
};
use shared::validation::validate_positive_quantity;

const DEFAULT_MAX_RETRIES: u32 = 3;

/// Shortage service managing shortages and donor-warehouse allocations
#[derive(Clone)]
pub struct ShortageService {
    db: PgPool,
    clock: Arc<dyn TimeProvider>,
    approval_required: bool,
    max_retries: u32,
}

/// Input for recording a shortage
#[derive(Debug, Deserialize)]
pub struct CreateShortageInput {
    pub wave_id: Option<Uuid>,
    pub warehouse_id: Uuid,
    pub item_id: Uuid,
    pub outbound_line_id: Option<Uuid>,
    /// Shortfall in pieces
    pub quantity: i64,
}

/// Outcome of a proxy-shipment proposal. A donor without stock yields
/// `allocation: None` — a normal unresolved outcome, not an error.
#[derive(Debug, Serialize)]
pub struct ProxyShipmentOutcome {
    pub shortage_id: Uuid,
    pub requested_qty: i64,
    pub clipped_qty: i64,
    pub allocated_qty: i64,
    pub allocation: Option<ShortageAllocation>,
}

/// Shortage with its allocations and the derived shortfall figures
#[derive(Debug, Serialize)]
pub struct ShortageDetail {
    #[serde(flatten)]
    pub shortage: Shortage,
    pub allocations: Vec<ShortageAllocation>,
    /// `S - Σ assign_qty` over non-cancelled allocations
    pub outstanding_qty: i64,
    /// `S - Σ picked_qty` over non-cancelled allocations
    pub unresolved_qty: i64,
}

/// Database row for a shortage
#[derive(Debug, sqlx::FromRow)]
struct ShortageRow {
    id: Uuid,
    wave_id: Option<Uuid>,
    warehouse_id: Uuid,
    item_id: Uuid,
    outbound_line_id: Option<Uuid>,
    quantity: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ShortageRow {
    fn into_shortage(self) -> AppResult<Shortage> {
        let status = ShortageStatus::from_str(&self.status).ok_or_else(|| {
            AppError::Internal(format!("unknown shortage status '{}'", self.status))
        })?;
        Ok(Shortage {
            id: self.id,
            wave_id: self.wave_id,
            warehouse_id: self.warehouse_id,
            item_id: self.item_id,
            outbound_line_id: self.outbound_line_id,
            quantity: self.quantity,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SHORTAGE_COLUMNS: &str =
    "id, wave_id, warehouse_id, item_id, outbound_line_id, quantity, status, created_at, updated_at";

/// Database row for a shortage allocation
#[derive(Debug, sqlx::FromRow)]
struct AllocationRow {
    id: Uuid,
    shortage_id: Uuid,
    donor_warehouse_id: Uuid,
    assign_qty: i64,
    picked_qty: i64,
    status: String,
    confirmed_user_id: Option<Uuid>,
    confirmed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AllocationRow {
    fn into_allocation(self) -> AppResult<ShortageAllocation> {
        let status = ShortageStatus::from_str(&self.status).ok_or_else(|| {
            AppError::Internal(format!("unknown shortage allocation status '{}'", self.status))
        })?;
        Ok(ShortageAllocation {
            id: self.id,
            shortage_id: self.shortage_id,
            donor_warehouse_id: self.donor_warehouse_id,
            assign_qty: self.assign_qty,
            picked_qty: self.picked_qty,
            status,
            confirmed_user_id: self.confirmed_user_id,
            confirmed_at: self.confirmed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const ALLOCATION_COLUMNS: &str = "id, shortage_id, donor_warehouse_id, assign_qty, picked_qty, \
     status, confirmed_user_id, confirmed_at, created_at, updated_at";

impl ShortageService {
    /// Create a new ShortageService instance
    pub fn new(db: PgPool, clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            db,
            clock,
            approval_required: true,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Whether proxy shipments need an approver before picking (from
    /// configuration)
    pub fn with_approval_required(mut self, approval_required: bool) -> Self {
        self.approval_required = approval_required;
        self
    }

    /// Override the number of lock-conflict retry attempts (from configuration)
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Record a shortage in PENDING
    pub async fn create_shortage(&self, input: CreateShortageInput) -> AppResult<Shortage> {
        validate_positive_quantity(input.quantity).map_err(|message| AppError::Validation {
            field: "quantity".to_string(),
            message: message.to_string(),
            message_th: "ปริมาณต้องเป็นค่าบวก".to_string(),
        })?;

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM warehouses WHERE id = $1) AND EXISTS(SELECT 1 FROM items WHERE id = $2)",
        )
        .bind(input.warehouse_id)
        .bind(input.item_id)
        .fetch_one(&self.db)
        .await?;

        if !exists {
            return Err(AppError::NotFound("Warehouse or item".to_string()));
        }

        let now = self.clock.now();
        let row = sqlx::query_as::<_, ShortageRow>(&format!(
            r#"
            INSERT INTO shortages (wave_id, warehouse_id, item_id, outbound_line_id,
                                   quantity, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6, $6)
            RETURNING {SHORTAGE_COLUMNS}
            "#,
        ))
        .bind(input.wave_id)
        .bind(input.warehouse_id)
        .bind(input.item_id)
        .bind(input.outbound_line_id)
        .bind(input.quantity)
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(shortage = %row.id, item = %row.item_id, quantity = row.quantity, "shortage created");
        row.into_shortage()
    }

    /// Propose compensating stock from a donor warehouse. The requested
    /// quantity is clipped to the outstanding shortfall; the donor is
    /// allocated with the same FEFO policy as regular demand.
    pub async fn propose_proxy_shipment(
        &self,
        shortage_id: Uuid,
        donor_warehouse_id: Uuid,
        quantity: i64,
    ) -> AppResult<ProxyShipmentOutcome> {
        validate_positive_quantity(quantity).map_err(|message| AppError::Validation {
            field: "quantity".to_string(),
            message: message.to_string(),
            message_th: "ปริมาณต้องเป็นค่าบวก".to_string(),
        })?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .try_propose(shortage_id, donor_warehouse_id, quantity)
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(err) if is_lock_conflict(&err) && attempt < self.max_retries => {
                    tracing::debug!(attempt, %shortage_id, "proxy proposal lock conflict, retrying");
                }
                Err(err) if is_lock_conflict(&err) => {
                    return Err(AppError::ConcurrencyConflict(format!(
                        "proxy proposal for shortage {} did not settle after {} attempts",
                        shortage_id, attempt
                    )));
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_propose(
        &self,
        shortage_id: Uuid,
        donor_warehouse_id: Uuid,
        quantity: i64,
    ) -> AppResult<ProxyShipmentOutcome> {
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let shortage = sqlx::query_as::<_, ShortageRow>(&format!(
            "SELECT {SHORTAGE_COLUMNS} FROM shortages WHERE id = $1 FOR UPDATE",
        ))
        .bind(shortage_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Shortage".to_string()))?
        .into_shortage()?;

        if !matches!(
            shortage.status,
            ShortageStatus::Pending | ShortageStatus::Reserved
        ) {
            return Err(AppError::InvalidStateTransition(format!(
                "proxy shipments can only be proposed while the shortage is pending or reserved, currently {}",
                shortage.status.as_str()
            )));
        }

        if donor_warehouse_id == shortage.warehouse_id {
            return Err(AppError::Validation {
                field: "donor_warehouse_id".to_string(),
                message: "Donor warehouse must differ from the shortage warehouse".to_string(),
                message_th: "คลังต้นทางต้องต่างจากคลังที่ขาดสต็อก".to_string(),
            });
        }

        let assigned: Vec<i64> = sqlx::query_scalar(
            "SELECT assign_qty FROM shortage_allocations WHERE shortage_id = $1 AND status <> 'cancelled'",
        )
        .bind(shortage_id)
        .fetch_all(&mut *tx)
        .await?;

        let outstanding = outstanding_qty(shortage.quantity, &assigned);
        if outstanding == 0 {
            return Err(AppError::ValidationError(
                "Shortage is already fully assigned".to_string(),
            ));
        }

        let clipped = clip_assign_qty(quantity, outstanding);
        let allocation_id = Uuid::new_v4();

        let request = AllocateRequest {
            warehouse_id: donor_warehouse_id,
            item_id: shortage.item_id,
            quantity: clipped,
            quantity_type: QuantityType::Piece,
            buyer_id: None,
            wave_id: None,
            source_type: SourceType::ShortageAllocation,
            source_id: allocation_id,
        };

        let allocation_service = AllocationService::new(self.db.clone(), self.clock.clone());
        let result = match allocation_service.allocate_within(&mut tx, &request).await {
            Ok(result) => result,
            // A donor without any stock position is a normal unresolved
            // outcome for this operation, not a failure
            Err(AppError::NotFound(_)) => {
                tracing::info!(
                    %shortage_id,
                    donor = %donor_warehouse_id,
                    "donor warehouse holds no stock for the item"
                );
                return Ok(ProxyShipmentOutcome {
                    shortage_id,
                    requested_qty: quantity,
                    clipped_qty: clipped,
                    allocated_qty: 0,
                    allocation: None,
                });
            }
            Err(err) => return Err(err),
        };

        if result.allocated_qty == 0 {
            tracing::info!(
                %shortage_id,
                donor = %donor_warehouse_id,
                "donor warehouse has no available stock"
            );
            return Ok(ProxyShipmentOutcome {
                shortage_id,
                requested_qty: quantity,
                clipped_qty: clipped,
                allocated_qty: 0,
                allocation: None,
            });
        }

        let status = if self.approval_required {
            ShortageStatus::Pending
        } else {
            ShortageStatus::Reserved
        };

        let allocation_row = sqlx::query_as::<_, AllocationRow>(&format!(
            r#"
            INSERT INTO shortage_allocations (id, shortage_id, donor_warehouse_id,
                                              assign_qty, picked_qty, status,
                                              created_at, updated_at)
            VALUES ($1, $2, $3, $4, 0, $5, $6, $6)
            RETURNING {ALLOCATION_COLUMNS}
            "#,
        ))
        .bind(allocation_id)
        .bind(shortage_id)
        .bind(donor_warehouse_id)
        .bind(result.allocated_qty)
        .bind(status.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        if shortage.status == ShortageStatus::Pending {
            sqlx::query("UPDATE shortages SET status = 'reserved', updated_at = $2 WHERE id = $1")
                .bind(shortage_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        // Without an approval gate the donor task is pickable immediately
        if status == ShortageStatus::Reserved {
            self.create_proxy_picking_task(
                &mut tx,
                allocation_id,
                donor_warehouse_id,
                shortage.item_id,
                result.allocated_qty,
                &result.reservations,
                now,
            )
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            %shortage_id,
            allocation = %allocation_id,
            donor = %donor_warehouse_id,
            assigned = result.allocated_qty,
            "proxy shipment proposed"
        );

        Ok(ProxyShipmentOutcome {
            shortage_id,
            requested_qty: quantity,
            clipped_qty: clipped,
            allocated_qty: result.allocated_qty,
            allocation: Some(allocation_row.into_allocation()?),
        })
    }

    /// Approve a pending proxy shipment: PENDING → RESERVED, stamping the
    /// confirming user, and create the donor-side picking task.
    pub async fn confirm_proxy_shipment(
        &self,
        allocation_id: Uuid,
        approver_id: Uuid,
    ) -> AppResult<ShortageAllocation> {
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let allocation = sqlx::query_as::<_, AllocationRow>(&format!(
            "SELECT {ALLOCATION_COLUMNS} FROM shortage_allocations WHERE id = $1 FOR UPDATE",
        ))
        .bind(allocation_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Shortage allocation".to_string()))?
        .into_allocation()?;

        if !allocation.status.can_transition_to(ShortageStatus::Reserved) {
            return Err(AppError::InvalidStateTransition(format!(
                "shortage allocation is {}, expected pending",
                allocation.status.as_str()
            )));
        }

        let item_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT item_id FROM shortages WHERE id = $1",
        )
        .bind(allocation.shortage_id)
        .fetch_one(&mut *tx)
        .await?;

        let updated = sqlx::query_as::<_, AllocationRow>(&format!(
            r#"
            UPDATE shortage_allocations
            SET status = 'reserved', confirmed_user_id = $2, confirmed_at = $3, updated_at = $3
            WHERE id = $1
            RETURNING {ALLOCATION_COLUMNS}
            "#,
        ))
        .bind(allocation_id)
        .bind(approver_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let reservations: Vec<ReservationLine> = sqlx::query_as::<_, (i64, Uuid, Option<Uuid>, i64)>(
            r#"
            SELECT id, lot_id, location_id, quantity_each
            FROM reservations
            WHERE source_type = 'shortage_allocation' AND source_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(allocation_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(|(reservation_id, lot_id, location_id, quantity)| ReservationLine {
            reservation_id,
            lot_id,
            location_id,
            quantity,
        })
        .collect();

        self.create_proxy_picking_task(
            &mut tx,
            allocation_id,
            allocation.donor_warehouse_id,
            item_id,
            allocation.assign_qty,
            &reservations,
            now,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            allocation = %allocation_id,
            approver = %approver_id,
            "proxy shipment confirmed"
        );

        updated.into_allocation()
    }

    /// Create the donor-side picking task for a reserved allocation
    #[allow(clippy::too_many_arguments)]
    async fn create_proxy_picking_task(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        allocation_id: Uuid,
        donor_warehouse_id: Uuid,
        item_id: Uuid,
        assign_qty: i64,
        reservations: &[ReservationLine],
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let default_area = sqlx::query_scalar::<_, String>(
            "SELECT default_area FROM warehouses WHERE id = $1",
        )
        .bind(donor_warehouse_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Warehouse".to_string()))?;

        let pairs: Vec<(i64, i64)> = reservations
            .iter()
            .map(|r| (r.reservation_id, r.quantity))
            .collect();
        let (lot_id, reservation_id, location_id) = match primary_reservation_index(&pairs) {
            Some(idx) => {
                let primary = &reservations[idx];
                (
                    Some(primary.lot_id),
                    Some(primary.reservation_id),
                    primary.location_id,
                )
            }
            None => (None, None, None),
        };

        let (floor, is_restricted_area) = match location_id {
            Some(location_id) => sqlx::query_as::<_, (String, bool)>(
                "SELECT floor, is_restricted FROM locations WHERE id = $1",
            )
            .bind(location_id)
            .fetch_optional(&mut **tx)
            .await?
            .unwrap_or((default_area, false)),
            None => (default_area, false),
        };

        let task_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO picking_tasks (wave_id, warehouse_id, floor, status,
                                       is_restricted_area, created_at, updated_at)
            VALUES (NULL, $1, $2, 'pending', $3, $4, $4)
            RETURNING id
            "#,
        )
        .bind(donor_warehouse_id)
        .bind(&floor)
        .bind(is_restricted_area)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO picking_item_results (picking_task_id, shortage_allocation_id,
                                              item_id, lot_id, reservation_id, location_id,
                                              ordered_qty, planned_qty, shortage_qty,
                                              status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7, 0, 'pending', $8, $8)
            "#,
        )
        .bind(task_id)
        .bind(allocation_id)
        .bind(item_id)
        .bind(lot_id)
        .bind(reservation_id)
        .bind(location_id)
        .bind(assign_qty)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Cancel a shortage allocation, releasing the donor reservation back
    /// to availability. Rejected once picking has started.
    pub async fn cancel_allocation(&self, allocation_id: Uuid) -> AppResult<ShortageAllocation> {
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let allocation = sqlx::query_as::<_, AllocationRow>(&format!(
            "SELECT {ALLOCATION_COLUMNS} FROM shortage_allocations WHERE id = $1 FOR UPDATE",
        ))
        .bind(allocation_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Shortage allocation".to_string()))?
        .into_allocation()?;

        if !allocation.status.is_cancellable() {
            return Err(AppError::InvalidStateTransition(
                "shortage allocation cannot be cancelled once picking has started".to_string(),
            ));
        }

        let reservations = sqlx::query_as::<_, (i64, Uuid, i64, Uuid)>(
            r#"
            SELECT r.id, r.lot_id, r.quantity_each, l.stock_position_id
            FROM reservations r
            JOIN lots l ON l.id = r.lot_id
            WHERE r.source_type = 'shortage_allocation' AND r.source_id = $1
            ORDER BY r.id ASC
            FOR UPDATE OF r, l
            "#,
        )
        .bind(allocation_id)
        .fetch_all(&mut *tx)
        .await?;

        for (reservation_id, lot_id, quantity_each, position_id) in reservations {
            sqlx::query("DELETE FROM reservations WHERE id = $1")
                .bind(reservation_id)
                .execute(&mut *tx)
                .await?;
            release_reserved(&mut tx, lot_id, position_id, quantity_each, now).await?;
        }

        // Withdraw the donor task if it was already laid out
        sqlx::query(
            "UPDATE picking_item_results SET status = 'cancelled', updated_at = $2 WHERE shortage_allocation_id = $1",
        )
        .bind(allocation_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE picking_tasks SET status = 'cancelled', updated_at = $2
            WHERE status = 'pending'
              AND id IN (SELECT picking_task_id FROM picking_item_results
                         WHERE shortage_allocation_id = $1)
            "#,
        )
        .bind(allocation_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let updated = sqlx::query_as::<_, AllocationRow>(&format!(
            r#"
            UPDATE shortage_allocations
            SET status = 'cancelled', updated_at = $2
            WHERE id = $1
            RETURNING {ALLOCATION_COLUMNS}
            "#,
        ))
        .bind(allocation_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        // With no live allocations left the shortage re-opens for new
        // proposals
        let open_allocations = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM shortage_allocations
            WHERE shortage_id = $1 AND status IN ('pending', 'reserved', 'picking')
            "#,
        )
        .bind(allocation.shortage_id)
        .fetch_one(&mut *tx)
        .await?;

        if open_allocations == 0 {
            sqlx::query(
                "UPDATE shortages SET status = 'pending', updated_at = $2 WHERE id = $1 AND status = 'reserved'",
            )
            .bind(allocation.shortage_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(allocation = %allocation_id, "shortage allocation cancelled");
        updated.into_allocation()
    }

    /// Cancel a shortage outright. Allowed only before picking and only
    /// when no allocation is still live.
    pub async fn cancel_shortage(&self, shortage_id: Uuid) -> AppResult<Shortage> {
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let shortage = sqlx::query_as::<_, ShortageRow>(&format!(
            "SELECT {SHORTAGE_COLUMNS} FROM shortages WHERE id = $1 FOR UPDATE",
        ))
        .bind(shortage_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Shortage".to_string()))?
        .into_shortage()?;

        if !shortage.status.is_cancellable() {
            return Err(AppError::InvalidStateTransition(
                "shortage cannot be cancelled once picking has started".to_string(),
            ));
        }

        let open_allocations = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM shortage_allocations
            WHERE shortage_id = $1 AND status IN ('pending', 'reserved', 'picking')
            "#,
        )
        .bind(shortage_id)
        .fetch_one(&mut *tx)
        .await?;

        if open_allocations > 0 {
            return Err(AppError::InvalidStateTransition(
                "cancel the shortage's allocations first".to_string(),
            ));
        }

        let updated = sqlx::query_as::<_, ShortageRow>(&format!(
            r#"
            UPDATE shortages SET status = 'cancelled', updated_at = $2
            WHERE id = $1
            RETURNING {SHORTAGE_COLUMNS}
            "#,
        ))
        .bind(shortage_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(shortage = %shortage_id, "shortage cancelled");
        updated.into_shortage()
    }

    /// Get a shortage with its allocations and derived shortfall figures
    pub async fn get_shortage(&self, shortage_id: Uuid) -> AppResult<ShortageDetail> {
        let shortage = sqlx::query_as::<_, ShortageRow>(&format!(
            "SELECT {SHORTAGE_COLUMNS} FROM shortages WHERE id = $1",
        ))
        .bind(shortage_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Shortage".to_string()))?
        .into_shortage()?;

        let allocations = sqlx::query_as::<_, AllocationRow>(&format!(
            r#"
            SELECT {ALLOCATION_COLUMNS}
            FROM shortage_allocations
            WHERE shortage_id = $1
            ORDER BY created_at ASC
            "#,
        ))
        .bind(shortage_id)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(AllocationRow::into_allocation)
        .collect::<AppResult<Vec<_>>>()?;

        let live: Vec<&ShortageAllocation> = allocations
            .iter()
            .filter(|a| a.status != ShortageStatus::Cancelled)
            .collect();
        let assigned: Vec<i64> = live.iter().map(|a| a.assign_qty).collect();
        let picked: Vec<i64> = live.iter().map(|a| a.picked_qty).collect();

        Ok(ShortageDetail {
            outstanding_qty: outstanding_qty(shortage.quantity, &assigned),
            unresolved_qty: unresolved_qty(shortage.quantity, &picked),
            shortage,
            allocations,
        })
    }

    /// List shortages, optionally filtered by warehouse
    pub async fn list_shortages(&self, warehouse_id: Option<Uuid>) -> AppResult<Vec<Shortage>> {
        let rows = sqlx::query_as::<_, ShortageRow>(&format!(
            r#"
            SELECT {SHORTAGE_COLUMNS}
            FROM shortages
            WHERE $1::uuid IS NULL OR warehouse_id = $1
            ORDER BY created_at DESC
            "#,
        ))
        .bind(warehouse_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(ShortageRow::into_shortage).collect()
    }
}
