//! Stock ledger service: receipt confirmation and position/lot reads

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::TimeProvider;
use crate::error::{AppError, AppResult};
use shared::models::{Item, Lot, LotStatus, QuantityType, Reservation, SourceType, StockPosition};

/// Stock service owning the durable ledger of positions and lots
#[derive(Clone)]
pub struct StockService {
    db: PgPool,
    clock: Arc<dyn TimeProvider>,
}

/// Database row for an item
#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    code: String,
    name: String,
    quantity_type: Option<String>,
    pieces_per_case: Option<i64>,
    pieces_per_carton: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ItemRow {
    fn into_item(self) -> AppResult<Item> {
        let quantity_type = match self.quantity_type.as_deref() {
            Some(s) => Some(QuantityType::from_str(s).ok_or_else(|| {
                AppError::Internal(format!("unknown quantity type '{}' on item {}", s, self.id))
            })?),
            None => None,
        };
        Ok(Item {
            id: self.id,
            code: self.code,
            name: self.name,
            quantity_type,
            pieces_per_case: self.pieces_per_case,
            pieces_per_carton: self.pieces_per_carton,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Fetch an item by id (works against the pool or an open transaction)
pub(crate) async fn fetch_item<'e, E>(executor: E, item_id: Uuid) -> AppResult<Item>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query_as::<_, ItemRow>(
        r#"
        SELECT id, code, name, quantity_type, pieces_per_case, pieces_per_carton,
               created_at, updated_at
        FROM items
        WHERE id = $1
        "#,
    )
    .bind(item_id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| AppError::NotFound("Item".to_string()))?
    .into_item()
}

/// Map a unit-normalization failure onto a validation error
pub(crate) fn unit_error(err: shared::UnitConversionError) -> AppError {
    AppError::Validation {
        field: "quantity".to_string(),
        message: err.to_string(),
        message_th: "ปริมาณหรืออัตราแปลงหน่วยไม่ถูกต้อง".to_string(),
    }
}

/// Database row for a stock position
#[derive(Debug, sqlx::FromRow)]
struct StockPositionRow {
    id: Uuid,
    warehouse_id: Uuid,
    item_id: Uuid,
    current_quantity: i64,
    reserved_quantity: i64,
    available_quantity: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<StockPositionRow> for StockPosition {
    fn from(row: StockPositionRow) -> Self {
        StockPosition {
            id: row.id,
            warehouse_id: row.warehouse_id,
            item_id: row.item_id,
            current_quantity: row.current_quantity,
            reserved_quantity: row.reserved_quantity,
            available_quantity: row.available_quantity,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Database row for a lot
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct LotRow {
    pub id: Uuid,
    pub stock_position_id: Uuid,
    pub warehouse_id: Uuid,
    pub item_id: Uuid,
    pub expiration_date: Option<NaiveDate>,
    pub received_at: DateTime<Utc>,
    pub source_purchase_ref: Option<String>,
    pub unit_cost: Option<Decimal>,
    pub current_quantity: i64,
    pub reserved_quantity: i64,
    pub available_quantity: i64,
    pub status: String,
    pub location_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LotRow {
    pub(crate) fn into_lot(self) -> AppResult<Lot> {
        let status = LotStatus::from_str(&self.status)
            .ok_or_else(|| AppError::Internal(format!("unknown lot status '{}'", self.status)))?;
        Ok(Lot {
            id: self.id,
            stock_position_id: self.stock_position_id,
            warehouse_id: self.warehouse_id,
            item_id: self.item_id,
            expiration_date: self.expiration_date,
            received_at: self.received_at,
            source_purchase_ref: self.source_purchase_ref,
            unit_cost: self.unit_cost,
            current_quantity: self.current_quantity,
            reserved_quantity: self.reserved_quantity,
            available_quantity: self.available_quantity,
            status,
            location_id: self.location_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const LOT_COLUMNS: &str = "id, stock_position_id, warehouse_id, item_id, expiration_date, \
     received_at, source_purchase_ref, unit_cost, current_quantity, reserved_quantity, \
     available_quantity, status, location_id, created_at, updated_at";

/// Input for confirming a stock receipt
#[derive(Debug, Deserialize)]
pub struct ConfirmReceiptInput {
    pub warehouse_id: Uuid,
    pub item_id: Uuid,
    /// Quantity in the given unit, normalized to pieces on confirmation
    pub quantity: i64,
    pub quantity_type: QuantityType,
    pub expiration_date: Option<NaiveDate>,
    pub source_purchase_ref: Option<String>,
    pub unit_cost: Option<Decimal>,
    pub location_id: Option<Uuid>,
    /// When non-empty, the lot is reservable only for these buyers
    #[serde(default)]
    pub restricted_buyer_ids: Vec<Uuid>,
}

impl StockService {
    /// Create a new StockService instance
    pub fn new(db: PgPool, clock: Arc<dyn TimeProvider>) -> Self {
        Self { db, clock }
    }

    /// Confirm a receipt: create a lot and roll its quantity into the
    /// stock position, in one transaction.
    pub async fn confirm_receipt(&self, input: ConfirmReceiptInput) -> AppResult<Lot> {
        let item = fetch_item(&self.db, input.item_id).await?;
        let pieces = item
            .to_pieces(input.quantity, input.quantity_type)
            .map_err(unit_error)?;

        let warehouse_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM warehouses WHERE id = $1)",
        )
        .bind(input.warehouse_id)
        .fetch_one(&self.db)
        .await?;

        if !warehouse_exists {
            return Err(AppError::NotFound("Warehouse".to_string()));
        }

        if let Some(location_id) = input.location_id {
            let location_ok = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM locations WHERE id = $1 AND warehouse_id = $2)",
            )
            .bind(location_id)
            .bind(input.warehouse_id)
            .fetch_one(&self.db)
            .await?;

            if !location_ok {
                return Err(AppError::Validation {
                    field: "location_id".to_string(),
                    message: "Location does not belong to the warehouse".to_string(),
                    message_th: "ตำแหน่งจัดเก็บไม่อยู่ในคลังนี้".to_string(),
                });
            }
        }

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let position_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO stock_positions (warehouse_id, item_id, current_quantity,
                                         reserved_quantity, available_quantity,
                                         created_at, updated_at)
            VALUES ($1, $2, $3, 0, $3, $4, $4)
            ON CONFLICT (warehouse_id, item_id)
            DO UPDATE SET current_quantity = stock_positions.current_quantity + $3,
                          available_quantity = stock_positions.available_quantity + $3,
                          updated_at = $4
            RETURNING id
            "#,
        )
        .bind(input.warehouse_id)
        .bind(input.item_id)
        .bind(pieces)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let lot_row = sqlx::query_as::<_, LotRow>(&format!(
            r#"
            INSERT INTO lots (stock_position_id, warehouse_id, item_id, expiration_date,
                              received_at, source_purchase_ref, unit_cost, current_quantity,
                              reserved_quantity, available_quantity, status, location_id,
                              created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, $8, 'active', $9, $10, $10)
            RETURNING {LOT_COLUMNS}
            "#,
        ))
        .bind(position_id)
        .bind(input.warehouse_id)
        .bind(input.item_id)
        .bind(input.expiration_date)
        .bind(now)
        .bind(&input.source_purchase_ref)
        .bind(input.unit_cost)
        .bind(pieces)
        .bind(input.location_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        for buyer_id in &input.restricted_buyer_ids {
            sqlx::query(
                "INSERT INTO lot_buyer_restrictions (lot_id, buyer_id) VALUES ($1, $2)",
            )
            .bind(lot_row.id)
            .bind(buyer_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            lot = %lot_row.id,
            warehouse = %input.warehouse_id,
            item = %input.item_id,
            pieces,
            "receipt confirmed"
        );

        lot_row.into_lot()
    }

    /// Get the stock position for a warehouse/item pair
    pub async fn get_position(
        &self,
        warehouse_id: Uuid,
        item_id: Uuid,
    ) -> AppResult<StockPosition> {
        let row = sqlx::query_as::<_, StockPositionRow>(
            r#"
            SELECT id, warehouse_id, item_id, current_quantity, reserved_quantity,
                   available_quantity, created_at, updated_at
            FROM stock_positions
            WHERE warehouse_id = $1 AND item_id = $2
            "#,
        )
        .bind(warehouse_id)
        .bind(item_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Stock position".to_string()))?;

        Ok(row.into())
    }

    /// List all stock positions of a warehouse
    pub async fn list_positions(&self, warehouse_id: Uuid) -> AppResult<Vec<StockPosition>> {
        let rows = sqlx::query_as::<_, StockPositionRow>(
            r#"
            SELECT id, warehouse_id, item_id, current_quantity, reserved_quantity,
                   available_quantity, created_at, updated_at
            FROM stock_positions
            WHERE warehouse_id = $1
            ORDER BY item_id
            "#,
        )
        .bind(warehouse_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(StockPosition::from).collect())
    }

    /// List lots of a warehouse/item pair in FEFO order
    pub async fn list_lots(&self, warehouse_id: Uuid, item_id: Uuid) -> AppResult<Vec<Lot>> {
        let rows = sqlx::query_as::<_, LotRow>(&format!(
            r#"
            SELECT {LOT_COLUMNS}
            FROM lots
            WHERE warehouse_id = $1 AND item_id = $2
            ORDER BY expiration_date ASC NULLS LAST, created_at ASC, id ASC
            "#,
        ))
        .bind(warehouse_id)
        .bind(item_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(LotRow::into_lot).collect()
    }

    /// List the active reservations against a lot, in creation order
    pub async fn list_lot_reservations(&self, lot_id: Uuid) -> AppResult<Vec<Reservation>> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM lots WHERE id = $1)")
            .bind(lot_id)
            .fetch_one(&self.db)
            .await?;
        if !exists {
            return Err(AppError::NotFound("Lot".to_string()));
        }

        let rows = sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT id, lot_id, wave_id, item_id, source_type, source_id,
                   quantity_each, location_id, created_at
            FROM reservations
            WHERE lot_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(lot_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(ReservationRow::into_reservation).collect()
    }
}

/// Database row for a reservation
#[derive(Debug, sqlx::FromRow)]
struct ReservationRow {
    id: i64,
    lot_id: Uuid,
    wave_id: Option<Uuid>,
    item_id: Uuid,
    source_type: String,
    source_id: Uuid,
    quantity_each: i64,
    location_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl ReservationRow {
    fn into_reservation(self) -> AppResult<Reservation> {
        let source_type = SourceType::from_str(&self.source_type).ok_or_else(|| {
            AppError::Internal(format!("unknown reservation source type '{}'", self.source_type))
        })?;
        Ok(Reservation {
            id: self.id,
            lot_id: self.lot_id,
            wave_id: self.wave_id,
            item_id: self.item_id,
            source_type,
            source_id: self.source_id,
            quantity_each: self.quantity_each,
            location_id: self.location_id,
            created_at: self.created_at,
        })
    }
}
