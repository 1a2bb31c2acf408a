//! Master data service
//!
//! Minimal creation/read surface for warehouses, items, locations,
//! routes, and outbound lines so the engine can be driven end to end.
//! Richer administration lives in external tooling over the same tables.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::clock::TimeProvider;
use crate::error::{AppError, AppResult};
use crate::services::stock::fetch_item;
use shared::models::{
    DeliveryRoute, Item, Location, OutboundLine, OutboundLineStatus, QuantityType, Warehouse,
};
use shared::validation::{validate_route_code, validate_warehouse_code};

/// Master data service
#[derive(Clone)]
pub struct MasterDataService {
    db: PgPool,
    clock: Arc<dyn TimeProvider>,
}

/// Input for creating a warehouse
#[derive(Debug, Deserialize, Validate)]
pub struct CreateWarehouseInput {
    pub code: String,
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(min = 1, max = 40))]
    pub default_area: String,
}

/// Input for creating an item
#[derive(Debug, Deserialize, Validate)]
pub struct CreateItemInput {
    #[validate(length(min = 1, max = 40))]
    pub code: String,
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub quantity_type: Option<QuantityType>,
    #[validate(range(min = 1))]
    pub pieces_per_case: Option<i64>,
    #[validate(range(min = 1))]
    pub pieces_per_carton: Option<i64>,
}

/// Input for creating a location
#[derive(Debug, Deserialize, Validate)]
pub struct CreateLocationInput {
    pub warehouse_id: Uuid,
    #[validate(length(min = 1, max = 40))]
    pub code: String,
    #[validate(length(min = 1, max = 40))]
    pub floor: String,
    #[serde(default)]
    pub is_restricted: bool,
}

/// Input for creating a delivery route
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRouteInput {
    pub code: String,
    #[validate(length(min = 1, max = 120))]
    pub name: String,
}

/// Input for creating an outbound line
#[derive(Debug, Deserialize, Validate)]
pub struct CreateOutboundLineInput {
    pub warehouse_id: Uuid,
    pub item_id: Uuid,
    pub buyer_id: Option<Uuid>,
    pub route_id: Uuid,
    /// Quantity in the item's configured quantity_type unit
    #[validate(range(min = 1))]
    pub quantity: i64,
    pub shipping_date: NaiveDate,
}

fn input_error(err: validator::ValidationErrors) -> AppError {
    AppError::ValidationError(err.to_string())
}

fn code_error(field: &str, message: &str) -> AppError {
    AppError::Validation {
        field: field.to_string(),
        message: message.to_string(),
        message_th: format!("รูปแบบรหัสไม่ถูกต้อง: {}", message),
    }
}

/// Database row for an outbound line
#[derive(Debug, sqlx::FromRow)]
struct OutboundLineRow {
    id: Uuid,
    warehouse_id: Uuid,
    item_id: Uuid,
    buyer_id: Option<Uuid>,
    route_id: Uuid,
    quantity: i64,
    shipping_date: NaiveDate,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OutboundLineRow {
    fn into_line(self) -> AppResult<OutboundLine> {
        let status = OutboundLineStatus::from_str(&self.status).ok_or_else(|| {
            AppError::Internal(format!("unknown outbound line status '{}'", self.status))
        })?;
        Ok(OutboundLine {
            id: self.id,
            warehouse_id: self.warehouse_id,
            item_id: self.item_id,
            buyer_id: self.buyer_id,
            route_id: self.route_id,
            quantity: self.quantity,
            shipping_date: self.shipping_date,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl MasterDataService {
    /// Create a new MasterDataService instance
    pub fn new(db: PgPool, clock: Arc<dyn TimeProvider>) -> Self {
        Self { db, clock }
    }

    /// Create a warehouse
    pub async fn create_warehouse(&self, input: CreateWarehouseInput) -> AppResult<Warehouse> {
        input.validate().map_err(input_error)?;
        validate_warehouse_code(&input.code).map_err(|m| code_error("code", m))?;

        let now = self.clock.now();
        let row = sqlx::query_as::<_, (Uuid, DateTime<Utc>, DateTime<Utc>)>(
            r#"
            INSERT INTO warehouses (code, name, default_area, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING id, created_at, updated_at
            "#,
        )
        .bind(&input.code)
        .bind(&input.name)
        .bind(&input.default_area)
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        Ok(Warehouse {
            id: row.0,
            code: input.code,
            name: input.name,
            default_area: input.default_area,
            created_at: row.1,
            updated_at: row.2,
        })
    }

    /// Create an item
    pub async fn create_item(&self, input: CreateItemInput) -> AppResult<Item> {
        input.validate().map_err(input_error)?;

        let now = self.clock.now();
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO items (code, name, quantity_type, pieces_per_case,
                               pieces_per_carton, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING id
            "#,
        )
        .bind(&input.code)
        .bind(&input.name)
        .bind(input.quantity_type.map(|qt| qt.as_str()))
        .bind(input.pieces_per_case)
        .bind(input.pieces_per_carton)
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        fetch_item(&self.db, id).await
    }

    /// Create a location within a warehouse
    pub async fn create_location(&self, input: CreateLocationInput) -> AppResult<Location> {
        input.validate().map_err(input_error)?;

        let warehouse_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM warehouses WHERE id = $1)",
        )
        .bind(input.warehouse_id)
        .fetch_one(&self.db)
        .await?;

        if !warehouse_exists {
            return Err(AppError::NotFound("Warehouse".to_string()));
        }

        let now = self.clock.now();
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO locations (warehouse_id, code, floor, is_restricted, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(input.warehouse_id)
        .bind(&input.code)
        .bind(&input.floor)
        .bind(input.is_restricted)
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        Ok(Location {
            id,
            warehouse_id: input.warehouse_id,
            code: input.code,
            floor: input.floor,
            is_restricted: input.is_restricted,
            created_at: now,
        })
    }

    /// Create a delivery route
    pub async fn create_route(&self, input: CreateRouteInput) -> AppResult<DeliveryRoute> {
        input.validate().map_err(input_error)?;
        validate_route_code(&input.code).map_err(|m| code_error("code", m))?;

        let now = self.clock.now();
        let id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO delivery_routes (code, name, created_at) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&input.code)
        .bind(&input.name)
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        Ok(DeliveryRoute {
            id,
            code: input.code,
            name: input.name,
            created_at: now,
        })
    }

    /// Create an outbound line awaiting wave generation
    pub async fn create_outbound_line(
        &self,
        input: CreateOutboundLineInput,
    ) -> AppResult<OutboundLine> {
        input.validate().map_err(input_error)?;

        let references_ok = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(SELECT 1 FROM warehouses WHERE id = $1)
               AND EXISTS(SELECT 1 FROM items WHERE id = $2)
               AND EXISTS(SELECT 1 FROM delivery_routes WHERE id = $3)
            "#,
        )
        .bind(input.warehouse_id)
        .bind(input.item_id)
        .bind(input.route_id)
        .fetch_one(&self.db)
        .await?;

        if !references_ok {
            return Err(AppError::NotFound("Warehouse, item, or route".to_string()));
        }

        let now = self.clock.now();
        let row = sqlx::query_as::<_, OutboundLineRow>(
            r#"
            INSERT INTO outbound_lines (warehouse_id, item_id, buyer_id, route_id,
                                        quantity, shipping_date, status, created_at,
                                        updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $7)
            RETURNING id, warehouse_id, item_id, buyer_id, route_id, quantity,
                      shipping_date, status, created_at, updated_at
            "#,
        )
        .bind(input.warehouse_id)
        .bind(input.item_id)
        .bind(input.buyer_id)
        .bind(input.route_id)
        .bind(input.quantity)
        .bind(input.shipping_date)
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        row.into_line()
    }

    /// List outbound lines for a warehouse and shipping date
    pub async fn list_outbound_lines(
        &self,
        warehouse_id: Uuid,
        shipping_date: NaiveDate,
    ) -> AppResult<Vec<OutboundLine>> {
        let rows = sqlx::query_as::<_, OutboundLineRow>(
            r#"
            SELECT id, warehouse_id, item_id, buyer_id, route_id, quantity,
                   shipping_date, status, created_at, updated_at
            FROM outbound_lines
            WHERE warehouse_id = $1 AND shipping_date = $2
            ORDER BY item_id ASC, id ASC
            "#,
        )
        .bind(warehouse_id)
        .bind(shipping_date)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(OutboundLineRow::into_line).collect()
    }
}
