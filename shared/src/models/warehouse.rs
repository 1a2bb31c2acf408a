//! Warehouse, location, route, and outbound demand models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A physical warehouse
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: Uuid,
    /// Short uppercase code, embedded into wave codes (e.g., "TKO")
    pub code: String,
    pub name: String,
    /// Fallback picking floor when a line has no resolvable location
    pub default_area: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A storage location inside a warehouse
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub warehouse_id: Uuid,
    pub code: String,
    /// Physical floor/zone used to group picking work
    pub floor: String,
    /// Requires restricted-area clearance to pick from
    pub is_restricted: bool,
    pub created_at: DateTime<Utc>,
}

/// A delivery route outbound lines are batched by
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRoute {
    pub id: Uuid,
    /// Short uppercase code, embedded into wave codes (e.g., "R01")
    pub code: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// One outbound order line ("earning") awaiting picking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundLine {
    pub id: Uuid,
    pub warehouse_id: Uuid,
    pub item_id: Uuid,
    /// Downstream buyer, relevant for buyer-restricted lots
    pub buyer_id: Option<Uuid>,
    pub route_id: Uuid,
    /// Quantity in the item's configured quantity_type unit
    pub quantity: i64,
    pub shipping_date: NaiveDate,
    pub status: OutboundLineStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of an outbound line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundLineStatus {
    Pending,
    PickingPrepared,
    Shipped,
    ShippedShort,
    Cancelled,
}

impl OutboundLineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboundLineStatus::Pending => "pending",
            OutboundLineStatus::PickingPrepared => "picking_prepared",
            OutboundLineStatus::Shipped => "shipped",
            OutboundLineStatus::ShippedShort => "shipped_short",
            OutboundLineStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OutboundLineStatus::Pending),
            "picking_prepared" => Some(OutboundLineStatus::PickingPrepared),
            "shipped" => Some(OutboundLineStatus::Shipped),
            "shipped_short" => Some(OutboundLineStatus::ShippedShort),
            "cancelled" => Some(OutboundLineStatus::Cancelled),
            _ => None,
        }
    }
}
