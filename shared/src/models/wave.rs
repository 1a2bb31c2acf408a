//! Wave and picking work models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A batch of outbound lines selected for one route/warehouse/date
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wave {
    pub id: Uuid,
    /// Derived code: warehouse code + route code + YYYYMMDD + sequence
    pub wave_no: String,
    pub warehouse_id: Uuid,
    pub route_id: Uuid,
    pub shipping_date: NaiveDate,
    pub status: WaveStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveStatus {
    Pending,
    Picking,
    Completed,
    Cancelled,
}

impl WaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaveStatus::Pending => "pending",
            WaveStatus::Picking => "picking",
            WaveStatus::Completed => "completed",
            WaveStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(WaveStatus::Pending),
            "picking" => Some(WaveStatus::Picking),
            "completed" => Some(WaveStatus::Completed),
            "cancelled" => Some(WaveStatus::Cancelled),
            _ => None,
        }
    }
}

/// Derive a wave code. The sequence is per warehouse and shipping date.
pub fn generate_wave_no(
    warehouse_code: &str,
    route_code: &str,
    shipping_date: NaiveDate,
    sequence: i64,
) -> String {
    format!(
        "{}{}{}{:03}",
        warehouse_code,
        route_code,
        shipping_date.format("%Y%m%d"),
        sequence
    )
}

/// The unit of physical picking work: one floor/zone of one wave.
/// Proxy-shipment tasks are not attached to a wave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickingTask {
    pub id: Uuid,
    pub wave_id: Option<Uuid>,
    pub warehouse_id: Uuid,
    pub floor: String,
    pub status: PickingTaskStatus,
    pub picker_id: Option<Uuid>,
    /// True when any contained line's location is access-restricted
    pub is_restricted_area: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickingTaskStatus {
    Pending,
    Picking,
    Shortage,
    Completed,
    Cancelled,
}

impl PickingTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PickingTaskStatus::Pending => "pending",
            PickingTaskStatus::Picking => "picking",
            PickingTaskStatus::Shortage => "shortage",
            PickingTaskStatus::Completed => "completed",
            PickingTaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PickingTaskStatus::Pending),
            "picking" => Some(PickingTaskStatus::Picking),
            "shortage" => Some(PickingTaskStatus::Shortage),
            "completed" => Some(PickingTaskStatus::Completed),
            "cancelled" => Some(PickingTaskStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal states reject further pick confirmations and completions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PickingTaskStatus::Shortage
                | PickingTaskStatus::Completed
                | PickingTaskStatus::Cancelled
        )
    }
}

/// One line within a picking task. The authoritative record of whether an
/// order line was fully satisfied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickingItemResult {
    pub id: Uuid,
    pub picking_task_id: Uuid,
    pub outbound_line_id: Option<Uuid>,
    pub shortage_allocation_id: Option<Uuid>,
    pub item_id: Uuid,
    /// Primary lot/reservation (greatest quantity, then lowest id)
    pub lot_id: Option<Uuid>,
    pub reservation_id: Option<i64>,
    pub location_id: Option<Uuid>,
    pub ordered_qty: i64,
    pub planned_qty: i64,
    pub picked_qty: Option<i64>,
    pub shortage_qty: i64,
    pub status: PickingItemStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickingItemStatus {
    Pending,
    Picked,
    Shortage,
    Cancelled,
}

impl PickingItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PickingItemStatus::Pending => "pending",
            PickingItemStatus::Picked => "picked",
            PickingItemStatus::Shortage => "shortage",
            PickingItemStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PickingItemStatus::Pending),
            "picked" => Some(PickingItemStatus::Picked),
            "shortage" => Some(PickingItemStatus::Shortage),
            "cancelled" => Some(PickingItemStatus::Cancelled),
            _ => None,
        }
    }
}

/// Shortfall of a picked line
pub fn shortage_qty(ordered: i64, picked: i64) -> i64 {
    (ordered - picked).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wave_no_format() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(generate_wave_no("TKO", "R01", date, 1), "TKOR0120240307001");
        assert_eq!(generate_wave_no("TKO", "R01", date, 42), "TKOR0120240307042");
    }

    #[test]
    fn test_shortage_qty_derivation() {
        assert_eq!(shortage_qty(10, 10), 0);
        assert_eq!(shortage_qty(10, 7), 3);
        assert_eq!(shortage_qty(10, 0), 10);
        // Over-pick never yields a negative shortage
        assert_eq!(shortage_qty(10, 12), 0);
    }

    #[test]
    fn test_terminal_task_states() {
        assert!(!PickingTaskStatus::Pending.is_terminal());
        assert!(!PickingTaskStatus::Picking.is_terminal());
        assert!(PickingTaskStatus::Shortage.is_terminal());
        assert!(PickingTaskStatus::Completed.is_terminal());
        assert!(PickingTaskStatus::Cancelled.is_terminal());
    }
}
