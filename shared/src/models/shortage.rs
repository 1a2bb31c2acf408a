//! Shortage records and proxy-shipment allocations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A recorded shortfall between ordered and picked/available quantity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shortage {
    pub id: Uuid,
    pub wave_id: Option<Uuid>,
    pub warehouse_id: Uuid,
    pub item_id: Uuid,
    pub outbound_line_id: Option<Uuid>,
    /// Shortfall in pieces
    pub quantity: i64,
    pub status: ShortageStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A compensating reservation against a donor warehouse
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortageAllocation {
    pub id: Uuid,
    pub shortage_id: Uuid,
    pub donor_warehouse_id: Uuid,
    pub assign_qty: i64,
    pub picked_qty: i64,
    pub status: ShortageStatus,
    pub confirmed_user_id: Option<Uuid>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShortageAllocation {
    pub fn remaining_qty(&self) -> i64 {
        self.assign_qty - self.picked_qty
    }
}

/// Shared state machine of Shortage and ShortageAllocation.
///
/// PENDING → RESERVED → PICKING → FULFILLED, with SHORTAGE (the
/// compensating attempt itself fell short) and CANCELLED as alternate
/// terminal states. Cancellation is impossible once picking has begun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortageStatus {
    Pending,
    Reserved,
    Picking,
    Fulfilled,
    Shortage,
    Cancelled,
}

impl ShortageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShortageStatus::Pending => "pending",
            ShortageStatus::Reserved => "reserved",
            ShortageStatus::Picking => "picking",
            ShortageStatus::Fulfilled => "fulfilled",
            ShortageStatus::Shortage => "shortage",
            ShortageStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ShortageStatus::Pending),
            "reserved" => Some(ShortageStatus::Reserved),
            "picking" => Some(ShortageStatus::Picking),
            "fulfilled" => Some(ShortageStatus::Fulfilled),
            "shortage" => Some(ShortageStatus::Shortage),
            "cancelled" => Some(ShortageStatus::Cancelled),
            _ => None,
        }
    }

    /// Valid forward transitions of the state machine
    pub fn can_transition_to(self, next: ShortageStatus) -> bool {
        use ShortageStatus::*;
        matches!(
            (self, next),
            (Pending, Reserved)
                | (Pending, Cancelled)
                | (Pending, Shortage)
                | (Reserved, Picking)
                | (Reserved, Cancelled)
                | (Reserved, Shortage)
                | (Picking, Fulfilled)
                | (Picking, Shortage)
        )
    }

    /// Cancellation is only allowed before physical picking starts
    pub fn is_cancellable(self) -> bool {
        matches!(self, ShortageStatus::Pending | ShortageStatus::Reserved)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ShortageStatus::Fulfilled | ShortageStatus::Shortage | ShortageStatus::Cancelled
        )
    }
}

/// Shortfall not yet covered by any live allocation: `S - Σ assign_qty`
/// over non-cancelled allocations. Creation-time clipping keeps this
/// non-negative.
pub fn outstanding_qty(shortage_qty: i64, assigned: &[i64]) -> i64 {
    (shortage_qty - assigned.iter().sum::<i64>()).max(0)
}

/// Clip a requested proxy quantity to the outstanding shortfall
pub fn clip_assign_qty(requested: i64, outstanding: i64) -> i64 {
    requested.min(outstanding).max(0)
}

/// Shortfall still unresolved after proxy picking: `S - Σ picked_qty`
pub fn unresolved_qty(shortage_qty: i64, picked: &[i64]) -> i64 {
    (shortage_qty - picked.iter().sum::<i64>()).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ShortageStatus::*;

    #[test]
    fn test_fulfillment_path() {
        assert!(Pending.can_transition_to(Reserved));
        assert!(Reserved.can_transition_to(Picking));
        assert!(Picking.can_transition_to(Fulfilled));
    }

    #[test]
    fn test_cancellation_boundary() {
        assert!(Pending.is_cancellable());
        assert!(Reserved.is_cancellable());
        assert!(!Picking.is_cancellable());
        assert!(!Fulfilled.is_cancellable());
        assert!(!Shortage.is_cancellable());
        assert!(!Cancelled.is_cancellable());
    }

    #[test]
    fn test_no_transition_out_of_terminal() {
        for terminal in [Fulfilled, Shortage, Cancelled] {
            for next in [Pending, Reserved, Picking, Fulfilled, Shortage, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_secondary_shortfall_reachable() {
        assert!(Pending.can_transition_to(Shortage));
        assert!(Reserved.can_transition_to(Shortage));
        assert!(Picking.can_transition_to(Shortage));
    }

    #[test]
    fn test_outstanding_and_clip() {
        assert_eq!(outstanding_qty(20, &[]), 20);
        assert_eq!(outstanding_qty(20, &[5, 10]), 5);
        assert_eq!(outstanding_qty(20, &[20]), 0);
        assert_eq!(clip_assign_qty(10, 5), 5);
        assert_eq!(clip_assign_qty(3, 5), 3);
        assert_eq!(clip_assign_qty(3, 0), 0);
    }

    #[test]
    fn test_unresolved_after_picking() {
        assert_eq!(unresolved_qty(20, &[15]), 5);
        assert_eq!(unresolved_qty(20, &[15, 5]), 0);
    }
}
