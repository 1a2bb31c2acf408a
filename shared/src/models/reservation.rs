//! Lot reservations linking stock to outbound demand

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A reservation of pieces on a lot for one demand line.
///
/// Ids are monotonically increasing (BIGSERIAL), so "lowest id" is a real
/// creation-order tie-break.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: i64,
    pub lot_id: Uuid,
    pub wave_id: Option<Uuid>,
    pub item_id: Uuid,
    pub source_type: SourceType,
    pub source_id: Uuid,
    /// Always normalized to pieces
    pub quantity_each: i64,
    pub location_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Which outbound document created the demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    OutboundLine,
    ShortageAllocation,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::OutboundLine => "outbound_line",
            SourceType::ShortageAllocation => "shortage_allocation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "outbound_line" => Some(SourceType::OutboundLine),
            "shortage_allocation" => Some(SourceType::ShortageAllocation),
            _ => None,
        }
    }
}

/// Index of the primary reservation of a line: the one with the greatest
/// quantity, ties broken by lowest reservation id. The primary reservation
/// supplies the lot/location recorded on the picking line.
pub fn primary_reservation_index(lines: &[(i64, i64)]) -> Option<usize> {
    lines
        .iter()
        .enumerate()
        .max_by(|(_, (id_a, qty_a)), (_, (id_b, qty_b))| {
            qty_a.cmp(qty_b).then(id_b.cmp(id_a))
        })
        .map(|(idx, _)| idx)
}

/// Distribute a picked quantity across a line's reservations in creation
/// order. Each reservation absorbs at most its own quantity; the sum of
/// the shares equals `min(picked, total planned)`.
pub fn distribute_picked(planned: &[(i64, i64)], picked: i64) -> Vec<(i64, i64)> {
    let mut remaining = picked.max(0);
    planned
        .iter()
        .map(|&(id, qty)| {
            let share = remaining.min(qty.max(0));
            remaining -= share;
            (id, share)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_is_greatest_quantity() {
        let lines = [(1, 3), (2, 10), (3, 5)];
        assert_eq!(primary_reservation_index(&lines), Some(1));
    }

    #[test]
    fn test_primary_tie_broken_by_lowest_id() {
        let lines = [(7, 5), (2, 5), (9, 5)];
        assert_eq!(primary_reservation_index(&lines), Some(1));
    }

    #[test]
    fn test_primary_of_empty_is_none() {
        assert_eq!(primary_reservation_index(&[]), None);
    }

    #[test]
    fn test_distribute_exact() {
        let shares = distribute_picked(&[(1, 10), (2, 2)], 12);
        assert_eq!(shares, vec![(1, 10), (2, 2)]);
    }

    #[test]
    fn test_distribute_short_pick() {
        let shares = distribute_picked(&[(1, 10), (2, 5)], 7);
        assert_eq!(shares, vec![(1, 7), (2, 0)]);
    }

    #[test]
    fn test_distribute_never_exceeds_planned() {
        let shares = distribute_picked(&[(1, 4), (2, 4)], 100);
        assert_eq!(shares, vec![(1, 4), (2, 4)]);
    }

    #[test]
    fn test_distribute_zero_pick() {
        let shares = distribute_picked(&[(1, 4)], 0);
        assert_eq!(shares, vec![(1, 0)]);
    }
}
