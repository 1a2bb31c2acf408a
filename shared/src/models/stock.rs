//! Stock ledger models and the FEFO consumption planner

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// On-hand stock for one warehouse × item pair.
///
/// Invariant: `available_quantity = current_quantity - reserved_quantity`
/// and never negative. All three columns are mutated together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockPosition {
    pub id: Uuid,
    pub warehouse_id: Uuid,
    pub item_id: Uuid,
    pub current_quantity: i64,
    pub reserved_quantity: i64,
    pub available_quantity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockPosition {
    /// Whether the stored columns satisfy the ledger invariant
    pub fn invariant_holds(&self) -> bool {
        self.available_quantity == self.current_quantity - self.reserved_quantity
            && self.available_quantity >= 0
            && self.reserved_quantity >= 0
    }
}

/// A physically distinct receipt of stock under a StockPosition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
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
    pub status: LotStatus,
    pub location_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of a lot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotStatus {
    Active,
    Depleted,
    Expired,
}

impl LotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LotStatus::Active => "active",
            LotStatus::Depleted => "depleted",
            LotStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(LotStatus::Active),
            "depleted" => Some(LotStatus::Depleted),
            "expired" => Some(LotStatus::Expired),
            _ => None,
        }
    }
}

/// Snapshot of a candidate lot as seen by the allocation planner
#[derive(Debug, Clone)]
pub struct LotCandidate {
    pub lot_id: Uuid,
    pub expiration_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub available_quantity: i64,
    pub location_id: Option<Uuid>,
}

/// One planned reservation against a lot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTake {
    pub lot_id: Uuid,
    pub quantity: i64,
    pub location_id: Option<Uuid>,
}

/// FEFO ordering: earliest expiration first, lots without an expiration
/// last, ties broken by receipt order and finally by id.
pub fn fefo_order(a: &LotCandidate, b: &LotCandidate) -> Ordering {
    match (a.expiration_date, b.expiration_date) {
        (Some(ea), Some(eb)) => ea.cmp(&eb),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then(a.created_at.cmp(&b.created_at))
    .then(a.lot_id.cmp(&b.lot_id))
}

/// Greedy FEFO consumption plan: consume candidates in FEFO order until
/// the requested quantity is met or candidates are exhausted. Never takes
/// more than a lot's available quantity; the planned total may fall short
/// of the request — that shortfall is the shortage signal, not an error.
pub fn plan_fefo(candidates: &[LotCandidate], requested: i64) -> Vec<PlannedTake> {
    let mut ordered: Vec<&LotCandidate> = candidates.iter().collect();
    ordered.sort_by(|a, b| fefo_order(a, b));

    let mut remaining = requested.max(0);
    let mut plan = Vec::new();
    for lot in ordered {
        if remaining == 0 {
            break;
        }
        if lot.available_quantity <= 0 {
            continue;
        }
        let take = remaining.min(lot.available_quantity);
        plan.push(PlannedTake {
            lot_id: lot.lot_id,
            quantity: take,
            location_id: lot.location_id,
        });
        remaining -= take;
    }
    plan
}

/// Total quantity of a plan
pub fn planned_total(plan: &[PlannedTake]) -> i64 {
    plan.iter().map(|t| t.quantity).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candidate(
        expiration: Option<(i32, u32, u32)>,
        received_secs: i64,
        available: i64,
    ) -> LotCandidate {
        LotCandidate {
            lot_id: Uuid::new_v4(),
            expiration_date: expiration.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            created_at: Utc.timestamp_opt(1_700_000_000 + received_secs, 0).unwrap(),
            available_quantity: available,
            location_id: None,
        }
    }

    #[test]
    fn test_fefo_earliest_expiration_first() {
        let march = candidate(Some((2024, 3, 1)), 0, 10);
        let january = candidate(Some((2024, 1, 15)), 10, 10);
        let never = candidate(None, 20, 10);

        let plan = plan_fefo(&[march.clone(), january.clone(), never.clone()], 5);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].lot_id, january.lot_id);
        assert_eq!(plan[0].quantity, 5);
    }

    #[test]
    fn test_fefo_null_expiration_consumed_last() {
        let march = candidate(Some((2024, 3, 1)), 0, 10);
        let january = candidate(Some((2024, 1, 15)), 10, 10);
        let never = candidate(None, 20, 10);

        let plan = plan_fefo(&[never.clone(), march.clone(), january.clone()], 25);
        let order: Vec<Uuid> = plan.iter().map(|t| t.lot_id).collect();
        assert_eq!(order, vec![january.lot_id, march.lot_id, never.lot_id]);
        assert_eq!(plan[2].quantity, 5);
    }

    #[test]
    fn test_fefo_tie_broken_by_receipt_order() {
        let older = candidate(Some((2024, 6, 1)), 0, 10);
        let newer = candidate(Some((2024, 6, 1)), 100, 10);

        let plan = plan_fefo(&[newer.clone(), older.clone()], 15);
        assert_eq!(plan[0].lot_id, older.lot_id);
        assert_eq!(plan[0].quantity, 10);
        assert_eq!(plan[1].lot_id, newer.lot_id);
        assert_eq!(plan[1].quantity, 5);
    }

    #[test]
    fn test_exact_satisfaction_across_two_lots() {
        // Lot A (expires earlier): 10, lot B: 5; request 12
        let a = candidate(Some((2024, 2, 1)), 0, 10);
        let b = candidate(Some((2024, 5, 1)), 10, 5);

        let plan = plan_fefo(&[b.clone(), a.clone()], 12);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].lot_id, a.lot_id);
        assert_eq!(plan[0].quantity, 10);
        assert_eq!(plan[1].lot_id, b.lot_id);
        assert_eq!(plan[1].quantity, 2);
        assert_eq!(planned_total(&plan), 12);
    }

    #[test]
    fn test_partial_plan_when_stock_short() {
        let a = candidate(Some((2024, 2, 1)), 0, 10);
        let b = candidate(Some((2024, 5, 1)), 10, 5);

        let plan = plan_fefo(&[a, b], 20);
        assert_eq!(planned_total(&plan), 15);
    }

    #[test]
    fn test_plan_skips_empty_candidates() {
        let empty = candidate(Some((2024, 1, 1)), 0, 0);
        let full = candidate(Some((2024, 2, 1)), 10, 8);

        let plan = plan_fefo(&[empty, full.clone()], 5);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].lot_id, full.lot_id);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn candidates_strategy() -> impl Strategy<Value = Vec<LotCandidate>> {
            prop::collection::vec(
                (
                    prop::option::of(0u32..720),
                    0i64..1_000_000,
                    0i64..500,
                ),
                0..12,
            )
            .prop_map(|entries| {
                entries
                    .into_iter()
                    .map(|(expiry_offset, received, available)| LotCandidate {
                        lot_id: Uuid::new_v4(),
                        expiration_date: expiry_offset.and_then(|d| {
                            NaiveDate::from_ymd_opt(2024, 1, 1)
                                .and_then(|base| base.checked_add_days(chrono::Days::new(d as u64)))
                        }),
                        created_at: Utc.timestamp_opt(1_700_000_000 + received, 0).unwrap(),
                        available_quantity: available,
                        location_id: None,
                    })
                    .collect()
            })
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(200))]

            /// A plan never exceeds the request nor any lot's availability
            #[test]
            fn prop_plan_never_over_allocates(
                candidates in candidates_strategy(),
                requested in 0i64..2_000,
            ) {
                let plan = plan_fefo(&candidates, requested);
                prop_assert!(planned_total(&plan) <= requested);

                let total_available: i64 =
                    candidates.iter().map(|c| c.available_quantity.max(0)).sum();
                prop_assert!(planned_total(&plan) <= total_available);

                for take in &plan {
                    let lot = candidates.iter().find(|c| c.lot_id == take.lot_id).unwrap();
                    prop_assert!(take.quantity > 0);
                    prop_assert!(take.quantity <= lot.available_quantity);
                }
            }

            /// When stock suffices the plan satisfies the request exactly
            #[test]
            fn prop_plan_exact_when_stock_suffices(
                candidates in candidates_strategy(),
                requested in 0i64..2_000,
            ) {
                let total_available: i64 =
                    candidates.iter().map(|c| c.available_quantity.max(0)).sum();
                let plan = plan_fefo(&candidates, requested);
                let expected = requested.min(total_available);
                prop_assert_eq!(planned_total(&plan), expected);
            }
        }
    }

    #[test]
    fn test_position_invariant() {
        let position = StockPosition {
            id: Uuid::new_v4(),
            warehouse_id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            current_quantity: 100,
            reserved_quantity: 30,
            available_quantity: 70,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(position.invariant_holds());

        let broken = StockPosition {
            available_quantity: 60,
            ..position
        };
        assert!(!broken.invariant_holds());
    }
}
