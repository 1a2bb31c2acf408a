//! Wave orchestration tests
//!
//! Tests for wave generation including:
//! - Wave code derivation
//! - Primary reservation tie-break for location assignment
//! - Floor grouping with default-area fallback
//! - Restricted-area propagation

use chrono::NaiveDate;
use proptest::prelude::*;
use std::collections::BTreeMap;
use uuid::Uuid;

use shared::models::{generate_wave_no, primary_reservation_index};

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Wave code is warehouse code + route code + YYYYMMDD + sequence
    #[test]
    fn test_wave_no_derivation() {
        let date = NaiveDate::from_ymd_opt(2024, 11, 5).unwrap();
        assert_eq!(generate_wave_no("TKO", "R01", date, 1), "TKOR0120241105001");
        assert_eq!(generate_wave_no("OSA", "N2", date, 12), "OSAN220241105012");
    }

    /// Sequences keep the code unique within a warehouse/date
    #[test]
    fn test_wave_no_sequence_distinguishes_waves() {
        let date = NaiveDate::from_ymd_opt(2024, 11, 5).unwrap();
        let first = generate_wave_no("TKO", "R01", date, 1);
        let second = generate_wave_no("TKO", "R01", date, 2);
        assert_ne!(first, second);
    }

    /// The primary reservation has the greatest quantity
    #[test]
    fn test_primary_reservation_greatest_quantity() {
        let reservations = [(11, 3), (12, 9), (13, 5)];
        assert_eq!(primary_reservation_index(&reservations), Some(1));
    }

    /// Equal quantities fall back to the lowest (earliest) reservation id
    #[test]
    fn test_primary_reservation_tie_break() {
        let reservations = [(31, 5), (17, 5), (42, 5)];
        assert_eq!(primary_reservation_index(&reservations), Some(1));
    }

    /// A line with no reservations has no primary
    #[test]
    fn test_primary_reservation_empty() {
        assert_eq!(primary_reservation_index(&[]), None);
    }

    /// Lines group by the floor of their picking location; lines without a
    /// resolvable location fall back to the warehouse default area
    #[test]
    fn test_floor_grouping_with_fallback() {
        let default_area = "AREA-1";
        let lines = vec![
            (Uuid::new_v4(), Some("F2")),
            (Uuid::new_v4(), None),
            (Uuid::new_v4(), Some("F1")),
            (Uuid::new_v4(), Some("F2")),
        ];

        let groups = group_by_floor(&lines, default_area);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups["F1"].len(), 1);
        assert_eq!(groups["F2"].len(), 2);
        assert_eq!(groups[default_area].len(), 1);
    }

    /// A task is restricted when any contained line's location is
    #[test]
    fn test_restricted_area_propagation() {
        assert!(is_restricted_task(&[false, true, false]));
        assert!(!is_restricted_task(&[false, false]));
        assert!(!is_restricted_task(&[]));
    }

    /// Mirrors the orchestrator's floor grouping
    pub fn group_by_floor<'a>(
        lines: &'a [(Uuid, Option<&'a str>)],
        default_area: &'a str,
    ) -> BTreeMap<&'a str, Vec<Uuid>> {
        let mut groups: BTreeMap<&str, Vec<Uuid>> = BTreeMap::new();
        for (line_id, floor) in lines {
            groups
                .entry(floor.unwrap_or(default_area))
                .or_default()
                .push(*line_id);
        }
        groups
    }

    pub fn is_restricted_task(line_restrictions: &[bool]) -> bool {
        line_restrictions.iter().any(|restricted| *restricted)
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Strategy for reservation (id, quantity) pairs with unique ids
    fn reservations_strategy() -> impl Strategy<Value = Vec<(i64, i64)>> {
        prop::collection::btree_map(1i64..10_000, 1i64..500, 1..10)
            .prop_map(|map| map.into_iter().collect())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// No reservation beats the primary: anything with more quantity
        /// is impossible, equal quantity implies a higher id
        #[test]
        fn prop_primary_reservation_is_maximal(
            reservations in reservations_strategy(),
        ) {
            let idx = primary_reservation_index(&reservations).unwrap();
            let (primary_id, primary_qty) = reservations[idx];

            for (id, qty) in &reservations {
                prop_assert!(*qty <= primary_qty);
                if *qty == primary_qty {
                    prop_assert!(*id >= primary_id);
                }
            }
        }

        /// Primary selection is order-independent for display stability
        #[test]
        fn prop_primary_reservation_order_independent(
            reservations in reservations_strategy(),
        ) {
            let idx = primary_reservation_index(&reservations).unwrap();
            let primary = reservations[idx];

            let mut reversed = reservations.clone();
            reversed.reverse();
            let reversed_idx = primary_reservation_index(&reversed).unwrap();
            prop_assert_eq!(reversed[reversed_idx], primary);
        }

        /// Every line lands in exactly one floor group
        #[test]
        fn prop_floor_grouping_partitions_lines(
            floors in prop::collection::vec(
                prop::option::of(prop_oneof![Just("F1"), Just("F2"), Just("F3")]),
                0..20,
            ),
        ) {
            let lines: Vec<(Uuid, Option<&str>)> =
                floors.iter().map(|f| (Uuid::new_v4(), *f)).collect();
            let groups = super::unit_tests::group_by_floor(&lines, "AREA-1");

            let grouped: usize = groups.values().map(|g| g.len()).sum();
            prop_assert_eq!(grouped, lines.len());
        }

        /// Wave codes embed the date exactly as YYYYMMDD
        #[test]
        fn prop_wave_no_embeds_date(
            year in 2020i32..2035,
            month in 1u32..13,
            day in 1u32..29,
            sequence in 1i64..1000,
        ) {
            let date = NaiveDate::from_ymd_opt(year, month, day).unwrap();
            let code = generate_wave_no("TKO", "R01", date, sequence);
            prop_assert!(code.starts_with("TKOR01"));
            let expected_date = format!("{:04}{:02}{:02}", year, month, day);
            prop_assert!(code.contains(&expected_date));
        }
    }
}
