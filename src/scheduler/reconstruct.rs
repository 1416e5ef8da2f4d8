//! Reconstruction of already-committed charges. Commitments embedded in the
//! interval data are regrouped per vehicle into pseudo-requests whose total
//! delivered energy is fixed, and their chargers are handed back to the
//! allocator so the prior placements can be re-seated around new vehicles.

use std::collections::HashMap;

use crate::domain::{ChargerId, ChargerRateTable, InputError, Interval, VehicleId};

use super::{timegrid::TimeGrid, CommittedParams};

/// Walk the window's intervals and fold their commitments into per-vehicle
/// [`CommittedParams`], ordered by first appearance.
///
/// Each observed commitment re-inserts its charger into `available`, the
/// per-call copy of the slots' free-charger sets. The synthetic window of a
/// commitment group ends one slot after its last observed slot; a window
/// reaching past the last interval is truncated there, and an arrival before
/// the first interval clamps to slot 0.
pub(crate) fn reclaim_commitments(
    intervals: &[Interval],
    grid: &TimeGrid,
    rates: &ChargerRateTable,
    available: &mut [Vec<ChargerId>],
) -> Result<Vec<CommittedParams>, InputError> {
    let mut groups: Vec<CommittedParams> = Vec::new();
    let mut index: HashMap<VehicleId, usize> = HashMap::new();

    for (t, interval) in intervals.iter().enumerate() {
        for commitment in &interval.commitments {
            available[t].push(commitment.charger_id);

            let slot_after = t + 1;
            match index.get(&commitment.vehicle_id) {
                Some(&i) => {
                    let group = &mut groups[i];
                    group.total_kwh += commitment.charge_kwh;
                    group.end_slot = slot_after;
                }
                None => {
                    let rate_kw = rates.rate_kw(commitment.charger_id).ok_or(
                        InputError::UnknownCharger {
                            charger: commitment.charger_id,
                        },
                    )?;
                    let start_slot = grid
                        .slot_index(commitment.arrival)
                        .clamp(0, grid.slot_count() as i64)
                        as usize;
                    index.insert(commitment.vehicle_id, groups.len());
                    groups.push(CommittedParams {
                        vehicle_id: commitment.vehicle_id,
                        charger_id: commitment.charger_id,
                        rate_kw,
                        total_kwh: commitment.charge_kwh,
                        start_slot,
                        end_slot: slot_after,
                        arrival: commitment.arrival,
                        departure: commitment.departure,
                    });
                }
            }
        }
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Commitment;
    use chrono::{NaiveDate, NaiveDateTime};

    fn slot_time(minutes: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 5, 25)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap()
            + chrono::Duration::minutes(minutes)
    }

    fn empty_interval(minutes: i64) -> Interval {
        Interval {
            start: slot_time(minutes),
            traditional_kwh: 10.0,
            renewable_kwh: 0.0,
            consumption_kwh: 0.0,
            max_capacity_kwh: 50.0,
            available_chargers: vec![],
            price_tariff: None,
            commitments: vec![],
        }
    }

    fn commitment(vehicle_id: u32, charge_kwh: f64, arrival_min: i64) -> Commitment {
        Commitment {
            vehicle_id,
            charge_kwh,
            charger_id: 0,
            arrival: slot_time(arrival_min),
            departure: slot_time(arrival_min + 45),
        }
    }

    #[test]
    fn groups_commitments_per_vehicle() {
        let mut intervals = vec![empty_interval(0), empty_interval(15), empty_interval(30)];
        intervals[0].commitments.push(commitment(7, 5.0, 0));
        intervals[1].commitments.push(commitment(7, 3.0, 0));

        let grid = TimeGrid::new(slot_time(0), 3, 15);
        let rates = ChargerRateTable::new(vec![50.0]);
        let mut available = vec![vec![]; 3];

        let groups = reclaim_commitments(&intervals, &grid, &rates, &mut available).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].vehicle_id, 7);
        assert_eq!(groups[0].total_kwh, 8.0);
        assert_eq!(groups[0].start_slot, 0);
        // One slot past the last observed commitment.
        assert_eq!(groups[0].end_slot, 2);
    }

    #[test]
    fn reinserts_chargers_into_availability() {
        let mut intervals = vec![empty_interval(0), empty_interval(15)];
        intervals[0].commitments.push(commitment(7, 5.0, 0));

        let grid = TimeGrid::new(slot_time(0), 2, 15);
        let rates = ChargerRateTable::new(vec![50.0]);
        let mut available = vec![vec![]; 2];

        reclaim_commitments(&intervals, &grid, &rates, &mut available).unwrap();
        assert_eq!(available[0], vec![0]);
        assert!(available[1].is_empty());
    }

    #[test]
    fn clamps_arrivals_before_the_window() {
        let mut intervals = vec![empty_interval(0), empty_interval(15)];
        intervals[1].commitments.push(commitment(7, 4.0, -60));

        let grid = TimeGrid::new(slot_time(0), 2, 15);
        let rates = ChargerRateTable::new(vec![50.0]);
        let mut available = vec![vec![]; 2];

        let groups = reclaim_commitments(&intervals, &grid, &rates, &mut available).unwrap();
        assert_eq!(groups[0].start_slot, 0);
        assert_eq!(groups[0].end_slot, 2);
    }

    #[test]
    fn keeps_first_appearance_order() {
        let mut intervals = vec![empty_interval(0), empty_interval(15)];
        intervals[0].commitments.push(commitment(9, 2.0, 0));
        intervals[0].commitments.push(commitment(4, 1.0, 0));
        intervals[1].commitments.push(commitment(9, 2.0, 0));

        let grid = TimeGrid::new(slot_time(0), 2, 15);
        let rates = ChargerRateTable::new(vec![50.0]);
        let mut available = vec![vec![]; 2];

        let groups = reclaim_commitments(&intervals, &grid, &rates, &mut available).unwrap();
        let ids: Vec<u32> = groups.iter().map(|g| g.vehicle_id).collect();
        assert_eq!(ids, vec![9, 4]);
        // The charger was handed back once per observed commitment.
        assert_eq!(available[0], vec![0, 0]);
    }
}
