//! The scheduling core: normalizes requests onto the slot grid, runs the
//! configured allocation strategy, reconstructs prior commitments, solves the
//! charge MILP, and assembles the resulting [`Timetable`].

pub mod allocation;
mod optimizer;
mod reconstruct;
pub mod timegrid;

pub use allocation::Allocator;

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use itertools::Itertools;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::domain::{
    ChargerId, ChargerRateTable, InputError, Interval, ScheduleEntry, ScheduleStatus, Timetable,
    VehicleId, VehicleRequest,
};

use optimizer::{ChargePlan, OptimizeInputs, SolveOutcome, SolverSettings};
use reconstruct::reclaim_commitments;
use timegrid::TimeGrid;

/// A vehicle request normalized onto the slot grid.
#[derive(Debug, Clone)]
pub(crate) struct VehicleParams {
    pub vehicle_id: VehicleId,
    pub charger_id: ChargerId,
    pub rate_kw: f64,
    pub demand_kwh: f64,
    pub headroom_kwh: f64,
    pub start_slot: usize,
    pub end_slot: usize,
}

/// A reconstructed commitment group: a prior schedule whose total delivered
/// energy is fixed, re-seated inside the current window.
#[derive(Debug, Clone)]
pub(crate) struct CommittedParams {
    pub vehicle_id: VehicleId,
    pub charger_id: ChargerId,
    pub rate_kw: f64,
    pub total_kwh: f64,
    pub start_slot: usize,
    pub end_slot: usize,
    pub arrival: NaiveDateTime,
    pub departure: NaiveDateTime,
}

/// Interval attributes unpacked into per-slot columns.
#[derive(Debug, Clone)]
pub(crate) struct SlotSeries {
    pub traditional: Vec<f64>,
    pub renewable: Vec<f64>,
    pub consumption: Vec<f64>,
    pub max_capacity: Vec<f64>,
    pub tariffs: Vec<f64>,
    pub available_chargers: Vec<Vec<ChargerId>>,
}

impl SlotSeries {
    pub fn len(&self) -> usize {
        self.traditional.len()
    }
}

/// The charging-station scheduler.
///
/// A `Scheduler` is cheap to construct and holds only station-level
/// configuration; every [`schedule`](Self::schedule) call is an independent
/// computation over immutable inputs.
pub struct Scheduler {
    rates: ChargerRateTable,
    slot_minutes: i64,
    allocator: Allocator,
    solver: SolverSettings,
}

impl Scheduler {
    pub fn new(rates: ChargerRateTable, slot_minutes: i64, allocator: Allocator) -> Self {
        Self {
            rates,
            slot_minutes,
            allocator,
            solver: SolverSettings::default(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let mut scheduler = Self::new(
            ChargerRateTable::new(config.chargers.rates_kw.clone()),
            config.scheduler.interval_minutes,
            config.scheduler.allocator(),
        );
        scheduler.solver.objective_tolerance = config.scheduler.objective_tolerance;
        scheduler
    }

    pub fn slot_minutes(&self) -> i64 {
        self.slot_minutes
    }

    /// Schedule all `vehicles` within the window spanned by `intervals`.
    ///
    /// Inputs are not mutated; the scheduler works on its own copies of the
    /// per-slot charger availability sets. Returns an error if any record
    /// fails validation, in which case no partial result is produced.
    /// Solver-level failure is not an error: affected vehicles are reported
    /// through the timetable's status map instead.
    pub fn schedule(
        &self,
        vehicles: &[VehicleRequest],
        intervals: &[Interval],
    ) -> Result<Timetable, InputError> {
        self.validate_inputs(vehicles, intervals)?;

        let grid = TimeGrid::new(intervals[0].start, intervals.len(), self.slot_minutes);
        let slots = unpack_intervals(intervals);
        let params = self.normalize_vehicles(vehicles, &grid)?;
        debug!(
            vehicles = params.len(),
            slots = slots.len(),
            "scheduling window normalized"
        );

        let alloc_new = self.allocator.allocate(&params, &slots, self.slot_minutes);

        // Commitments get their chargers back in a per-call copy of the
        // availability sets, then keep their prior placement via first-choice.
        let mut augmented = slots.clone();
        let committed = reclaim_commitments(
            intervals,
            &grid,
            &self.rates,
            &mut augmented.available_chargers,
        )?;
        let committed_view: Vec<VehicleParams> = committed
            .iter()
            .map(|entry| VehicleParams {
                vehicle_id: entry.vehicle_id,
                charger_id: entry.charger_id,
                rate_kw: entry.rate_kw,
                demand_kwh: entry.total_kwh,
                headroom_kwh: entry.total_kwh,
                start_slot: entry.start_slot,
                end_slot: entry.end_slot,
            })
            .collect();
        let alloc_committed =
            Allocator::FirstChoice.allocate(&committed_view, &augmented, self.slot_minutes);

        let inputs = OptimizeInputs {
            vehicles: &params,
            committed: &committed,
            slots: &slots,
            alloc_new: &alloc_new,
            alloc_committed: &alloc_committed,
            slot_minutes: self.slot_minutes,
        };
        let plan = match optimizer::optimize(&inputs, &self.solver) {
            SolveOutcome::Solved(plan) => plan,
            SolveOutcome::Infeasible => {
                ChargePlan::zeros(params.len(), committed.len(), slots.len())
            }
        };

        let timetable = self.assemble(vehicles, &alloc_new, &committed, &plan, &grid);
        info!(
            scheduled = timetable
                .get_schedule_status()
                .values()
                .filter(|&&s| s == ScheduleStatus::Scheduled)
                .count(),
            requested = vehicles.len(),
            "scheduling window solved"
        );
        Ok(timetable)
    }

    fn validate_inputs(
        &self,
        vehicles: &[VehicleRequest],
        intervals: &[Interval],
    ) -> Result<(), InputError> {
        if intervals.is_empty() {
            return Err(InputError::EmptyWindow);
        }
        for interval in intervals {
            interval.validate(self.rates.len())?;
        }
        for (prev, next) in intervals.iter().tuple_windows() {
            if next.start <= prev.start {
                return Err(InputError::UnsortedIntervals { slot: next.start });
            }
            if (next.start - prev.start).num_minutes() != self.slot_minutes {
                return Err(InputError::IrregularSpacing {
                    slot: next.start,
                    expected_minutes: self.slot_minutes,
                });
            }
        }
        for vehicle in vehicles {
            vehicle.validate(&self.rates)?;
        }
        Ok(())
    }

    fn normalize_vehicles(
        &self,
        vehicles: &[VehicleRequest],
        grid: &TimeGrid,
    ) -> Result<Vec<VehicleParams>, InputError> {
        vehicles
            .iter()
            .map(|request| {
                let start = grid.slot_index(request.arrival);
                let end = grid.slot_index(request.departure);
                if start < 0 || start > end || end > grid.slot_count() as i64 {
                    return Err(InputError::WindowOutOfBounds {
                        vehicle: request.vehicle_id,
                    });
                }
                let rate_kw = self.rates.rate_kw(request.charger_id).ok_or(
                    InputError::UnknownCharger {
                        charger: request.charger_id,
                    },
                )?;
                Ok(VehicleParams {
                    vehicle_id: request.vehicle_id,
                    charger_id: request.charger_id,
                    rate_kw,
                    demand_kwh: request.demand_kwh(),
                    headroom_kwh: request.headroom_kwh(),
                    start_slot: start as usize,
                    end_slot: end as usize,
                })
            })
            .collect()
    }

    fn assemble(
        &self,
        vehicles: &[VehicleRequest],
        alloc_new: &[Vec<bool>],
        committed: &[CommittedParams],
        plan: &ChargePlan,
        grid: &TimeGrid,
    ) -> Timetable {
        // Tight delivery window per new vehicle: first charged slot through
        // one slot past the last charged slot.
        let windows: Vec<Option<(NaiveDateTime, NaiveDateTime)>> = plan
            .new_charges
            .iter()
            .map(|row| {
                let first = row.iter().position(|&c| c > 0.0)?;
                let last = row.iter().rposition(|&c| c > 0.0)?;
                Some((grid.slot_start(first), grid.slot_start(last + 1)))
            })
            .collect();

        let mut slots_out: Vec<Vec<ScheduleEntry>> = vec![Vec::new(); grid.slot_count()];
        for (t, bucket) in slots_out.iter_mut().enumerate() {
            for (v, request) in vehicles.iter().enumerate() {
                let charge_kwh = plan.new_charges[v][t];
                if charge_kwh > 0.0 {
                    if let Some((arrival, departure)) = windows[v] {
                        bucket.push(ScheduleEntry {
                            vehicle_id: request.vehicle_id,
                            charge_kwh,
                            charger_id: request.charger_id,
                            arrival,
                            departure,
                        });
                    }
                }
            }
            for (e, entry) in committed.iter().enumerate() {
                let charge_kwh = plan.committed_charges[e][t];
                if charge_kwh > 0.0 {
                    bucket.push(ScheduleEntry {
                        vehicle_id: entry.vehicle_id,
                        charge_kwh,
                        charger_id: entry.charger_id,
                        arrival: entry.arrival,
                        departure: entry.departure,
                    });
                }
            }
        }

        let mut statuses = BTreeMap::new();
        for (v, request) in vehicles.iter().enumerate() {
            let status = if plan.new_charges[v].iter().any(|&c| c > 0.0) {
                ScheduleStatus::Scheduled
            } else if alloc_new[v].iter().any(|&a| a) {
                ScheduleStatus::ScheduleInfeasible
            } else {
                ScheduleStatus::ChargerConflict
            };
            statuses.insert(request.vehicle_id, status);
        }

        Timetable::new(grid.slot_start(0), self.slot_minutes, slots_out, statuses)
    }
}

fn unpack_intervals(intervals: &[Interval]) -> SlotSeries {
    SlotSeries {
        traditional: intervals.iter().map(|i| i.traditional_kwh).collect(),
        renewable: intervals.iter().map(|i| i.renewable_kwh).collect(),
        consumption: intervals.iter().map(|i| i.consumption_kwh).collect(),
        max_capacity: intervals.iter().map(|i| i.max_capacity_kwh).collect(),
        tariffs: intervals.iter().map(Interval::tariff_or_default).collect(),
        available_chargers: intervals.iter().map(|i| i.available_chargers.clone()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn slot_time(minutes: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 5, 25)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap()
            + chrono::Duration::minutes(minutes)
    }

    fn interval(minutes: i64) -> Interval {
        Interval {
            start: slot_time(minutes),
            traditional_kwh: 10.0,
            renewable_kwh: 0.0,
            consumption_kwh: 0.0,
            max_capacity_kwh: f64::INFINITY,
            available_chargers: vec![0],
            price_tariff: None,
            commitments: vec![],
        }
    }

    fn request() -> VehicleRequest {
        VehicleRequest {
            vehicle_id: 0,
            arrival: slot_time(0),
            departure: slot_time(30),
            arrival_soc: 50.0,
            demand_soc: 60.0,
            battery_capacity_kwh: 100.0,
            charger_id: 0,
        }
    }

    fn scheduler() -> Scheduler {
        Scheduler::new(ChargerRateTable::new(vec![50.0]), 15, Allocator::FirstChoice)
    }

    #[test]
    fn rejects_empty_window() {
        let err = scheduler().schedule(&[request()], &[]).unwrap_err();
        assert_eq!(err, InputError::EmptyWindow);
    }

    #[test]
    fn rejects_unsorted_intervals() {
        let intervals = vec![interval(15), interval(0)];
        let err = scheduler().schedule(&[], &intervals).unwrap_err();
        assert_eq!(err, InputError::UnsortedIntervals { slot: slot_time(0) });
    }

    #[test]
    fn rejects_irregular_spacing() {
        let intervals = vec![interval(0), interval(30)];
        let err = scheduler().schedule(&[], &intervals).unwrap_err();
        assert_eq!(
            err,
            InputError::IrregularSpacing {
                slot: slot_time(30),
                expected_minutes: 15
            }
        );
    }

    #[test]
    fn rejects_request_outside_window() {
        let intervals = vec![interval(0), interval(15)];
        let mut early = request();
        early.arrival = slot_time(-60);
        early.departure = slot_time(15);
        let err = scheduler().schedule(&[early], &intervals).unwrap_err();
        assert_eq!(err, InputError::WindowOutOfBounds { vehicle: 0 });
    }

    #[test]
    fn rejects_negative_interval_quantities() {
        let mut bad = interval(0);
        bad.consumption_kwh = -5.0;
        assert!(scheduler().schedule(&[request()], &[bad]).is_err());
    }
}
