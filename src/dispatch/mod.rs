//! The dispatch loop around the scheduling core: a FIFO-by-arrival queue of
//! pending requests, drained one at a time as a
//! poll -> read commitments -> schedule -> classify -> write cycle under a
//! single lock over the reservation table.
//!
//! Clashes with reservations written outside the request's window are
//! detected after scheduling: the window is shifted past the clash and
//! retried once, and a second clash defers the request with the shifted
//! window as a suggestion.

pub mod store;

pub use store::{InMemoryStore, Reservation, ReservationStore};

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use chrono::{Duration, NaiveDateTime};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::domain::{
    Commitment, InputError, Interval, ScheduleStatus, Timetable, VehicleId, VehicleRequest,
};
use crate::scheduler::{timegrid::TimeGrid, Scheduler};

/// Grid-side data for one slot, as supplied by the hosting application's
/// forecast or metering pipeline.
#[derive(Debug, Clone, Copy)]
pub struct GridConditions {
    pub traditional_kwh: f64,
    pub renewable_kwh: f64,
    pub consumption_kwh: f64,
    pub max_capacity_kwh: f64,
    pub price_tariff: Option<f64>,
}

/// Source of per-slot grid conditions for dispatcher-built windows.
pub trait GridProfile {
    fn conditions_at(&self, slot_start: NaiveDateTime) -> GridConditions;
}

impl<F> GridProfile for F
where
    F: Fn(NaiveDateTime) -> GridConditions,
{
    fn conditions_at(&self, slot_start: NaiveDateTime) -> GridConditions {
        self(slot_start)
    }
}

/// Result of one dispatch cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Scheduled {
        vehicle_id: VehicleId,
        arrival: NaiveDateTime,
        departure: NaiveDateTime,
        charge_kwh: f64,
    },
    /// The scheduler produced no charge for this vehicle.
    Rejected {
        vehicle_id: VehicleId,
        status: ScheduleStatus,
    },
    /// Both the requested window and the suggested shift clash with foreign
    /// reservations; the request is deferred with a fresh suggestion.
    SuggestedWindowTaken {
        vehicle_id: VehicleId,
        suggested_arrival: NaiveDateTime,
        suggested_departure: NaiveDateTime,
    },
    Invalid {
        vehicle_id: VehicleId,
        error: InputError,
    },
}

struct Pending {
    seq: u64,
    request: VehicleRequest,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.request.arrival == other.request.arrival && self.seq == other.seq
    }
}

impl Eq for Pending {}

impl Ord for Pending {
    // BinaryHeap is a max-heap: invert so the earliest arrival (then the
    // earliest submission) pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .request
            .arrival
            .cmp(&self.request.arrival)
            .then(other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct DispatchState<S> {
    store: S,
    queue: BinaryHeap<Pending>,
    next_seq: u64,
}

/// Drains pending charge requests against a shared reservation table.
pub struct Dispatcher<S, P> {
    scheduler: Scheduler,
    profile: P,
    state: Mutex<DispatchState<S>>,
}

impl<S: ReservationStore, P: GridProfile> Dispatcher<S, P> {
    pub fn new(scheduler: Scheduler, store: S, profile: P) -> Self {
        Self {
            scheduler,
            profile,
            state: Mutex::new(DispatchState {
                store,
                queue: BinaryHeap::new(),
                next_seq: 0,
            }),
        }
    }

    pub fn submit(&self, request: VehicleRequest) {
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push(Pending { seq, request });
    }

    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Run one dispatch cycle. The queue pop, commitment read, scheduling
    /// call, and reservation write all happen under the same lock.
    pub fn run_once(&self) -> Option<DispatchOutcome> {
        let mut state = self.state.lock();
        let pending = state.queue.pop()?;
        Some(self.dispatch(&mut state.store, pending.request))
    }

    /// Drain the queue, collecting every outcome.
    pub fn run_until_idle(&self) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.run_once() {
            outcomes.push(outcome);
        }
        outcomes
    }

    fn dispatch(&self, store: &mut S, request: VehicleRequest) -> DispatchOutcome {
        let vehicle_id = request.vehicle_id;
        let mut attempt = request;
        let mut retried = false;

        loop {
            let intervals = self.build_window(store, &attempt);
            let timetable = match self.scheduler.schedule(
                std::slice::from_ref(&attempt),
                &intervals,
            ) {
                Ok(timetable) => timetable,
                Err(error) => {
                    warn!(vehicle = vehicle_id, %error, "request rejected by validation");
                    return DispatchOutcome::Invalid { vehicle_id, error };
                }
            };

            let Some(summary) = timetable.get_schedules().get(&vehicle_id).cloned() else {
                let status = timetable
                    .get_schedule_status()
                    .get(&vehicle_id)
                    .copied()
                    .unwrap_or(ScheduleStatus::ScheduleInfeasible);
                debug!(vehicle = vehicle_id, ?status, "no charge scheduled");
                return DispatchOutcome::Rejected { vehicle_id, status };
            };

            let clashes = store.overlapping(
                attempt.charger_id,
                summary.arrival,
                summary.departure,
                vehicle_id,
            );
            if clashes.is_empty() {
                self.write_schedule(store, &timetable, &attempt);
                info!(
                    vehicle = vehicle_id,
                    charge_kwh = summary.charge_kwh,
                    "schedule committed"
                );
                return DispatchOutcome::Scheduled {
                    vehicle_id,
                    arrival: summary.arrival,
                    departure: summary.departure,
                    charge_kwh: summary.charge_kwh,
                };
            }

            // Shift the whole window just past the clashing reservations.
            let span = summary.departure - summary.arrival;
            let clash_end = clashes
                .iter()
                .map(|r| r.departure)
                .max()
                .unwrap_or(summary.departure);
            if retried {
                info!(vehicle = vehicle_id, "suggested window also taken; deferring");
                return DispatchOutcome::SuggestedWindowTaken {
                    vehicle_id,
                    suggested_arrival: clash_end,
                    suggested_departure: clash_end + span,
                };
            }
            debug!(
                vehicle = vehicle_id,
                shifted_to = %clash_end,
                "window clashes with an outside reservation; retrying"
            );
            attempt.arrival = clash_end;
            attempt.departure = clash_end + span;
            retried = true;
        }
    }

    /// Build the interval window for a request: its discretized span plus the
    /// departure slot, with grid conditions from the profile and commitments
    /// read back from the reservation table.
    fn build_window(&self, store: &S, request: &VehicleRequest) -> Vec<Interval> {
        let slot_minutes = self.scheduler.slot_minutes();
        let grid = TimeGrid::new(request.arrival, 0, slot_minutes);
        let start = grid.align(request.arrival);
        let end = grid.align(request.departure);
        let slot_count = ((end - start).num_minutes() / slot_minutes + 1).max(1) as usize;

        (0..slot_count)
            .map(|i| {
                let slot_start = start + Duration::minutes(i as i64 * slot_minutes);
                let conditions = self.profile.conditions_at(slot_start);
                let commitments = store
                    .slot_holders(request.charger_id, slot_start, request.vehicle_id)
                    .into_iter()
                    .map(|r| Commitment {
                        vehicle_id: r.vehicle_id,
                        charge_kwh: r.charge_kwh,
                        charger_id: request.charger_id,
                        arrival: r.arrival,
                        departure: r.departure,
                    })
                    .collect();
                Interval {
                    start: slot_start,
                    traditional_kwh: conditions.traditional_kwh,
                    renewable_kwh: conditions.renewable_kwh,
                    consumption_kwh: conditions.consumption_kwh,
                    max_capacity_kwh: conditions.max_capacity_kwh,
                    available_chargers: vec![request.charger_id],
                    price_tariff: conditions.price_tariff,
                    commitments,
                }
            })
            .collect()
    }

    /// Replace the window's persisted state with the new timetable: the
    /// vehicle's old reservations go away, every touched slot is rewritten
    /// with its new holders (including re-seated commitments).
    fn write_schedule(&self, store: &mut S, timetable: &Timetable, request: &VehicleRequest) {
        store.clear_vehicle(request.vehicle_id);
        for (t, held) in timetable.slots().iter().enumerate() {
            let slot_start =
                timetable.start() + Duration::minutes(t as i64 * timetable.slot_minutes());
            store.clear_slot(request.charger_id, slot_start);
            for entry in held {
                store.insert(
                    entry.charger_id,
                    slot_start,
                    Reservation {
                        vehicle_id: entry.vehicle_id,
                        charge_kwh: entry.charge_kwh,
                        arrival: entry.arrival,
                        departure: entry.departure,
                    },
                );
            }
        }
    }
}
