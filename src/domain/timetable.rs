//! The scheduler's output: per-slot schedule entries, per-vehicle statuses,
//! and a derive-once compact summary.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use super::{ChargerId, VehicleId};

/// Outcome of a scheduling attempt for one vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleStatus {
    /// The vehicle receives at least some charge.
    Scheduled = 0,
    /// The allocator found no slot where the preferred charger is free.
    ChargerConflict = 1,
    /// Slots were allocated but the optimizer delivered nothing.
    ScheduleInfeasible = 2,
}

/// One vehicle's share of one time slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub vehicle_id: VehicleId,
    pub charge_kwh: f64,
    pub charger_id: ChargerId,
    pub arrival: NaiveDateTime,
    pub departure: NaiveDateTime,
}

/// Compact per-vehicle view over a whole timetable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSchedule {
    pub arrival: NaiveDateTime,
    pub departure: NaiveDateTime,
    pub charge_kwh: f64,
}

/// The assembled charging schedule for one scheduling window.
///
/// `slots` runs parallel to the input intervals; each element lists the
/// vehicles charged in that slot, new vehicles first, then re-placed
/// commitments.
#[derive(Debug, Serialize, Deserialize)]
pub struct Timetable {
    start: NaiveDateTime,
    slot_minutes: i64,
    slots: Vec<Vec<ScheduleEntry>>,
    statuses: BTreeMap<VehicleId, ScheduleStatus>,
    #[serde(skip)]
    schedules: OnceCell<BTreeMap<VehicleId, VehicleSchedule>>,
}

impl Timetable {
    pub fn new(
        start: NaiveDateTime,
        slot_minutes: i64,
        slots: Vec<Vec<ScheduleEntry>>,
        statuses: BTreeMap<VehicleId, ScheduleStatus>,
    ) -> Self {
        Self {
            start,
            slot_minutes,
            slots,
            statuses,
            schedules: OnceCell::new(),
        }
    }

    /// Start of the first slot in the scheduling window.
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn slot_minutes(&self) -> i64 {
        self.slot_minutes
    }

    /// Per-slot entry lists, parallel to the input intervals.
    pub fn slots(&self) -> &[Vec<ScheduleEntry>] {
        &self.slots
    }

    /// Per-vehicle summary: first charged slot, departure after the last
    /// charged slot, and total delivered kWh. Derived once and cached.
    pub fn get_schedules(&self) -> &BTreeMap<VehicleId, VehicleSchedule> {
        self.schedules.get_or_init(|| {
            let mut summaries: BTreeMap<VehicleId, VehicleSchedule> = BTreeMap::new();
            for slot in &self.slots {
                for entry in slot {
                    let summary =
                        summaries
                            .entry(entry.vehicle_id)
                            .or_insert_with(|| VehicleSchedule {
                                arrival: entry.arrival,
                                departure: entry.departure,
                                charge_kwh: 0.0,
                            });
                    summary.departure = entry.departure;
                    summary.charge_kwh += entry.charge_kwh;
                }
            }
            summaries
        })
    }

    /// Status of every vehicle submitted for scheduling.
    pub fn get_schedule_status(&self) -> &BTreeMap<VehicleId, ScheduleStatus> {
        &self.statuses
    }
}
