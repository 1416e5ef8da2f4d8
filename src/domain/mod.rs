pub mod interval;
pub mod timetable;
pub mod vehicle;

pub use interval::{Commitment, Interval};
pub use timetable::{ScheduleEntry, ScheduleStatus, Timetable, VehicleSchedule};
pub use vehicle::{ChargerRateTable, VehicleRequest};

use chrono::NaiveDateTime;
use thiserror::Error;

/// Vehicle identifier, assigned by the surrounding application.
pub type VehicleId = u32;

/// Index into the station's charger rate table.
pub type ChargerId = usize;

/// Errors raised when a scheduling request or its interval window fails
/// validation. Any of these aborts the whole `schedule()` call; no partial
/// work is exposed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InputError {
    #[error("no intervals supplied")]
    EmptyWindow,

    #[error("interval at {slot} has negative {field}")]
    NegativeQuantity {
        slot: NaiveDateTime,
        field: &'static str,
    },

    #[error("interval at {slot} is out of chronological order")]
    UnsortedIntervals { slot: NaiveDateTime },

    #[error("interval at {slot} does not start {expected_minutes} minutes after its predecessor")]
    IrregularSpacing {
        slot: NaiveDateTime,
        expected_minutes: i64,
    },

    #[error("vehicle {vehicle}: arrival must be before departure")]
    InvalidTimePeriod { vehicle: VehicleId },

    #[error("vehicle {vehicle}: state of charge {value} outside [0, 100]")]
    SocOutOfRange { vehicle: VehicleId, value: f64 },

    #[error("vehicle {vehicle}: battery capacity must be positive")]
    NonPositiveCapacity { vehicle: VehicleId },

    #[error("charger {charger} is not in the station rate table")]
    UnknownCharger { charger: ChargerId },

    #[error("vehicle {vehicle}: requested window falls outside the scheduling window")]
    WindowOutOfBounds { vehicle: VehicleId },

    #[error("commitment for vehicle {vehicle} has negative delivered charge")]
    NegativeCommittedCharge { vehicle: VehicleId },

    #[error("commitment for vehicle {vehicle} has arrival after departure")]
    InvalidCommitmentPeriod { vehicle: VehicleId },
}
