//! EV charging-station scheduling inside a constrained grid.
//!
//! The core answers one question per request batch: which vehicles charge,
//! when, on which charger, and how many kWh they receive per time slot,
//! without overdrawing grid capacity or walking back commitments made to
//! previously scheduled vehicles.
//!
//! - [`scheduler::Scheduler`] is the synchronous core: allocation strategy,
//!   charge MILP, timetable assembly.
//! - [`dispatch::Dispatcher`] is the loop around it: a FIFO request queue
//!   drained against a shared reservation table with clash detection.
//! - [`domain`] holds the input/output records exchanged with the
//!   surrounding application.

pub mod config;
pub mod dispatch;
pub mod domain;
pub mod scheduler;
pub mod telemetry;

pub use domain::{
    ChargerRateTable, Commitment, InputError, Interval, ScheduleEntry, ScheduleStatus, Timetable,
    VehicleRequest,
};
pub use scheduler::{Allocator, Scheduler};
