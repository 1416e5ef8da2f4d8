//! The persisted reservation table: the source of truth for which vehicle
//! holds which charger-slot, read before every scheduling round and written
//! after it. The trait is the seam where the surrounding application's
//! database plugs in; the in-memory implementation backs tests and the demo
//! session.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::{ChargerId, VehicleId};

/// One vehicle's claim on one charger-slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub vehicle_id: VehicleId,
    pub charge_kwh: f64,
    /// Window of the schedule this slot belongs to.
    pub arrival: NaiveDateTime,
    pub departure: NaiveDateTime,
}

/// Storage for committed schedules, keyed by `(charger, slot start)`.
pub trait ReservationStore {
    /// Reservations holding `charger` at `slot_start`, except the given
    /// vehicle's own.
    fn slot_holders(
        &self,
        charger: ChargerId,
        slot_start: NaiveDateTime,
        except: VehicleId,
    ) -> Vec<Reservation>;

    /// Reservations on `charger` by other vehicles whose schedule window
    /// overlaps `[from, until)`, one per vehicle.
    fn overlapping(
        &self,
        charger: ChargerId,
        from: NaiveDateTime,
        until: NaiveDateTime,
        except: VehicleId,
    ) -> Vec<Reservation>;

    /// Drop everything held at `(charger, slot_start)`.
    fn clear_slot(&mut self, charger: ChargerId, slot_start: NaiveDateTime);

    /// Drop all of a vehicle's reservations, across all chargers and slots.
    fn clear_vehicle(&mut self, vehicle: VehicleId);

    fn insert(&mut self, charger: ChargerId, slot_start: NaiveDateTime, reservation: Reservation);
}

/// Reservation table held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    slots: BTreeMap<(ChargerId, NaiveDateTime), Vec<Reservation>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.values().all(Vec::is_empty)
    }
}

impl ReservationStore for InMemoryStore {
    fn slot_holders(
        &self,
        charger: ChargerId,
        slot_start: NaiveDateTime,
        except: VehicleId,
    ) -> Vec<Reservation> {
        self.slots
            .get(&(charger, slot_start))
            .map(|held| {
                held.iter()
                    .filter(|r| r.vehicle_id != except)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn overlapping(
        &self,
        charger: ChargerId,
        from: NaiveDateTime,
        until: NaiveDateTime,
        except: VehicleId,
    ) -> Vec<Reservation> {
        let mut seen = BTreeSet::new();
        let mut found = Vec::new();
        for ((held_charger, _), held) in &self.slots {
            if *held_charger != charger {
                continue;
            }
            for reservation in held {
                if reservation.vehicle_id == except
                    || reservation.arrival >= until
                    || reservation.departure <= from
                {
                    continue;
                }
                if seen.insert(reservation.vehicle_id) {
                    found.push(reservation.clone());
                }
            }
        }
        found
    }

    fn clear_slot(&mut self, charger: ChargerId, slot_start: NaiveDateTime) {
        self.slots.remove(&(charger, slot_start));
    }

    fn clear_vehicle(&mut self, vehicle: VehicleId) {
        for held in self.slots.values_mut() {
            held.retain(|r| r.vehicle_id != vehicle);
        }
    }

    fn insert(&mut self, charger: ChargerId, slot_start: NaiveDateTime, reservation: Reservation) {
        self.slots
            .entry((charger, slot_start))
            .or_default()
            .push(reservation);
    }
}
