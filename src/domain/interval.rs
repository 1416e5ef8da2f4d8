//! Grid-side input records: one [`Interval`] per time slot of the scheduling
//! window, each optionally carrying the [`Commitment`]s already placed in it.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{ChargerId, InputError, VehicleId};

/// One contiguous time slot of the scheduling window.
///
/// All energy quantities are kWh over the slot. `available_chargers` lists the
/// charger ids the station still considers free at this slot; chargers held by
/// an embedded commitment are re-inserted by the scheduler before allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interval {
    /// Slot start, local wall clock, quantized to the slot length.
    pub start: NaiveDateTime,
    /// Production from traditional sources.
    pub traditional_kwh: f64,
    /// Production from renewable sources.
    pub renewable_kwh: f64,
    /// Baseline consumption already drawn from the grid.
    pub consumption_kwh: f64,
    /// Grid capacity ceiling for total energy use in this slot.
    pub max_capacity_kwh: f64,
    /// Charger ids free at this slot.
    pub available_chargers: Vec<ChargerId>,
    /// Optional price tariff for energy delivered in this slot.
    #[serde(default)]
    pub price_tariff: Option<f64>,
    /// Charges already scheduled into this slot by earlier dispatch rounds.
    #[serde(default)]
    pub commitments: Vec<Commitment>,
}

impl Interval {
    pub fn validate(&self, num_chargers: usize) -> Result<(), InputError> {
        let quantities = [
            ("traditional production", self.traditional_kwh),
            ("renewable production", self.renewable_kwh),
            ("consumption", self.consumption_kwh),
            ("max capacity", self.max_capacity_kwh),
            ("price tariff", self.price_tariff.unwrap_or(0.0)),
        ];
        for (field, value) in quantities {
            if value < 0.0 {
                return Err(InputError::NegativeQuantity {
                    slot: self.start,
                    field,
                });
            }
        }
        for &charger in &self.available_chargers {
            if charger >= num_chargers {
                return Err(InputError::UnknownCharger { charger });
            }
        }
        for commitment in &self.commitments {
            commitment.validate(num_chargers)?;
        }
        Ok(())
    }

    /// Tariff applied to the cost objective; absent tariffs contribute nothing.
    pub fn tariff_or_default(&self) -> f64 {
        self.price_tariff.unwrap_or(0.0)
    }
}

/// A previously decided placement: how much a vehicle receives in one slot,
/// on which charger, and the full window the placement belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commitment {
    pub vehicle_id: VehicleId,
    pub charge_kwh: f64,
    pub charger_id: ChargerId,
    pub arrival: NaiveDateTime,
    pub departure: NaiveDateTime,
}

impl Commitment {
    pub fn validate(&self, num_chargers: usize) -> Result<(), InputError> {
        if self.charge_kwh < 0.0 {
            return Err(InputError::NegativeCommittedCharge {
                vehicle: self.vehicle_id,
            });
        }
        if self.arrival > self.departure {
            return Err(InputError::InvalidCommitmentPeriod {
                vehicle: self.vehicle_id,
            });
        }
        if self.charger_id >= num_chargers {
            return Err(InputError::UnknownCharger {
                charger: self.charger_id,
            });
        }
        Ok(())
    }
}
