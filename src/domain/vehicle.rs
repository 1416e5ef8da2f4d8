//! Vehicle-side input records: the charging request and the station's fixed
//! charger rate table.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{ChargerId, InputError, VehicleId};

/// A single vehicle's request for a charging session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleRequest {
    pub vehicle_id: VehicleId,
    /// Expected arrival, local wall clock.
    pub arrival: NaiveDateTime,
    /// Expected departure, local wall clock. Must be after `arrival`.
    pub departure: NaiveDateTime,
    /// State of charge on arrival, percent in [0, 100].
    pub arrival_soc: f64,
    /// Requested state of charge at departure, percent in [0, 100].
    pub demand_soc: f64,
    /// Battery capacity in kWh, strictly positive.
    pub battery_capacity_kwh: f64,
    /// Preferred charger.
    pub charger_id: ChargerId,
}

impl VehicleRequest {
    /// Integer kWh demand to reach the requested state of charge.
    ///
    /// A request already at or above its target demands nothing.
    pub fn demand_kwh(&self) -> f64 {
        ((self.demand_soc - self.arrival_soc) / 100.0 * self.battery_capacity_kwh)
            .floor()
            .max(0.0)
    }

    /// Physical headroom: the most the battery can accept from its arrival
    /// state, in kWh. Unlike demand this is not rounded.
    pub fn headroom_kwh(&self) -> f64 {
        (100.0 - self.arrival_soc) / 100.0 * self.battery_capacity_kwh
    }

    pub fn validate(&self, chargers: &ChargerRateTable) -> Result<(), InputError> {
        if self.arrival >= self.departure {
            return Err(InputError::InvalidTimePeriod {
                vehicle: self.vehicle_id,
            });
        }
        for soc in [self.arrival_soc, self.demand_soc] {
            if !(0.0..=100.0).contains(&soc) {
                return Err(InputError::SocOutOfRange {
                    vehicle: self.vehicle_id,
                    value: soc,
                });
            }
        }
        if self.battery_capacity_kwh <= 0.0 {
            return Err(InputError::NonPositiveCapacity {
                vehicle: self.vehicle_id,
            });
        }
        if chargers.rate_kw(self.charger_id).is_none() {
            return Err(InputError::UnknownCharger {
                charger: self.charger_id,
            });
        }
        Ok(())
    }
}

/// Fixed mapping from charger id to maximum charging power in kW.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargerRateTable {
    rates_kw: Vec<f64>,
}

impl ChargerRateTable {
    pub fn new(rates_kw: Vec<f64>) -> Self {
        Self { rates_kw }
    }

    pub fn len(&self) -> usize {
        self.rates_kw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates_kw.is_empty()
    }

    pub fn rate_kw(&self, charger: ChargerId) -> Option<f64> {
        self.rates_kw.get(charger).copied()
    }

    /// Most a charger can deliver within one slot of the given length.
    pub fn slot_cap_kwh(&self, charger: ChargerId, slot_minutes: i64) -> Option<f64> {
        self.rate_kw(charger)
            .map(|rate| rate * slot_minutes as f64 / 60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn request() -> VehicleRequest {
        let arrival = NaiveDate::from_ymd_opt(2021, 5, 25)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap();
        VehicleRequest {
            vehicle_id: 0,
            arrival,
            departure: arrival + chrono::Duration::minutes(30),
            arrival_soc: 50.0,
            demand_soc: 60.0,
            battery_capacity_kwh: 100.0,
            charger_id: 0,
        }
    }

    #[test]
    fn demand_floors_to_integer_kwh() {
        let mut req = request();
        req.battery_capacity_kwh = 27.0;
        req.arrival_soc = 90.0;
        req.demand_soc = 100.0;
        // 10% of 27 kWh = 2.7, floored to 2
        assert_eq!(req.demand_kwh(), 2.0);
    }

    #[test]
    fn demand_clamps_at_zero_when_already_charged() {
        let mut req = request();
        req.arrival_soc = 80.0;
        req.demand_soc = 60.0;
        assert_eq!(req.demand_kwh(), 0.0);
    }

    #[test]
    fn headroom_is_unrounded() {
        let mut req = request();
        req.battery_capacity_kwh = 27.0;
        req.arrival_soc = 90.0;
        assert!((req.headroom_kwh() - 2.7).abs() < 1e-9);
    }

    #[test]
    fn validate_rejects_reversed_window() {
        let mut req = request();
        req.departure = req.arrival;
        let table = ChargerRateTable::new(vec![50.0]);
        assert_eq!(
            req.validate(&table),
            Err(InputError::InvalidTimePeriod { vehicle: 0 })
        );
    }

    #[test]
    fn validate_rejects_soc_out_of_range() {
        let mut req = request();
        req.demand_soc = 120.0;
        let table = ChargerRateTable::new(vec![50.0]);
        assert_eq!(
            req.validate(&table),
            Err(InputError::SocOutOfRange {
                vehicle: 0,
                value: 120.0
            })
        );
    }

    #[test]
    fn validate_rejects_unknown_charger() {
        let mut req = request();
        req.charger_id = 3;
        let table = ChargerRateTable::new(vec![50.0, 50.0]);
        assert_eq!(req.validate(&table), Err(InputError::UnknownCharger { charger: 3 }));
    }

    #[test]
    fn slot_cap_scales_with_slot_length() {
        let table = ChargerRateTable::new(vec![50.0, 22.0]);
        assert_eq!(table.slot_cap_kwh(0, 15), Some(12.5));
        assert_eq!(table.slot_cap_kwh(1, 30), Some(11.0));
        assert_eq!(table.slot_cap_kwh(2, 15), None);
    }
}
