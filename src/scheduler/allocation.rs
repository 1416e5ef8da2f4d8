//! Time-slot allocation strategies. Each strategy produces a boolean
//! vehicle-by-slot availability mask that the optimizer then charges within.

use ordered_float::OrderedFloat;

use super::{SlotSeries, VehicleParams};

/// Allocation strategy family, selected per scheduler instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allocator {
    /// Allocate the requested window as-is, earlier vehicles winning charger
    /// conflicts.
    FirstChoice,
    /// Shift the requested window by up to `offset` slots towards the span
    /// with the highest renewable production.
    MostRenewables { offset: i64 },
    /// Shift the requested window by up to `offset` slots towards the span
    /// with the lowest total price tariff.
    CheapestPricing { offset: i64 },
}

enum SpanObjective {
    MaxRenewables,
    MinTariff,
}

impl Allocator {
    pub(crate) fn allocate(
        &self,
        vehicles: &[VehicleParams],
        slots: &SlotSeries,
        slot_minutes: i64,
    ) -> Vec<Vec<bool>> {
        match *self {
            Allocator::FirstChoice => first_choice(vehicles, slots),
            Allocator::MostRenewables { offset } => {
                best_span(vehicles, slots, slot_minutes, offset, SpanObjective::MaxRenewables)
            }
            Allocator::CheapestPricing { offset } => {
                best_span(vehicles, slots, slot_minutes, offset, SpanObjective::MinTariff)
            }
        }
    }
}

/// Walk each vehicle's requested `[arrival, departure)` span in input order,
/// claiming its preferred charger slot by slot. A single unavailable slot
/// zeroes the whole row: partial windows are not offered to the optimizer.
fn first_choice(vehicles: &[VehicleParams], slots: &SlotSeries) -> Vec<Vec<bool>> {
    let slot_count = slots.len();
    let mut rows = vec![vec![false; slot_count]; vehicles.len()];
    let mut available = slots.available_chargers.clone();

    for (v, vehicle) in vehicles.iter().enumerate() {
        for t in vehicle.start_slot..vehicle.end_slot {
            match available[t].iter().position(|&c| c == vehicle.charger_id) {
                Some(pos) => {
                    rows[v][t] = true;
                    available[t].swap_remove(pos);
                }
                None => {
                    rows[v].fill(false);
                    break;
                }
            }
        }
    }

    rows
}

/// Score every shifted placement of each vehicle's window and allocate the
/// best feasible one. A span is feasible when the preferred charger is free
/// throughout and enough energy can plausibly be delivered to meet demand.
///
/// The last slot of the window is reserved as the departure slot and is never
/// part of a shifted span. When no shifted span is feasible the requested
/// window is kept, leaving any shortfall to the optimizer's deviation
/// variables; if even that window lacks the charger, the row stays zero.
fn best_span(
    vehicles: &[VehicleParams],
    slots: &SlotSeries,
    slot_minutes: i64,
    offset: i64,
    objective: SpanObjective,
) -> Vec<Vec<bool>> {
    let slot_count = slots.len();
    let mut rows = vec![vec![false; slot_count]; vehicles.len()];

    for (v, vehicle) in vehicles.iter().enumerate() {
        let len = vehicle.end_slot - vehicle.start_slot;
        if len == 0 {
            continue;
        }

        let mut best: Option<(usize, OrderedFloat<f64>)> = None;
        for shift in -offset..=offset {
            let start = vehicle.start_slot as i64 + shift;
            if start < 0 || start as usize + len > slot_count.saturating_sub(1) {
                continue;
            }
            let start = start as usize;
            let Some(score) = span_score(vehicle, slots, slot_minutes, start, len, &objective)
            else {
                continue;
            };
            let score = OrderedFloat(score);
            let improves = match (&objective, best) {
                (_, None) => true,
                (SpanObjective::MaxRenewables, Some((_, incumbent))) => score > incumbent,
                (SpanObjective::MinTariff, Some((_, incumbent))) => score < incumbent,
            };
            if improves {
                best = Some((start, score));
            }
        }

        match best {
            Some((start, _)) => rows[v][start..start + len].fill(true),
            None if charger_free(vehicle, slots, vehicle.start_slot, len) => {
                rows[v][vehicle.start_slot..vehicle.end_slot].fill(true);
            }
            None => {}
        }
    }

    rows
}

fn span_score(
    vehicle: &VehicleParams,
    slots: &SlotSeries,
    slot_minutes: i64,
    start: usize,
    len: usize,
    objective: &SpanObjective,
) -> Option<f64> {
    let cap = vehicle.rate_kw * slot_minutes as f64 / 60.0;
    let mut score = 0.0;
    let mut deliverable = 0.0;

    for t in start..start + len {
        if !slots.available_chargers[t].contains(&vehicle.charger_id) {
            return None;
        }
        score += match objective {
            SpanObjective::MaxRenewables => slots.renewable[t],
            SpanObjective::MinTariff => slots.tariffs[t],
        };
        // Count a full-rate slot only where production could actually carry it.
        if slots.renewable[t] + slots.traditional[t] >= cap {
            deliverable += cap;
        }
    }

    if deliverable < vehicle.demand_kwh {
        return None;
    }
    Some(score)
}

fn charger_free(vehicle: &VehicleParams, slots: &SlotSeries, start: usize, len: usize) -> bool {
    (start..start + len).all(|t| slots.available_chargers[t].contains(&vehicle.charger_id))
}
