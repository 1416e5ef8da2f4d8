//! Dispatcher flow: queueing, clash detection against the reservation
//! table, the single shifted retry, and deferral.

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use grid_charge_scheduler::dispatch::{
    DispatchOutcome, Dispatcher, GridConditions, InMemoryStore,
};
use grid_charge_scheduler::domain::{ChargerRateTable, InputError, ScheduleStatus, VehicleRequest};
use grid_charge_scheduler::scheduler::{Allocator, Scheduler};

fn slot_time(minutes: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2021, 5, 25)
        .unwrap()
        .and_hms_opt(15, 0, 0)
        .unwrap()
        + chrono::Duration::minutes(minutes)
}

/// Plenty of production, with a tariff that rises through the day so the
/// optimizer always packs charge into the earliest slot of a window.
fn rising_tariff(slot_start: NaiveDateTime) -> GridConditions {
    let minute_of_day = f64::from(slot_start.hour()) * 60.0 + f64::from(slot_start.minute());
    GridConditions {
        traditional_kwh: 40.0,
        renewable_kwh: 0.0,
        consumption_kwh: 0.0,
        max_capacity_kwh: f64::INFINITY,
        price_tariff: Some(1.0 + minute_of_day / 100.0),
    }
}

fn starved_grid(_slot_start: NaiveDateTime) -> GridConditions {
    GridConditions {
        traditional_kwh: 0.0,
        renewable_kwh: 0.0,
        consumption_kwh: 0.0,
        max_capacity_kwh: f64::INFINITY,
        price_tariff: None,
    }
}

fn scheduler() -> Scheduler {
    Scheduler::new(
        ChargerRateTable::new(vec![50.0, 50.0]),
        15,
        Allocator::FirstChoice,
    )
}

fn request(vehicle_id: u32, arrival_min: i64, departure_min: i64) -> VehicleRequest {
    VehicleRequest {
        vehicle_id,
        arrival: slot_time(arrival_min),
        departure: slot_time(departure_min),
        arrival_soc: 50.0,
        demand_soc: 60.0,
        battery_capacity_kwh: 100.0,
        charger_id: 0,
    }
}

#[test]
fn requests_drain_in_arrival_order() {
    let dispatcher = Dispatcher::new(scheduler(), InMemoryStore::new(), rising_tariff);
    dispatcher.submit(request(2, 60, 120));
    dispatcher.submit(request(1, 0, 60));
    assert_eq!(dispatcher.pending(), 2);

    let outcomes = dispatcher.run_until_idle();
    assert_eq!(dispatcher.pending(), 0);
    let ids: Vec<u32> = outcomes
        .iter()
        .map(|o| match o {
            DispatchOutcome::Scheduled { vehicle_id, .. } => *vehicle_id,
            other => panic!("expected both scheduled, got {other:?}"),
        })
        .collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn clashing_request_is_shifted_past_the_reservation() {
    let dispatcher = Dispatcher::new(scheduler(), InMemoryStore::new(), rising_tariff);

    // Vehicle 1 takes the earliest slot of the hour.
    dispatcher.submit(request(1, 0, 60));
    let first = dispatcher.run_once().unwrap();
    assert_eq!(
        first,
        DispatchOutcome::Scheduled {
            vehicle_id: 1,
            arrival: slot_time(0),
            departure: slot_time(15),
            charge_kwh: 10.0,
        }
    );

    // Vehicle 2 asks for the same hour on the same charger: its tight window
    // lands on vehicle 1's reservation and is shifted just past it.
    dispatcher.submit(request(2, 0, 60));
    let second = dispatcher.run_once().unwrap();
    assert_eq!(
        second,
        DispatchOutcome::Scheduled {
            vehicle_id: 2,
            arrival: slot_time(15),
            departure: slot_time(30),
            charge_kwh: 10.0,
        }
    );
}

#[test]
fn second_clash_defers_with_a_suggested_window() {
    let dispatcher = Dispatcher::new(scheduler(), InMemoryStore::new(), rising_tariff);
    dispatcher.submit(request(1, 0, 60));
    dispatcher.submit(request(2, 0, 60));
    dispatcher.run_until_idle();

    // Slots 15:00 and 15:15 are now held; vehicle 3's first try clashes with
    // vehicle 1, the shifted retry clashes with vehicle 2.
    dispatcher.submit(request(3, 0, 30));
    let outcome = dispatcher.run_once().unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::SuggestedWindowTaken {
            vehicle_id: 3,
            suggested_arrival: slot_time(30),
            suggested_departure: slot_time(45),
        }
    );
}

#[test]
fn undeliverable_demand_is_rejected_as_infeasible() {
    let dispatcher = Dispatcher::new(scheduler(), InMemoryStore::new(), starved_grid);
    dispatcher.submit(request(1, 0, 60));

    let outcome = dispatcher.run_once().unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Rejected {
            vehicle_id: 1,
            status: ScheduleStatus::ScheduleInfeasible,
        }
    );
}

#[test]
fn invalid_requests_surface_their_validation_error() {
    let dispatcher = Dispatcher::new(scheduler(), InMemoryStore::new(), rising_tariff);
    let mut backwards = request(1, 60, 60);
    backwards.departure = backwards.arrival;
    dispatcher.submit(backwards);

    let outcome = dispatcher.run_once().unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Invalid {
            vehicle_id: 1,
            error: InputError::InvalidTimePeriod { vehicle: 1 },
        }
    );
}

#[test]
fn empty_queue_yields_no_outcome() {
    let dispatcher = Dispatcher::new(scheduler(), InMemoryStore::new(), rising_tariff);
    assert!(dispatcher.run_once().is_none());
}
