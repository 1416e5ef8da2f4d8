use anyhow::Result;
use chrono::{NaiveDateTime, NaiveTime, Timelike};
use rand::Rng;
use tracing::{info, warn};

use grid_charge_scheduler::config::AppConfig;
use grid_charge_scheduler::dispatch::{
    DispatchOutcome, Dispatcher, GridConditions, InMemoryStore,
};
use grid_charge_scheduler::domain::VehicleRequest;
use grid_charge_scheduler::scheduler::Scheduler;
use grid_charge_scheduler::telemetry;

/// Synthetic grid conditions for the demo session: flat traditional
/// production, a midday solar hump, an evening consumption bump, and a
/// two-band tariff.
fn demo_profile(slot_start: NaiveDateTime) -> GridConditions {
    let hour = f64::from(slot_start.hour()) + f64::from(slot_start.minute()) / 60.0;
    let solar = (std::f64::consts::PI * (hour - 6.0) / 12.0).sin().max(0.0);
    let evening = if (17.0..22.0).contains(&hour) { 3.0 } else { 0.0 };
    let peak_tariff = (7.0..10.0).contains(&hour) || (17.0..20.0).contains(&hour);

    GridConditions {
        traditional_kwh: 12.0,
        renewable_kwh: 20.0 * solar,
        consumption_kwh: 6.0 + evening,
        max_capacity_kwh: 40.0,
        price_tariff: Some(if peak_tariff { 0.32 } else { 0.18 }),
    }
}

fn main() -> Result<()> {
    telemetry::init_tracing();

    let config = AppConfig::load()?;
    info!(
        allocation = %config.scheduler.allocation,
        chargers = config.chargers.rates_kw.len(),
        "starting charging-station scheduler"
    );

    let slot_minutes = config.scheduler.interval_minutes;
    let scheduler = Scheduler::from_config(&config);
    let dispatcher = Dispatcher::new(scheduler, InMemoryStore::new(), demo_profile);

    // A morning's worth of synthetic charge requests.
    let mut rng = rand::thread_rng();
    let base = chrono::Local::now().date_naive().and_time(NaiveTime::MIN)
        + chrono::Duration::hours(8);
    for vehicle_id in 0..config.dispatch.demo_vehicles {
        let arrival = base + chrono::Duration::minutes(rng.gen_range(0..8) * slot_minutes);
        let window_slots = rng.gen_range(3..=config.dispatch.horizon_slots as i64);
        let arrival_soc = rng.gen_range(20.0..60.0);
        let request = VehicleRequest {
            vehicle_id,
            arrival,
            departure: arrival + chrono::Duration::minutes(window_slots * slot_minutes),
            arrival_soc,
            demand_soc: rng.gen_range(arrival_soc..=95.0),
            battery_capacity_kwh: rng.gen_range(40.0..90.0),
            charger_id: rng.gen_range(0..config.chargers.rates_kw.len()),
        };
        dispatcher.submit(request);
    }

    for outcome in dispatcher.run_until_idle() {
        match outcome {
            DispatchOutcome::Scheduled {
                vehicle_id,
                arrival,
                departure,
                charge_kwh,
            } => info!(
                vehicle = vehicle_id,
                %arrival,
                %departure,
                charge_kwh,
                "vehicle scheduled"
            ),
            DispatchOutcome::Rejected { vehicle_id, status } => {
                warn!(vehicle = vehicle_id, ?status, "vehicle not scheduled")
            }
            DispatchOutcome::SuggestedWindowTaken {
                vehicle_id,
                suggested_arrival,
                suggested_departure,
            } => warn!(
                vehicle = vehicle_id,
                %suggested_arrival,
                %suggested_departure,
                "suggested window taken; request deferred"
            ),
            DispatchOutcome::Invalid { vehicle_id, error } => {
                warn!(vehicle = vehicle_id, %error, "request rejected")
            }
        }
    }

    info!("demo session complete");
    Ok(())
}
