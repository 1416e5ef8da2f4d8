//! The charge-allocation MILP. Given allocation masks for new vehicles and
//! reconstructed commitments, decides how many kWh each vehicle receives in
//! each slot.
//!
//! The formulation follows the station's energy-accounting rules:
//! - per-slot integer charge variables bounded by the charger rate,
//! - continuous shortfall variables absorbing unmet demand,
//! - exact totals for already-committed vehicles,
//! - equilibrium between energy used and energy consumed per slot,
//! - a production balance with a free sink for unused generation,
//! - a grid-capacity ceiling per slot.
//!
//! The three objectives (meet demand, maximize renewables use, minimize
//! cost) are lexicographic. CBC has no native multi-objective mode, so each
//! tier is solved separately with the previous optima locked in as
//! constraints, within a small tolerance.

use good_lp::{
    constraint, default_solver, variable, Expression, ProblemVariables, ResolutionError, Solution,
    SolverModel, Variable,
};
use tracing::{debug, warn};

use super::{CommittedParams, SlotSeries, VehicleParams};

#[derive(Debug, Clone, Copy)]
pub(crate) struct SolverSettings {
    /// Slack allowed when locking an objective tier's optimum.
    pub objective_tolerance: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            objective_tolerance: 1e-6,
        }
    }
}

pub(crate) struct OptimizeInputs<'a> {
    pub vehicles: &'a [VehicleParams],
    pub committed: &'a [CommittedParams],
    pub slots: &'a SlotSeries,
    pub alloc_new: &'a [Vec<bool>],
    pub alloc_committed: &'a [Vec<bool>],
    pub slot_minutes: i64,
}

/// Charge matrices for new vehicles (integer kWh) and reconstructed
/// commitments (continuous kWh), both vehicle-by-slot.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ChargePlan {
    pub new_charges: Vec<Vec<f64>>,
    pub committed_charges: Vec<Vec<f64>>,
}

impl ChargePlan {
    pub fn zeros(vehicles: usize, committed: usize, slot_count: usize) -> Self {
        Self {
            new_charges: vec![vec![0.0; slot_count]; vehicles],
            committed_charges: vec![vec![0.0; slot_count]; committed],
        }
    }
}

pub(crate) enum SolveOutcome {
    Solved(ChargePlan),
    /// The hard constraints admit no solution (or the solver gave up); the
    /// driver marks every requesting vehicle infeasible.
    Infeasible,
}

#[derive(Debug, Clone, Copy)]
enum Objective {
    Shortfall,
    Renewables,
    Cost,
}

#[derive(Debug, Clone, Copy, Default)]
struct Locks {
    shortfall: Option<f64>,
    renewables: Option<f64>,
}

struct PassSolution {
    plan: ChargePlan,
    shortfall_total: f64,
    renewables_total: f64,
}

/// Solve the lexicographic MILP. Later tiers refine the earlier ones; if a
/// later tier fails numerically the last good plan is kept rather than
/// discarding the schedule.
pub(crate) fn optimize(inputs: &OptimizeInputs<'_>, settings: &SolverSettings) -> SolveOutcome {
    let tol = settings.objective_tolerance;

    let mut best = match solve_pass(inputs, Objective::Shortfall, Locks::default(), tol) {
        Ok(solution) => solution,
        Err(err) => {
            warn!(error = %err, "charge model has no feasible solution");
            return SolveOutcome::Infeasible;
        }
    };
    debug!(shortfall = best.shortfall_total, "demand tier solved");

    let locks = Locks {
        shortfall: Some(best.shortfall_total),
        renewables: None,
    };
    match solve_pass(inputs, Objective::Renewables, locks, tol) {
        Ok(solution) => best = solution,
        Err(err) => {
            warn!(error = %err, "renewables tier failed; keeping demand-tier plan");
            return SolveOutcome::Solved(best.plan);
        }
    }
    debug!(renewables = best.renewables_total, "renewables tier solved");

    let locks = Locks {
        shortfall: locks.shortfall,
        renewables: Some(best.renewables_total),
    };
    match solve_pass(inputs, Objective::Cost, locks, tol) {
        Ok(solution) => best = solution,
        Err(err) => {
            warn!(error = %err, "cost tier failed; keeping renewables-tier plan");
        }
    }

    SolveOutcome::Solved(best.plan)
}

fn solve_pass(
    inputs: &OptimizeInputs<'_>,
    objective: Objective,
    locks: Locks,
    tol: f64,
) -> Result<PassSolution, ResolutionError> {
    let slot_count = inputs.slots.len();
    let slot_hours = inputs.slot_minutes as f64 / 60.0;
    let mut vars = ProblemVariables::new();

    // Integer kWh per new vehicle and slot, capped by the charger rate.
    let charge: Vec<Vec<Variable>> = inputs
        .vehicles
        .iter()
        .map(|vehicle| {
            let cap = (vehicle.rate_kw * slot_hours).floor();
            (0..slot_count)
                .map(|_| vars.add(variable().integer().min(0.0).max(cap)))
                .collect()
        })
        .collect();

    // Continuous shortfall absorbing whatever demand goes unmet.
    let shortfall: Vec<Vec<Variable>> = inputs
        .vehicles
        .iter()
        .map(|_| {
            (0..slot_count)
                .map(|_| vars.add(variable().min(0.0)))
                .collect()
        })
        .collect();

    // Continuous kWh per reconstructed commitment and slot.
    let committed: Vec<Vec<Variable>> = inputs
        .committed
        .iter()
        .map(|entry| {
            let cap = entry.rate_kw * slot_hours;
            (0..slot_count)
                .map(|_| vars.add(variable().min(0.0).max(cap)))
                .collect()
        })
        .collect();

    let trad_use: Vec<Variable> = (0..slot_count)
        .map(|t| vars.add(variable().min(0.0).max(inputs.slots.traditional[t])))
        .collect();
    let ren_use: Vec<Variable> = (0..slot_count)
        .map(|t| vars.add(variable().min(0.0).max(inputs.slots.renewable[t])))
        .collect();
    let sink: Vec<Variable> = (0..slot_count)
        .map(|_| vars.add(variable().min(0.0)))
        .collect();

    let shortfall_expr: Expression = shortfall.iter().flatten().map(|&d| Expression::from(d)).sum();
    let renewables_expr: Expression = ren_use.iter().map(|&r| Expression::from(r)).sum();
    let cost_expr: Expression = charge
        .iter()
        .map(|row| {
            row.iter()
                .zip(&inputs.slots.tariffs)
                .map(|(&x, &tariff)| tariff * Expression::from(x))
                .sum::<Expression>()
        })
        .sum();

    let objective_expr = match objective {
        Objective::Shortfall => shortfall_expr.clone(),
        Objective::Renewables => -1.0 * renewables_expr.clone(),
        Objective::Cost => cost_expr.clone(),
    };

    let mut model = vars.minimise(objective_expr).using(default_solver);

    // Blocking: unallocated cells deliver nothing.
    for (v, row) in inputs.alloc_new.iter().enumerate() {
        for (t, &allocated) in row.iter().enumerate() {
            if !allocated {
                model = model.with(constraint!(charge[v][t] == 0.0));
            }
        }
    }
    for (e, row) in inputs.alloc_committed.iter().enumerate() {
        for (t, &allocated) in row.iter().enumerate() {
            if !allocated {
                model = model.with(constraint!(committed[e][t] == 0.0));
            }
        }
    }

    // Battery headroom and demand closure per new vehicle.
    for (v, vehicle) in inputs.vehicles.iter().enumerate() {
        let delivered: Expression = charge[v].iter().map(|&x| Expression::from(x)).sum();
        let missed: Expression = shortfall[v].iter().map(|&d| Expression::from(d)).sum();
        model = model.with(constraint!(delivered.clone() <= vehicle.headroom_kwh));
        model = model.with(constraint!(delivered + missed == vehicle.demand_kwh));
    }

    // Committed vehicles must receive exactly what they were promised.
    for (e, entry) in inputs.committed.iter().enumerate() {
        let delivered: Expression = committed[e].iter().map(|&y| Expression::from(y)).sum();
        model = model.with(constraint!(delivered == entry.total_kwh));
    }

    for t in 0..slot_count {
        let mut station_load: Expression =
            charge.iter().map(|row| Expression::from(row[t])).sum();
        station_load += committed
            .iter()
            .map(|row| Expression::from(row[t]))
            .sum::<Expression>();

        // Energy used equals energy needed: charging plus baseline load.
        model = model.with(constraint!(
            trad_use[t] + ren_use[t] == station_load + inputs.slots.consumption[t]
        ));
        // Production balance: whatever is generated is used or sunk.
        model = model.with(constraint!(
            trad_use[t] + ren_use[t] + sink[t]
                == inputs.slots.traditional[t] + inputs.slots.renewable[t]
        ));
        // An unbounded grid has no ceiling worth writing down.
        if inputs.slots.max_capacity[t].is_finite() {
            model = model.with(constraint!(
                trad_use[t] + ren_use[t] <= inputs.slots.max_capacity[t]
            ));
        }
    }

    if let Some(bound) = locks.shortfall {
        model = model.with(constraint!(shortfall_expr.clone() <= bound + tol));
    }
    if let Some(bound) = locks.renewables {
        model = model.with(constraint!(renewables_expr.clone() >= bound - tol));
    }

    let solution = model.solve()?;

    // CBC reports integers as near-integers; pin them back down.
    let new_charges: Vec<Vec<f64>> = charge
        .iter()
        .map(|row| {
            row.iter()
                .map(|&x| solution.value(x).round().max(0.0))
                .collect()
        })
        .collect();
    let committed_charges: Vec<Vec<f64>> = committed
        .iter()
        .map(|row| row.iter().map(|&y| solution.value(y).max(0.0)).collect())
        .collect();
    let shortfall_total: f64 = shortfall
        .iter()
        .flatten()
        .map(|&d| solution.value(d))
        .sum();
    let renewables_total: f64 = ren_use.iter().map(|&r| solution.value(r)).sum();

    Ok(PassSolution {
        plan: ChargePlan {
            new_charges,
            committed_charges,
        },
        shortfall_total,
        renewables_total,
    })
}
