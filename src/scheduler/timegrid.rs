//! Time and unit normalization: wall-clock datetimes are mapped to minute
//! offsets from the window origin (midnight of the earliest interval's date)
//! and discretized onto the slot grid.

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};

pub const MINS_IN_DAY: i64 = 1_440;
pub const MINS_IN_HOUR: i64 = 60;

/// The discretized scheduling window: `slot_count` slots of `slot_minutes`
/// each, the first starting `first_slot_min` minutes after the origin.
#[derive(Debug, Clone, Copy)]
pub struct TimeGrid {
    origin: NaiveDateTime,
    first_slot_min: i64,
    slot_minutes: i64,
    slot_count: usize,
}

impl TimeGrid {
    pub fn new(first_slot: NaiveDateTime, slot_count: usize, slot_minutes: i64) -> Self {
        let origin = first_slot.date().and_time(NaiveTime::MIN);
        let mut grid = Self {
            origin,
            first_slot_min: 0,
            slot_minutes,
            slot_count,
        };
        grid.first_slot_min = grid.minutes_from_origin(first_slot);
        grid
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn slot_minutes(&self) -> i64 {
        self.slot_minutes
    }

    /// Minutes between the window origin and `t`. Negative when `t` predates
    /// the origin.
    pub fn minutes_from_origin(&self, t: NaiveDateTime) -> i64 {
        let days = (t.date() - self.origin.date()).num_days();
        days * MINS_IN_DAY + i64::from(t.hour()) * MINS_IN_HOUR + i64::from(t.minute())
    }

    /// Round a minute value to the nearest slot boundary; ties round up.
    pub fn discretise(&self, minutes: i64) -> i64 {
        let rem = minutes.rem_euclid(self.slot_minutes);
        if rem == 0 {
            minutes
        } else if rem < (self.slot_minutes + 1) / 2 {
            minutes - rem
        } else {
            minutes + self.slot_minutes - rem
        }
    }

    /// Slot index of `t` after discretization. Index 0 is the first slot of
    /// the window; out-of-window times produce out-of-range indices for the
    /// caller to reject or clamp.
    pub fn slot_index(&self, t: NaiveDateTime) -> i64 {
        (self.discretise(self.minutes_from_origin(t)) - self.first_slot_min) / self.slot_minutes
    }

    /// Wall-clock start of the slot at `index`.
    pub fn slot_start(&self, index: usize) -> NaiveDateTime {
        self.origin
            + Duration::minutes(self.first_slot_min + index as i64 * self.slot_minutes)
    }

    /// Snap a wall-clock time onto the nearest slot boundary.
    pub fn align(&self, t: NaiveDateTime) -> NaiveDateTime {
        self.origin + Duration::minutes(self.discretise(self.minutes_from_origin(t)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use rstest::rstest;

    fn grid() -> TimeGrid {
        let first_slot = NaiveDate::from_ymd_opt(2021, 5, 25)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap();
        TimeGrid::new(first_slot, 8, 15)
    }

    #[rstest]
    #[case(900, 900)] // exact boundary stays put
    #[case(907, 900)] // lesser half rounds down
    #[case(908, 915)] // tie rounds up
    #[case(914, 915)]
    fn discretise_rounds_to_slot_boundaries(#[case] minutes: i64, #[case] expected: i64) {
        assert_eq!(grid().discretise(minutes), expected);
    }

    #[test]
    fn minutes_from_origin_spans_midnight() {
        let g = grid();
        let next_day = NaiveDate::from_ymd_opt(2021, 5, 26)
            .unwrap()
            .and_hms_opt(0, 30, 0)
            .unwrap();
        assert_eq!(g.minutes_from_origin(next_day), MINS_IN_DAY + 30);
    }

    #[test]
    fn slot_index_is_relative_to_first_slot() {
        let g = grid();
        let t = NaiveDate::from_ymd_opt(2021, 5, 25)
            .unwrap()
            .and_hms_opt(15, 30, 0)
            .unwrap();
        assert_eq!(g.slot_index(t), 2);
    }

    #[test]
    fn slot_start_round_trips_indices() {
        let g = grid();
        for index in 0..g.slot_count() {
            assert_eq!(g.slot_index(g.slot_start(index)), index as i64);
        }
    }

    proptest! {
        #[test]
        fn discretised_times_stay_on_grid(minutes in -2 * MINS_IN_DAY..2 * MINS_IN_DAY) {
            let g = grid();
            let d = g.discretise(minutes);
            prop_assert_eq!(d.rem_euclid(g.slot_minutes()), 0);
            // Never moves more than half a slot (ties move up a full half).
            prop_assert!((d - minutes).abs() <= g.slot_minutes() / 2 + 1);
        }
    }
}
