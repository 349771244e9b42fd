use chrono::NaiveDate;

use crate::limits::SLOT_CAPACITY;
use crate::model::{TimeOfDay, WeekSchedule};

use super::availability::is_available;

// ── Slot Search ──────────────────────────────────────────────────

/// Visits are quantized to 15-minute slots.
pub const SLOT_MINUTES: u16 = 15;

/// Daily booking window `[09:00, 19:00)`, i.e. hours 9 through 18.
pub const DAY_START_HOUR: u16 = 9;
pub const DAY_END_HOUR: u16 = 19;

/// The 40 candidate slots of a booking day, in ascending order.
pub fn day_slots() -> impl Iterator<Item = TimeOfDay> {
    (DAY_START_HOUR * 60..DAY_END_HOUR * 60)
        .step_by(SLOT_MINUTES as usize)
        .map(|minutes| TimeOfDay::from_minutes(minutes).expect("slot grid stays within the day"))
}

/// Earliest slot in the daily window where the slot is under capacity and
/// both parties are reachable, or `None` when the day is exhausted.
///
/// `booked` holds the slots of the visits already committed for this
/// apartment on `date` (one entry per visit). A linear scan over 40
/// candidates is the whole search; the domain is small and bounded.
pub fn find_slot(
    apartment: &WeekSchedule,
    runner: &WeekSchedule,
    booked: &[TimeOfDay],
    date: NaiveDate,
) -> Option<TimeOfDay> {
    day_slots().find(|&slot| {
        booked.iter().filter(|&&taken| taken == slot).count() < SLOT_CAPACITY
            && is_available(apartment, date, slot)
            && is_available(runner, date, slot)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TimeRange;

    fn t(h: u8, m: u8) -> TimeOfDay {
        TimeOfDay::new(h, m).unwrap()
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 9).unwrap()
    }

    fn all_day_monday() -> WeekSchedule {
        WeekSchedule {
            monday: vec![TimeRange::new(t(9, 0), t(19, 0))],
            ..Default::default()
        }
    }

    fn monday_morning() -> WeekSchedule {
        WeekSchedule {
            monday: vec![TimeRange::new(t(9, 0), t(12, 0))],
            ..Default::default()
        }
    }

    #[test]
    fn grid_covers_forty_slots() {
        let slots: Vec<TimeOfDay> = day_slots().collect();
        assert_eq!(slots.len(), 40);
        assert_eq!(slots[0], t(9, 0));
        assert_eq!(slots[1], t(9, 15));
        assert_eq!(*slots.last().unwrap(), t(18, 45));
        assert!(slots.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn empty_day_yields_first_slot() {
        let found = find_slot(&all_day_monday(), &monday_morning(), &[], monday());
        assert_eq!(found, Some(t(9, 0)));
    }

    #[test]
    fn slot_at_capacity_is_skipped() {
        // Two visits already at 09:00 — capacity reached, move to 09:15
        let booked = vec![t(9, 0), t(9, 0)];
        let found = find_slot(&all_day_monday(), &monday_morning(), &booked, monday());
        assert_eq!(found, Some(t(9, 15)));
    }

    #[test]
    fn single_booking_leaves_slot_open() {
        let booked = vec![t(9, 0)];
        let found = find_slot(&all_day_monday(), &monday_morning(), &booked, monday());
        assert_eq!(found, Some(t(9, 0)));
    }

    #[test]
    fn runner_schedule_constrains_search() {
        // Runner reachable only from 14:00; apartment open all day
        let runner = WeekSchedule {
            monday: vec![TimeRange::new(t(14, 0), t(16, 0))],
            ..Default::default()
        };
        let found = find_slot(&all_day_monday(), &runner, &[], monday());
        assert_eq!(found, Some(t(14, 0)));
    }

    #[test]
    fn apartment_schedule_constrains_search() {
        let apartment = WeekSchedule {
            monday: vec![TimeRange::new(t(11, 0), t(13, 0))],
            ..Default::default()
        };
        let found = find_slot(&apartment, &all_day_monday(), &[], monday());
        assert_eq!(found, Some(t(11, 0)));
    }

    #[test]
    fn no_overlap_between_parties_yields_none() {
        let apartment = WeekSchedule {
            monday: vec![TimeRange::new(t(9, 0), t(11, 0))],
            ..Default::default()
        };
        let runner = WeekSchedule {
            monday: vec![TimeRange::new(t(15, 0), t(18, 0))],
            ..Default::default()
        };
        assert_eq!(find_slot(&apartment, &runner, &[], monday()), None);
    }

    #[test]
    fn runner_without_weekday_entry_yields_none() {
        // Runner's schedule has nothing for Monday
        let runner = WeekSchedule {
            tuesday: vec![TimeRange::new(t(9, 0), t(17, 0))],
            ..Default::default()
        };
        assert_eq!(find_slot(&all_day_monday(), &runner, &[], monday()), None);
    }

    #[test]
    fn fully_booked_day_yields_none() {
        let mut booked = Vec::new();
        for slot in day_slots() {
            booked.push(slot);
            booked.push(slot);
        }
        assert_eq!(
            find_slot(&all_day_monday(), &all_day_monday(), &booked, monday()),
            None
        );
    }

    #[test]
    fn search_is_deterministic() {
        let booked = vec![t(9, 0), t(9, 0), t(9, 15)];
        let first = find_slot(&all_day_monday(), &monday_morning(), &booked, monday());
        for _ in 0..10 {
            assert_eq!(
                find_slot(&all_day_monday(), &monday_morning(), &booked, monday()),
                first
            );
        }
        assert_eq!(first, Some(t(9, 15)));
    }

    #[test]
    fn range_end_is_bookable() {
        // Apartment and runner both end availability exactly at 12:00;
        // everything before is at capacity
        let mut booked = Vec::new();
        for slot in day_slots().take_while(|&s| s < t(12, 0)) {
            booked.push(slot);
            booked.push(slot);
        }
        let found = find_slot(&monday_morning(), &monday_morning(), &booked, monday());
        assert_eq!(found, Some(t(12, 0)));
    }
}
