use chrono::{Datelike, NaiveDate};

use crate::model::{TimeOfDay, WeekSchedule};

// ── Availability Predicate ───────────────────────────────────────

/// Whether a party is reachable at `slot` on `date` per its weekly
/// schedule.
///
/// The weekday comes straight from the civil date — no timezone is
/// involved. A day with no ranges means unavailable all day. Range
/// endpoints are inclusive: a slot equal to a range's `start` or `end`
/// is available.
pub fn is_available(schedule: &WeekSchedule, date: NaiveDate, slot: TimeOfDay) -> bool {
    schedule
        .for_weekday(date.weekday())
        .iter()
        .any(|range| range.contains(slot))
}
