use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::MAX_VISITS_PER_WEEK;
use crate::model::{is_weekend, week_bounds, Visit};

use super::store::RunnerVisit;
use super::SchedulerError;

// ── Constraint Validator ─────────────────────────────────────────
//
// Three slot-independent preconditions, checked in order (cheapest and
// most general first). Each is a pure function over data the
// orchestrator loaded under its locks; any failure short-circuits with
// its own error kind.

/// 1. Weekday eligibility: no visits on Saturday or Sunday.
pub fn check_weekday(date: NaiveDate) -> Result<(), SchedulerError> {
    if is_weekend(date) {
        return Err(SchedulerError::InvalidDate(date));
    }
    Ok(())
}

/// 2. Weekly quota: the apartment's visits within the Monday-to-Sunday
/// week containing `date` must stay under [`MAX_VISITS_PER_WEEK`].
pub fn check_weekly_quota(
    apartment_id: Ulid,
    visits: &[Visit],
    date: NaiveDate,
) -> Result<(), SchedulerError> {
    let (week_start, week_end) = week_bounds(date);
    let count = visits
        .iter()
        .filter(|v| v.date >= week_start && v.date <= week_end)
        .count();
    if count >= MAX_VISITS_PER_WEEK {
        return Err(SchedulerError::QuotaExceeded {
            apartment_id,
            week_start,
        });
    }
    Ok(())
}

/// 3. Zone exclusivity: a runner serves one zone per calendar day. Any
/// visit on `date` whose zone differs from `zone` blocks the booking.
/// Visits in the same zone never conflict, even at another apartment.
pub fn check_zone(
    zone: &str,
    runner_visits: &[RunnerVisit],
    date: NaiveDate,
) -> Result<(), SchedulerError> {
    if runner_visits
        .iter()
        .any(|v| v.date == date && v.zone != zone)
    {
        return Err(SchedulerError::ZoneConflict { date });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TimeOfDay, VisitStatus};

    fn t(h: u8, m: u8) -> TimeOfDay {
        TimeOfDay::new(h, m).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn visit_on(apartment_id: Ulid, date: NaiveDate) -> Visit {
        Visit {
            id: Ulid::new(),
            apartment_id,
            runner_id: Ulid::new(),
            tenant_id: Ulid::new(),
            date,
            slot: t(9, 0),
            status: VisitStatus::Scheduled,
        }
    }

    fn runner_visit(date: NaiveDate, zone: &str) -> RunnerVisit {
        RunnerVisit {
            visit_id: Ulid::new(),
            apartment_id: Ulid::new(),
            date,
            slot: t(9, 0),
            zone: zone.to_string(),
        }
    }

    #[test]
    fn weekday_check_rejects_weekend() {
        // 2025-06-14 Saturday, 2025-06-15 Sunday
        assert!(matches!(
            check_weekday(d(2025, 6, 14)),
            Err(SchedulerError::InvalidDate(_))
        ));
        assert!(matches!(
            check_weekday(d(2025, 6, 15)),
            Err(SchedulerError::InvalidDate(_))
        ));
        assert!(check_weekday(d(2025, 6, 16)).is_ok());
    }

    #[test]
    fn quota_counts_only_the_containing_week() {
        let apartment_id = Ulid::new();
        // Fill the week of June 9 to the cap, all on weekdays
        let mut visits = Vec::new();
        for day in [9, 10, 11, 12, 13] {
            for _ in 0..6 {
                visits.push(visit_on(apartment_id, d(2025, 6, day)));
            }
        }
        assert_eq!(visits.len(), MAX_VISITS_PER_WEEK);
        assert!(matches!(
            check_weekly_quota(apartment_id, &visits, d(2025, 6, 11)),
            Err(SchedulerError::QuotaExceeded { .. })
        ));
        // The next week is unaffected
        assert!(check_weekly_quota(apartment_id, &visits, d(2025, 6, 16)).is_ok());
    }

    #[test]
    fn quota_one_below_cap_passes() {
        let apartment_id = Ulid::new();
        let visits: Vec<Visit> = (0..MAX_VISITS_PER_WEEK - 1)
            .map(|_| visit_on(apartment_id, d(2025, 6, 10)))
            .collect();
        assert!(check_weekly_quota(apartment_id, &visits, d(2025, 6, 10)).is_ok());
    }

    #[test]
    fn quota_week_includes_both_bounds() {
        let apartment_id = Ulid::new();
        // Visits on the Monday and the Sunday of the same week
        let visits = vec![
            visit_on(apartment_id, d(2025, 6, 9)),
            visit_on(apartment_id, d(2025, 6, 15)),
        ];
        let (start, end) = week_bounds(d(2025, 6, 11));
        let counted = visits
            .iter()
            .filter(|v| v.date >= start && v.date <= end)
            .count();
        assert_eq!(counted, 2);
    }

    #[test]
    fn zone_check_blocks_cross_zone_same_day() {
        let visits = vec![runner_visit(d(2025, 6, 9), "south")];
        assert!(matches!(
            check_zone("north", &visits, d(2025, 6, 9)),
            Err(SchedulerError::ZoneConflict { .. })
        ));
    }

    #[test]
    fn zone_check_allows_same_zone() {
        let visits = vec![
            runner_visit(d(2025, 6, 9), "north"),
            runner_visit(d(2025, 6, 9), "north"),
        ];
        assert!(check_zone("north", &visits, d(2025, 6, 9)).is_ok());
    }

    #[test]
    fn zone_check_ignores_other_days() {
        let visits = vec![runner_visit(d(2025, 6, 10), "south")];
        assert!(check_zone("north", &visits, d(2025, 6, 9)).is_ok());
    }

    #[test]
    fn zone_conflict_carries_the_date() {
        let date = d(2025, 6, 9);
        let visits = vec![runner_visit(date, "south")];
        match check_zone("north", &visits, date) {
            Err(SchedulerError::ZoneConflict { date: conflict }) => assert_eq!(conflict, date),
            other => panic!("expected ZoneConflict, got {other:?}"),
        }
    }
}
