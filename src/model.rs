use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Minutes since midnight. Rendered and parsed as zero-padded "HH:MM".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const fn from_minutes(minutes: u16) -> Option<Self> {
        if minutes < 24 * 60 {
            Some(Self(minutes))
        } else {
            None
        }
    }

    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self(hour as u16 * 60 + minute as u16))
        } else {
            None
        }
    }

    pub fn hour(&self) -> u8 {
        (self.0 / 60) as u8
    }

    pub fn minute(&self) -> u8 {
        (self.0 % 60) as u8
    }

    pub fn minutes_from_midnight(&self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTimeError;

impl std::fmt::Display for ParseTimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "expected time of day as \"HH:MM\"")
    }
}

impl std::error::Error for ParseTimeError {}

impl std::str::FromStr for TimeOfDay {
    type Err = ParseTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s.split_once(':').ok_or(ParseTimeError)?;
        if h.len() != 2 || m.len() != 2 {
            return Err(ParseTimeError);
        }
        let hour: u8 = h.parse().map_err(|_| ParseTimeError)?;
        let minute: u8 = m.parse().map_err(|_| ParseTimeError)?;
        Self::new(hour, minute).ok_or(ParseTimeError)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A reachable window within one day. Both endpoints are bookable:
/// a slot equal to `start` or `end` counts as inside the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl TimeRange {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: TimeOfDay) -> bool {
        self.start <= t && t <= self.end
    }
}

/// Declarative weekly availability: seven weekday keys, each an ordered
/// list of disjoint ranges. A missing day means unavailable all day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekSchedule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub monday: Vec<TimeRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tuesday: Vec<TimeRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wednesday: Vec<TimeRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thursday: Vec<TimeRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub friday: Vec<TimeRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub saturday: Vec<TimeRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sunday: Vec<TimeRange>,
}

impl WeekSchedule {
    pub fn for_weekday(&self, day: Weekday) -> &[TimeRange] {
        match day {
            Weekday::Mon => &self.monday,
            Weekday::Tue => &self.tuesday,
            Weekday::Wed => &self.wednesday,
            Weekday::Thu => &self.thursday,
            Weekday::Fri => &self.friday,
            Weekday::Sat => &self.saturday,
            Weekday::Sun => &self.sunday,
        }
    }

    fn days_mut(&mut self) -> [&mut Vec<TimeRange>; 7] {
        [
            &mut self.monday,
            &mut self.tuesday,
            &mut self.wednesday,
            &mut self.thursday,
            &mut self.friday,
            &mut self.saturday,
            &mut self.sunday,
        ]
    }

    /// Sort each day's ranges and enforce the schedule invariants:
    /// every range has `start <= end`, and ranges within a day are
    /// disjoint (shared endpoints count as overlap).
    pub fn normalized(mut self) -> Result<Self, &'static str> {
        for day in self.days_mut() {
            day.sort_by_key(|r| r.start);
            for r in day.iter() {
                if r.end < r.start {
                    return Err("range ends before it starts");
                }
            }
            for pair in day.windows(2) {
                if pair[1].start <= pair[0].end {
                    return Err("ranges within a day overlap");
                }
            }
        }
        Ok(self)
    }
}

// ── Calendar helpers ─────────────────────────────────────────────

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Monday-to-Sunday bounds (inclusive) of the week containing `date`.
/// Week start is Monday regardless of locale conventions.
pub fn week_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = date - Days::new(u64::from(date.weekday().num_days_from_monday()));
    (monday, monday + Days::new(6))
}

// ── Entities ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Apartment {
    pub id: Ulid,
    /// Locality tag; a runner serves at most one zone per calendar day.
    pub zone: String,
    pub availability: WeekSchedule,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runner {
    pub id: Ulid,
    pub name: Option<String>,
    pub availability: WeekSchedule,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Ulid,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    Scheduled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
    pub id: Ulid,
    pub apartment_id: Ulid,
    pub runner_id: Ulid,
    pub tenant_id: Ulid,
    pub date: NaiveDate,
    pub slot: TimeOfDay,
    pub status: VisitStatus,
}

/// The event types — flat, no nesting. This is the journal record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ApartmentCreated {
        id: Ulid,
        zone: String,
        availability: WeekSchedule,
    },
    RunnerCreated {
        id: Ulid,
        name: Option<String>,
        availability: WeekSchedule,
    },
    TenantCreated {
        id: Ulid,
        name: Option<String>,
    },
    RunnerAssigned {
        apartment_id: Ulid,
        runner_id: Ulid,
    },
    VisitScheduled {
        id: Ulid,
        apartment_id: Ulid,
        runner_id: Ulid,
        tenant_id: Ulid,
        date: NaiveDate,
        slot: TimeOfDay,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u8, m: u8) -> TimeOfDay {
        TimeOfDay::new(h, m).unwrap()
    }

    #[test]
    fn time_of_day_parse_and_display() {
        let nine: TimeOfDay = "09:00".parse().unwrap();
        assert_eq!(nine, t(9, 0));
        assert_eq!(nine.to_string(), "09:00");
        assert_eq!("18:45".parse::<TimeOfDay>().unwrap().to_string(), "18:45");
    }

    #[test]
    fn time_of_day_rejects_malformed() {
        assert!("9:00".parse::<TimeOfDay>().is_err()); // not zero-padded
        assert!("24:00".parse::<TimeOfDay>().is_err());
        assert!("12:60".parse::<TimeOfDay>().is_err());
        assert!("1200".parse::<TimeOfDay>().is_err());
        assert!("".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn time_of_day_orders_chronologically() {
        assert!(t(9, 0) < t(9, 15));
        assert!(t(9, 45) < t(10, 0));
        assert_eq!(TimeOfDay::from_minutes(9 * 60), Some(t(9, 0)));
        assert_eq!(TimeOfDay::from_minutes(24 * 60), None);
    }

    #[test]
    fn time_range_contains_both_endpoints() {
        let r = TimeRange::new(t(9, 0), t(12, 0));
        assert!(r.contains(t(9, 0)));
        assert!(r.contains(t(12, 0)));
        assert!(r.contains(t(10, 30)));
        assert!(!r.contains(t(8, 45)));
        assert!(!r.contains(t(12, 15)));
    }

    #[test]
    fn schedule_missing_days_default_empty() {
        let schedule: WeekSchedule =
            serde_json::from_str(r#"{"monday":[{"start":"09:00","end":"12:00"}]}"#).unwrap();
        assert_eq!(schedule.monday.len(), 1);
        assert!(schedule.tuesday.is_empty());
        assert!(schedule.sunday.is_empty());
    }

    #[test]
    fn schedule_normalize_sorts_ranges() {
        let schedule = WeekSchedule {
            monday: vec![
                TimeRange::new(t(14, 0), t(16, 0)),
                TimeRange::new(t(9, 0), t(12, 0)),
            ],
            ..Default::default()
        };
        let normalized = schedule.normalized().unwrap();
        assert_eq!(normalized.monday[0].start, t(9, 0));
        assert_eq!(normalized.monday[1].start, t(14, 0));
    }

    #[test]
    fn schedule_rejects_inverted_range() {
        let schedule = WeekSchedule {
            friday: vec![TimeRange::new(t(12, 0), t(9, 0))],
            ..Default::default()
        };
        assert!(schedule.normalized().is_err());
    }

    #[test]
    fn schedule_rejects_overlapping_ranges() {
        let schedule = WeekSchedule {
            monday: vec![
                TimeRange::new(t(9, 0), t(12, 0)),
                TimeRange::new(t(11, 0), t(14, 0)),
            ],
            ..Default::default()
        };
        assert!(schedule.normalized().is_err());

        // Shared endpoint counts as overlap
        let touching = WeekSchedule {
            monday: vec![
                TimeRange::new(t(9, 0), t(12, 0)),
                TimeRange::new(t(12, 0), t(14, 0)),
            ],
            ..Default::default()
        };
        assert!(touching.normalized().is_err());
    }

    #[test]
    fn weekend_detection() {
        // 2025-06-07 is a Saturday, 2025-06-08 a Sunday
        assert!(is_weekend(NaiveDate::from_ymd_opt(2025, 6, 7).unwrap()));
        assert!(is_weekend(NaiveDate::from_ymd_opt(2025, 6, 8).unwrap()));
        assert!(!is_weekend(NaiveDate::from_ymd_opt(2025, 6, 9).unwrap()));
        assert!(!is_weekend(NaiveDate::from_ymd_opt(2025, 6, 13).unwrap()));
    }

    #[test]
    fn week_bounds_start_monday() {
        // 2025-06-11 is a Wednesday
        let wed = NaiveDate::from_ymd_opt(2025, 6, 11).unwrap();
        let (start, end) = week_bounds(wed);
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 6, 9).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2025, 6, 15).unwrap());
    }

    #[test]
    fn week_bounds_fixed_points() {
        // A Monday maps to itself; a Sunday maps back to its Monday.
        let mon = NaiveDate::from_ymd_opt(2025, 6, 9).unwrap();
        assert_eq!(week_bounds(mon).0, mon);
        let sun = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        assert_eq!(week_bounds(sun), (mon, sun));
    }

    #[test]
    fn week_bounds_across_year_boundary() {
        // 2026-01-01 is a Thursday; its week starts 2025-12-29
        let thu = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let (start, end) = week_bounds(thu);
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 12, 29).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2026, 1, 4).unwrap());
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::VisitScheduled {
            id: Ulid::new(),
            apartment_id: Ulid::new(),
            runner_id: Ulid::new(),
            tenant_id: Ulid::new(),
            date: NaiveDate::from_ymd_opt(2025, 6, 9).unwrap(),
            slot: t(9, 15),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn schedule_serde_roundtrip() {
        let schedule = WeekSchedule {
            monday: vec![TimeRange::new(t(9, 0), t(12, 0))],
            wednesday: vec![
                TimeRange::new(t(9, 0), t(11, 0)),
                TimeRange::new(t(13, 0), t(17, 0)),
            ],
            ..Default::default()
        };
        let json = serde_json::to_string(&schedule).unwrap();
        // Empty days are omitted on the wire
        assert!(!json.contains("tuesday"));
        let back: WeekSchedule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, schedule);
    }
}
