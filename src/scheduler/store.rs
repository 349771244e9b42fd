use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::{Apartment, Runner, Tenant, TimeOfDay, Visit};

pub type SharedApartmentState = Arc<RwLock<ApartmentState>>;
pub type SharedRunnerState = Arc<RwLock<RunnerState>>;

/// An apartment plus every visit booked at it, sorted by (date, slot).
#[derive(Debug)]
pub struct ApartmentState {
    pub apartment: Apartment,
    pub visits: Vec<Visit>,
}

impl ApartmentState {
    pub fn new(apartment: Apartment) -> Self {
        Self {
            apartment,
            visits: Vec::new(),
        }
    }

    /// Insert a visit maintaining (date, slot) order.
    pub fn insert_visit(&mut self, visit: Visit) {
        let pos = self
            .visits
            .partition_point(|v| (v.date, v.slot) <= (visit.date, visit.slot));
        self.visits.insert(pos, visit);
    }

    /// All visits on one date. Binary search over the sorted list.
    pub fn visits_on(&self, date: NaiveDate) -> &[Visit] {
        let lo = self.visits.partition_point(|v| v.date < date);
        let hi = self.visits.partition_point(|v| v.date <= date);
        &self.visits[lo..hi]
    }

    /// All visits with `from <= date <= to`.
    pub fn visits_between(&self, from: NaiveDate, to: NaiveDate) -> &[Visit] {
        let lo = self.visits.partition_point(|v| v.date < from);
        let hi = self.visits.partition_point(|v| v.date <= to);
        &self.visits[lo..hi.max(lo)]
    }
}

/// A runner's view of one committed visit — enough to evaluate the
/// one-zone-per-day rule without touching the apartment's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerVisit {
    pub visit_id: Ulid,
    pub apartment_id: Ulid,
    pub date: NaiveDate,
    pub slot: TimeOfDay,
    pub zone: String,
}

#[derive(Debug)]
pub struct RunnerState {
    pub runner: Runner,
    pub visits: Vec<RunnerVisit>,
}

impl RunnerState {
    pub fn new(runner: Runner) -> Self {
        Self {
            runner,
            visits: Vec::new(),
        }
    }

    pub fn record_visit(&mut self, visit: &Visit, zone: String) {
        self.visits.push(RunnerVisit {
            visit_id: visit.id,
            apartment_id: visit.apartment_id,
            date: visit.date,
            slot: visit.slot,
            zone,
        });
    }

    pub fn visits_on(&self, date: NaiveDate) -> impl Iterator<Item = &RunnerVisit> {
        self.visits.iter().filter(move |v| v.date == date)
    }
}

/// In-memory entity store. Apartments and runners carry mutable visit
/// state behind per-entity locks; tenants are immutable records.
pub struct InMemoryStore {
    apartments: DashMap<Ulid, SharedApartmentState>,
    runners: DashMap<Ulid, SharedRunnerState>,
    tenants: DashMap<Ulid, Tenant>,
    /// Apartment → assigned runners. Bookings resolve the first entry.
    assignments: DashMap<Ulid, Vec<Ulid>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            apartments: DashMap::new(),
            runners: DashMap::new(),
            tenants: DashMap::new(),
            assignments: DashMap::new(),
        }
    }

    // ── Apartments ───────────────────────────────────────────

    pub fn apartment_count(&self) -> usize {
        self.apartments.len()
    }

    pub fn contains_apartment(&self, id: &Ulid) -> bool {
        self.apartments.contains_key(id)
    }

    pub fn apartment_state(&self, id: &Ulid) -> Option<SharedApartmentState> {
        self.apartments.get(id).map(|e| e.value().clone())
    }

    pub fn insert_apartment(&self, apartment: Apartment) {
        self.apartments.insert(
            apartment.id,
            Arc::new(RwLock::new(ApartmentState::new(apartment))),
        );
    }

    pub fn apartment_states(&self) -> Vec<SharedApartmentState> {
        self.apartments.iter().map(|e| e.value().clone()).collect()
    }

    // ── Runners ──────────────────────────────────────────────

    pub fn runner_count(&self) -> usize {
        self.runners.len()
    }

    pub fn contains_runner(&self, id: &Ulid) -> bool {
        self.runners.contains_key(id)
    }

    pub fn runner_state(&self, id: &Ulid) -> Option<SharedRunnerState> {
        self.runners.get(id).map(|e| e.value().clone())
    }

    pub fn insert_runner(&self, runner: Runner) {
        self.runners
            .insert(runner.id, Arc::new(RwLock::new(RunnerState::new(runner))));
    }

    pub fn runner_states(&self) -> Vec<SharedRunnerState> {
        self.runners.iter().map(|e| e.value().clone()).collect()
    }

    // ── Tenants ──────────────────────────────────────────────

    pub fn tenant_count(&self) -> usize {
        self.tenants.len()
    }

    pub fn contains_tenant(&self, id: &Ulid) -> bool {
        self.tenants.contains_key(id)
    }

    pub fn tenant(&self, id: &Ulid) -> Option<Tenant> {
        self.tenants.get(id).map(|e| e.value().clone())
    }

    pub fn insert_tenant(&self, tenant: Tenant) {
        self.tenants.insert(tenant.id, tenant);
    }

    pub fn tenants(&self) -> Vec<Tenant> {
        self.tenants.iter().map(|e| e.value().clone()).collect()
    }

    // ── Assignments ──────────────────────────────────────────

    /// The runner a booking at this apartment resolves to: the first
    /// assignment, if any.
    pub fn runner_for(&self, apartment_id: &Ulid) -> Option<Ulid> {
        self.assignments
            .get(apartment_id)
            .and_then(|e| e.value().first().copied())
    }

    pub fn assigned_runners(&self, apartment_id: &Ulid) -> Vec<Ulid> {
        self.assignments
            .get(apartment_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn add_assignment(&self, apartment_id: Ulid, runner_id: Ulid) {
        self.assignments
            .entry(apartment_id)
            .or_default()
            .push(runner_id);
    }

    pub fn assignments(&self) -> Vec<(Ulid, Vec<Ulid>)> {
        self.assignments
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{VisitStatus, WeekSchedule};

    fn t(h: u8, m: u8) -> TimeOfDay {
        TimeOfDay::new(h, m).unwrap()
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn visit(apartment_id: Ulid, date: NaiveDate, slot: TimeOfDay) -> Visit {
        Visit {
            id: Ulid::new(),
            apartment_id,
            runner_id: Ulid::new(),
            tenant_id: Ulid::new(),
            date,
            slot,
            status: VisitStatus::Scheduled,
        }
    }

    fn apartment() -> Apartment {
        Apartment {
            id: Ulid::new(),
            zone: "north".into(),
            availability: WeekSchedule::default(),
        }
    }

    #[test]
    fn visits_stay_sorted() {
        let apt = apartment();
        let id = apt.id;
        let mut state = ApartmentState::new(apt);
        state.insert_visit(visit(id, d(11), t(9, 30)));
        state.insert_visit(visit(id, d(9), t(14, 0)));
        state.insert_visit(visit(id, d(11), t(9, 0)));
        state.insert_visit(visit(id, d(9), t(9, 0)));

        let order: Vec<(NaiveDate, TimeOfDay)> =
            state.visits.iter().map(|v| (v.date, v.slot)).collect();
        assert_eq!(
            order,
            vec![
                (d(9), t(9, 0)),
                (d(9), t(14, 0)),
                (d(11), t(9, 0)),
                (d(11), t(9, 30)),
            ]
        );
    }

    #[test]
    fn visits_on_selects_one_date() {
        let apt = apartment();
        let id = apt.id;
        let mut state = ApartmentState::new(apt);
        state.insert_visit(visit(id, d(9), t(9, 0)));
        state.insert_visit(visit(id, d(10), t(9, 0)));
        state.insert_visit(visit(id, d(10), t(9, 15)));
        state.insert_visit(visit(id, d(11), t(9, 0)));

        assert_eq!(state.visits_on(d(10)).len(), 2);
        assert_eq!(state.visits_on(d(9)).len(), 1);
        assert!(state.visits_on(d(12)).is_empty());
    }

    #[test]
    fn visits_between_is_inclusive() {
        let apt = apartment();
        let id = apt.id;
        let mut state = ApartmentState::new(apt);
        for day in [9, 10, 11, 12, 13] {
            state.insert_visit(visit(id, d(day), t(9, 0)));
        }
        assert_eq!(state.visits_between(d(10), d(12)).len(), 3);
        assert_eq!(state.visits_between(d(9), d(13)).len(), 5);
        assert!(state.visits_between(d(14), d(20)).is_empty());
    }

    #[test]
    fn runner_state_tracks_zones() {
        let runner = Runner {
            id: Ulid::new(),
            name: None,
            availability: WeekSchedule::default(),
        };
        let mut state = RunnerState::new(runner);
        let v = visit(Ulid::new(), d(9), t(9, 0));
        state.record_visit(&v, "north".into());

        let on_day: Vec<_> = state.visits_on(d(9)).collect();
        assert_eq!(on_day.len(), 1);
        assert_eq!(on_day[0].zone, "north");
        assert!(state.visits_on(d(10)).next().is_none());
    }

    #[test]
    fn first_assignment_wins() {
        let store = InMemoryStore::new();
        let apartment_id = Ulid::new();
        let first = Ulid::new();
        let second = Ulid::new();

        assert_eq!(store.runner_for(&apartment_id), None);
        store.add_assignment(apartment_id, first);
        store.add_assignment(apartment_id, second);
        assert_eq!(store.runner_for(&apartment_id), Some(first));
        assert_eq!(store.assigned_runners(&apartment_id), vec![first, second]);
    }
}
