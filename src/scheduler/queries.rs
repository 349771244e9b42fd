use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::MAX_LIST_WINDOW_DAYS;
use crate::model::{week_bounds, Apartment, Runner, Tenant, Visit};

use super::{RunnerVisit, Scheduler, SchedulerError};

impl Scheduler {
    pub async fn apartment(&self, id: &Ulid) -> Option<Apartment> {
        let state = self.store.apartment_state(id)?;
        let guard = state.read().await;
        Some(guard.apartment.clone())
    }

    pub async fn runner(&self, id: &Ulid) -> Option<Runner> {
        let state = self.store.runner_state(id)?;
        let guard = state.read().await;
        Some(guard.runner.clone())
    }

    pub fn tenant(&self, id: &Ulid) -> Option<Tenant> {
        self.store.tenant(id)
    }

    /// The runner a booking at this apartment would resolve to.
    pub fn runner_for_apartment(&self, apartment_id: &Ulid) -> Option<Ulid> {
        self.store.runner_for(apartment_id)
    }

    /// Visits at an apartment with `from <= date <= to`. An unknown
    /// apartment yields an empty list, not an error.
    pub async fn list_visits(
        &self,
        apartment_id: &Ulid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Visit>, SchedulerError> {
        if to < from {
            return Err(SchedulerError::InvalidInput("query window is inverted"));
        }
        if (to - from).num_days() > MAX_LIST_WINDOW_DAYS {
            return Err(SchedulerError::LimitExceeded("query window too wide"));
        }
        let Some(state) = self.store.apartment_state(apartment_id) else {
            return Ok(Vec::new());
        };
        let guard = state.read().await;
        Ok(guard.visits_between(from, to).to_vec())
    }

    pub async fn visits_on(&self, apartment_id: &Ulid, date: NaiveDate) -> Vec<Visit> {
        match self.store.apartment_state(apartment_id) {
            Some(state) => state.read().await.visits_on(date).to_vec(),
            None => Vec::new(),
        }
    }

    /// Count of visits at the apartment within the Monday-to-Sunday week
    /// containing `date`.
    pub async fn weekly_visit_count(&self, apartment_id: &Ulid, date: NaiveDate) -> usize {
        let (start, end) = week_bounds(date);
        match self.store.apartment_state(apartment_id) {
            Some(state) => state.read().await.visits_between(start, end).len(),
            None => 0,
        }
    }

    pub async fn runner_visits_on(&self, runner_id: &Ulid, date: NaiveDate) -> Vec<RunnerVisit> {
        match self.store.runner_state(runner_id) {
            Some(state) => state.read().await.visits_on(date).cloned().collect(),
            None => Vec::new(),
        }
    }
}
