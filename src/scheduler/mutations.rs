use chrono::NaiveDate;
use tokio::sync::oneshot;
use ulid::Ulid;

use crate::limits::*;
use crate::model::{Apartment, Event, Runner, Tenant, Visit, VisitStatus, WeekSchedule};

use super::constraints::{check_weekday, check_weekly_quota, check_zone};
use super::slots::find_slot;
use super::{JournalCommand, Scheduler, SchedulerError};

fn validate_schedule(schedule: WeekSchedule) -> Result<WeekSchedule, SchedulerError> {
    let normalized = schedule
        .normalized()
        .map_err(SchedulerError::InvalidInput)?;
    for day in [
        &normalized.monday,
        &normalized.tuesday,
        &normalized.wednesday,
        &normalized.thursday,
        &normalized.friday,
        &normalized.saturday,
        &normalized.sunday,
    ] {
        if day.len() > MAX_RANGES_PER_DAY {
            return Err(SchedulerError::LimitExceeded("too many ranges in one day"));
        }
    }
    Ok(normalized)
}

fn validate_name(name: &Option<String>) -> Result<(), SchedulerError> {
    if let Some(n) = name
        && n.len() > MAX_NAME_LEN
    {
        return Err(SchedulerError::LimitExceeded("name too long"));
    }
    Ok(())
}

impl Scheduler {
    // ── Administrative mutations ─────────────────────────────

    pub async fn create_apartment(
        &self,
        id: Ulid,
        zone: String,
        availability: WeekSchedule,
    ) -> Result<Apartment, SchedulerError> {
        if self.store.apartment_count() >= MAX_APARTMENTS {
            return Err(SchedulerError::LimitExceeded("too many apartments"));
        }
        if zone.is_empty() {
            return Err(SchedulerError::InvalidInput("zone must not be empty"));
        }
        if zone.len() > MAX_ZONE_LEN {
            return Err(SchedulerError::LimitExceeded("zone too long"));
        }
        let availability = validate_schedule(availability)?;
        if self.store.contains_apartment(&id) {
            return Err(SchedulerError::AlreadyExists(id));
        }

        let event = Event::ApartmentCreated {
            id,
            zone: zone.clone(),
            availability: availability.clone(),
        };
        self.journal_append(&event).await?;
        let apartment = Apartment {
            id,
            zone,
            availability,
        };
        self.store.insert_apartment(apartment.clone());
        self.notify.send(id, &event);
        Ok(apartment)
    }

    pub async fn create_runner(
        &self,
        id: Ulid,
        name: Option<String>,
        availability: WeekSchedule,
    ) -> Result<Runner, SchedulerError> {
        if self.store.runner_count() >= MAX_RUNNERS {
            return Err(SchedulerError::LimitExceeded("too many runners"));
        }
        validate_name(&name)?;
        let availability = validate_schedule(availability)?;
        if self.store.contains_runner(&id) {
            return Err(SchedulerError::AlreadyExists(id));
        }

        let event = Event::RunnerCreated {
            id,
            name: name.clone(),
            availability: availability.clone(),
        };
        self.journal_append(&event).await?;
        let runner = Runner {
            id,
            name,
            availability,
        };
        self.store.insert_runner(runner.clone());
        Ok(runner)
    }

    pub async fn create_tenant(
        &self,
        id: Ulid,
        name: Option<String>,
    ) -> Result<Tenant, SchedulerError> {
        if self.store.tenant_count() >= MAX_TENANTS {
            return Err(SchedulerError::LimitExceeded("too many tenants"));
        }
        validate_name(&name)?;
        if self.store.contains_tenant(&id) {
            return Err(SchedulerError::AlreadyExists(id));
        }

        let event = Event::TenantCreated {
            id,
            name: name.clone(),
        };
        self.journal_append(&event).await?;
        let tenant = Tenant { id, name };
        self.store.insert_tenant(tenant.clone());
        Ok(tenant)
    }

    /// Associate a runner with an apartment. The first assignment is the
    /// one bookings resolve to; later ones are kept for bookkeeping.
    pub async fn assign_runner(
        &self,
        apartment_id: Ulid,
        runner_id: Ulid,
    ) -> Result<(), SchedulerError> {
        if !self.store.contains_apartment(&apartment_id) {
            return Err(SchedulerError::NotFound(apartment_id));
        }
        if !self.store.contains_runner(&runner_id) {
            return Err(SchedulerError::NotFound(runner_id));
        }
        let assigned = self.store.assigned_runners(&apartment_id);
        if assigned.contains(&runner_id) {
            return Err(SchedulerError::AlreadyExists(runner_id));
        }
        if assigned.len() >= MAX_RUNNERS_PER_APARTMENT {
            return Err(SchedulerError::LimitExceeded(
                "too many runners assigned to apartment",
            ));
        }

        let event = Event::RunnerAssigned {
            apartment_id,
            runner_id,
        };
        self.journal_append(&event).await?;
        self.store.add_assignment(apartment_id, runner_id);
        self.notify.send(apartment_id, &event);
        Ok(())
    }

    // ── Booking orchestrator ─────────────────────────────────

    /// Book the earliest valid 15-minute slot on `preferred_date`.
    ///
    /// Loading → Validated → SlotFound → Committed. Both the apartment's
    /// and the runner's write locks are held from validation through
    /// commit, so the view the checks observe is the view the commit
    /// writes. Apartment lock before runner lock, always — the fixed
    /// order keeps concurrent bookings deadlock-free. The journal append
    /// is the only side effect; every earlier step is read-only.
    pub async fn schedule_visit(
        &self,
        apartment_id: Ulid,
        tenant_id: Ulid,
        preferred_date: NaiveDate,
    ) -> Result<Visit, SchedulerError> {
        // Loading
        if !self.store.contains_tenant(&tenant_id) {
            return Err(SchedulerError::NotFound(tenant_id));
        }
        let apartment = self
            .store
            .apartment_state(&apartment_id)
            .ok_or(SchedulerError::NotFound(apartment_id))?;
        let runner_id = self
            .store
            .runner_for(&apartment_id)
            .ok_or(SchedulerError::NoRunnerAssigned(apartment_id))?;
        let runner = self.store.runner_state(&runner_id).ok_or_else(|| {
            SchedulerError::Internal(format!("assignment references unknown runner {runner_id}"))
        })?;

        let mut apt_guard = apartment.write().await;
        let mut runner_guard = runner.write().await;

        // Validated
        check_weekday(preferred_date)?;
        check_weekly_quota(apartment_id, &apt_guard.visits, preferred_date)?;
        check_zone(
            &apt_guard.apartment.zone,
            &runner_guard.visits,
            preferred_date,
        )?;

        // SlotFound
        let booked: Vec<_> = apt_guard
            .visits_on(preferred_date)
            .iter()
            .map(|v| v.slot)
            .collect();
        let slot = find_slot(
            &apt_guard.apartment.availability,
            &runner_guard.runner.availability,
            &booked,
            preferred_date,
        )
        .ok_or(SchedulerError::NoSlotAvailable(preferred_date))?;

        // Committed
        let visit = Visit {
            id: Ulid::new(),
            apartment_id,
            runner_id,
            tenant_id,
            date: preferred_date,
            slot,
            status: VisitStatus::Scheduled,
        };
        let event = Event::VisitScheduled {
            id: visit.id,
            apartment_id,
            runner_id,
            tenant_id,
            date: preferred_date,
            slot,
        };
        self.journal_append(&event).await?;
        let zone = apt_guard.apartment.zone.clone();
        apt_guard.insert_visit(visit.clone());
        runner_guard.record_visit(&visit, zone);
        self.notify.send(apartment_id, &event);
        metrics::counter!(crate::observability::VISITS_SCHEDULED_TOTAL).increment(1);
        Ok(visit)
    }

    // ── Journal maintenance ──────────────────────────────────

    /// Rewrite the journal with the minimal event sequence that
    /// recreates the current state.
    pub async fn compact_journal(&self) -> Result<(), SchedulerError> {
        let mut events = Vec::new();
        let mut visit_events = Vec::new();

        for state in self.store.apartment_states() {
            let guard = state.read().await;
            events.push(Event::ApartmentCreated {
                id: guard.apartment.id,
                zone: guard.apartment.zone.clone(),
                availability: guard.apartment.availability.clone(),
            });
            for v in &guard.visits {
                visit_events.push(Event::VisitScheduled {
                    id: v.id,
                    apartment_id: v.apartment_id,
                    runner_id: v.runner_id,
                    tenant_id: v.tenant_id,
                    date: v.date,
                    slot: v.slot,
                });
            }
        }
        for state in self.store.runner_states() {
            let guard = state.read().await;
            events.push(Event::RunnerCreated {
                id: guard.runner.id,
                name: guard.runner.name.clone(),
                availability: guard.runner.availability.clone(),
            });
        }
        for tenant in self.store.tenants() {
            events.push(Event::TenantCreated {
                id: tenant.id,
                name: tenant.name,
            });
        }
        for (apartment_id, runner_ids) in self.store.assignments() {
            for runner_id in runner_ids {
                events.push(Event::RunnerAssigned {
                    apartment_id,
                    runner_id,
                });
            }
        }
        // Visits last: replay applies them against the recreated entities
        events.extend(visit_events);

        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| SchedulerError::Unavailable("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| SchedulerError::Unavailable("journal writer dropped response".into()))?
            .map_err(|e| SchedulerError::Unavailable(e.to_string()))
    }

    pub async fn journal_records_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::RecordsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
