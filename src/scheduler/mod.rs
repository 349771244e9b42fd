mod availability;
mod constraints;
mod error;
mod mutations;
mod queries;
mod slots;
mod store;

pub use availability::is_available;
pub use error::SchedulerError;
pub use slots::{day_slots, find_slot, DAY_END_HOUR, DAY_START_HOUR, SLOT_MINUTES};
pub use store::{ApartmentState, InMemoryStore, RunnerState, RunnerVisit};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use crate::journal::Journal;
use crate::model::{Event, Visit, VisitStatus};
use crate::notify::NotifyHub;

// ── Group-commit journal channel ─────────────────────────────────

pub(super) enum JournalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    RecordsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the journal and batches appends for group
/// commit: block on the first append, drain whatever else is already
/// queued, write the batch with a single fsync, then answer every
/// sender at once.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let JournalCommand::Append { event, response } = cmd else {
            handle_control(&mut journal, cmd);
            continue;
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                JournalCommand::Append { event, response } => batch.push((event, response)),
                control => {
                    deferred = Some(control);
                    break;
                }
            }
        }

        flush_batch(&mut journal, batch);
        if let Some(control) = deferred {
            handle_control(&mut journal, control);
        }
    }
}

fn flush_batch(journal: &mut Journal, batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE)
        .record(batch.len() as f64);
    let started = Instant::now();

    let mut result: io::Result<()> = Ok(());
    for (event, _) in &batch {
        if let Err(e) = journal.buffer(event) {
            result = Err(e);
            break;
        }
    }
    // Sync even after a buffer error so partially buffered bytes don't
    // carry over into the next batch.
    let sync_result = journal.sync();
    if result.is_ok() {
        result = sync_result;
    }

    metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in batch {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn handle_control(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Journal::write_compacted(journal.path(), &events)
                .and_then(|()| journal.install_compacted());
            let _ = response.send(result);
        }
        JournalCommand::RecordsSinceCompact { response } => {
            let _ = response.send(journal.records_since_compact());
        }
        JournalCommand::Append { .. } => unreachable!(),
    }
}

// ── Scheduler ────────────────────────────────────────────────────

/// The booking engine: in-memory entity store, durable event journal,
/// and a notification hub for `watch` subscriptions.
pub struct Scheduler {
    pub store: InMemoryStore,
    journal_tx: mpsc::Sender<JournalCommand>,
    pub notify: Arc<NotifyHub>,
}

impl Scheduler {
    /// Replay the journal at `journal_path` and start the group-commit
    /// writer task. Must run inside a tokio runtime.
    pub fn open(journal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Journal::replay(&journal_path)?;
        let journal = Journal::open(&journal_path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let scheduler = Self {
            store: InMemoryStore::new(),
            journal_tx,
            notify,
        };
        for event in &events {
            scheduler.apply_replayed(event);
        }
        Ok(scheduler)
    }

    /// Apply one replayed event. We are the sole owner of every state
    /// Arc at this point, so try_write always succeeds instantly; never
    /// block here because open() may run inside an async context.
    fn apply_replayed(&self, event: &Event) {
        match event {
            Event::ApartmentCreated {
                id,
                zone,
                availability,
            } => {
                self.store.insert_apartment(crate::model::Apartment {
                    id: *id,
                    zone: zone.clone(),
                    availability: availability.clone(),
                });
            }
            Event::RunnerCreated {
                id,
                name,
                availability,
            } => {
                self.store.insert_runner(crate::model::Runner {
                    id: *id,
                    name: name.clone(),
                    availability: availability.clone(),
                });
            }
            Event::TenantCreated { id, name } => {
                self.store.insert_tenant(crate::model::Tenant {
                    id: *id,
                    name: name.clone(),
                });
            }
            Event::RunnerAssigned {
                apartment_id,
                runner_id,
            } => {
                self.store.add_assignment(*apartment_id, *runner_id);
            }
            Event::VisitScheduled {
                id,
                apartment_id,
                runner_id,
                tenant_id,
                date,
                slot,
            } => {
                let visit = Visit {
                    id: *id,
                    apartment_id: *apartment_id,
                    runner_id: *runner_id,
                    tenant_id: *tenant_id,
                    date: *date,
                    slot: *slot,
                    status: VisitStatus::Scheduled,
                };
                let Some(apartment) = self.store.apartment_state(apartment_id) else {
                    tracing::warn!("replay: visit {id} references unknown apartment");
                    return;
                };
                let mut apt_guard = apartment.try_write().expect("replay: uncontended write");
                let zone = apt_guard.apartment.zone.clone();
                apt_guard.insert_visit(visit.clone());
                drop(apt_guard);

                if let Some(runner) = self.store.runner_state(runner_id) {
                    runner
                        .try_write()
                        .expect("replay: uncontended write")
                        .record_visit(&visit, zone);
                } else {
                    tracing::warn!("replay: visit {id} references unknown runner");
                }
            }
        }
    }

    /// Write an event through the background group-commit writer and
    /// wait for the fsync acknowledgment.
    pub(super) async fn journal_append(&self, event: &Event) -> Result<(), SchedulerError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| SchedulerError::Unavailable("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| SchedulerError::Unavailable("journal writer dropped response".into()))?
            .map_err(|e| SchedulerError::Unavailable(e.to_string()))
    }
}
