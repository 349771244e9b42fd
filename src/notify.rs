use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for `watch` subscriptions, one channel per apartment.
/// Committed events for an apartment fan out to every watching connection.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events for an apartment. Creates the channel if needed.
    pub fn subscribe(&self, apartment_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(apartment_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is watching.
    pub fn send(&self, apartment_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&apartment_id) {
            let _ = sender.send(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TimeOfDay;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let apartment_id = Ulid::new();
        let mut rx = hub.subscribe(apartment_id);

        let event = Event::VisitScheduled {
            id: Ulid::new(),
            apartment_id,
            runner_id: Ulid::new(),
            tenant_id: Ulid::new(),
            date: NaiveDate::from_ymd_opt(2025, 6, 9).unwrap(),
            slot: TimeOfDay::new(9, 0).unwrap(),
        };
        hub.send(apartment_id, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_watchers_is_noop() {
        let hub = NotifyHub::new();
        hub.send(
            Ulid::new(),
            &Event::TenantCreated {
                id: Ulid::new(),
                name: None,
            },
        );
    }
}
