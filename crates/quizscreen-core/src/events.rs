//! Events and their delivery to observers.
//!
//! Every committed state change produces an [`Event`]. Observers register
//! through [`EventBus::subscribe`] and receive events in the order the
//! underlying transitions occurred; idempotent no-op commands publish
//! nothing.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::budget::TimerStatus;

/// Source of a screen-time grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantSource {
    Quiz,
    Goal,
}

/// Every state change in the system produces an Event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TimerStarted {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerStopped {
        at: DateTime<Utc>,
    },
    ForegroundChanged {
        foreground: bool,
        at: DateTime<Utc>,
    },
    /// Budget exhausted mid-tick; the overflow seconds opened the debt.
    DebtEntered {
        debt_secs: u64,
        at: DateTime<Utc>,
    },
    /// A grant repaid the debt in full; the surplus became new budget.
    DebtCleared {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    GrantApplied {
        source: GrantSource,
        granted_secs: u64,
        at: DateTime<Utc>,
    },
    /// A calendar day was sealed and its carryover score settled.
    DayRolledOver {
        day: NaiveDate,
        carryover_score: i64,
        applied: bool,
        at: DateTime<Utc>,
    },
    /// Full status after a committed transition.
    StateChanged {
        status: TimerStatus,
        at: DateTime<Utc>,
    },
}

struct Listener {
    id: Uuid,
    tx: mpsc::UnboundedSender<Event>,
}

/// Fan-out of events to registered observers.
///
/// Each subscriber gets its own FIFO channel, so delivery order per
/// subscriber matches publish order. Dropping a [`Subscription`] (or calling
/// [`Subscription::unsubscribe`]) removes the listener exactly once.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Mutex<Vec<Listener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer and hand back its subscription handle.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Listener { id, tx });
        Subscription {
            id,
            rx,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Deliver an event to every live subscriber, pruning closed channels.
    pub fn publish(&self, event: &Event) {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.retain(|l| l.tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

/// Handle returned by [`EventBus::subscribe`].
pub struct Subscription {
    id: Uuid,
    rx: mpsc::UnboundedReceiver<Event>,
    listeners: std::sync::Weak<Mutex<Vec<Listener>>>,
}

impl Subscription {
    /// Receive the next event, in publish order. `None` once unsubscribed
    /// and the backlog is drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Non-blocking receive for polling consumers.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Deregister from the bus. Dropping the handle has the same effect;
    /// either way the listener entry is removed once.
    pub fn unsubscribe(self) {}

    fn remove(&self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|l| l.id != self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{PhaseKind, TimerStatus};

    fn status() -> TimerStatus {
        TimerStatus {
            state: PhaseKind::Running,
            remaining_secs: 60,
            debt_secs: 0,
            is_in_debt_mode: false,
            is_paused: false,
            today_secs: 0,
            week_secs: 0,
        }
    }

    #[tokio::test]
    async fn delivery_preserves_publish_order() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        bus.publish(&Event::TimerStarted {
            remaining_secs: 60,
            at: Utc::now(),
        });
        bus.publish(&Event::StateChanged {
            status: status(),
            at: Utc::now(),
        });

        assert!(matches!(sub.recv().await, Some(Event::TimerStarted { .. })));
        assert!(matches!(sub.recv().await, Some(Event::StateChanged { .. })));
    }

    #[tokio::test]
    async fn unsubscribe_removes_listener_once() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        let _other = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        sub.unsubscribe();
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn dropped_subscription_is_pruned() {
        let bus = EventBus::new();
        {
            let _sub = bus.subscribe();
        }
        assert_eq!(bus.subscriber_count(), 0);
    }
}
