use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::{
    models::{ButtonState, Shift, ShiftId},
    timing::ShiftTimings,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    ActiveShiftChanged {
        shift: Option<Shift>,
    },
    RecalculationStarted {
        shift_id: ShiftId,
    },
    TimingsCalculated {
        shift_id: ShiftId,
        timings: ShiftTimings,
    },
    RecalculationError {
        shift_id: ShiftId,
        message: String,
    },
    ButtonStateChanged {
        from: ButtonState,
        to: ButtonState,
        forced: bool,
    },
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::ActiveShiftChanged { .. } => "activeShiftChanged",
            EngineEvent::RecalculationStarted { .. } => "recalculationStarted",
            EngineEvent::TimingsCalculated { .. } => "timingsCalculated",
            EngineEvent::RecalculationError { .. } => "recalculationError",
            EngineEvent::ButtonStateChanged { .. } => "buttonStateChanged",
        }
    }
}

type Callback = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    callbacks: Vec<(u64, Callback)>,
}

/// Synchronous fan-out of [`EngineEvent`]s. Every subscription gets its own
/// handle, so registering the same closure twice is two subscriptions.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Subscribers>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: impl Fn(&EngineEvent) + Send + Sync + 'static) -> Subscription {
        let mut subscribers = lock(&self.subscribers);
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        subscribers.callbacks.push((id, Arc::new(callback)));

        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// Calls every subscriber in registration order. Subscribers may
    /// subscribe or unsubscribe from inside the callback.
    pub fn publish(&self, event: EngineEvent) {
        let callbacks: Vec<Callback> = lock(&self.subscribers)
            .callbacks
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        log::debug!("Publishing {} to {} subscribers", event.name(), callbacks.len());
        for callback in callbacks {
            callback(&event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).callbacks.len()
    }
}

#[must_use = "dropping a Subscription keeps the callback registered; call unsubscribe to remove it"]
pub struct Subscription {
    id: u64,
    subscribers: Weak<Mutex<Subscribers>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            lock(&subscribers)
                .callbacks
                .retain(|(id, _)| *id != self.id);
        }
    }
}

fn lock(subscribers: &Mutex<Subscribers>) -> MutexGuard<'_, Subscribers> {
    subscribers.lock().unwrap_or_else(PoisonError::into_inner)
}
