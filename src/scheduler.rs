use std::future::Future;
use std::sync::{Arc, Mutex};

use crossbeam::atomic::AtomicCell;
use dashmap::DashMap;
use serenity::model::id::MessageId;
use time::Duration;
use tokio::task::JoinHandle;
use tracing::error;

use crate::error::Result;

// Giveaways further from their deadline than the horizon are left to a
// later check pass instead of holding a timer open.
pub const DEFAULT_ARM_HORIZON: Duration = Duration::seconds(15);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimerState {
    // No timer is scheduled.
    Unarmed,
    // A timer is counting down to the deadline.
    Armed,
    // The timer has fired and the end callback is running.
    Fired,
}

// A single cancellable end timer. Arming is idempotent: while a timer
// is armed or firing, further arm requests are ignored, so a giveaway
// never holds more than one timer.
#[derive(Clone)]
pub struct EndScheduler {
    inner: Arc<TimerInner>,
}

struct TimerInner {
    state: AtomicCell<TimerState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EndScheduler {
    pub fn new() -> Self {
        EndScheduler {
            inner: Arc::new(TimerInner {
                state: AtomicCell::new(TimerState::Unarmed),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> TimerState {
        self.inner.state.load()
    }

    pub fn is_armed(&self) -> bool {
        self.state() != TimerState::Unarmed
    }

    // Arms the timer for the remaining duration unless it exceeds the
    // horizon or a timer is already pending. An overdue deadline fires
    // the callback right away. Callback failures are reported and
    // swallowed: the check loop picks the giveaway up again.
    pub fn ensure_armed<F, Fut>(&self, remaining: Duration, horizon: Duration, on_fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if remaining > horizon {
            return;
        }
        let claimed = self
            .inner
            .state
            .compare_exchange(TimerState::Unarmed, TimerState::Armed)
            .is_ok();
        if !claimed {
            return;
        }

        let delay = remaining.max(Duration::ZERO).unsigned_abs();
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // A concurrent disarm between the wakeup and this exchange
            // wins the race and the callback never starts.
            let fired = inner
                .state
                .compare_exchange(TimerState::Armed, TimerState::Fired)
                .is_ok();
            if fired {
                if let Err(err) = on_fire().await {
                    error!("The end timer callback failed: {}", err);
                }
                inner.state.store(TimerState::Unarmed);
            }
        });
        *self.inner.task.lock().unwrap() = Some(handle);
    }

    // Cancels the timer while it is still counting down. A timer that
    // has already fired is left alone, so a disarm issued from inside
    // the end callback can't cut its own transition short.
    pub fn disarm(&self) {
        let cancelled = self
            .inner
            .state
            .compare_exchange(TimerState::Armed, TimerState::Unarmed)
            .is_ok();
        if cancelled {
            if let Some(handle) = self.inner.task.lock().unwrap().take() {
                handle.abort();
            }
        }
    }
}

impl Default for EndScheduler {
    fn default() -> Self {
        EndScheduler::new()
    }
}

// End timers for every tracked giveaway, owned by the manager and keyed
// by the giveaway message. Timer tasks never outlive their registry
// entry: deleting a giveaway disarms and drops its scheduler.
pub struct TimerRegistry {
    timers: DashMap<MessageId, EndScheduler>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        TimerRegistry {
            timers: DashMap::new(),
        }
    }

    // Returns the scheduler for the giveaway, creating it on first use.
    pub fn scheduler_for(&self, message_id: MessageId) -> EndScheduler {
        self.timers
            .entry(message_id)
            .or_insert_with(EndScheduler::new)
            .clone()
    }

    // Cancels and forgets the timer of a single giveaway.
    pub fn disarm_remove(&self, message_id: MessageId) {
        if let Some((_, scheduler)) = self.timers.remove(&message_id) {
            scheduler.disarm();
        }
    }

    // Cancels every pending timer. Used on shutdown.
    pub fn disarm_all(&self) {
        for entry in self.timers.iter() {
            entry.value().disarm();
        }
        self.timers.clear();
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl Default for TimerRegistry {
    fn default() -> Self {
        TimerRegistry::new()
    }
}
