//! Slotted time wheel.
//!
//! Schedules callbacks at absolute wall-clock times, each registered under a
//! string key so it can be cancelled or replaced later. The wheel's worker
//! runs on its own tokio task and fires whatever became due on each tick, so
//! a callback may run up to one tick interval late. Callbacks execute on the
//! worker concurrently with command execution and must take the same key
//! locks a command would.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::warn;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_SLOTS: usize = 600;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

struct Task {
    /// Full wheel rotations left before the task is due.
    rotations: usize,
    key: String,
    job: Job,
}

struct Location {
    slot: usize,
    id: u64,
}

struct Inner {
    slots: Vec<HashMap<u64, Task>>,
    keys: HashMap<String, Location>,
    current: usize,
    next_id: u64,
}

pub struct TimeWheel {
    interval: Duration,
    inner: Mutex<Inner>,
}

impl TimeWheel {
    /// Create the wheel and spawn its ticking worker on the current runtime.
    /// The worker holds only a weak handle and parks for good once every
    /// strong handle is gone.
    pub fn spawn(interval: Duration, slot_count: usize) -> Arc<Self> {
        assert!(slot_count > 0, "time wheel needs at least one slot");
        let wheel = Arc::new(Self {
            interval,
            inner: Mutex::new(Inner {
                slots: (0..slot_count).map(|_| HashMap::new()).collect(),
                keys: HashMap::new(),
                current: 0,
                next_id: 0,
            }),
        });

        let weak = Arc::downgrade(&wheel);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(wheel) => wheel.advance(),
                    None => break,
                }
            }
        });

        wheel
    }

    pub fn spawn_default() -> Arc<Self> {
        Self::spawn(DEFAULT_INTERVAL, DEFAULT_SLOTS)
    }

    /// Schedule `job` to run at `at`. Scheduling a key that already has a
    /// pending task replaces the earlier registration.
    pub fn at(&self, at: SystemTime, key: impl Into<String>, job: Job) {
        let key = key.into();
        let delay = at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO);
        // Never target the slot currently being scanned: a task always waits
        // at least one tick.
        let interval_ms = self.interval.as_millis().max(1);
        let ticks = (delay.as_millis().div_ceil(interval_ms) as usize).max(1);

        let mut inner = self.inner.lock();
        let slot_count = inner.slots.len();
        let slot = (inner.current + ticks % slot_count) % slot_count;
        let rotations = ticks / slot_count;
        let id = inner.next_id;
        inner.next_id += 1;

        if let Some(old) = inner.keys.insert(key.clone(), Location { slot, id }) {
            inner.slots[old.slot].remove(&old.id);
        }
        inner.slots[slot].insert(
            id,
            Task {
                rotations,
                key,
                job,
            },
        );
    }

    /// Drop the pending task registered under `key`, if any. Cancelling a
    /// task that is already running has no effect on that run.
    pub fn cancel(&self, key: &str) {
        let mut inner = self.inner.lock();
        if let Some(location) = inner.keys.remove(key) {
            inner.slots[location.slot].remove(&location.id);
        }
    }

    /// One tick: scan the current slot, run what is due, age the rest.
    fn advance(&self) {
        let due = {
            let mut inner = self.inner.lock();
            let index = inner.current;
            inner.current = (index + 1) % inner.slots.len();

            let slot = &mut inner.slots[index];
            let due_ids: Vec<u64> = slot
                .iter_mut()
                .filter_map(|(id, task)| {
                    if task.rotations == 0 {
                        Some(*id)
                    } else {
                        task.rotations -= 1;
                        None
                    }
                })
                .collect();

            let due: Vec<Task> = due_ids
                .iter()
                .filter_map(|id| inner.slots[index].remove(id))
                .collect();
            for task in &due {
                inner.keys.remove(&task.key);
            }
            due
        };

        // Jobs run outside the wheel mutex; they may schedule or cancel.
        for task in due {
            let key = task.key;
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(task.job)).is_err() {
                warn!(key = %key, "time wheel callback panicked");
            }
        }
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.inner.lock().keys.len()
    }
}
