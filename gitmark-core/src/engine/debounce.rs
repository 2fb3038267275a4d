//! Per-key single-shot timers.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Schedules one delayed callback per key; arming a key again cancels the
/// callback still waiting for that key and leaves other keys alone.
///
/// Once the delay has elapsed the callback runs on a task of its own, so a
/// later cancellation never interrupts work that has already started.
#[derive(Debug)]
pub struct Debouncer<K> {
    delay: Duration,
    timers: Mutex<HashMap<K, JoinHandle<()>>>,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            timers: Mutex::new(HashMap::new()),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arms (or re-arms) the timer for `key`. Must be called from within a
    /// Tokio runtime.
    pub fn arm<F, Fut>(&self, key: K, fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(fire());
        });

        let mut timers = match self.timers.lock() {
            Ok(timers) => timers,
            Err(poisoned) => poisoned.into_inner(),
        };
        timers.retain(|_, h| !h.is_finished());
        if let Some(previous) = timers.insert(key, handle) {
            previous.abort();
        }
    }

    /// Cancels the pending timer for `key`. Returns whether one was waiting.
    pub fn cancel(&self, key: &K) -> bool {
        let mut timers = match self.timers.lock() {
            Ok(timers) => timers,
            Err(poisoned) => poisoned.into_inner(),
        };
        match timers.remove(key) {
            Some(handle) => {
                let waiting = !handle.is_finished();
                handle.abort();
                waiting
            }
            None => false,
        }
    }

    #[cfg(test)]
    fn is_armed(&self, key: &K) -> bool {
        match self.timers.lock() {
            Ok(timers) => timers.get(key).is_some_and(|h| !h.is_finished()),
            Err(_) => false,
        }
    }
}
