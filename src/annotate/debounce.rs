//! Single-slot, per-key timers for coalescing rapid UI events.
//!
//! Scheduling replaces whatever was pending for the key; only the last
//! request in a burst runs. Work that has already started is never
//! interrupted: each request takes a fresh generation number, and the timer
//! task only runs if its generation still owns the slot when it wakes.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
pub struct Debouncer {
    /// key → generation of the pending request
    generations: Arc<Mutex<HashMap<String, u64>>>,
    next_generation: AtomicU64,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` after `delay` unless another call for `key` arrives first.
    pub fn schedule<Fut>(&self, key: &str, delay: Duration, work: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.generations.lock().insert(key.to_string(), generation);

        let generations = Arc::clone(&self.generations);
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut generations = generations.lock();
                if generations.get(&key) != Some(&generation) {
                    return;
                }
                generations.remove(&key);
            }
            work.await;
        });
    }

    /// Clear the pending slot for `key`, if any.
    pub fn cancel(&self, key: &str) -> bool {
        self.generations.lock().remove(key).is_some()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.generations.lock().contains_key(key)
    }
}
