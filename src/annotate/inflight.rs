//! Join-or-start registry for keyed background work.
//!
//! At most one task per key is outstanding. A second caller for the same key
//! gets a clone of the existing shared future instead of starting a duplicate.
//! Every task is also driven by a detached tokio task, so it runs to
//! completion even if all callers stop waiting. The entry is removed when the
//! task finishes or fails; removal is tied to a guard inside the future, not
//! to the caller.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

pub type SharedTask<T> = Shared<BoxFuture<'static, T>>;

type TaskTable<T> = Mutex<HashMap<String, (u64, SharedTask<T>)>>;

pub struct InFlight<T: Clone> {
    tasks: Arc<TaskTable<T>>,
    next_id: AtomicU64,
}

/// Removes its table entry on drop, unless a newer task took the key.
struct CleanupGuard<T: Clone> {
    tasks: Weak<TaskTable<T>>,
    key: String,
    id: u64,
}

impl<T: Clone> Drop for CleanupGuard<T> {
    fn drop(&mut self) {
        if let Some(tasks) = self.tasks.upgrade() {
            let mut tasks = tasks.lock();
            if tasks.get(&self.key).is_some_and(|(id, _)| *id == self.id) {
                tasks.remove(&self.key);
            }
        }
    }
}

impl<T> InFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Attach to the task running under `key`, or start one with `start`.
    ///
    /// Returns the shared task and whether this call started it.
    pub fn join_or_start<F, Fut>(&self, key: &str, start: F) -> (SharedTask<T>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        if let Some((_, existing)) = tasks.get(key) {
            tracing::debug!("Joining in-flight task for {}", key);
            return (existing.clone(), false);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let guard = CleanupGuard {
            tasks: Arc::downgrade(&self.tasks),
            key: key.to_string(),
            id,
        };
        let work = start();
        let task = async move {
            let _guard = guard;
            work.await
        }
        .boxed()
        .shared();

        tasks.insert(key.to_string(), (id, task.clone()));
        tokio::spawn(task.clone());
        (task, true)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.tasks.lock().contains_key(key)
    }

    /// Forget the task under `key`. Current awaiters still get its result;
    /// the next caller starts fresh.
    pub fn forget(&self, key: &str) -> bool {
        self.tasks.lock().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for InFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
