//! Per-key deduplication of in-flight work
//!
//! The first caller for a key spawns the work; later callers for the same
//! key subscribe to its completion signal instead of starting their own.
//! The work runs on its own task, so callers that give up waiting do not
//! cancel it for anyone else.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

/// The in-flight task ended without producing a result (it panicked)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("in-flight request for {0} ended without a result")]
pub struct TaskAborted(pub String);

type Outcome<T, E> = Option<Result<T, E>>;
type Table<K, T, E> = Arc<Mutex<HashMap<K, FetchTask<T, E>>>>;

/// One running task and everyone waiting on it
struct FetchTask<T, E> {
    result: watch::Receiver<Outcome<T, E>>,
    /// Callers still waiting for the result
    waiters: usize,
    /// Distinguishes this run from a later run for the same key
    run_id: u64,
}

/// Removes the task's table entry when the task finishes or unwinds
struct InFlightGuard<K: Eq + Hash, T, E> {
    table: Table<K, T, E>,
    key: Option<K>,
}

impl<K: Eq + Hash, T, E> InFlightGuard<K, T, E> {
    /// Remove the entry and report how many callers were waiting
    fn finish(mut self) -> usize {
        match self.key.take() {
            Some(key) => lock(&self.table).remove(&key).map_or(0, |t| t.waiters),
            None => 0,
        }
    }
}

impl<K: Eq + Hash, T, E> Drop for InFlightGuard<K, T, E> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            lock(&self.table).remove(&key);
        }
    }
}

/// Detaches one caller from its run when the caller stops waiting
struct WaiterGuard<'a, K: Eq + Hash, T, E> {
    table: &'a Table<K, T, E>,
    key: &'a K,
    run_id: u64,
}

impl<K: Eq + Hash, T, E> Drop for WaiterGuard<'_, K, T, E> {
    fn drop(&mut self) {
        if let Some(task) = lock(self.table).get_mut(self.key) {
            if task.run_id == self.run_id {
                task.waiters = task.waiters.saturating_sub(1);
            }
        }
    }
}

fn lock<K, T, E>(table: &Table<K, T, E>) -> MutexGuard<'_, HashMap<K, FetchTask<T, E>>> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs at most one task per key at a time and fans its result out
pub struct RequestCoalescer<K, T, E> {
    in_flight: Table<K, T, E>,
    next_run: AtomicU64,
}

impl<K, T, E> RequestCoalescer<K, T, E>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<TaskAborted> + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_run: AtomicU64::new(0),
        }
    }

    /// Run `work` for `key` unless a run is already in flight, in which
    /// case wait for that run's result instead.
    ///
    /// `work` is only invoked by the caller that starts a new task.
    pub async fn run_exclusive<F, Fut>(&self, key: K, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (mut rx, sender, run_id) = {
            let mut table = lock(&self.in_flight);
            match table.get_mut(&key) {
                Some(task) => {
                    task.waiters += 1;
                    debug!(key = %key, waiters = task.waiters, "Joined in-flight request");
                    (task.result.clone(), None, task.run_id)
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    let run_id = self.next_run.fetch_add(1, Ordering::Relaxed);
                    table.insert(
                        key.clone(),
                        FetchTask {
                            result: rx.clone(),
                            waiters: 1,
                            run_id,
                        },
                    );
                    (rx, Some(tx), run_id)
                }
            }
        };
        let _waiting = WaiterGuard {
            table: &self.in_flight,
            key: &key,
            run_id,
        };

        if let Some(tx) = sender {
            let guard = InFlightGuard {
                table: Arc::clone(&self.in_flight),
                key: Some(key.clone()),
            };
            let fut = work();
            let task_key = key.clone();
            tokio::spawn(async move {
                let outcome = fut.await;
                let waiters = guard.finish();
                debug!(key = %task_key, waiters, ok = outcome.is_ok(), "In-flight request finished");
                // Every waiter may have gone away; the result is then simply dropped
                let _ = tx.send(Some(outcome));
            });
        }

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| Err(E::from(TaskAborted(key.to_string()))))
    }

    /// Number of keys with a task in flight
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Callers still waiting on the task for `key`, if one is running
    pub fn waiters(&self, key: &K) -> Option<usize> {
        lock(&self.in_flight).get(key).map(|t| t.waiters)
    }
}

impl<K, T, E> Default for RequestCoalescer<K, T, E>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<TaskAborted> + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
