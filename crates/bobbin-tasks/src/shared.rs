//! Call deduplication for async operations.
//!
//! [`SharedConcurrent`] coalesces concurrent calls whose keys compare equal:
//! the first caller starts the operation, later callers attach to it, and
//! every caller receives a clone of the same output.
//!
//! ```text
//! call(k) ─┐
//!          │                            spawned
//! call(k) ─┼──► SharedConcurrent ─────► operation
//!          │         │                     │
//! call(k) ─┘         ▼                     ▼
//!             [all callers receive ◄── one output]
//! ```
//!
//! The operation runs as its own spawned task, so a caller that gives up
//! (its future is dropped) does not cancel the work for the others. The
//! registry entry is removed by the operation itself as it finishes, before
//! any caller observes the output: a call issued after completion always
//! starts a fresh execution. Nothing is retained once the operation ends;
//! this is coalescing, not caching.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt as _;
use tracing::debug;

use crate::error::TaskError;

type SharedOutput<T> = Shared<BoxFuture<'static, Result<T, TaskError>>>;

struct InFlight<T> {
    generation: u64,
    output: SharedOutput<T>,
}

struct Registry<K, T> {
    running: HashMap<K, InFlight<T>>,
    next_generation: u64,
}

type SharedRegistry<K, T> = Arc<Mutex<Registry<K, T>>>;

fn lock<K, T>(registry: &SharedRegistry<K, T>) -> MutexGuard<'_, Registry<K, T>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a finished operation's registry entry, on success, failure, or
/// panic alike. The generation check keeps a newer entry for the same key
/// intact.
struct Deregister<K: Eq + Hash, T> {
    registry: SharedRegistry<K, T>,
    key: Option<K>,
    generation: u64,
}

impl<K: Eq + Hash, T> Drop for Deregister<K, T> {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        let mut registry = lock(&self.registry);
        if registry
            .running
            .get(&key)
            .is_some_and(|entry| entry.generation == self.generation)
        {
            registry.running.remove(&key);
        }
    }
}

/// Coalesces concurrent identical calls into one execution.
///
/// Keys are the canonical form of an operation's arguments; a tuple or
/// struct of the arguments is the usual choice.
pub struct SharedConcurrent<K, T> {
    registry: SharedRegistry<K, T>,
}

impl<K, T> SharedConcurrent<K, T>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                running: HashMap::new(),
                next_generation: 0,
            })),
        }
    }

    /// Run `make()` for `key`, or attach to the execution already running
    /// for an equal key. `make` is only called when a new execution starts.
    ///
    /// Returns [`TaskError`] only if the shared execution itself panicked or
    /// was aborted.
    pub async fn call<F, Fut>(&self, key: K, make: F) -> Result<T, TaskError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let output = {
            let mut registry = lock(&self.registry);
            if let Some(existing) = registry.running.get(&key) {
                debug!(?key, "attaching to in-flight call");
                existing.output.clone()
            } else {
                let generation = registry.next_generation;
                registry.next_generation += 1;

                let deregister = Deregister {
                    registry: Arc::clone(&self.registry),
                    key: Some(key.clone()),
                    generation,
                };
                let operation = make();
                // Deregistration waits on the registry lock held here, so
                // the entry is always inserted before it can be removed.
                let handle = tokio::spawn(async move {
                    let output = operation.await;
                    drop(deregister);
                    output
                });
                let output = handle
                    .map(|joined| joined.map_err(TaskError::from))
                    .boxed()
                    .shared();

                debug!(?key, "starting new call");
                registry.running.insert(
                    key,
                    InFlight {
                        generation,
                        output: output.clone(),
                    },
                );
                output
            }
        };
        output.await
    }

    /// Like [`call`](Self::call), for fallible operations whose error type can
    /// absorb a [`TaskError`].
    pub async fn try_call<F, Fut, V, E>(&self, key: K, make: F) -> Result<V, E>
    where
        T: Into<Result<V, E>>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        E: From<TaskError>,
    {
        self.call(key, make).await?.into()
    }

    /// Number of distinct keys with an execution in flight.
    pub fn in_flight(&self) -> usize {
        lock(&self.registry).running.len()
    }

    /// Returns `true` if an execution for `key` is in flight.
    pub fn is_running(&self, key: &K) -> bool {
        lock(&self.registry).running.contains_key(key)
    }
}

impl<K, T> Default for SharedConcurrent<K, T>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> Clone for SharedConcurrent<K, T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<K, T> Debug for SharedConcurrent<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedConcurrent")
            .field("in_flight", &lock(&self.registry).running.len())
            .finish()
    }
}
