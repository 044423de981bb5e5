//! Admission limiter: bounded concurrency with a FIFO queue.
//!
//! At most `max_tasks` units of work hold a [`LimiterPermit`] at any time.
//! Work that arrives while the limiter is full is queued in arrival order;
//! a finishing unit hands its permit straight to the oldest queued unit, so
//! the running count only decreases when the queue is empty.
//!
//! # Cancellation while queued
//!
//! A queued unit that is cancelled (its [`LimitedTask`] aborted or dropped,
//! or its [`acquire`](TaskLimiter::acquire) future dropped) is skipped when
//! dequeued: the hand-off moves on to the next queued unit, and the
//! cancelled unit never starts and never counts as running. A permit handed
//! to a unit that is cancelled before it observes the permit is returned
//! through the same hand-off.
//!
//! # Usage
//!
//! ```ignore
//! let limiter = TaskLimiter::new(4);
//!
//! // Gate an inline operation.
//! let _permit = limiter.acquire().await?;
//!
//! // Or spawn work that starts once admitted.
//! let task = limiter.schedule(async { 42 });
//! assert_eq!(task.await?, 42);
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::TaskError;

struct LimiterState {
    running: usize,
    starters: VecDeque<oneshot::Sender<LimiterPermit>>,
}

struct LimiterInner {
    max_tasks: usize,
    state: Mutex<LimiterState>,
}

impl LimiterInner {
    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand a freed slot to the oldest live starter, or give it back.
    fn release(self: &Arc<Self>) {
        let mut state = self.lock();
        while let Some(starter) = state.starters.pop_front() {
            let permit = LimiterPermit {
                inner: Some(Arc::clone(self)),
            };
            match starter.send(permit) {
                Ok(()) => return,
                Err(mut unclaimed) => {
                    // The queued unit was cancelled; disarm so dropping the
                    // permit does not re-enter `release`.
                    unclaimed.inner = None;
                }
            }
        }
        state.running -= 1;
    }
}

/// Proof of admission. Dropping it frees the slot for the next queued unit.
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct LimiterPermit {
    inner: Option<Arc<LimiterInner>>,
}

impl Drop for LimiterPermit {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.release();
        }
    }
}

impl std::fmt::Debug for LimiterPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimiterPermit")
            .field("armed", &self.inner.is_some())
            .finish()
    }
}

/// Outcome of arriving at the limiter.
enum Admission {
    Started(LimiterPermit),
    Queued(oneshot::Receiver<LimiterPermit>),
}

impl Admission {
    async fn into_permit(self) -> Result<LimiterPermit, TaskError> {
        match self {
            Admission::Started(permit) => Ok(permit),
            Admission::Queued(start) => start.await.map_err(|_| TaskError::Cancelled),
        }
    }
}

/// Bounded-concurrency gate with FIFO queueing of excess work.
///
/// Cloning produces another handle to the same limiter.
#[derive(Clone)]
pub struct TaskLimiter {
    inner: Arc<LimiterInner>,
}

impl TaskLimiter {
    /// Create a limiter admitting at most `max_tasks` concurrent units.
    ///
    /// # Panics
    ///
    /// Panics if `max_tasks` is 0.
    pub fn new(max_tasks: usize) -> Self {
        assert!(max_tasks > 0, "max_tasks must be > 0");
        Self {
            inner: Arc::new(LimiterInner {
                max_tasks,
                state: Mutex::new(LimiterState {
                    running: 0,
                    starters: VecDeque::new(),
                }),
            }),
        }
    }

    /// Take a slot now, or join the back of the queue.
    ///
    /// Queue position is decided here, synchronously, which is what keeps
    /// admission in strict arrival order.
    fn admit(&self) -> Admission {
        let mut state = self.inner.lock();
        if state.running < self.inner.max_tasks {
            state.running += 1;
            Admission::Started(LimiterPermit {
                inner: Some(Arc::clone(&self.inner)),
            })
        } else {
            let (starter, start) = oneshot::channel();
            state.starters.push_back(starter);
            debug!(
                running = state.running,
                queued = state.starters.len(),
                "limiter full; queueing"
            );
            Admission::Queued(start)
        }
    }

    /// Wait for a slot. Hold the returned permit for the duration of the work.
    pub async fn acquire(&self) -> Result<LimiterPermit, TaskError> {
        self.admit().into_permit().await
    }

    /// Spawn `task`, starting it once admitted.
    pub fn schedule<F>(&self, task: F) -> LimitedTask<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.schedule_with(move || task)
    }

    /// Spawn the work produced by `make`, calling `make` only once admitted.
    ///
    /// Nothing of the work exists until the unit starts, so a unit cancelled
    /// while queued costs nothing beyond its queue entry.
    pub fn schedule_with<M, F>(&self, make: M) -> LimitedTask<F::Output>
    where
        M: FnOnce() -> F + Send + 'static,
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let admission = self.admit();
        LimitedTask {
            handle: tokio::spawn(async move {
                let _permit = admission.into_permit().await?;
                Ok(make().await)
            }),
        }
    }

    /// The configured cap.
    pub fn max_tasks(&self) -> usize {
        self.inner.max_tasks
    }

    /// Units currently holding a slot.
    pub fn running(&self) -> usize {
        self.inner.lock().running
    }

    /// Units waiting for a slot, including cancelled ones not yet dequeued.
    pub fn queued(&self) -> usize {
        self.inner.lock().starters.len()
    }
}

impl std::fmt::Debug for TaskLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("TaskLimiter")
            .field("max_tasks", &self.inner.max_tasks)
            .field("running", &state.running)
            .field("queued", &state.starters.len())
            .finish()
    }
}

/// A unit of work spawned through a [`TaskLimiter`].
///
/// Dropping the handle cancels the unit, whether it is queued or running.
#[must_use = "dropping a LimitedTask cancels it"]
pub struct LimitedTask<T> {
    handle: JoinHandle<Result<T, TaskError>>,
}

impl<T> LimitedTask<T> {
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl<T> Future for LimitedTask<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle)
            .poll(cx)
            .map(|joined| joined.map_err(TaskError::from).and_then(|output| output))
    }
}

impl<T> Drop for LimitedTask<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const SHORT: Duration = Duration::from_millis(50);
    const LONG: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn runs_immediately_under_cap() {
        let limiter = TaskLimiter::new(2);
        let task = limiter.schedule(async { 7 });
        assert_eq!(timeout(LONG, task).await.unwrap(), Ok(7));
        assert_eq!(limiter.running(), 0);
    }

    #[tokio::test]
    async fn excess_work_waits_for_a_slot() {
        let limiter = TaskLimiter::new(1);
        let (release, gate) = oneshot::channel::<()>();
        let first = limiter.schedule(async move {
            let _ = gate.await;
        });
        let second = limiter.schedule(async { "second" });

        assert_eq!(limiter.running(), 1);
        assert_eq!(limiter.queued(), 1);
        tokio::time::sleep(SHORT).await;
        assert!(!second.is_finished());

        release.send(()).unwrap();
        timeout(LONG, first).await.unwrap().unwrap();
        assert_eq!(timeout(LONG, second).await.unwrap(), Ok("second"));
        assert_eq!(limiter.running(), 0);
        assert_eq!(limiter.queued(), 0);
    }

    #[tokio::test]
    async fn queued_units_start_in_arrival_order() {
        let limiter = TaskLimiter::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        let (release, gate) = oneshot::channel::<()>();
        let blocker = limiter.schedule(async move {
            let _ = gate.await;
        });

        let tasks: Vec<_> = (0..5)
            .map(|n| {
                let order = Arc::clone(&order);
                limiter.schedule(async move {
                    order.lock().unwrap().push(n);
                })
            })
            .collect();

        release.send(()).unwrap();
        timeout(LONG, blocker).await.unwrap().unwrap();
        for task in tasks {
            timeout(LONG, task).await.unwrap().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn cancelled_queued_unit_never_starts() {
        let limiter = TaskLimiter::new(1);
        let (release, gate) = oneshot::channel::<()>();
        let blocker = limiter.schedule(async move {
            let _ = gate.await;
        });

        let started = Arc::new(Mutex::new(false));
        let cancelled = limiter.schedule_with({
            let started = Arc::clone(&started);
            move || async move {
                *started.lock().unwrap() = true;
            }
        });
        let survivor = limiter.schedule(async { "ran" });

        cancelled.abort();
        assert_eq!(timeout(LONG, cancelled).await.unwrap(), Err(TaskError::Cancelled));

        release.send(()).unwrap();
        timeout(LONG, blocker).await.unwrap().unwrap();
        assert_eq!(timeout(LONG, survivor).await.unwrap(), Ok("ran"));
        assert!(!*started.lock().unwrap());
        assert_eq!(limiter.running(), 0);
    }

    #[tokio::test]
    async fn acquire_gates_inline_work() {
        let limiter = TaskLimiter::new(1);
        let permit = limiter.acquire().await.unwrap();
        assert!(timeout(SHORT, limiter.acquire()).await.is_err());
        // The timed-out acquire left a dead queue entry behind.
        assert_eq!(limiter.queued(), 1);

        drop(permit);
        assert_eq!(limiter.running(), 0);
        assert_eq!(limiter.queued(), 0);

        let _again = timeout(LONG, limiter.acquire()).await.unwrap().unwrap();
        assert_eq!(limiter.running(), 1);
    }

    #[test]
    #[should_panic(expected = "max_tasks must be > 0")]
    fn zero_cap_panics() {
        let _ = TaskLimiter::new(0);
    }
}
