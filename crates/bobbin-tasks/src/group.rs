//! Scoped groups of background tasks.
//!
//! A [`TaskGroup`] owns every task added to it. Waiting for the group is an
//! explicit step ([`TaskGroup::wait`]); dropping the group on any exit path
//! aborts the tasks that are still running without awaiting them and
//! releases every pending waiter. Errors unwinding through a scope are
//! therefore never held up by outstanding background work.
//!
//! # Idle signalling
//!
//! The group tracks an idle epoch that advances every time the running set
//! drains to empty (and once more on teardown). Waiters subscribe to the
//! epoch under the same lock that guards the running set, so a drain cannot
//! slip between "check" and "subscribe".

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::debug;

struct GroupState {
    running: HashMap<u64, AbortHandle>,
    next_id: u64,
    closed: bool,
}

struct GroupInner {
    state: Mutex<GroupState>,
    idle_epoch: watch::Sender<u64>,
}

impl GroupInner {
    fn lock(&self) -> MutexGuard<'_, GroupState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, id: u64) {
        let mut state = self.lock();
        if state.running.remove(&id).is_some() && state.running.is_empty() {
            self.idle_epoch.send_modify(|epoch| *epoch += 1);
        }
    }

    fn add<F>(self: &Arc<Self>, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let mut state = self.lock();
        if state.closed {
            drop(state);
            return Self::cancelled(task);
        }
        let id = state.next_id;
        state.next_id += 1;

        let completion = Completion {
            inner: Arc::clone(self),
            id,
        };
        let handle = tokio::spawn(async move {
            let _completion = completion;
            task.await
        });
        state.running.insert(id, handle.abort_handle());
        handle
    }

    /// A handle for a task refused by a closed group. `task` is dropped
    /// without being polled and the handle resolves as cancelled.
    fn cancelled<F>(task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        debug!("task added to a closed group; cancelling");
        drop(task);
        let handle = tokio::spawn(std::future::pending::<F::Output>());
        handle.abort();
        handle
    }

    async fn wait(&self, instant: bool) {
        let mut epoch = {
            let state = self.lock();
            if state.closed || (instant && state.running.is_empty()) {
                return;
            }
            self.idle_epoch.subscribe()
        };
        // The sender lives in `self`, so `changed` only returns once the
        // epoch moves: a drain or a teardown.
        let _ = epoch.changed().await;
    }

    fn teardown(&self) {
        let running = {
            let mut state = self.lock();
            state.closed = true;
            let running = std::mem::take(&mut state.running);
            self.idle_epoch.send_modify(|epoch| *epoch += 1);
            running
        };
        if !running.is_empty() {
            debug!(cancelled = running.len(), "task group closed with tasks still running");
        }
        for handle in running.into_values() {
            handle.abort();
        }
    }
}

/// Drop guard that removes a task from its group however the task ends:
/// completion, panic, or abort.
struct Completion {
    inner: Arc<GroupInner>,
    id: u64,
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.inner.finish(self.id);
    }
}

/// A scoped set of concurrently running background tasks.
///
/// Dropping the group cancels every task still running and releases any
/// pending waiters. Use [`handle`](Self::handle) to give other components a
/// way to add tasks to a group they do not own.
pub struct TaskGroup {
    inner: Arc<GroupInner>,
}

impl TaskGroup {
    /// Create an empty group.
    pub fn new() -> Self {
        let (idle_epoch, _) = watch::channel(0);
        Self {
            inner: Arc::new(GroupInner {
                state: Mutex::new(GroupState {
                    running: HashMap::new(),
                    next_id: 0,
                    closed: false,
                }),
                idle_epoch,
            }),
        }
    }

    /// Spawn `task` onto the runtime and register it with the group.
    ///
    /// The returned handle may be awaited for the task's output, or ignored.
    pub fn add<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.inner.add(task)
    }

    /// Wait until the group has no running tasks.
    ///
    /// With `instant` set, returns immediately when nothing is running.
    /// Otherwise waits for the next time the group drains to empty. Every
    /// waiter pending at a drain is released by that same drain.
    pub async fn wait(&self, instant: bool) {
        self.inner.wait(instant).await
    }

    /// Number of tasks currently running.
    pub fn len(&self) -> usize {
        self.inner.lock().running.len()
    }

    /// Returns `true` if no task is running.
    pub fn is_idle(&self) -> bool {
        self.len() == 0
    }

    /// A cloneable handle for adding tasks to, and waiting on, this group.
    ///
    /// Handles do not keep the group's tasks alive: once the group is
    /// dropped, tasks added through a handle are aborted immediately and
    /// waits return at once.
    pub fn handle(&self) -> TaskGroupHandle {
        TaskGroupHandle {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

impl std::fmt::Debug for TaskGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGroup")
            .field("running", &self.len())
            .finish()
    }
}

/// Non-owning handle to a [`TaskGroup`].
#[derive(Clone)]
pub struct TaskGroupHandle {
    inner: Arc<GroupInner>,
}

impl TaskGroupHandle {
    /// See [`TaskGroup::add`].
    pub fn add<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.inner.add(task)
    }

    /// See [`TaskGroup::wait`].
    pub async fn wait(&self, instant: bool) {
        self.inner.wait(instant).await
    }

    /// Number of tasks currently running in the group.
    pub fn len(&self) -> usize {
        self.inner.lock().running.len()
    }

    pub fn is_idle(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once the owning group has been dropped.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl std::fmt::Debug for TaskGroupHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGroupHandle")
            .field("running", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    const SHORT: Duration = Duration::from_millis(50);
    const LONG: Duration = Duration::from_secs(5);

    /// A task that runs until the returned sender fires or is dropped.
    fn gated() -> (oneshot::Sender<()>, impl Future<Output = ()> + Send + 'static) {
        let (release, gate) = oneshot::channel::<()>();
        (release, async move {
            let _ = gate.await;
        })
    }

    #[tokio::test]
    async fn wait_on_empty_group_returns_immediately() {
        let group = TaskGroup::new();
        timeout(SHORT, group.wait(true))
            .await
            .expect("empty group should not block");
    }

    #[tokio::test]
    async fn wait_blocks_until_every_task_finishes() {
        let group = TaskGroup::new();
        let (first, task) = gated();
        group.add(task);
        let (second, task) = gated();
        group.add(task);
        assert_eq!(group.len(), 2);

        first.send(()).unwrap();
        assert!(timeout(SHORT, group.wait(true)).await.is_err());

        second.send(()).unwrap();
        timeout(LONG, group.wait(true)).await.expect("group drains");
        assert!(group.is_idle());
    }

    #[tokio::test]
    async fn concurrent_waiters_release_together() {
        let group = TaskGroup::new();
        let (release, task) = gated();
        group.add(task);

        let a = tokio::spawn({
            let handle = group.handle();
            async move { handle.wait(true).await }
        });
        let b = tokio::spawn({
            let handle = group.handle();
            async move { handle.wait(true).await }
        });
        tokio::time::sleep(SHORT).await;
        assert!(!a.is_finished());
        assert!(!b.is_finished());

        release.send(()).unwrap();
        timeout(LONG, a).await.unwrap().unwrap();
        timeout(LONG, b).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn drop_cancels_running_tasks_and_releases_waiters() {
        let group = TaskGroup::new();
        let (release, task) = gated();
        let handle = group.add(task);

        let waiter = tokio::spawn({
            let handle = group.handle();
            async move { handle.wait(true).await }
        });
        tokio::time::sleep(SHORT).await;

        drop(group);

        timeout(LONG, waiter).await.unwrap().unwrap();
        let err = handle.await.unwrap_err();
        assert!(err.is_cancelled());
        // The task never consumed its gate.
        assert!(release.send(()).is_err());
    }

    #[tokio::test]
    async fn tasks_added_after_close_are_aborted() {
        let group = TaskGroup::new();
        let handle = group.handle();
        drop(group);

        assert!(handle.is_closed());
        let (_release, task) = gated();
        let joined = handle.add(task).await;
        assert!(joined.unwrap_err().is_cancelled());
        timeout(SHORT, handle.wait(false)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn closed_group_never_runs_added_tasks() {
        let group = TaskGroup::new();
        let handle = group.handle();
        drop(group);

        let ran = Arc::new(AtomicUsize::new(0));
        let joins: Vec<_> = (0..2000)
            .map(|_| {
                let ran = Arc::clone(&ran);
                handle.add(async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        for joined in joins {
            assert!(joined.await.unwrap_err().is_cancelled());
        }
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(handle.is_idle());
    }

    #[tokio::test]
    async fn new_task_after_drain_starts_a_new_busy_period() {
        let group = TaskGroup::new();
        group.add(async {}).await.unwrap();
        timeout(LONG, group.wait(true)).await.unwrap();

        let (release, task) = gated();
        group.add(task);
        assert!(timeout(SHORT, group.wait(true)).await.is_err());

        release.send(()).unwrap();
        timeout(LONG, group.wait(true)).await.unwrap();
    }

    #[tokio::test]
    async fn non_instant_wait_waits_for_next_drain() {
        let group = TaskGroup::new();
        assert!(timeout(SHORT, group.wait(false)).await.is_err());

        let waiter = tokio::spawn({
            let handle = group.handle();
            async move { handle.wait(false).await }
        });
        tokio::time::sleep(SHORT).await;
        group.add(async {});
        timeout(LONG, waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn panicking_task_still_leaves_the_group() {
        let group = TaskGroup::new();
        let handle = group.add(async { panic!("boom") });
        assert!(handle.await.unwrap_err().is_panic());
        timeout(LONG, group.wait(true)).await.unwrap();
        assert!(group.is_idle());
    }
}
