use async_trait::async_trait;
use bobbin_tasks::TaskLimiter;
use bobbin_types::{Record, RecordId, UserId};
use tracing::trace;

use crate::error::RemoteResult;
use crate::source::RecordSource;

/// A source that admits at most `max_concurrency` calls at a time.
///
/// Excess calls wait in arrival order. A caller that gives up while queued
/// never reaches the inner source.
pub struct LimitedSource<S> {
    inner: S,
    limiter: TaskLimiter,
}

impl<S: RecordSource> LimitedSource<S> {
    /// # Panics
    ///
    /// Panics if `max_concurrency` is 0.
    pub fn new(inner: S, max_concurrency: usize) -> Self {
        Self::with_limiter(inner, TaskLimiter::new(max_concurrency))
    }

    /// Gate `inner` through an existing limiter, possibly shared with other
    /// sources.
    pub fn with_limiter(inner: S, limiter: TaskLimiter) -> Self {
        Self { inner, limiter }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn limiter(&self) -> &TaskLimiter {
        &self.limiter
    }
}

#[async_trait]
impl<S: RecordSource> RecordSource for LimitedSource<S> {
    async fn fetch_record(&self, id: &RecordId) -> RemoteResult<Record> {
        let _permit = self.limiter.acquire().await?;
        trace!(%id, running = self.limiter.running(), "fetching record");
        self.inner.fetch_record(id).await
    }

    async fn fetch_recent_by_author(
        &self,
        author: &UserId,
        before: &RecordId,
        limit: usize,
    ) -> RemoteResult<Vec<Record>> {
        let _permit = self.limiter.acquire().await?;
        trace!(%author, %before, limit, running = self.limiter.running(), "fetching recent records");
        self.inner.fetch_recent_by_author(author, before, limit).await
    }
}

impl<S> std::fmt::Debug for LimitedSource<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimitedSource")
            .field("limiter", &self.limiter)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use bobbin_types::Author;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Tracks the highest number of calls it ever saw at once.
    #[derive(Default)]
    struct ConcurrencyProbe {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl RecordSource for ConcurrencyProbe {
        async fn fetch_record(&self, id: &RecordId) -> RemoteResult<Record> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(Record::root(id.clone(), Arc::new(Author::new("1", "ann", "Ann"))))
        }

        async fn fetch_recent_by_author(
            &self,
            _author: &UserId,
            before: &RecordId,
            _limit: usize,
        ) -> RemoteResult<Vec<Record>> {
            Err(RemoteError::NotFound(before.clone()))
        }
    }

    #[tokio::test]
    async fn never_exceeds_the_cap() {
        let source = Arc::new(LimitedSource::new(ConcurrencyProbe::default(), 2));
        let fetches: Vec<_> = (0..8)
            .map(|n| {
                let source = Arc::clone(&source);
                tokio::spawn(async move { source.fetch_record(&RecordId::new(n.to_string())).await })
            })
            .collect();
        for fetch in fetches {
            fetch.await.unwrap().unwrap();
        }
        assert_eq!(source.inner().peak.load(Ordering::SeqCst), 2);
        assert_eq!(source.limiter().running(), 0);
    }

    #[tokio::test]
    async fn inner_errors_pass_through_unchanged() {
        let source = LimitedSource::new(ConcurrencyProbe::default(), 1);
        let err = source
            .fetch_recent_by_author(&UserId::new("1"), &RecordId::new("9"), 5)
            .await
            .unwrap_err();
        assert_eq!(err, RemoteError::NotFound(RecordId::new("9")));
        assert_eq!(source.limiter().running(), 0);
    }
}
