use bobbin_tasks::SharedConcurrent;
use bobbin_types::{Record, RecordId};

use crate::error::ThreadResult;
use crate::resolver::ThreadResolver;

type ThreadKey = (RecordId, Option<RecordId>);

/// The public "get thread" operation.
///
/// Concurrent requests for the same `(tail, head)` share a single walk, and
/// a caller that gives up does not cancel the walk for the others.
#[derive(Clone, Debug)]
pub struct ThreadGetter {
    resolver: ThreadResolver,
    calls: SharedConcurrent<ThreadKey, ThreadResult<Vec<Record>>>,
}

impl ThreadGetter {
    pub fn new(resolver: ThreadResolver) -> Self {
        Self {
            resolver,
            calls: SharedConcurrent::new(),
        }
    }

    pub fn resolver(&self) -> &ThreadResolver {
        &self.resolver
    }

    /// Resolve the thread ending at `tail`, oldest record first.
    pub async fn get_thread(
        &self,
        tail: RecordId,
        head: Option<RecordId>,
    ) -> ThreadResult<Vec<Record>> {
        let resolver = self.resolver.clone();
        let key = (tail.clone(), head.clone());
        self.calls
            .try_call(key, move || async move { resolver.get_thread(tail, head).await })
            .await
    }

    /// Distinct threads currently being resolved.
    pub fn in_flight(&self) -> usize {
        self.calls.in_flight()
    }
}
