use std::sync::Arc;

use bobbin_cache::{Cache, DiskCache, InMemoryCache, StackedCache};
use bobbin_remote::{LimitedSource, RecordSource, SharedSource};
use bobbin_tasks::TaskGroup;
use bobbin_thread::{thread_author, ThreadGetter, ThreadResolver};
use bobbin_types::{Author, AuthorTable, Record, RecordCodec, RecordId};
use tracing::info;

use crate::config::BobbinConfig;
use crate::error::BobbinResult;

/// A resolved thread, oldest record first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Thread {
    pub records: Vec<Record>,
    /// `None` when the thread is a conversation between several authors.
    pub author: Option<Arc<Author>>,
}

/// A fully wired thread service over the remote source `S`.
///
/// Owns the task group receiving cache repair writes; dropping the service
/// cancels repairs still in flight.
pub struct Bobbin<S> {
    config: BobbinConfig,
    authors: Arc<AuthorTable>,
    source: Arc<SharedSource<LimitedSource<S>>>,
    getter: ThreadGetter,
    repairs: TaskGroup,
}

impl<S: RecordSource + 'static> Bobbin<S> {
    pub fn new(config: BobbinConfig, source: S) -> BobbinResult<Self> {
        config.validate()?;

        let repairs = TaskGroup::new();
        let mut layers: Vec<Arc<dyn Cache>> =
            vec![Arc::new(InMemoryCache::new(config.cache.memory_size.bytes()))];
        if let Some(path) = &config.cache.disk_path {
            layers.push(Arc::new(DiskCache::new(path)));
        }
        let cache = Arc::new(StackedCache::new(layers, repairs.handle()));

        let source = Arc::new(SharedSource::new(LimitedSource::new(
            source,
            config.remote.max_concurrency,
        )));

        let authors = Arc::new(AuthorTable::new());
        let resolver = ThreadResolver::new(
            cache,
            Arc::clone(&source) as Arc<dyn RecordSource>,
            RecordCodec::new(Arc::clone(&authors)),
        )
        .with_batch_size(config.thread.batch_size);

        info!(
            memory_size = %config.cache.memory_size,
            disk = config.cache.disk_path.is_some(),
            max_concurrency = config.remote.max_concurrency,
            batch_size = config.thread.batch_size,
            "thread service ready"
        );

        Ok(Self {
            config,
            authors,
            source,
            getter: ThreadGetter::new(resolver),
            repairs,
        })
    }

    /// Resolve the thread ending at `tail`, back to `head` or the root.
    pub async fn get_thread(&self, tail: RecordId, head: Option<RecordId>) -> BobbinResult<Thread> {
        let records = self.getter.get_thread(tail, head).await?;
        let author = thread_author(&records);
        Ok(Thread { records, author })
    }

    pub fn config(&self) -> &BobbinConfig {
        &self.config
    }

    /// The author table shared by everything this service decodes.
    pub fn authors(&self) -> &Arc<AuthorTable> {
        &self.authors
    }

    /// The caller's source, as passed to [`new`](Self::new).
    pub fn source(&self) -> &S {
        self.source.inner().inner()
    }

    /// Wait for outstanding cache repair writes to land.
    pub async fn flush(&self) {
        self.repairs.wait(true).await;
    }
}

impl<S> std::fmt::Debug for Bobbin<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bobbin")
            .field("config", &self.config)
            .field("repairs", &self.repairs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BobbinError;
    use bobbin_remote::{InMemorySource, RemoteError};
    use bobbin_thread::ThreadError;

    fn chain_source() -> InMemorySource {
        let ann = Arc::new(Author::new("1", "ann", "Ann"));
        let bob = Arc::new(Author::new("2", "bob", "Bob"));
        InMemorySource::with_records([
            Record::root("100", Arc::clone(&ann)),
            Record::reply("101", Arc::clone(&ann), "100", "1"),
            Record::reply("102", Arc::clone(&bob), "101", "1"),
            Record::reply("103", Arc::clone(&ann), "102", "2"),
        ])
    }

    fn ids(thread: &Thread) -> Vec<&str> {
        thread.records.iter().map(|r| r.id.as_str()).collect()
    }

    #[tokio::test]
    async fn resolves_thread_and_author() {
        let bobbin = Bobbin::new(BobbinConfig::default(), chain_source()).unwrap();
        let thread = bobbin
            .get_thread(RecordId::new("103"), None)
            .await
            .unwrap();

        assert_eq!(ids(&thread), ["100", "101", "102", "103"]);
        assert_eq!(thread.author.unwrap().handle, "ann");
    }

    #[tokio::test]
    async fn second_request_is_served_from_cache() {
        let bobbin = Bobbin::new(BobbinConfig::default(), chain_source()).unwrap();
        let first = bobbin.get_thread(RecordId::new("103"), None).await.unwrap();
        let calls = bobbin.source().total_calls();

        let second = bobbin.get_thread(RecordId::new("103"), None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(bobbin.source().total_calls(), calls);
    }

    #[tokio::test]
    async fn disk_layer_survives_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BobbinConfig::default();
        config.cache.disk_path = Some(dir.path().to_path_buf());

        let first = Bobbin::new(config.clone(), chain_source()).unwrap();
        first.get_thread(RecordId::new("103"), None).await.unwrap();
        drop(first);

        let restarted = Bobbin::new(config, InMemorySource::new()).unwrap();
        let thread = restarted
            .get_thread(RecordId::new("103"), Some(RecordId::new("101")))
            .await
            .unwrap();
        restarted.flush().await;

        assert_eq!(ids(&thread), ["101", "102", "103"]);
        assert_eq!(restarted.source().total_calls(), 0);
        // Decoded authors are interned.
        assert!(Arc::ptr_eq(&thread.records[0].author, &thread.records[2].author));
        assert_eq!(restarted.authors().len(), 2);
    }

    #[tokio::test]
    async fn mismatched_head_is_reported() {
        let bobbin = Bobbin::new(BobbinConfig::default(), chain_source()).unwrap();
        let err = bobbin
            .get_thread(RecordId::new("102"), Some(RecordId::new("999")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BobbinError::Thread(ThreadError::MismatchedHead(head)) if head == RecordId::new("999")
        ));
    }

    #[tokio::test]
    async fn remote_failure_is_reported() {
        let source = chain_source();
        source.fail_next(RemoteError::Transport("connection reset".into()));
        let bobbin = Bobbin::new(BobbinConfig::default(), source).unwrap();

        let err = bobbin.get_thread(RecordId::new("100"), None).await.unwrap_err();
        assert!(matches!(
            err,
            BobbinError::Thread(ThreadError::Remote(RemoteError::Transport(_)))
        ));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = BobbinConfig::default();
        config.remote.max_concurrency = 0;
        assert!(matches!(
            Bobbin::new(config, InMemorySource::new()),
            Err(BobbinError::Config(_))
        ));
    }
}
