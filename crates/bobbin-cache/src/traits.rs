use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{CacheError, CacheResult};

/// Outcome of reading one key from a cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    Hit(Bytes),
    Miss,
}

impl Lookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }

    /// The value, or `None` on a miss.
    pub fn into_value(self) -> Option<Bytes> {
        match self {
            Lookup::Hit(value) => Some(value),
            Lookup::Miss => None,
        }
    }
}

impl From<Option<Bytes>> for Lookup {
    fn from(value: Option<Bytes>) -> Self {
        value.map_or(Lookup::Miss, Lookup::Hit)
    }
}

/// Atomically readable and writable volatile key-value storage.
///
/// All implementations must satisfy these invariants:
/// - A key always maps to the same value. Writing a key that is already
///   present stores an equal value; there is no update or merge.
/// - Values may disappear at any time (eviction, external cleanup). A
///   vanished key reads as [`Lookup::Miss`].
/// - A miss is never an error. `Err` means the layer itself failed.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Read `key`.
    async fn lookup(&self, key: &str) -> CacheResult<Lookup>;

    /// Store `value` under `key`.
    async fn write(&self, key: &str, value: Bytes) -> CacheResult<()>;

    /// Read `key`, reporting a miss as [`CacheError::KeyNotFound`].
    async fn get(&self, key: &str) -> CacheResult<Bytes> {
        match self.lookup(key).await? {
            Lookup::Hit(value) => Ok(value),
            Lookup::Miss => Err(CacheError::KeyNotFound(key.to_owned())),
        }
    }

    /// Short label used in logs.
    fn name(&self) -> &str {
        "cache"
    }
}

/// Backend errors that may mean "the key is simply not there".
pub trait MissingKey {
    fn is_missing_key(&self) -> bool;
}

impl MissingKey for std::io::Error {
    fn is_missing_key(&self) -> bool {
        self.kind() == std::io::ErrorKind::NotFound
    }
}

/// Turn a backend read into a [`Lookup`]: a missing-key error becomes
/// [`Lookup::Miss`], any other error propagates.
///
/// ```ignore
/// lookup_from(tokio::fs::read(&path).await.map(Bytes::from))
/// ```
pub fn lookup_from<E>(result: Result<Bytes, E>) -> CacheResult<Lookup>
where
    E: MissingKey + Into<CacheError>,
{
    match result {
        Ok(value) => Ok(Lookup::Hit(value)),
        Err(err) if err.is_missing_key() => Ok(Lookup::Miss),
        Err(err) => Err(err.into()),
    }
}
