//! Reply-chain resolution for Bobbin.
//!
//! Given a `tail` record and an optional `head`, [`ThreadResolver`] walks
//! parent links from the tail back toward the head (or the root), consulting
//! in order:
//!
//! 1. a per-walk local store, filled by batch prefetch;
//! 2. the layered persistent cache;
//! 3. the remote source.
//!
//! Records found through the local store or the remote are written to the
//! persistent cache in the background. Writes never hold up the walk, and
//! failed writes are logged, never returned.
//!
//! [`ThreadGetter`] is the public entry point: concurrent requests for the
//! same `(tail, head)` share one walk.

pub mod author;
pub mod error;
pub mod getter;
pub mod resolver;

pub use author::thread_author;
pub use error::{ThreadError, ThreadResult};
pub use getter::ThreadGetter;
pub use resolver::{ThreadResolver, ThreadWalk, DEFAULT_BATCH_SIZE};
