//! Remote record sources for Bobbin.
//!
//! A [`RecordSource`] is the slow, rate-limited origin of records. The core
//! treats its errors opaquely: they propagate unchanged to whoever asked
//! for the thread.
//!
//! Sources compose by wrapping:
//!
//! ```text
//! SharedSource<LimitedSource<S>>
//!   │             │            └─ the real source
//!   │             └─ at most N calls in flight, excess queued FIFO
//!   └─ identical concurrent calls collapse into one
//! ```

pub mod error;
pub mod limited;
pub mod memory;
pub mod shared;
pub mod source;

pub use error::{RemoteError, RemoteResult};
pub use limited::LimitedSource;
pub use memory::{InMemorySource, SourceCall};
pub use shared::SharedSource;
pub use source::RecordSource;
