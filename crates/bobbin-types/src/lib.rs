//! Foundation types for Bobbin.
//!
//! Every other Bobbin crate depends on `bobbin-types`. The types here model
//! one node of a reply chain and the identifiers that link nodes together.
//!
//! # Key Types
//!
//! - [`RecordId`]: Opaque record identifier, ordered numerically for decimal ids
//! - [`UserId`]: Opaque author identifier
//! - [`Author`]: Immutable author handle and display name
//! - [`Record`]: One node of a reply chain, immutable once built
//! - [`AuthorTable`]: Flyweight table sharing one `Arc<Author>` per author
//! - [`RecordCodec`]: Byte encoding of records for cache layers

pub mod codec;
pub mod error;
pub mod id;
pub mod intern;
pub mod record;

pub use codec::RecordCodec;
pub use error::TypeError;
pub use id::{RecordId, UserId};
pub use intern::AuthorTable;
pub use record::{Author, Record};
