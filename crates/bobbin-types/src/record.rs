use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::id::{RecordId, UserId};

/// The author of a record.
///
/// Authors are immutable and shared: every record by the same author within
/// a process should point at the same `Arc<Author>` (see [`AuthorTable`]).
///
/// [`AuthorTable`]: crate::AuthorTable
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Author {
    pub id: UserId,
    pub handle: String,
    pub name: String,
}

impl Author {
    pub fn new(id: impl Into<UserId>, handle: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            handle: handle.into(),
            name: name.into(),
        }
    }
}

/// One node of a reply chain.
///
/// `parent_author_id` is known even when the parent record itself has not
/// been resolved yet, which lets the resolver choose a prefetch source
/// before it ever sees the parent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub author: Arc<Author>,
    pub parent_id: Option<RecordId>,
    pub parent_author_id: Option<UserId>,
}

impl Record {
    /// A record that replies to nothing.
    pub fn root(id: impl Into<RecordId>, author: Arc<Author>) -> Self {
        Self {
            id: id.into(),
            author,
            parent_id: None,
            parent_author_id: None,
        }
    }

    /// A record replying to `parent_id`, written by `parent_author_id`.
    pub fn reply(
        id: impl Into<RecordId>,
        author: Arc<Author>,
        parent_id: impl Into<RecordId>,
        parent_author_id: impl Into<UserId>,
    ) -> Self {
        Self {
            id: id.into(),
            author,
            parent_id: Some(parent_id.into()),
            parent_author_id: Some(parent_author_id.into()),
        }
    }
}
