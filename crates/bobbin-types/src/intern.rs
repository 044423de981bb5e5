//! Flyweight table for [`Author`] values.
//!
//! Records from one bulk fetch overwhelmingly share a handful of authors, so
//! every decoded or fetched record is pointed at a single shared instance.
//! Entries are never evicted; the table lives as long as its owner.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::id::UserId;
use crate::record::Author;

/// Process-owned interning table mapping author ids to shared authors.
#[derive(Debug, Default)]
pub struct AuthorTable {
    authors: Mutex<HashMap<UserId, Arc<Author>>>,
}

impl AuthorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the shared instance for `author`.
    ///
    /// If an equal author is already known, the existing `Arc` is returned.
    /// If an author with the same id but different fields is known (a renamed
    /// handle, say), the table adopts the incoming value.
    pub fn intern(&self, author: Author) -> Arc<Author> {
        let mut authors = self.authors.lock().unwrap_or_else(PoisonError::into_inner);
        match authors.entry(author.id.clone()) {
            Entry::Occupied(mut entry) => {
                if **entry.get() != author {
                    entry.insert(Arc::new(author));
                }
                Arc::clone(entry.get())
            }
            Entry::Vacant(entry) => Arc::clone(entry.insert(Arc::new(author))),
        }
    }

    /// Like [`intern`](Self::intern), but reuses the incoming allocation when
    /// the author is new to the table.
    pub fn intern_arc(&self, author: Arc<Author>) -> Arc<Author> {
        let mut authors = self.authors.lock().unwrap_or_else(PoisonError::into_inner);
        match authors.entry(author.id.clone()) {
            Entry::Occupied(mut entry) => {
                if **entry.get() != *author {
                    entry.insert(author);
                }
                Arc::clone(entry.get())
            }
            Entry::Vacant(entry) => Arc::clone(entry.insert(author)),
        }
    }

    pub fn get(&self, id: &UserId) -> Option<Arc<Author>> {
        self.authors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.authors.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
