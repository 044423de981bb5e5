//! Byte encoding of [`Record`]s for cache layers.
//!
//! Cache layers store opaque bytes; this codec is the single place that
//! decides what those bytes look like. Entries are bincode-encoded, and
//! decoding routes the author through the shared [`AuthorTable`].

use std::sync::Arc;

use crate::error::TypeError;
use crate::intern::AuthorTable;
use crate::record::Record;

/// Encoder/decoder for cache entries.
#[derive(Clone, Debug, Default)]
pub struct RecordCodec {
    authors: Arc<AuthorTable>,
}

impl RecordCodec {
    pub fn new(authors: Arc<AuthorTable>) -> Self {
        Self { authors }
    }

    /// The table decoded authors are interned into.
    pub fn authors(&self) -> &Arc<AuthorTable> {
        &self.authors
    }

    pub fn encode(&self, record: &Record) -> Result<Vec<u8>, TypeError> {
        bincode::serialize(record).map_err(|e| TypeError::Encode {
            id: record.id.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Record, TypeError> {
        let mut record: Record =
            bincode::deserialize(bytes).map_err(|e| TypeError::Decode(e.to_string()))?;
        record.author = self.authors.intern_arc(record.author);
        Ok(record)
    }
}
