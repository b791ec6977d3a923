// Storage Interfaces
//
// The storage engine is an external collaborator. The pipeline only sees a
// transaction that opens cursors, the cursors themselves and the replication
// status of a collection. `memory` provides a reference implementation.

pub mod memory;

pub use self::memory::{AlwaysInSync, MemoryCollection, MemoryCursor, MemoryTransaction};

use std::fmt;

use crate::common::types::DocumentId;
use crate::query::executor::result::{DataValue, QueryResult};

/// Handle of a collection as seen by the query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Collection {
    name: String,
    satellite: bool,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Collection {
            name: name.into(),
            satellite: false,
        }
    }

    /// A collection synchronously replicated to every node
    pub fn satellite(name: impl Into<String>) -> Self {
        Collection {
            name: name.into(),
            satellite: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_satellite(&self) -> bool {
        self.satellite
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Iteration order of a collection cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorType {
    /// Natural storage order
    #[default]
    All,
    /// Random order over the same documents
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorOptions {
    pub cursor_type: CursorType,
    /// Yield covering-index entries instead of documents
    pub produce_index_entries: bool,
}

/// One item produced by a cursor
#[derive(Debug, Clone, PartialEq)]
pub enum CursorEntry {
    Document { id: DocumentId, document: DataValue },
    /// Attribute values stored in a covering index, in index attribute order
    IndexEntry { id: DocumentId, values: Vec<DataValue> },
}

impl CursorEntry {
    pub fn id(&self) -> DocumentId {
        match self {
            CursorEntry::Document { id, .. } | CursorEntry::IndexEntry { id, .. } => *id,
        }
    }
}

/// Result of one cursor read
#[derive(Debug, Clone, PartialEq)]
pub enum CursorBatch {
    /// Up to `batch_size` entries; empty once the cursor is exhausted
    Ready(Vec<CursorEntry>),
    /// Storage would block, nothing was consumed
    Waiting,
}

/// Storage-side iterator bound to one collection and one transaction
pub trait OperationCursor: Send {
    /// Whether more entries may be returned
    fn has_more(&self) -> bool;

    fn next_batch(&mut self, batch_size: usize) -> QueryResult<CursorBatch>;

    /// Restart from the beginning
    fn reset(&mut self);
}

/// Transaction handle borrowed from the surrounding query
pub trait TransactionMethods: Send + Sync {
    fn open_cursor(&self, collection: &Collection, options: CursorOptions) -> QueryResult<Box<dyn OperationCursor>>;

    /// Attributes of the collection's covering index, empty if it has none
    fn index_attributes(&self, collection: &Collection) -> QueryResult<Vec<String>>;
}

/// Readiness of synchronously replicated collections
pub trait ReplicationStatus: Send + Sync {
    /// `false` while the local copy is not yet usable; callers poll again
    fn in_sync(&self, collection: &Collection) -> QueryResult<bool>;
}
