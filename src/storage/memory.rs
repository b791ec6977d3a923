// In-Memory Storage
//
// Collections keep their documents bincode-encoded, cursors decode them on
// read. Each cursor works on a snapshot taken when it was opened.

use std::collections::HashMap;
use std::sync::Arc;

use log::trace;
use parking_lot::RwLock;
use rand::seq::SliceRandom;

use crate::common::types::DocumentId;
use crate::query::executor::result::{DataValue, QueryError, QueryResult};
use crate::storage::{
    Collection, CursorBatch, CursorEntry, CursorOptions, CursorType, OperationCursor, ReplicationStatus,
    TransactionMethods,
};

/// A collection held in memory
#[derive(Debug)]
pub struct MemoryCollection {
    name: String,
    documents: RwLock<Vec<(DocumentId, Vec<u8>)>>,
    /// Attributes stored in the collection's covering index, if it has one
    index_attributes: Vec<String>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_index(name, Vec::<String>::new())
    }

    pub fn with_index<A: Into<String>>(name: impl Into<String>, index_attributes: impl IntoIterator<Item = A>) -> Self {
        MemoryCollection {
            name: name.into(),
            documents: RwLock::new(Vec::new()),
            index_attributes: index_attributes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index_attributes(&self) -> &[String] {
        &self.index_attributes
    }

    pub fn insert(&self, document: DataValue) -> QueryResult<DocumentId> {
        let bytes = document.serialize_document()?;
        let mut documents = self.documents.write();
        let id = documents.last().map_or(1, |(id, _)| id + 1);
        documents.push((id, bytes));
        Ok(id)
    }

    pub fn insert_many(&self, documents: impl IntoIterator<Item = DataValue>) -> QueryResult<usize> {
        let mut count = 0;
        for document in documents {
            self.insert(document)?;
            count += 1;
        }
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<(DocumentId, Vec<u8>)> {
        self.documents.read().clone()
    }
}

/// Transaction over a set of in-memory collections
#[derive(Debug, Default)]
pub struct MemoryTransaction {
    collections: RwLock<HashMap<String, Arc<MemoryCollection>>>,
}

impl MemoryTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_collection(&self, collection: Arc<MemoryCollection>) {
        self.collections.write().insert(collection.name().to_string(), collection);
    }

    pub fn collection(&self, name: &str) -> QueryResult<Arc<MemoryCollection>> {
        self.collections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| QueryError::CollectionNotFound(name.to_string()))
    }
}

impl TransactionMethods for MemoryTransaction {
    fn open_cursor(&self, collection: &Collection, options: CursorOptions) -> QueryResult<Box<dyn OperationCursor>> {
        let stored = self.collection(collection.name())?;
        let index_attributes = if options.produce_index_entries {
            if stored.index_attributes().is_empty() {
                return Err(QueryError::InvalidConfiguration(format!(
                    "collection {} has no covering index",
                    collection
                )));
            }
            Some(stored.index_attributes().to_vec())
        } else {
            None
        };
        trace!("Opening {:?} cursor on {}", options.cursor_type, collection);
        Ok(Box::new(MemoryCursor::new(stored.snapshot(), options.cursor_type, index_attributes)))
    }

    fn index_attributes(&self, collection: &Collection) -> QueryResult<Vec<String>> {
        Ok(self.collection(collection.name())?.index_attributes().to_vec())
    }
}

/// Cursor over a snapshot of a memory collection
#[derive(Debug)]
pub struct MemoryCursor {
    entries: Vec<(DocumentId, Vec<u8>)>,
    position: usize,
    cursor_type: CursorType,
    index_attributes: Option<Vec<String>>,
}

impl MemoryCursor {
    pub fn new(
        entries: Vec<(DocumentId, Vec<u8>)>,
        cursor_type: CursorType,
        index_attributes: Option<Vec<String>>,
    ) -> Self {
        let mut cursor = MemoryCursor {
            entries,
            position: 0,
            cursor_type,
            index_attributes,
        };
        cursor.reset();
        cursor
    }

    fn decode(&self, id: DocumentId, bytes: &[u8]) -> QueryResult<CursorEntry> {
        let document = DataValue::deserialize_document(bytes)?;
        Ok(match &self.index_attributes {
            Some(attributes) => CursorEntry::IndexEntry {
                id,
                values: attributes
                    .iter()
                    .map(|attribute| document.get_path(attribute).cloned().unwrap_or_default())
                    .collect(),
            },
            None => CursorEntry::Document { id, document },
        })
    }
}

impl OperationCursor for MemoryCursor {
    fn has_more(&self) -> bool {
        self.position < self.entries.len()
    }

    fn next_batch(&mut self, batch_size: usize) -> QueryResult<CursorBatch> {
        let end = self.entries.len().min(self.position + batch_size);
        let batch = self.entries[self.position..end]
            .iter()
            .map(|(id, bytes)| self.decode(*id, bytes))
            .collect::<QueryResult<Vec<_>>>()?;
        self.position = end;
        Ok(CursorBatch::Ready(batch))
    }

    fn reset(&mut self) {
        self.position = 0;
        if self.cursor_type == CursorType::Any {
            self.entries.shuffle(&mut rand::thread_rng());
        }
    }
}

/// Replication status of a single server: everything is always in sync
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysInSync;

impl ReplicationStatus for AlwaysInSync {
    fn in_sync(&self, _collection: &Collection) -> QueryResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: i64, city: &str) -> DataValue {
        DataValue::object([
            ("id", DataValue::Integer(id)),
            ("address", DataValue::object([("city", DataValue::Text(city.to_string()))])),
        ])
    }

    fn setup(n: i64) -> MemoryTransaction {
        let collection = Arc::new(MemoryCollection::with_index("people", ["id", "address.city"]));
        for i in 0..n {
            collection.insert(person(i, "Berlin")).unwrap();
        }
        let trx = MemoryTransaction::new();
        trx.add_collection(collection);
        trx
    }

    fn ids(batch: CursorBatch) -> Vec<DocumentId> {
        match batch {
            CursorBatch::Ready(entries) => entries.iter().map(CursorEntry::id).collect(),
            CursorBatch::Waiting => panic!("memory cursor never waits"),
        }
    }

    #[test]
    fn test_cursor_reads_in_batches() {
        let trx = setup(5);
        let mut cursor = trx.open_cursor(&Collection::new("people"), CursorOptions::default()).unwrap();
        assert_eq!(ids(cursor.next_batch(3).unwrap()), vec![1, 2, 3]);
        assert!(cursor.has_more());
        assert_eq!(ids(cursor.next_batch(3).unwrap()), vec![4, 5]);
        assert!(!cursor.has_more());
        assert!(ids(cursor.next_batch(3).unwrap()).is_empty());

        cursor.reset();
        assert_eq!(ids(cursor.next_batch(1).unwrap()), vec![1]);
    }

    #[test]
    fn test_random_cursor_returns_same_documents() {
        let trx = setup(50);
        let options = CursorOptions {
            cursor_type: CursorType::Any,
            ..CursorOptions::default()
        };
        let mut cursor = trx.open_cursor(&Collection::new("people"), options).unwrap();
        let mut seen = ids(cursor.next_batch(100).unwrap());
        seen.sort_unstable();
        assert_eq!(seen, (1..=50).collect::<Vec<_>>());
    }

    #[test]
    fn test_index_entries() {
        let trx = setup(1);
        let options = CursorOptions {
            produce_index_entries: true,
            ..CursorOptions::default()
        };
        let mut cursor = trx.open_cursor(&Collection::new("people"), options).unwrap();
        match cursor.next_batch(10).unwrap() {
            CursorBatch::Ready(entries) => assert_eq!(
                entries,
                vec![CursorEntry::IndexEntry {
                    id: 1,
                    values: vec![DataValue::Integer(0), DataValue::Text("Berlin".to_string())],
                }]
            ),
            CursorBatch::Waiting => panic!("memory cursor never waits"),
        }
    }

    #[test]
    fn test_missing_collection_and_index() {
        let trx = setup(0);
        assert!(matches!(
            trx.open_cursor(&Collection::new("nope"), CursorOptions::default()),
            Err(QueryError::CollectionNotFound(_))
        ));

        trx.add_collection(Arc::new(MemoryCollection::new("plain")));
        let options = CursorOptions {
            produce_index_entries: true,
            ..CursorOptions::default()
        };
        assert!(trx.open_cursor(&Collection::new("plain"), options).is_err());
    }
}
