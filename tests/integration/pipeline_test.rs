use std::sync::Arc;

use anyhow::Result;

use bayun_pipeline::query::executor::fetcher::{BlockSource, ValuesBlockSource};
use bayun_pipeline::query::executor::infos::ExecutorInfos;
use bayun_pipeline::query::executor::operators::{
    EnumerateCollectionExecutorInfos, LimitExecutorInfos, create_enumerate_collection, create_limit,
};
use bayun_pipeline::storage::{
    Collection, CursorBatch, CursorOptions, MemoryTransaction, OperationCursor, TransactionMethods,
};
use bayun_pipeline::{ExecutionState, QueryContext, QueryError, QueryOptions, QueryResult};

#[path = "../common/mod.rs"]
mod common;
use common::{document_id, drain, numbered_collection, transaction_with};

/// Cursor that blocks once before every batch
struct SlowCursor {
    inner: Box<dyn OperationCursor>,
    blocked: bool,
}

impl OperationCursor for SlowCursor {
    fn has_more(&self) -> bool {
        self.inner.has_more()
    }

    fn next_batch(&mut self, batch_size: usize) -> QueryResult<CursorBatch> {
        self.blocked = !self.blocked;
        if self.blocked {
            return Ok(CursorBatch::Waiting);
        }
        self.inner.next_batch(batch_size)
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

struct SlowStorage(Arc<MemoryTransaction>);

impl TransactionMethods for SlowStorage {
    fn open_cursor(&self, collection: &Collection, options: CursorOptions) -> QueryResult<Box<dyn OperationCursor>> {
        Ok(Box::new(SlowCursor {
            inner: self.0.open_cursor(collection, options)?,
            blocked: false,
        }))
    }

    fn index_attributes(&self, collection: &Collection) -> QueryResult<Vec<String>> {
        self.0.index_attributes(collection)
    }
}

fn enumerate_infos(trx: Arc<dyn TransactionMethods>, random: bool) -> Result<Arc<EnumerateCollectionExecutorInfos>> {
    let infos =
        EnumerateCollectionExecutorInfos::new(ExecutorInfos::new(1, 2, [1], [], [0])?, 1, Collection::new("docs"), trx)?
            .with_random(random);
    Ok(Arc::new(infos))
}

fn limit_infos(offset: usize, limit: usize, full_count: bool) -> Result<Arc<LimitExecutorInfos>> {
    Ok(Arc::new(LimitExecutorInfos::new(ExecutorInfos::pass_all(2), offset, limit, full_count)?))
}

#[test]
fn test_limit_over_enumeration() -> Result<()> {
    let context = Arc::new(QueryContext::new(QueryOptions::from_json(r#"{ "cursor_batch_size": 4 }"#)?));
    let trx = transaction_with(numbered_collection(10)?);
    let enumerate = create_enumerate_collection(ValuesBlockSource::integers(3), enumerate_infos(trx, false)?, context.clone());
    let mut limit = create_limit(enumerate, limit_infos(5, 12, true)?, context);

    let drained = drain(&mut limit, 7)?;
    let pairs: Vec<(i64, i64)> = drained
        .rows
        .iter()
        .map(|row| (row[0].as_integer().unwrap(), document_id(row, 1).unwrap()))
        .collect();
    let expected: Vec<(i64, i64)> = (0..3).flat_map(|i| (0..10).map(move |d| (i, d))).skip(5).take(12).collect();
    assert_eq!(pairs, expected);

    let total = limit.stats() + limit.executor().fetcher().upstream().stats();
    assert_eq!(total.full_count, 25);
    assert_eq!(total.scanned_full, 30);
    Ok(())
}

#[test]
fn test_pipeline_resumes_over_blocking_storage() -> Result<()> {
    let context = Arc::new(QueryContext::default());
    let trx = Arc::new(SlowStorage(transaction_with(numbered_collection(6)?)));
    let enumerate = create_enumerate_collection(ValuesBlockSource::integers(4), enumerate_infos(trx, true)?, context.clone());
    let mut limit = create_limit(enumerate, limit_infos(3, 100, true)?, context);

    let drained = drain(&mut limit, 5)?;
    assert!(drained.waits > 0);
    assert_eq!(drained.rows.len(), 21);
    assert_eq!(limit.stats().full_count, 21);

    // Random order per input row, but no row lost or duplicated
    let mut per_input = vec![0; 4];
    for row in &drained.rows {
        per_input[row[0].as_integer().unwrap() as usize] += 1;
    }
    assert_eq!(per_input.iter().sum::<usize>(), 21);
    assert_eq!(&per_input[1..], &[6, 6, 6]);
    Ok(())
}

#[test]
fn test_default_block_size_from_options() -> Result<()> {
    let options = QueryOptions::from_json(r#"{ "default_block_size": 4 }"#)?;
    let context = Arc::new(QueryContext::new(options));
    let trx = transaction_with(numbered_collection(10)?);
    let enumerate = create_enumerate_collection(ValuesBlockSource::integers(1), enumerate_infos(trx, false)?, context.clone());
    let mut limit = create_limit(enumerate, limit_infos(0, 10, false)?, context);

    let (state, block) = limit.get_some(0)?;
    assert_eq!(state, ExecutionState::HasMore);
    assert_eq!(block.map(|b| b.size()), Some(4));
    Ok(())
}

#[test]
fn test_kill_reaches_every_stage() -> Result<()> {
    let context = Arc::new(QueryContext::default());
    let trx = transaction_with(numbered_collection(100)?);
    let enumerate = create_enumerate_collection(ValuesBlockSource::integers(1), enumerate_infos(trx, false)?, context.clone());
    let mut limit = create_limit(enumerate, limit_infos(0, 50, false)?, context.clone());

    let (_, block) = limit.get_some(10)?;
    assert_eq!(block.map(|b| b.size()), Some(10));

    assert!(limit.executor().fetcher().upstream().executor().has_cursor());

    context.kill();
    assert!(matches!(limit.get_some(10), Err(QueryError::Killed)));
    // The enumeration is released without being called again
    assert!(!limit.executor().fetcher().upstream().executor().has_cursor());

    let upstream = limit.executor_mut().fetcher_mut().upstream_mut();
    assert!(matches!(upstream.fetch_block(10), Err(QueryError::Killed)));
    Ok(())
}
