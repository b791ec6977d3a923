use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;

use bayun_pipeline::query::executor::fetcher::ValuesBlockSource;
use bayun_pipeline::query::executor::infos::ExecutorInfos;
use bayun_pipeline::query::executor::operators::document_producer::covering_positions;
use bayun_pipeline::query::executor::operators::{EnumerateCollectionExecutorInfos, create_enumerate_collection};
use bayun_pipeline::storage::{Collection, ReplicationStatus};
use bayun_pipeline::{DataValue, ExecutionState, QueryContext, QueryError, QueryOptions, QueryResult};

#[path = "../common/mod.rs"]
mod common;
use common::{document_id, drain, numbered_collection, transaction_with};

fn infos(documents: usize, collection: Collection) -> Result<EnumerateCollectionExecutorInfos> {
    let trx = transaction_with(numbered_collection(documents)?);
    Ok(EnumerateCollectionExecutorInfos::new(
        ExecutorInfos::new(1, 2, [1], [], [0])?,
        1,
        collection,
        trx,
    )?)
}

/// Reports the collection out of sync for the first `polls` checks
struct SyncAfter {
    polls: AtomicUsize,
}

impl ReplicationStatus for SyncAfter {
    fn in_sync(&self, _collection: &Collection) -> QueryResult<bool> {
        Ok(self
            .polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_err())
    }
}

#[test]
fn test_enumeration_emits_every_pair() -> Result<()> {
    let context = Arc::new(QueryContext::new(QueryOptions::from_json(r#"{ "cursor_batch_size": 3 }"#)?));
    let infos = Arc::new(infos(7, Collection::new("docs"))?);
    let mut block = create_enumerate_collection(ValuesBlockSource::integers(4), infos, context);

    let drained = drain(&mut block, 5)?;
    assert_eq!(drained.rows.len(), 28);
    assert!(drained.blocks.iter().all(|b| b.size() <= 5));

    let pairs: Vec<(i64, i64)> = drained
        .rows
        .iter()
        .map(|row| (row[0].as_integer().unwrap(), document_id(row, 1).unwrap()))
        .collect();
    let expected: Vec<(i64, i64)> = (0..4).flat_map(|i| (0..7).map(move |d| (i, d))).collect();
    assert_eq!(pairs, expected);
    assert_eq!(block.stats().scanned_full, 28);
    Ok(())
}

#[test]
fn test_random_enumeration_same_multiset() -> Result<()> {
    let infos = Arc::new(infos(30, Collection::new("docs"))?.with_random(true));
    let mut block = create_enumerate_collection(ValuesBlockSource::integers(3), infos, Arc::new(QueryContext::default()));

    let drained = drain(&mut block, 16)?;
    for input in 0..3 {
        let mut ids: Vec<i64> = drained
            .rows
            .iter()
            .filter(|row| row[0].as_integer() == Some(input))
            .filter_map(|row| document_id(row, 1))
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..30).collect::<Vec<_>>());
    }
    Ok(())
}

#[test]
fn test_covering_index_through_driver() -> Result<()> {
    let collection = numbered_collection(4)?;
    let projections = vec!["tag".to_string()];
    let positions = covering_positions(collection.index_attributes(), &projections).unwrap_or_default();
    let infos = EnumerateCollectionExecutorInfos::new(
        ExecutorInfos::new(1, 2, [1], [], [0])?,
        1,
        Collection::new("docs"),
        transaction_with(collection),
    )?
    .with_projections(projections, positions)?;

    let mut block =
        create_enumerate_collection(ValuesBlockSource::integers(1), Arc::new(infos), Arc::new(QueryContext::default()));
    let drained = drain(&mut block, 100)?;
    assert_eq!(
        drained.rows[3][1],
        DataValue::object([("tag", DataValue::Text("t3".to_string()))])
    );
    assert_eq!(block.stats().scanned_index, 4);
    assert_eq!(block.stats().scanned_full, 0);
    Ok(())
}

#[test]
fn test_satellite_readiness_is_polled() -> Result<()> {
    let replication = Arc::new(SyncAfter { polls: AtomicUsize::new(3) });
    let infos = infos(2, Collection::satellite("docs"))?.with_replication(replication);
    let mut block =
        create_enumerate_collection(ValuesBlockSource::integers(2), Arc::new(infos), Arc::new(QueryContext::default()));

    for _ in 0..3 {
        let (state, rows) = block.get_some(10)?;
        assert_eq!(state, ExecutionState::Waiting);
        assert!(rows.is_none());
    }
    let drained = drain(&mut block, 10)?;
    assert_eq!(drained.rows.len(), 4);
    assert_eq!(drained.waits, 0);
    Ok(())
}

#[test]
fn test_skip_some_matches_produced_rows() -> Result<()> {
    let infos = Arc::new(infos(5, Collection::new("docs"))?.with_random(true));
    let mut block = create_enumerate_collection(ValuesBlockSource::integers(3), infos, Arc::new(QueryContext::default()));

    let (state, skipped) = block.skip_some(7)?;
    assert_eq!((state, skipped), (ExecutionState::HasMore, 7));
    let drained = drain(&mut block, 100)?;
    assert_eq!(drained.rows.len(), 8);
    assert_eq!(block.stats().scanned_full, 15);
    Ok(())
}

#[test]
fn test_kill_releases_cursor() -> Result<()> {
    let context = Arc::new(QueryContext::default());
    let infos = Arc::new(infos(50, Collection::new("docs"))?);
    let mut block = create_enumerate_collection(ValuesBlockSource::integers(1), infos, context.clone());

    let (state, rows) = block.get_some(10)?;
    assert_eq!(state, ExecutionState::HasMore);
    assert_eq!(rows.map(|b| b.size()), Some(10));
    assert!(block.executor().has_cursor());

    context.kill();
    assert!(matches!(block.get_some(10), Err(QueryError::Killed)));
    assert!(!block.executor().has_cursor());
    Ok(())
}
