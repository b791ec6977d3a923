use std::sync::Arc;

use anyhow::Result;
use rand::Rng;

use bayun_pipeline::query::executor::fetcher::ValuesBlockSource;
use bayun_pipeline::query::executor::infos::ExecutorInfos;
use bayun_pipeline::query::executor::operators::{LimitExecutorInfos, create_limit};
use bayun_pipeline::{ExecutionState, QueryContext, QueryError};

#[path = "../common/mod.rs"]
mod common;
use common::drain;

fn limit_infos(offset: usize, limit: usize, full_count: bool) -> Result<Arc<LimitExecutorInfos>> {
    Ok(Arc::new(LimitExecutorInfos::new(ExecutorInfos::pass_all(1), offset, limit, full_count)?))
}

#[test]
fn test_limit_passes_upstream_blocks_through() -> Result<()> {
    let source = ValuesBlockSource::integers(10).with_max_block_size(4);
    let mut limit = create_limit(source, limit_infos(2, 5, false)?, Arc::new(QueryContext::default()));

    let drained = drain(&mut limit, 100)?;
    assert_eq!(drained.integers(0), vec![2, 3, 4, 5, 6]);

    // Offset rows were skipped upstream, every returned block is the
    // identical block the source handed out.
    let handed_out = limit.executor().fetcher().upstream().handed_out();
    assert_eq!(drained.blocks.len(), handed_out.len());
    for (returned, original) in drained.blocks.iter().zip(handed_out) {
        assert!(Arc::ptr_eq(returned, original));
    }
    Ok(())
}

#[test]
fn test_limit_respects_requested_block_size() -> Result<()> {
    let source = ValuesBlockSource::integers(10);
    let mut limit = create_limit(source, limit_infos(0, 10, false)?, Arc::new(QueryContext::default()));

    let drained = drain(&mut limit, 3)?;
    assert_eq!(drained.integers(0), (0..10).collect::<Vec<_>>());
    assert!(drained.blocks.iter().all(|block| block.size() <= 3));
    Ok(())
}

#[test]
fn test_zero_limit_counts_everything() -> Result<()> {
    let source = ValuesBlockSource::integers(5);
    let mut limit = create_limit(source, limit_infos(0, 0, true)?, Arc::new(QueryContext::default()));

    let drained = drain(&mut limit, 10)?;
    assert!(drained.rows.is_empty());
    assert_eq!(limit.stats().full_count, 5);
    Ok(())
}

#[test]
fn test_skip_then_get() -> Result<()> {
    let source = ValuesBlockSource::integers(10);
    let mut limit = create_limit(source, limit_infos(2, 5, false)?, Arc::new(QueryContext::default()));

    let (state, skipped) = limit.skip_some(3)?;
    assert_eq!((state, skipped), (ExecutionState::HasMore, 3));

    let drained = drain(&mut limit, 100)?;
    assert_eq!(drained.integers(0), vec![5, 6]);
    Ok(())
}

#[test]
fn test_random_block_sizes_with_waiting() -> Result<()> {
    let mut rng = rand::thread_rng();
    for _ in 0..50 {
        let n = rng.gen_range(0..40);
        let offset = rng.gen_range(0..10);
        let lim = rng.gen_range(0..15);
        let full_count = rng.gen_bool(0.5);
        let source = ValuesBlockSource::integers(n)
            .with_max_block_size(rng.gen_range(1..8))
            .waiting_before_each_call();
        let mut limit = create_limit(source, limit_infos(offset, lim, full_count)?, Arc::new(QueryContext::default()));

        let drained = drain(&mut limit, rng.gen_range(1..10))?;
        let expected: Vec<i64> = (offset..n.min(offset + lim)).map(|i| i as i64).collect();
        assert_eq!(drained.integers(0), expected, "n={} offset={} limit={}", n, offset, lim);
        assert!(drained.waits > 0 || n == 0 || (lim == 0 && !full_count));
        let expected_count = if full_count { n.saturating_sub(offset) } else { 0 };
        assert_eq!(limit.stats().full_count, expected_count);
    }
    Ok(())
}

#[test]
fn test_call_after_done_is_rejected() -> Result<()> {
    let source = ValuesBlockSource::integers(3);
    let mut limit = create_limit(source, limit_infos(0, 2, false)?, Arc::new(QueryContext::default()));
    drain(&mut limit, 10)?;

    let err = limit.get_some(10).unwrap_err();
    assert!(matches!(err, QueryError::ContractViolation(_)));
    assert!(err.is_fatal());

    // Reset makes the stage usable again
    limit.initialize_cursor()?;
    let drained = drain(&mut limit, 10)?;
    assert_eq!(drained.integers(0), vec![0, 1]);
    Ok(())
}

#[test]
fn test_kill_is_reported() -> Result<()> {
    let context = Arc::new(QueryContext::default());
    let source = ValuesBlockSource::integers(100).with_max_block_size(10);
    let mut limit = create_limit(source, limit_infos(0, 50, false)?, context.clone());

    let (state, block) = limit.get_some(10)?;
    assert_eq!(state, ExecutionState::HasMore);
    assert_eq!(block.map(|b| b.size()), Some(10));

    context.kill();
    assert!(matches!(limit.get_some(10), Err(QueryError::Killed)));
    assert!(matches!(limit.skip_some(10), Err(QueryError::Killed)));
    Ok(())
}
