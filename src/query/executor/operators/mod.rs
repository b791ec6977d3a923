// Query Operators Module
//
// This module defines the executor contract of the pull-based pipeline and
// the stage implementations.

pub mod document_producer;
pub mod enumerate_collection;
pub mod limit;

pub use self::enumerate_collection::{EnumerateCollectionExecutor, EnumerateCollectionExecutorInfos};
pub use self::limit::{LimitExecutor, LimitExecutorInfos};

use std::sync::Arc;

use log::debug;

use crate::query::executor::block::SharedItemBlock;
use crate::query::executor::context::QueryContext;
use crate::query::executor::engine::ExecutionBlock;
use crate::query::executor::fetcher::{BlockSource, SingleRowFetcher};
use crate::query::executor::infos::ExecutorInfos;
use crate::query::executor::output::OutputRow;
use crate::query::executor::result::{QueryError, QueryResult};
use crate::query::executor::state::ExecutionState;
use crate::query::executor::stats::ExecutorStats;

/// Static capabilities of an executor kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorProperties {
    pub preserves_order: bool,
    /// Output cardinality equals input cardinality, so upstream blocks can be
    /// reused as output without copying
    pub allows_block_passthrough: bool,
    pub input_size_restricts_output_size: bool,
}

/// The Executor trait defines the interface for all stages of the pull
/// pipeline. Each call either makes progress, reports `Waiting` with no state
/// lost, or reports `Done`.
pub trait Executor {
    type Infos;
    type Stats: ExecutorStats;

    const PROPERTIES: ExecutorProperties;

    /// Name used in log messages
    fn name(&self) -> &'static str;

    fn infos(&self) -> &Self::Infos;

    /// Register layout of the rows this stage writes
    fn register_infos(&self) -> &Arc<ExecutorInfos>;

    /// Write zero or more rows into `output`
    fn produce_rows(&mut self, output: &mut OutputRow) -> QueryResult<(ExecutionState, Self::Stats)>;

    /// Skip at most `at_most` rows, returning how many count as skipped
    fn skip_rows(&mut self, at_most: usize) -> QueryResult<(ExecutionState, Self::Stats, usize)>;

    /// Hand back an upstream block unchanged. Only meaningful when
    /// `PROPERTIES.allows_block_passthrough` is set.
    fn fetch_block_for_passthrough(
        &mut self,
        _at_most: usize,
    ) -> QueryResult<(ExecutionState, Self::Stats, Option<SharedItemBlock>)> {
        Err(QueryError::ContractViolation(format!(
            "{} does not allow block passthrough",
            self.name()
        )))
    }

    /// Reset to the initial state, rewinding the upstream
    fn initialize_cursor(&mut self) -> QueryResult<()>;

    /// Release resources held between calls, including those of the
    /// upstream stages
    fn shutdown(&mut self);
}

/// Create a driver for a limit stage on top of `upstream`
pub fn create_limit<S: BlockSource>(
    upstream: S,
    infos: Arc<LimitExecutorInfos>,
    context: Arc<QueryContext>,
) -> ExecutionBlock<LimitExecutor<SingleRowFetcher<S>>> {
    ExecutionBlock::new(LimitExecutor::new(SingleRowFetcher::new(upstream), infos), context)
}

/// Create a driver for a collection enumeration on top of `upstream`
pub fn create_enumerate_collection<S: BlockSource>(
    upstream: S,
    infos: Arc<EnumerateCollectionExecutorInfos>,
    context: Arc<QueryContext>,
) -> ExecutionBlock<EnumerateCollectionExecutor<SingleRowFetcher<S>>> {
    let batch_size = context.options().cursor_batch_size;
    if infos.collection().is_satellite() {
        debug!(
            "Enumerating satellite collection {}, readiness polled for up to {}s",
            infos.collection(),
            context.options().satellite_sync_wait
        );
    }
    ExecutionBlock::new(
        EnumerateCollectionExecutor::new(SingleRowFetcher::new(upstream), infos, batch_size),
        context,
    )
}
