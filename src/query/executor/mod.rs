// Query Executor Module
//
// This module implements the pull-based, resumable execution pipeline:
// blocks and rows, fetchers, the executor contract and the generic driver.

pub mod block;
pub mod context;
pub mod engine;
pub mod fetcher;
pub mod infos;
pub mod operators;
pub mod output;
pub mod result;
pub mod state;
pub mod stats;

// Export key types
pub use self::block::{InputRow, ItemBlock, SharedItemBlock};
pub use self::context::{QueryContext, QueryOptions};
pub use self::engine::ExecutionBlock;
pub use self::fetcher::{BlockSource, Fetcher, PassthroughFetcher, SingleRowFetcher, ValuesBlockSource};
pub use self::infos::ExecutorInfos;
pub use self::operators::Executor;
pub use self::output::OutputRow;
pub use self::result::{DataValue, QueryError, QueryResult};
pub use self::state::ExecutionState;
pub use self::stats::ExecutionStats;
