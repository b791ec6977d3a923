// Bayun Pipeline
//
// Pull-based, resumable query execution over collections of documents.

pub mod common;
pub mod query;
pub mod storage;

// Re-export key items for convenient access
pub use query::executor::context::{QueryContext, QueryOptions};
pub use query::executor::engine::ExecutionBlock;
pub use query::executor::operators::{
    EnumerateCollectionExecutor, EnumerateCollectionExecutorInfos, LimitExecutor, LimitExecutorInfos,
    create_enumerate_collection, create_limit,
};
pub use query::executor::result::{DataValue, QueryError, QueryResult};
pub use query::executor::state::ExecutionState;
pub use query::executor::stats::ExecutionStats;
pub use storage::{Collection, MemoryCollection, MemoryTransaction};
