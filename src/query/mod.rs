// Bayun Pipeline Query Module
//
// Query execution: the executor pipeline and its stages.

pub mod executor;

// Export key public interfaces
pub use executor::engine::ExecutionBlock;
pub use executor::result::{QueryError, QueryResult};
