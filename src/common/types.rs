/// Register (column slot) index within a block
pub type RegisterId = usize;

/// Identifier of a document inside a collection
pub type DocumentId = u64;

/// Default number of rows requested from upstream per call
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Upper bound for a single block allocation
pub const MAX_BLOCK_SIZE: usize = 10_000;
