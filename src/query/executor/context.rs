// Query Context
//
// Per-query options and the abort flag shared by all stages of one query.

use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::common::types::{DEFAULT_BATCH_SIZE, MAX_BLOCK_SIZE};
use crate::query::executor::result::{QueryError, QueryResult};

/// Tunables of the pull pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    /// Rows per block allocated by the driver
    pub default_block_size: usize,
    /// Documents requested from a storage cursor per call
    pub cursor_batch_size: usize,
    /// Seconds the outer scheduler keeps retrying a collection that is not in sync
    pub satellite_sync_wait: f64,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            default_block_size: DEFAULT_BATCH_SIZE,
            cursor_batch_size: DEFAULT_BATCH_SIZE,
            satellite_sync_wait: 60.0,
        }
    }
}

impl QueryOptions {
    pub fn from_json(json: &str) -> QueryResult<Self> {
        let options: QueryOptions = serde_json::from_str(json)
            .map_err(|e| QueryError::InvalidConfiguration(format!("Failed to parse query options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> QueryResult<()> {
        if self.default_block_size == 0 || self.default_block_size > MAX_BLOCK_SIZE {
            return Err(QueryError::InvalidConfiguration(format!(
                "default_block_size must be within 1..={}, got {}",
                MAX_BLOCK_SIZE, self.default_block_size
            )));
        }
        if self.cursor_batch_size == 0 {
            return Err(QueryError::InvalidConfiguration("cursor_batch_size must be positive".to_string()));
        }
        Ok(())
    }
}

/// State shared by every stage of one query
#[derive(Debug, Default)]
pub struct QueryContext {
    options: QueryOptions,
    killed: AtomicBool,
}

impl QueryContext {
    pub fn new(options: QueryOptions) -> Self {
        QueryContext {
            options,
            killed: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Request abort. Stages observe it at their next call boundary.
    pub fn kill(&self) {
        debug!("Query kill requested");
        self.killed.store(true, Ordering::Release);
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }
}
