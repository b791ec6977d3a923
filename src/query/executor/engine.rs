// Execution Engine
//
// Generic driver around one executor. It allocates output blocks (or adopts
// passthrough blocks), calls the executor until a block is complete, keeps
// partial work across WAITING and accumulates stats for the pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, trace};

use crate::common::types::MAX_BLOCK_SIZE;
use crate::query::executor::block::{ItemBlock, SharedItemBlock};
use crate::query::executor::context::QueryContext;
use crate::query::executor::fetcher::BlockSource;
use crate::query::executor::operators::Executor;
use crate::query::executor::output::OutputRow;
use crate::query::executor::result::{QueryError, QueryResult};
use crate::query::executor::state::ExecutionState;
use crate::query::executor::stats::ExecutionStats;

static NEXT_BLOCK_ID: AtomicUsize = AtomicUsize::new(0);

/// Drives one executor and exposes it as a block source to the next stage.
pub struct ExecutionBlock<E: Executor> {
    executor: E,
    context: Arc<QueryContext>,
    state: ExecutionState,
    stats: ExecutionStats,
    /// Block under construction, kept across WAITING
    output: Option<OutputRow>,
    block_id: usize,
}

impl<E: Executor> ExecutionBlock<E> {
    pub fn new(executor: E, context: Arc<QueryContext>) -> Self {
        let block_id = NEXT_BLOCK_ID.fetch_add(1, Ordering::SeqCst);
        debug!("Created execution block {} for {}", block_id, executor.name());
        ExecutionBlock {
            executor,
            context,
            state: ExecutionState::HasMore,
            stats: ExecutionStats::default(),
            output: None,
            block_id,
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    /// Stats accumulated over all calls since construction
    pub fn stats(&self) -> ExecutionStats {
        self.stats
    }

    /// State reported by the last completed call
    pub fn state(&self) -> ExecutionState {
        self.state
    }

    fn check_call(&mut self) -> QueryResult<()> {
        if self.context.is_killed() {
            debug!("Execution block {} ({}) observed kill", self.block_id, self.executor.name());
            self.shutdown();
            return Err(QueryError::Killed);
        }
        if self.state == ExecutionState::Done && self.output.is_none() {
            return Err(QueryError::ContractViolation(format!(
                "{} called after DONE without initialize_cursor",
                self.executor.name()
            )));
        }
        Ok(())
    }

    fn block_size(&self, at_most: usize) -> usize {
        if at_most == 0 {
            self.context.options().default_block_size
        } else {
            at_most.min(MAX_BLOCK_SIZE)
        }
    }

    fn prepare_output(&mut self, at_most: usize) -> QueryResult<Option<ExecutionState>> {
        if self.output.is_some() {
            return Ok(None);
        }
        let infos = self.executor.register_infos().clone();
        if E::PROPERTIES.allows_block_passthrough {
            let (state, stats, block) = self.executor.fetch_block_for_passthrough(at_most)?;
            self.stats.merge(stats);
            match (state, block) {
                (ExecutionState::Waiting, _) => return Ok(Some(ExecutionState::Waiting)),
                (_, Some(block)) => {
                    trace!("Execution block {} passes through {} rows", self.block_id, block.size());
                    self.output = Some(OutputRow::passthrough(block, infos)?);
                    return Ok(None);
                }
                (ExecutionState::Done, None) => return Ok(Some(ExecutionState::Done)),
                (ExecutionState::HasMore, None) => {
                    trace!("Execution block {} falls back to copying rows", self.block_id);
                }
            }
        }
        let block = ItemBlock::new(at_most, infos.nr_output_registers());
        self.output = Some(OutputRow::new(block, infos)?);
        Ok(None)
    }

    /// Produce up to `at_most` rows (the configured default if zero).
    pub fn get_some(&mut self, at_most: usize) -> QueryResult<(ExecutionState, Option<SharedItemBlock>)> {
        self.check_call()?;
        let at_most = self.block_size(at_most);

        if let Some(state) = self.prepare_output(at_most)? {
            if state == ExecutionState::Done {
                self.state = state;
                debug!("Execution block {} ({}) is done", self.block_id, self.executor.name());
            }
            return Ok((state, None));
        }

        let mut state = ExecutionState::HasMore;
        if let Some(output) = self.output.as_mut() {
            while !output.is_full() {
                let (call_state, stats) = self.executor.produce_rows(output)?;
                self.stats.merge(stats);
                if output.produced() {
                    output.advance_row()?;
                }
                state = call_state;
                match call_state {
                    ExecutionState::Waiting => return Ok((ExecutionState::Waiting, None)),
                    ExecutionState::Done => break,
                    ExecutionState::HasMore => {}
                }
            }
        }

        let block = self.output.take().and_then(OutputRow::into_block);
        self.state = state;
        if state == ExecutionState::Done {
            debug!("Execution block {} ({}) is done", self.block_id, self.executor.name());
        }
        Ok((state, block))
    }

    /// Skip up to `at_most` rows
    pub fn skip_some(&mut self, at_most: usize) -> QueryResult<(ExecutionState, usize)> {
        self.check_call()?;
        if self.output.is_some() {
            return Err(QueryError::ContractViolation(format!(
                "{} asked to skip while a block is being produced",
                self.executor.name()
            )));
        }

        let mut skipped_total = 0;
        let mut state = ExecutionState::HasMore;
        while skipped_total < at_most {
            let (call_state, stats, skipped) = self.executor.skip_rows(at_most - skipped_total)?;
            self.stats.merge(stats);
            skipped_total += skipped;
            state = call_state;
            match call_state {
                ExecutionState::Waiting => {
                    if skipped_total == 0 {
                        return Ok((ExecutionState::Waiting, 0));
                    }
                    state = ExecutionState::HasMore;
                    break;
                }
                ExecutionState::Done => break,
                ExecutionState::HasMore => {}
            }
        }
        self.state = state;
        Ok((state, skipped_total))
    }

    /// Release the resources of this stage and everything upstream of it
    pub fn shutdown(&mut self) {
        self.executor.shutdown();
        self.output = None;
    }

    /// Reset this stage and everything upstream of it
    pub fn initialize_cursor(&mut self) -> QueryResult<()> {
        debug!("Execution block {} ({}) initializes cursor", self.block_id, self.executor.name());
        self.executor.initialize_cursor()?;
        self.output = None;
        self.state = ExecutionState::HasMore;
        Ok(())
    }
}

impl<E: Executor> BlockSource for ExecutionBlock<E> {
    fn fetch_block(&mut self, at_most: usize) -> QueryResult<(ExecutionState, Option<SharedItemBlock>)> {
        self.get_some(at_most)
    }

    fn skip_some(&mut self, at_most: usize) -> QueryResult<(ExecutionState, usize)> {
        ExecutionBlock::skip_some(self, at_most)
    }

    fn initialize_cursor(&mut self) -> QueryResult<()> {
        ExecutionBlock::initialize_cursor(self)
    }

    fn shutdown(&mut self) {
        ExecutionBlock::shutdown(self)
    }
}
