// Enumerate Collection Operator
//
// Nested loop over input rows and the documents of one collection: every
// input row is joined with every document. The cursor is opened once and
// reset for each new input row.

use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, trace};

use crate::common::types::{DEFAULT_BATCH_SIZE, RegisterId};
use crate::query::executor::block::InputRow;
use crate::query::executor::fetcher::Fetcher;
use crate::query::executor::infos::ExecutorInfos;
use crate::query::executor::operators::document_producer::{
    DocumentProducingFunction, DocumentProducingFunctionContext, build_document_producer,
};
use crate::query::executor::operators::{Executor, ExecutorProperties};
use crate::query::executor::output::OutputRow;
use crate::query::executor::result::{QueryError, QueryResult};
use crate::query::executor::state::ExecutionState;
use crate::query::executor::stats::EnumerateCollectionStats;
use crate::storage::{
    AlwaysInSync, Collection, CursorBatch, CursorEntry, CursorOptions, CursorType, OperationCursor,
    ReplicationStatus, TransactionMethods,
};

/// Configuration of a collection enumeration
pub struct EnumerateCollectionExecutorInfos {
    registers: Arc<ExecutorInfos>,
    collection: Collection,
    trx: Arc<dyn TransactionMethods>,
    replication: Arc<dyn ReplicationStatus>,
    producer_context: DocumentProducingFunctionContext,
    random: bool,
}

impl EnumerateCollectionExecutorInfos {
    /// Enumerate `collection` into `output_register`, which must be the only
    /// register the stage writes.
    pub fn new(
        registers: ExecutorInfos,
        output_register: RegisterId,
        collection: Collection,
        trx: Arc<dyn TransactionMethods>,
    ) -> QueryResult<Self> {
        let outputs = registers.output_registers();
        if outputs.len() != 1 || !outputs.contains(&output_register) {
            return Err(QueryError::InvalidConfiguration(format!(
                "enumeration of {} must write exactly register {}",
                collection, output_register
            )));
        }
        Ok(EnumerateCollectionExecutorInfos {
            registers: Arc::new(registers),
            collection,
            trx,
            replication: Arc::new(AlwaysInSync),
            producer_context: DocumentProducingFunctionContext::new(output_register, true, Vec::new(), Vec::new())?,
            random: false,
        })
    }

    /// Only materialize `projections`. Non-empty `covering_positions` give
    /// the position of each projection within the collection's covering index.
    pub fn with_projections(mut self, projections: Vec<String>, covering_positions: Vec<usize>) -> QueryResult<Self> {
        if !covering_positions.is_empty() {
            let index_attributes = self.trx.index_attributes(&self.collection)?;
            for (projection, &position) in projections.iter().zip(&covering_positions) {
                if index_attributes.get(position) != Some(projection) {
                    return Err(QueryError::InvalidConfiguration(format!(
                        "position {} of the index on {} does not cover {}",
                        position, self.collection, projection
                    )));
                }
            }
        }
        self.producer_context = DocumentProducingFunctionContext::new(
            self.producer_context.output_register(),
            self.producer_context.produce_result(),
            projections,
            covering_positions,
        )?;
        Ok(self)
    }

    /// Write `null` instead of documents when the result is never read
    pub fn with_produce_result(mut self, produce_result: bool) -> QueryResult<Self> {
        self.producer_context = DocumentProducingFunctionContext::new(
            self.producer_context.output_register(),
            produce_result,
            self.producer_context.projections().to_vec(),
            self.producer_context.covering_index_attribute_positions().to_vec(),
        )?;
        Ok(self)
    }

    pub fn with_random(mut self, random: bool) -> Self {
        self.random = random;
        self
    }

    pub fn with_replication(mut self, replication: Arc<dyn ReplicationStatus>) -> Self {
        self.replication = replication;
        self
    }

    pub fn registers(&self) -> &Arc<ExecutorInfos> {
        &self.registers
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn output_register(&self) -> RegisterId {
        self.producer_context.output_register()
    }

    pub fn produce_result(&self) -> bool {
        self.producer_context.produce_result()
    }

    pub fn projections(&self) -> &[String] {
        self.producer_context.projections()
    }

    pub fn covering_index_attribute_positions(&self) -> &[usize] {
        self.producer_context.covering_index_attribute_positions()
    }

    pub fn random(&self) -> bool {
        self.random
    }

    pub fn producer_context(&self) -> &DocumentProducingFunctionContext {
        &self.producer_context
    }
}

/// Outcome of pulling one entry from the cursor
enum CursorPoll {
    Entry(CursorEntry),
    Waiting,
    /// The cursor returned an empty batch but is not exhausted
    Empty,
    Exhausted,
}

/// Collection enumeration executor
pub struct EnumerateCollectionExecutor<F> {
    infos: Arc<EnumerateCollectionExecutorInfos>,
    fetcher: F,
    producer_context: DocumentProducingFunctionContext,
    document_producer: DocumentProducingFunction,
    cursor: Option<Box<dyn OperationCursor>>,
    /// Entries read from the cursor but not yet emitted
    buffer: VecDeque<CursorEntry>,
    input: Option<InputRow>,
    /// Number of input rows bound so far
    bound_inputs: usize,
    upstream_state: ExecutionState,
    satellites_ready: bool,
    batch_size: usize,
}

impl<F: Fetcher> EnumerateCollectionExecutor<F> {
    pub fn new(fetcher: F, infos: Arc<EnumerateCollectionExecutorInfos>, batch_size: usize) -> Self {
        let mut producer_context = infos.producer_context().clone();
        producer_context.set_allow_covering_index_optimization(true);
        let document_producer = build_document_producer(&producer_context);
        EnumerateCollectionExecutor {
            infos,
            fetcher,
            producer_context,
            document_producer,
            cursor: None,
            buffer: VecDeque::new(),
            input: None,
            bound_inputs: 0,
            upstream_state: ExecutionState::HasMore,
            satellites_ready: false,
            batch_size: batch_size.max(1),
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Whether a cursor is currently open
    pub fn has_cursor(&self) -> bool {
        self.cursor.is_some()
    }

    fn cursor_has_more(&self) -> bool {
        !self.buffer.is_empty() || self.cursor.as_ref().is_some_and(|cursor| cursor.has_more())
    }

    fn cursor_options(&self) -> CursorOptions {
        CursorOptions {
            cursor_type: if self.infos.random() { CursorType::Any } else { CursorType::All },
            produce_index_entries: self.producer_context.uses_covering_index(),
        }
    }

    /// Poll the replication status of a satellite collection. Once in sync it
    /// stays in sync for the lifetime of the executor.
    fn wait_for_satellites(&mut self) -> QueryResult<bool> {
        if self.satellites_ready || !self.infos.collection().is_satellite() {
            return Ok(true);
        }
        if self.infos.replication.in_sync(self.infos.collection())? {
            debug!("Satellite collection {} is in sync", self.infos.collection());
            self.satellites_ready = true;
            return Ok(true);
        }
        trace!("Satellite collection {} not yet in sync", self.infos.collection());
        Ok(false)
    }

    /// Bind the executor to a new input row and restart the cursor
    fn bind_input(&mut self, input: InputRow) -> QueryResult<()> {
        self.buffer.clear();
        match self.cursor.as_mut() {
            Some(cursor) => cursor.reset(),
            None => {
                let options = self.cursor_options();
                self.cursor = Some(self.infos.trx.open_cursor(self.infos.collection(), options)?);
            }
        }
        self.input = Some(input);
        self.bound_inputs += 1;
        Ok(())
    }

    /// `Waiting` after an input row was bound in this call is reported as
    /// `HasMore`, so `Waiting` always means nothing changed.
    fn pause_if_waiting(&self, state: ExecutionState, inputs_before: usize) -> ExecutionState {
        if state == ExecutionState::Waiting && self.bound_inputs != inputs_before {
            ExecutionState::HasMore
        } else {
            state
        }
    }

    /// Make sure a cursor with more documents is bound to an input row.
    /// Returns the state to report if that is not possible right now.
    fn ensure_input(&mut self) -> QueryResult<Option<ExecutionState>> {
        if self.cursor_has_more() {
            return Ok(None);
        }
        if self.upstream_state == ExecutionState::Done {
            return Ok(Some(ExecutionState::Done));
        }
        if !self.wait_for_satellites()? {
            return Ok(Some(ExecutionState::Waiting));
        }
        let (state, input) = self.fetcher.fetch_row(DEFAULT_BATCH_SIZE)?;
        if state == ExecutionState::Waiting {
            return Ok(Some(state));
        }
        self.upstream_state = state;
        match input {
            Some(input) => {
                self.bind_input(input)?;
                Ok(None)
            }
            None => Ok(Some(state)),
        }
    }

    fn read_batch(&mut self, batch_size: usize, stats: &mut EnumerateCollectionStats) -> QueryResult<CursorPoll> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(CursorPoll::Exhausted);
        };
        if !cursor.has_more() {
            return Ok(CursorPoll::Exhausted);
        }
        match cursor.next_batch(batch_size)? {
            CursorBatch::Waiting => Ok(CursorPoll::Waiting),
            CursorBatch::Ready(entries) => {
                for entry in &entries {
                    match entry {
                        CursorEntry::Document { .. } => stats.incr_scanned(1),
                        CursorEntry::IndexEntry { .. } => stats.incr_scanned_index(1),
                    }
                }
                self.buffer.extend(entries);
                Ok(match self.buffer.pop_front() {
                    Some(entry) => CursorPoll::Entry(entry),
                    None if cursor.has_more() => CursorPoll::Empty,
                    None => CursorPoll::Exhausted,
                })
            }
        }
    }

    fn next_entry(&mut self, stats: &mut EnumerateCollectionStats) -> QueryResult<CursorPoll> {
        match self.buffer.pop_front() {
            Some(entry) => Ok(CursorPoll::Entry(entry)),
            None => self.read_batch(self.batch_size, stats),
        }
    }

    fn skip_pause(&self, skipped: usize, inputs_before: usize) -> ExecutionState {
        if skipped > 0 {
            ExecutionState::HasMore
        } else {
            self.pause_if_waiting(ExecutionState::Waiting, inputs_before)
        }
    }

    fn current_state(&self) -> ExecutionState {
        if !self.cursor_has_more() && self.upstream_state == ExecutionState::Done {
            ExecutionState::Done
        } else {
            ExecutionState::HasMore
        }
    }
}

impl<F: Fetcher> Executor for EnumerateCollectionExecutor<F> {
    type Infos = EnumerateCollectionExecutorInfos;
    type Stats = EnumerateCollectionStats;

    const PROPERTIES: ExecutorProperties = ExecutorProperties {
        preserves_order: true,
        allows_block_passthrough: false,
        input_size_restricts_output_size: false,
    };

    fn name(&self) -> &'static str {
        "EnumerateCollectionExecutor"
    }

    fn infos(&self) -> &EnumerateCollectionExecutorInfos {
        &self.infos
    }

    fn register_infos(&self) -> &Arc<ExecutorInfos> {
        self.infos.registers()
    }

    fn produce_rows(&mut self, output: &mut OutputRow) -> QueryResult<(ExecutionState, EnumerateCollectionStats)> {
        let inputs_before = self.bound_inputs;
        let mut stats = EnumerateCollectionStats::default();
        loop {
            if let Some(state) = self.ensure_input()? {
                return Ok((self.pause_if_waiting(state, inputs_before), stats));
            }
            match self.next_entry(&mut stats)? {
                CursorPoll::Entry(entry) => {
                    let Some(input) = self.input.as_ref() else {
                        return Err(QueryError::ContractViolation(
                            "cursor open without an input row".to_string(),
                        ));
                    };
                    (self.document_producer)(&self.producer_context, entry, input, output)?;
                    return Ok((self.current_state(), stats));
                }
                CursorPoll::Waiting => {
                    return Ok((self.pause_if_waiting(ExecutionState::Waiting, inputs_before), stats));
                }
                CursorPoll::Empty => return Ok((ExecutionState::HasMore, stats)),
                // Next input row
                CursorPoll::Exhausted => {}
            }
        }
    }

    fn skip_rows(&mut self, at_most: usize) -> QueryResult<(ExecutionState, EnumerateCollectionStats, usize)> {
        let inputs_before = self.bound_inputs;
        let mut stats = EnumerateCollectionStats::default();
        let mut skipped = 0;

        while skipped < at_most {
            match self.ensure_input()? {
                Some(ExecutionState::Waiting) => {
                    return Ok((self.skip_pause(skipped, inputs_before), stats, skipped));
                }
                Some(state) => return Ok((state, stats, skipped)),
                None => {}
            }

            let from_buffer = self.buffer.len().min(at_most - skipped);
            self.buffer.drain(..from_buffer);
            skipped += from_buffer;
            if skipped == at_most {
                break;
            }

            match self.read_batch((at_most - skipped).min(self.batch_size), &mut stats)? {
                CursorPoll::Entry(_) => {
                    // read_batch hands out the first entry of the batch,
                    // the rest stays buffered for the next round.
                    skipped += 1;
                }
                CursorPoll::Waiting => return Ok((self.skip_pause(skipped, inputs_before), stats, skipped)),
                CursorPoll::Empty => return Ok((ExecutionState::HasMore, stats, skipped)),
                CursorPoll::Exhausted => {}
            }
        }
        trace!("EnumerateCollectionExecutor skipped {} rows", skipped);
        Ok((self.current_state(), stats, skipped))
    }

    fn initialize_cursor(&mut self) -> QueryResult<()> {
        self.cursor = None;
        self.buffer.clear();
        self.input = None;
        self.upstream_state = ExecutionState::HasMore;
        self.fetcher.reset()
    }

    fn shutdown(&mut self) {
        if self.cursor.take().is_some() {
            debug!("Released cursor on {}", self.infos.collection());
        }
        self.buffer.clear();
        self.fetcher.shutdown();
    }
}
