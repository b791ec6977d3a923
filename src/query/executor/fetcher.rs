// Fetchers
//
// A fetcher pulls input for one executor from its upstream stage, either
// row by row or, for passthrough-capable stages, as whole blocks.

use log::trace;

use crate::common::types::RegisterId;
use crate::query::executor::block::{InputRow, ItemBlock, SharedItemBlock};
use crate::query::executor::result::{DataValue, QueryError, QueryResult};
use crate::query::executor::state::ExecutionState;

/// Upstream end of a stage: anything that hands out blocks.
pub trait BlockSource {
    /// Return at most `at_most` rows. `Waiting` carries no block.
    fn fetch_block(&mut self, at_most: usize) -> QueryResult<(ExecutionState, Option<SharedItemBlock>)>;

    /// Drop at most `at_most` rows without materializing them
    fn skip_some(&mut self, at_most: usize) -> QueryResult<(ExecutionState, usize)>;

    /// Rewind so the source can be pulled from again
    fn initialize_cursor(&mut self) -> QueryResult<()> {
        Ok(())
    }

    /// Release resources held between calls, here and further upstream
    fn shutdown(&mut self) {}
}

impl<S: BlockSource + ?Sized> BlockSource for Box<S> {
    fn fetch_block(&mut self, at_most: usize) -> QueryResult<(ExecutionState, Option<SharedItemBlock>)> {
        (**self).fetch_block(at_most)
    }

    fn skip_some(&mut self, at_most: usize) -> QueryResult<(ExecutionState, usize)> {
        (**self).skip_some(at_most)
    }

    fn initialize_cursor(&mut self) -> QueryResult<()> {
        (**self).initialize_cursor()
    }

    fn shutdown(&mut self) {
        (**self).shutdown()
    }
}

/// Row-by-row access to the upstream
pub trait Fetcher {
    /// Return the next input row. The final row comes with `Done`.
    fn fetch_row(&mut self, at_most: usize) -> QueryResult<(ExecutionState, Option<InputRow>)>;

    /// Skip at most `at_most` rows, returning how many were skipped
    fn skip_rows(&mut self, at_most: usize) -> QueryResult<(ExecutionState, usize)>;

    /// Forget buffered input and rewind the upstream
    fn reset(&mut self) -> QueryResult<()>;

    /// Drop buffered input and shut the upstream down
    fn shutdown(&mut self);
}

/// Fetcher that can also hand over whole upstream blocks
pub trait PassthroughFetcher: Fetcher {
    /// Return the next upstream block for reuse as output. `None` with
    /// `HasMore` means no block can be handed over right now and the caller
    /// should fall back to row-wise fetching.
    fn fetch_block_for_passthrough(&mut self, at_most: usize) -> QueryResult<(ExecutionState, Option<SharedItemBlock>)>;
}

/// The standard fetcher: buffers one upstream block and serves its rows.
pub struct SingleRowFetcher<S> {
    upstream: S,
    current: Option<SharedItemBlock>,
    row_index: usize,
    upstream_state: ExecutionState,
}

impl<S: BlockSource> SingleRowFetcher<S> {
    pub fn new(upstream: S) -> Self {
        SingleRowFetcher {
            upstream,
            current: None,
            row_index: 0,
            upstream_state: ExecutionState::HasMore,
        }
    }

    pub fn upstream(&self) -> &S {
        &self.upstream
    }

    pub fn upstream_mut(&mut self) -> &mut S {
        &mut self.upstream
    }

    fn buffered_rows(&self) -> usize {
        self.current
            .as_ref()
            .map_or(0, |block| block.size().saturating_sub(self.row_index))
    }

    fn local_state(&self) -> ExecutionState {
        if self.buffered_rows() == 0 && self.upstream_state == ExecutionState::Done {
            ExecutionState::Done
        } else {
            ExecutionState::HasMore
        }
    }

    /// Pull the next non-empty block from upstream. Returns the state to
    /// report if no block is available.
    fn refill(&mut self, at_most: usize) -> QueryResult<Option<ExecutionState>> {
        if self.upstream_state == ExecutionState::Done {
            return Ok(Some(ExecutionState::Done));
        }
        let (state, block) = self.upstream.fetch_block(at_most.max(1))?;
        if state == ExecutionState::Waiting {
            if block.is_some() {
                return Err(QueryError::ContractViolation(
                    "upstream returned a block together with WAITING".to_string(),
                ));
            }
            return Ok(Some(ExecutionState::Waiting));
        }
        self.upstream_state = state;
        self.row_index = 0;
        match block {
            Some(block) if !block.is_empty() => {
                trace!("Fetcher buffered block of {} rows ({})", block.size(), state);
                self.current = Some(block);
                Ok(None)
            }
            _ => {
                self.current = None;
                Ok(Some(state))
            }
        }
    }
}

impl<S: BlockSource> Fetcher for SingleRowFetcher<S> {
    fn fetch_row(&mut self, at_most: usize) -> QueryResult<(ExecutionState, Option<InputRow>)> {
        if self.buffered_rows() == 0 {
            if let Some(state) = self.refill(at_most)? {
                return Ok((state, None));
            }
        }
        let Some(block) = self.current.clone() else {
            return Err(QueryError::ContractViolation("fetcher lost its buffered block".to_string()));
        };
        let row = InputRow::new(block, self.row_index);
        self.row_index += 1;
        Ok((self.local_state(), Some(row)))
    }

    fn skip_rows(&mut self, at_most: usize) -> QueryResult<(ExecutionState, usize)> {
        let from_buffer = self.buffered_rows().min(at_most);
        self.row_index += from_buffer;
        if from_buffer == at_most || self.upstream_state == ExecutionState::Done {
            return Ok((self.local_state(), from_buffer));
        }

        let (state, skipped) = self.upstream.skip_some(at_most - from_buffer)?;
        if state == ExecutionState::Waiting {
            // Rows taken from the buffer still count as progress.
            let state = if from_buffer > 0 { ExecutionState::HasMore } else { ExecutionState::Waiting };
            return Ok((state, from_buffer));
        }
        self.upstream_state = state;
        Ok((state, from_buffer + skipped))
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.current = None;
        self.row_index = 0;
        self.upstream_state = ExecutionState::HasMore;
        self.upstream.initialize_cursor()
    }

    fn shutdown(&mut self) {
        self.current = None;
        self.row_index = 0;
        self.upstream.shutdown();
    }
}

impl<S: BlockSource> PassthroughFetcher for SingleRowFetcher<S> {
    fn fetch_block_for_passthrough(&mut self, at_most: usize) -> QueryResult<(ExecutionState, Option<SharedItemBlock>)> {
        let buffered = self.buffered_rows();
        if buffered > 0 {
            if buffered > at_most {
                return Ok((ExecutionState::HasMore, None));
            }
            let Some(block) = self.current.take() else {
                return Err(QueryError::ContractViolation("fetcher lost its buffered block".to_string()));
            };
            let rest = block.slice(self.row_index, block.size()).into_shared();
            self.current = Some(rest.clone());
            self.row_index = 0;
            return Ok((self.upstream_state, Some(rest)));
        }
        if self.upstream_state == ExecutionState::Done {
            return Ok((ExecutionState::Done, None));
        }

        let (state, block) = self.upstream.fetch_block(at_most.max(1))?;
        if state == ExecutionState::Waiting {
            return Ok((state, None));
        }
        self.upstream_state = state;
        self.row_index = 0;
        match block {
            Some(block) if !block.is_empty() => {
                if block.size() > at_most {
                    return Err(QueryError::ContractViolation(format!(
                        "upstream returned {} rows, at most {} requested",
                        block.size(),
                        at_most
                    )));
                }
                self.current = Some(block.clone());
                Ok((state, Some(block)))
            }
            _ => {
                self.current = None;
                Ok((state, None))
            }
        }
    }
}

/// Block source over a fixed list of rows. Serves as the pipeline's root
/// (for example the input rows of an enumeration) and as a test double.
#[derive(Debug)]
pub struct ValuesBlockSource {
    nr_registers: RegisterId,
    rows: Vec<Vec<DataValue>>,
    position: usize,
    max_block_size: usize,
    max_skip: usize,
    wait_before_each_call: bool,
    waited: bool,
    handed_out: Vec<SharedItemBlock>,
    calls: usize,
}

impl ValuesBlockSource {
    pub fn new(nr_registers: RegisterId, rows: Vec<Vec<DataValue>>) -> Self {
        ValuesBlockSource {
            nr_registers,
            rows,
            position: 0,
            max_block_size: usize::MAX,
            max_skip: usize::MAX,
            wait_before_each_call: false,
            waited: false,
            handed_out: Vec::new(),
            calls: 0,
        }
    }

    /// Single-register source with the integers `0..n`
    pub fn integers(n: usize) -> Self {
        Self::new(1, (0..n as i64).map(|i| vec![DataValue::Integer(i)]).collect())
    }

    /// Cap the size of the blocks handed out
    pub fn with_max_block_size(mut self, max_block_size: usize) -> Self {
        self.max_block_size = max_block_size.max(1);
        self
    }

    /// Cap the number of rows dropped by one `skip_some` call
    pub fn with_max_skip(mut self, max_skip: usize) -> Self {
        self.max_skip = max_skip.max(1);
        self
    }

    /// Answer every call with `Waiting` first, then with the real result
    pub fn waiting_before_each_call(mut self) -> Self {
        self.wait_before_each_call = true;
        self
    }

    /// Blocks returned by `fetch_block`, in order
    pub fn handed_out(&self) -> &[SharedItemBlock] {
        &self.handed_out
    }

    /// Number of non-waiting calls answered
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn remaining(&self) -> usize {
        self.rows.len() - self.position
    }

    fn should_wait(&mut self) -> bool {
        if self.wait_before_each_call && !self.waited {
            self.waited = true;
            return true;
        }
        self.waited = false;
        self.calls += 1;
        false
    }

    fn state(&self) -> ExecutionState {
        if self.remaining() == 0 {
            ExecutionState::Done
        } else {
            ExecutionState::HasMore
        }
    }
}

impl BlockSource for ValuesBlockSource {
    fn fetch_block(&mut self, at_most: usize) -> QueryResult<(ExecutionState, Option<SharedItemBlock>)> {
        if self.should_wait() {
            return Ok((ExecutionState::Waiting, None));
        }
        let count = self.remaining().min(at_most).min(self.max_block_size);
        if count == 0 {
            return Ok((self.state(), None));
        }
        let rows = self.rows[self.position..self.position + count].to_vec();
        self.position += count;
        let block = ItemBlock::from_rows(self.nr_registers, rows)?.into_shared();
        self.handed_out.push(block.clone());
        Ok((self.state(), Some(block)))
    }

    fn skip_some(&mut self, at_most: usize) -> QueryResult<(ExecutionState, usize)> {
        if self.should_wait() {
            return Ok((ExecutionState::Waiting, 0));
        }
        let count = self.remaining().min(at_most).min(self.max_skip);
        self.position += count;
        Ok((self.state(), count))
    }

    fn initialize_cursor(&mut self) -> QueryResult<()> {
        self.position = 0;
        self.waited = false;
        Ok(())
    }
}
