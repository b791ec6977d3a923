// Limit Operator
//
// Skips `offset` input rows, returns the next `limit` rows and, with full
// count enabled, keeps consuming input to count every row past the offset.

use std::sync::Arc;

use log::trace;

use crate::common::types::DEFAULT_BATCH_SIZE;
use crate::query::executor::block::{InputRow, SharedItemBlock};
use crate::query::executor::fetcher::PassthroughFetcher;
use crate::query::executor::infos::ExecutorInfos;
use crate::query::executor::operators::{Executor, ExecutorProperties};
use crate::query::executor::output::OutputRow;
use crate::query::executor::result::{QueryError, QueryResult};
use crate::query::executor::state::ExecutionState;
use crate::query::executor::stats::LimitStats;

/// Configuration of a limit stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitExecutorInfos {
    registers: Arc<ExecutorInfos>,
    offset: usize,
    limit: usize,
    full_count: bool,
}

impl LimitExecutorInfos {
    pub fn new(registers: ExecutorInfos, offset: usize, limit: usize, full_count: bool) -> QueryResult<Self> {
        if !registers.output_registers().is_empty()
            || registers.nr_input_registers() != registers.nr_output_registers()
        {
            return Err(QueryError::InvalidConfiguration(
                "limit passes rows through and must not write registers".to_string(),
            ));
        }
        if offset.checked_add(limit).is_none() {
            return Err(QueryError::InvalidConfiguration(format!(
                "offset {} plus limit {} overflows",
                offset, limit
            )));
        }
        Ok(LimitExecutorInfos {
            registers: Arc::new(registers),
            offset,
            limit,
            full_count,
        })
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn limit_plus_offset(&self) -> usize {
        self.offset + self.limit
    }

    pub fn is_full_count_enabled(&self) -> bool {
        self.full_count
    }

    pub fn registers(&self) -> &Arc<ExecutorInfos> {
        &self.registers
    }
}

/// Phase of the limit stage, derived from the row counter on every call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitState {
    /// Still consuming the offset
    Skipping,
    /// Returning rows, more than one left before the limit
    Returning,
    /// The next row returned is the last one within the limit
    ReturningLastRow,
    /// Limit reached, counting the remaining input for the full count
    Counting,
    /// Limit reached and nothing left to do
    LimitReached,
}

/// Limit executor
pub struct LimitExecutor<F> {
    infos: Arc<LimitExecutorInfos>,
    fetcher: F,
    /// Final row, held back while the rest of the input is counted
    last_row_to_output: Option<InputRow>,
    state_of_last_row_to_output: ExecutionState,
    /// Number of input rows seen, never beyond offset + limit
    counter: usize,
}

impl<F: PassthroughFetcher> LimitExecutor<F> {
    pub fn new(fetcher: F, infos: Arc<LimitExecutorInfos>) -> Self {
        LimitExecutor {
            infos,
            fetcher,
            last_row_to_output: None,
            state_of_last_row_to_output: ExecutionState::HasMore,
            counter: 0,
        }
    }

    pub fn counter(&self) -> usize {
        self.counter
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn fetcher_mut(&mut self) -> &mut F {
        &mut self.fetcher
    }

    /// Derive the phase from the counter. Offset and limit may both be zero,
    /// so the order of the checks matters.
    pub fn current_state(&self) -> LimitState {
        if self.counter < self.infos.offset() {
            LimitState::Skipping
        } else if self.counter + 1 == self.infos.limit_plus_offset() {
            LimitState::ReturningLastRow
        } else if self.counter < self.infos.limit_plus_offset() {
            LimitState::Returning
        } else if self.infos.is_full_count_enabled() {
            LimitState::Counting
        } else {
            LimitState::LimitReached
        }
    }

    fn max_rows_left_to_fetch(&self) -> QueryResult<usize> {
        self.infos
            .limit_plus_offset()
            .checked_sub(self.counter)
            .ok_or_else(|| {
                QueryError::ContractViolation(format!(
                    "limit counter {} exceeds offset plus limit {}",
                    self.counter,
                    self.infos.limit_plus_offset()
                ))
            })
    }

    fn max_rows_left_to_skip(&self) -> usize {
        self.infos.offset().saturating_sub(self.counter)
    }

    /// Consume offset rows. They are never reported as skipped.
    fn skip_offset(&mut self) -> QueryResult<(ExecutionState, LimitStats)> {
        let (state, skipped) = self.fetcher.skip_rows(self.max_rows_left_to_skip())?;
        debug_assert!(state != ExecutionState::Waiting || skipped == 0);
        self.counter += skipped;
        trace!("LimitExecutor skipped {} offset rows ({})", skipped, state);
        Ok((state, LimitStats::default()))
    }

    /// Consume the rest of the input, counting it. Returns `Waiting` or `Done`.
    fn skip_rest_for_full_count(&mut self) -> QueryResult<(ExecutionState, LimitStats)> {
        let mut stats = LimitStats::default();
        loop {
            let (state, skipped) = self.fetcher.skip_rows(DEFAULT_BATCH_SIZE)?;
            stats.incr_counter_by(skipped);
            match state {
                ExecutionState::Waiting | ExecutionState::Done => return Ok((state, stats)),
                ExecutionState::HasMore => {}
            }
        }
    }

    /// `Waiting` after the counter moved in this call is reported as
    /// `HasMore`, so `Waiting` always means nothing changed.
    fn pause_if_waiting(&self, state: ExecutionState, counter_before: usize) -> ExecutionState {
        if state == ExecutionState::Waiting && self.counter != counter_before {
            ExecutionState::HasMore
        } else {
            state
        }
    }

    /// Run `skip_offset` until the offset is consumed. Returns the state to
    /// report if the caller has to return early.
    fn skip_whole_offset(&mut self, stats: &mut LimitStats) -> QueryResult<Option<ExecutionState>> {
        while self.current_state() == LimitState::Skipping {
            let (state, offset_stats) = self.skip_offset()?;
            *stats += offset_stats;
            if state == ExecutionState::Waiting || state == ExecutionState::Done {
                return Ok(Some(state));
            }
        }
        Ok(None)
    }

    fn produce_last_row(
        &mut self,
        output: &mut OutputRow,
        mut stats: LimitStats,
        counter_before: usize,
    ) -> QueryResult<(ExecutionState, LimitStats)> {
        let (state, input) = match self.last_row_to_output.take() {
            Some(row) => (self.state_of_last_row_to_output, row),
            None => {
                let (state, input) = self.fetcher.fetch_row(self.max_rows_left_to_fetch()?)?;
                if state == ExecutionState::Waiting {
                    return Ok((self.pause_if_waiting(state, counter_before), stats));
                }
                let Some(input) = input else {
                    return Ok((state, stats));
                };
                if self.infos.is_full_count_enabled() {
                    stats.incr_counter();
                }
                (state, input)
            }
        };

        // The count travels with the stats of this call, so it has to be
        // complete before the last row goes out.
        if self.infos.is_full_count_enabled() && state != ExecutionState::Done {
            let (count_state, count_stats) = self.skip_rest_for_full_count()?;
            stats += count_stats;
            if count_state == ExecutionState::Waiting {
                self.last_row_to_output = Some(input);
                self.state_of_last_row_to_output = state;
                return Ok((self.pause_if_waiting(ExecutionState::Waiting, counter_before), stats));
            }
        }

        output.copy_row(&input)?;
        self.counter += 1;
        Ok((ExecutionState::Done, stats))
    }
}

impl<F: PassthroughFetcher> Executor for LimitExecutor<F> {
    type Infos = LimitExecutorInfos;
    type Stats = LimitStats;

    const PROPERTIES: ExecutorProperties = ExecutorProperties {
        preserves_order: true,
        allows_block_passthrough: true,
        input_size_restricts_output_size: false,
    };

    fn name(&self) -> &'static str {
        "LimitExecutor"
    }

    fn infos(&self) -> &LimitExecutorInfos {
        &self.infos
    }

    fn register_infos(&self) -> &Arc<ExecutorInfos> {
        self.infos.registers()
    }

    fn produce_rows(&mut self, output: &mut OutputRow) -> QueryResult<(ExecutionState, LimitStats)> {
        let counter_before = self.counter;
        let mut stats = LimitStats::default();
        if let Some(state) = self.skip_whole_offset(&mut stats)? {
            return Ok((self.pause_if_waiting(state, counter_before), stats));
        }

        match self.current_state() {
            LimitState::Skipping => Err(QueryError::ContractViolation(
                "limit still skipping after the offset was consumed".to_string(),
            )),
            LimitState::Returning => {
                let (state, input) = self.fetcher.fetch_row(self.max_rows_left_to_fetch()?)?;
                if state == ExecutionState::Waiting {
                    return Ok((self.pause_if_waiting(state, counter_before), stats));
                }
                let Some(input) = input else {
                    return Ok((state, stats));
                };
                output.copy_row(&input)?;
                self.counter += 1;
                if self.infos.is_full_count_enabled() {
                    stats.incr_counter();
                }
                Ok((state, stats))
            }
            LimitState::ReturningLastRow => self.produce_last_row(output, stats, counter_before),
            LimitState::Counting => {
                let (state, count_stats) = self.skip_rest_for_full_count()?;
                stats += count_stats;
                Ok((state, stats))
            }
            LimitState::LimitReached => Ok((ExecutionState::Done, stats)),
        }
    }

    /// Offset rows are consumed but not reported. Rows after the offset are
    /// reported, up to the limit.
    fn skip_rows(&mut self, to_skip_requested: usize) -> QueryResult<(ExecutionState, LimitStats, usize)> {
        if self.last_row_to_output.is_some() {
            return Err(QueryError::ContractViolation(
                "LimitExecutor asked to skip while holding back its last row".to_string(),
            ));
        }
        let counter_before = self.counter;
        let mut stats = LimitStats::default();
        if let Some(state) = self.skip_whole_offset(&mut stats)? {
            return Ok((self.pause_if_waiting(state, counter_before), stats, 0));
        }

        match self.current_state() {
            LimitState::Skipping => Err(QueryError::ContractViolation(
                "limit still skipping after the offset was consumed".to_string(),
            )),
            LimitState::Returning | LimitState::ReturningLastRow => {
                let to_skip = to_skip_requested.min(self.max_rows_left_to_fetch()?);
                let (mut state, skipped) = self.fetcher.skip_rows(to_skip)?;
                if state == ExecutionState::Waiting {
                    return Ok((self.pause_if_waiting(state, counter_before), stats, 0));
                }
                self.counter += skipped;
                if self.infos.is_full_count_enabled() {
                    stats.incr_counter_by(skipped);
                }
                match self.current_state() {
                    LimitState::LimitReached => state = ExecutionState::Done,
                    LimitState::Counting if state != ExecutionState::Done => {
                        let (count_state, count_stats) = self.skip_rest_for_full_count()?;
                        stats += count_stats;
                        // Counting resumes on the next call.
                        state = if count_state == ExecutionState::Waiting {
                            ExecutionState::HasMore
                        } else {
                            count_state
                        };
                    }
                    _ => {}
                }
                Ok((state, stats, skipped))
            }
            LimitState::Counting => {
                let (state, count_stats) = self.skip_rest_for_full_count()?;
                stats += count_stats;
                Ok((state, stats, 0))
            }
            LimitState::LimitReached => Ok((ExecutionState::Done, stats, 0)),
        }
    }

    fn fetch_block_for_passthrough(
        &mut self,
        at_most: usize,
    ) -> QueryResult<(ExecutionState, LimitStats, Option<SharedItemBlock>)> {
        let mut stats = LimitStats::default();
        if self.last_row_to_output.is_some() {
            // The held-back row has to go out through produce_rows.
            return Ok((ExecutionState::HasMore, stats, None));
        }
        let counter_before = self.counter;
        if let Some(state) = self.skip_whole_offset(&mut stats)? {
            return Ok((self.pause_if_waiting(state, counter_before), stats, None));
        }

        match self.current_state() {
            LimitState::Skipping => Err(QueryError::ContractViolation(
                "limit still skipping after the offset was consumed".to_string(),
            )),
            LimitState::Returning | LimitState::ReturningLastRow => {
                let max_rows = at_most.min(self.max_rows_left_to_fetch()?);
                let (state, block) = self.fetcher.fetch_block_for_passthrough(max_rows)?;
                let state = self.pause_if_waiting(state, counter_before);
                trace!(
                    "LimitExecutor passthrough of {} rows ({})",
                    block.as_ref().map_or(0, |b| b.size()),
                    state
                );
                Ok((state, stats, block))
            }
            LimitState::Counting => {
                let (state, count_stats) = self.skip_rest_for_full_count()?;
                stats += count_stats;
                Ok((state, stats, None))
            }
            LimitState::LimitReached => Ok((ExecutionState::Done, stats, None)),
        }
    }

    fn initialize_cursor(&mut self) -> QueryResult<()> {
        self.counter = 0;
        self.last_row_to_output = None;
        self.state_of_last_row_to_output = ExecutionState::HasMore;
        self.fetcher.reset()
    }

    fn shutdown(&mut self) {
        self.last_row_to_output = None;
        self.fetcher.shutdown();
    }
}
