// Output Row
//
// Write cursor over the block a stage produces into. Either a freshly
// allocated block or a block passed through unchanged from upstream.

use std::sync::Arc;

use crate::common::types::RegisterId;
use crate::query::executor::block::{InputRow, ItemBlock, SharedItemBlock};
use crate::query::executor::infos::ExecutorInfos;
use crate::query::executor::result::{DataValue, QueryError, QueryResult};

#[derive(Debug)]
enum OutputTarget {
    Owned(ItemBlock),
    Passthrough(SharedItemBlock),
}

/// Write cursor for one stage's output block.
///
/// A row counts as produced only once every declared output register has
/// been written and the input row has been copied.
#[derive(Debug)]
pub struct OutputRow {
    target: OutputTarget,
    infos: Arc<ExecutorInfos>,
    base_index: usize,
    written_registers: Vec<RegisterId>,
    input_row_copied: bool,
}

impl OutputRow {
    pub fn new(block: ItemBlock, infos: Arc<ExecutorInfos>) -> QueryResult<Self> {
        if block.nr_registers() != infos.nr_output_registers() {
            return Err(QueryError::ContractViolation(format!(
                "output block has {} registers, stage declares {}",
                block.nr_registers(),
                infos.nr_output_registers()
            )));
        }
        Ok(Self::with_target(OutputTarget::Owned(block), infos))
    }

    /// Reuse an upstream block as output. Only valid for stages that write no
    /// registers of their own.
    pub fn passthrough(block: SharedItemBlock, infos: Arc<ExecutorInfos>) -> QueryResult<Self> {
        if !infos.output_registers().is_empty()
            || infos.nr_input_registers() != infos.nr_output_registers()
            || block.nr_registers() != infos.nr_output_registers()
        {
            return Err(QueryError::ContractViolation(
                "passthrough requires a stage that writes no registers".to_string(),
            ));
        }
        Ok(Self::with_target(OutputTarget::Passthrough(block), infos))
    }

    fn with_target(target: OutputTarget, infos: Arc<ExecutorInfos>) -> Self {
        OutputRow {
            target,
            infos,
            base_index: 0,
            written_registers: Vec::new(),
            input_row_copied: false,
        }
    }

    fn capacity(&self) -> usize {
        match &self.target {
            OutputTarget::Owned(block) => block.size(),
            OutputTarget::Passthrough(block) => block.size(),
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self.target, OutputTarget::Passthrough(_))
    }

    pub fn is_full(&self) -> bool {
        self.base_index >= self.capacity()
    }

    pub fn num_rows_left(&self) -> usize {
        self.capacity().saturating_sub(self.base_index)
    }

    pub fn num_rows_written(&self) -> usize {
        self.base_index
    }

    /// Write the value of a declared output register, copying the input row
    /// along with the first write.
    pub fn set_value(&mut self, register: RegisterId, input: &InputRow, value: DataValue) -> QueryResult<()> {
        if !self.infos.output_registers().contains(&register) {
            return Err(QueryError::ContractViolation(format!(
                "register {} is not a declared output register",
                register
            )));
        }
        if self.written_registers.contains(&register) {
            return Err(QueryError::ContractViolation(format!(
                "register {} written twice for row {}",
                register, self.base_index
            )));
        }
        if self.is_full() {
            return Err(QueryError::ContractViolation("write past block capacity".to_string()));
        }
        match &mut self.target {
            OutputTarget::Owned(block) => block.set_value(self.base_index, register, value)?,
            OutputTarget::Passthrough(_) => {
                return Err(QueryError::ContractViolation(
                    "cannot write into a passed-through block".to_string(),
                ));
            }
        }
        self.written_registers.push(register);
        if !self.input_row_copied {
            self.copy_row(input)?;
        }
        Ok(())
    }

    /// Copy the kept registers of `input` into the current row
    pub fn copy_row(&mut self, input: &InputRow) -> QueryResult<()> {
        if self.input_row_copied {
            return Ok(());
        }
        if self.is_full() {
            return Err(QueryError::ContractViolation("copy past block capacity".to_string()));
        }
        let base_index = self.base_index;
        match &mut self.target {
            OutputTarget::Owned(block) => {
                for &register in self.infos.copied_registers() {
                    block.set_value(base_index, register, input.get_value(register).clone())?;
                }
            }
            OutputTarget::Passthrough(block) => {
                if !input.is_at(block, base_index) {
                    return Err(QueryError::ContractViolation(format!(
                        "passthrough row {} does not match input row {}",
                        base_index,
                        input.index()
                    )));
                }
            }
        }
        self.input_row_copied = true;
        Ok(())
    }

    pub fn produced(&self) -> bool {
        self.input_row_copied && self.written_registers.len() == self.infos.output_registers().len()
    }

    /// Move on to the next row. The current row must be complete.
    pub fn advance_row(&mut self) -> QueryResult<()> {
        if !self.produced() {
            return Err(QueryError::ContractViolation(format!(
                "row {} is incomplete: {} of {} registers written",
                self.base_index,
                self.written_registers.len(),
                self.infos.output_registers().len()
            )));
        }
        self.base_index += 1;
        self.written_registers.clear();
        self.input_row_copied = false;
        Ok(())
    }

    /// Hand out the rows written so far, `None` if there are none
    pub fn into_block(self) -> Option<SharedItemBlock> {
        let written = self.base_index;
        if written == 0 {
            return None;
        }
        match self.target {
            OutputTarget::Owned(mut block) => {
                block.shrink(written);
                Some(block.into_shared())
            }
            OutputTarget::Passthrough(block) if written == block.size() => Some(block),
            OutputTarget::Passthrough(block) => Some(block.slice(0, written).into_shared()),
        }
    }
}
