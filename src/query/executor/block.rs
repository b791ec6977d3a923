// Item Blocks
//
// A block is a fixed-width batch of rows. Blocks are shared by reference
// once handed downstream; a shared block is read-only.

use std::sync::Arc;

use crate::common::types::RegisterId;
use crate::query::executor::result::{DataValue, QueryError, QueryResult};

/// A batch of rows, each with `nr_registers` values, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemBlock {
    nr_registers: RegisterId,
    size: usize,
    values: Vec<DataValue>,
}

/// Reference-counted, immutable block
pub type SharedItemBlock = Arc<ItemBlock>;

impl ItemBlock {
    /// Allocate a block of `size` rows with every register set to null
    pub fn new(size: usize, nr_registers: RegisterId) -> Self {
        ItemBlock {
            nr_registers,
            size,
            values: vec![DataValue::Null; size * nr_registers],
        }
    }

    /// Build a block from complete rows
    pub fn from_rows(nr_registers: RegisterId, rows: Vec<Vec<DataValue>>) -> QueryResult<Self> {
        let size = rows.len();
        let mut values = Vec::with_capacity(size * nr_registers);
        for (index, row) in rows.into_iter().enumerate() {
            if row.len() != nr_registers {
                return Err(QueryError::ContractViolation(format!(
                    "row {} has {} values, block expects {} registers",
                    index,
                    row.len(),
                    nr_registers
                )));
            }
            values.extend(row);
        }
        Ok(ItemBlock { nr_registers, size, values })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn nr_registers(&self) -> RegisterId {
        self.nr_registers
    }

    pub fn get_value(&self, row: usize, register: RegisterId) -> &DataValue {
        debug_assert!(row < self.size && register < self.nr_registers);
        &self.values[row * self.nr_registers + register]
    }

    pub fn row_values(&self, row: usize) -> &[DataValue] {
        let start = row * self.nr_registers;
        &self.values[start..start + self.nr_registers]
    }

    pub fn set_value(&mut self, row: usize, register: RegisterId, value: DataValue) -> QueryResult<()> {
        if row >= self.size || register >= self.nr_registers {
            return Err(QueryError::ContractViolation(format!(
                "write to row {} register {} outside block of {}x{}",
                row, register, self.size, self.nr_registers
            )));
        }
        self.values[row * self.nr_registers + register] = value;
        Ok(())
    }

    /// Drop trailing rows so the block holds exactly `rows` rows
    pub fn shrink(&mut self, rows: usize) {
        if rows < self.size {
            self.size = rows;
            self.values.truncate(rows * self.nr_registers);
        }
    }

    /// Copy rows `[from, to)` into a new block
    pub fn slice(&self, from: usize, to: usize) -> ItemBlock {
        let to = to.min(self.size);
        let from = from.min(to);
        ItemBlock {
            nr_registers: self.nr_registers,
            size: to - from,
            values: self.values[from * self.nr_registers..to * self.nr_registers].to_vec(),
        }
    }

    pub fn into_shared(self) -> SharedItemBlock {
        Arc::new(self)
    }
}

/// Zero-copy read view of one row of a shared block
#[derive(Debug, Clone)]
pub struct InputRow {
    block: SharedItemBlock,
    index: usize,
}

impl InputRow {
    pub fn new(block: SharedItemBlock, index: usize) -> Self {
        debug_assert!(index < block.size());
        InputRow { block, index }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn block(&self) -> &SharedItemBlock {
        &self.block
    }

    pub fn get_value(&self, register: RegisterId) -> &DataValue {
        self.block.get_value(self.index, register)
    }

    pub fn values(&self) -> &[DataValue] {
        self.block.row_values(self.index)
    }

    /// Whether this row lives at `index` of exactly `block`
    pub fn is_at(&self, block: &SharedItemBlock, index: usize) -> bool {
        Arc::ptr_eq(&self.block, block) && self.index == index
    }
}
