#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Result, bail};
use bayun_pipeline::query::executor::block::SharedItemBlock;
use bayun_pipeline::query::executor::fetcher::BlockSource;
use bayun_pipeline::query::executor::state::ExecutionState;
use bayun_pipeline::storage::{MemoryCollection, MemoryTransaction};
use bayun_pipeline::DataValue;

/// Everything a source produced until `Done`
pub struct Drained {
    pub rows: Vec<Vec<DataValue>>,
    pub blocks: Vec<SharedItemBlock>,
    pub waits: usize,
}

impl Drained {
    /// Integer values of one register, in output order
    pub fn integers(&self, register: usize) -> Vec<i64> {
        self.rows.iter().filter_map(|row| row[register].as_integer()).collect()
    }
}

// Pull blocks of at most `at_most` rows until the source is done
pub fn drain<S: BlockSource>(source: &mut S, at_most: usize) -> Result<Drained> {
    let mut drained = Drained {
        rows: Vec::new(),
        blocks: Vec::new(),
        waits: 0,
    };
    for _ in 0..100_000 {
        let (state, block) = source.fetch_block(at_most)?;
        if let Some(block) = block {
            for row in 0..block.size() {
                drained.rows.push(block.row_values(row).to_vec());
            }
            drained.blocks.push(block);
        }
        match state {
            ExecutionState::Done => return Ok(drained),
            ExecutionState::Waiting => drained.waits += 1,
            ExecutionState::HasMore => {}
        }
    }
    bail!("source did not finish")
}

// Create a collection "docs" with documents {id: 0..n, tag: "t<id>"}
pub fn numbered_collection(documents: usize) -> Result<Arc<MemoryCollection>> {
    let collection = Arc::new(MemoryCollection::with_index("docs", ["id", "tag"]));
    for i in 0..documents as i64 {
        collection.insert(DataValue::object([
            ("id", DataValue::Integer(i)),
            ("tag", DataValue::Text(format!("t{}", i))),
        ]))?;
    }
    Ok(collection)
}

pub fn transaction_with(collection: Arc<MemoryCollection>) -> Arc<MemoryTransaction> {
    let trx = Arc::new(MemoryTransaction::new());
    trx.add_collection(collection);
    trx
}

/// `id` attribute of the document in `register`
pub fn document_id(row: &[DataValue], register: usize) -> Option<i64> {
    row[register].get("id").and_then(DataValue::as_integer)
}
