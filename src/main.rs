use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use rand::Rng;

use bayun_pipeline::query::executor::fetcher::ValuesBlockSource;
use bayun_pipeline::query::executor::infos::ExecutorInfos;
use bayun_pipeline::query::executor::operators::document_producer::covering_positions;
use bayun_pipeline::query::executor::operators::{
    EnumerateCollectionExecutorInfos, LimitExecutorInfos, create_enumerate_collection, create_limit,
};
use bayun_pipeline::{Collection, DataValue, ExecutionState, MemoryCollection, MemoryTransaction, QueryContext, QueryOptions};

#[derive(Parser)]
#[command(author, version, about = "Bayun pipeline demo - enumerate a collection and limit the result")]
struct Cli {
    /// Number of documents in the demo collection
    #[arg(short, long, default_value_t = 10)]
    documents: usize,

    /// Number of input rows, each joined with every document
    #[arg(short, long, default_value_t = 1)]
    inputs: usize,

    /// Rows to skip before returning
    #[arg(long, default_value_t = 0)]
    offset: usize,

    /// Rows to return after the offset
    #[arg(short, long, default_value_t = 5)]
    limit: usize,

    /// Count every row past the offset
    #[arg(long)]
    full_count: bool,

    /// Enumerate documents in random order
    #[arg(long)]
    random: bool,

    /// Attribute to project, may be repeated
    #[arg(long)]
    projection: Vec<String>,

    /// Rows per block
    #[arg(long, default_value_t = 1000)]
    block_size: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let collection = Arc::new(MemoryCollection::with_index("demo", ["value", "name"]));
    let mut rng = rand::thread_rng();
    for i in 0..cli.documents {
        collection.insert(DataValue::object([
            ("name", DataValue::Text(format!("doc{}", i))),
            ("value", DataValue::Integer(rng.gen_range(0..1000))),
        ]))?;
    }
    let trx = Arc::new(MemoryTransaction::new());
    trx.add_collection(collection.clone());

    let options = QueryOptions {
        default_block_size: cli.block_size,
        ..QueryOptions::default()
    };
    options.validate()?;
    let context = Arc::new(QueryContext::new(options));

    // Input register 0, document register 1
    let positions = covering_positions(collection.index_attributes(), &cli.projection).unwrap_or_default();
    let enumerate_infos =
        EnumerateCollectionExecutorInfos::new(ExecutorInfos::new(1, 2, [1], [], [0])?, 1, Collection::new("demo"), trx)?
            .with_projections(cli.projection.clone(), positions)?
            .with_random(cli.random);
    let enumerate = create_enumerate_collection(
        ValuesBlockSource::integers(cli.inputs),
        Arc::new(enumerate_infos),
        context.clone(),
    );

    let limit_infos = LimitExecutorInfos::new(ExecutorInfos::pass_all(2), cli.offset, cli.limit, cli.full_count)?;
    let mut pipeline = create_limit(enumerate, Arc::new(limit_infos), context);

    let mut rows = 0;
    loop {
        let (state, block) = pipeline.get_some(0)?;
        if let Some(block) = block {
            for row in 0..block.size() {
                println!("{}\t{}", block.get_value(row, 0), block.get_value(row, 1));
            }
            rows += block.size();
        }
        match state {
            ExecutionState::Done => break,
            // Memory storage never blocks, a real driver would reschedule here.
            ExecutionState::Waiting | ExecutionState::HasMore => {}
        }
    }

    let stats = pipeline.stats() + pipeline.executor().fetcher().upstream().stats();
    println!("{} rows", rows);
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
