// Document Producing Functions
//
// Turn a cursor entry (a full document or a covering-index entry) into the
// output register of a row. The function is picked once per executor from
// its configuration, not per document.

use crate::common::types::RegisterId;
use crate::query::executor::block::InputRow;
use crate::query::executor::output::OutputRow;
use crate::query::executor::result::{DataValue, QueryError, QueryResult};
use crate::storage::CursorEntry;

/// Writes one cursor entry into the output row
pub type DocumentProducingFunction =
    fn(&DocumentProducingFunctionContext, CursorEntry, &InputRow, &mut OutputRow) -> QueryResult<()>;

/// Configuration shared by the document-producing functions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentProducingFunctionContext {
    output_register: RegisterId,
    produce_result: bool,
    projections: Vec<String>,
    covering_index_attribute_positions: Vec<usize>,
    allow_covering_index_optimization: bool,
}

impl DocumentProducingFunctionContext {
    pub fn new(
        output_register: RegisterId,
        produce_result: bool,
        projections: Vec<String>,
        covering_index_attribute_positions: Vec<usize>,
    ) -> QueryResult<Self> {
        if !covering_index_attribute_positions.is_empty()
            && covering_index_attribute_positions.len() != projections.len()
        {
            return Err(QueryError::InvalidConfiguration(format!(
                "{} covering index positions for {} projections",
                covering_index_attribute_positions.len(),
                projections.len()
            )));
        }
        Ok(DocumentProducingFunctionContext {
            output_register,
            produce_result,
            projections,
            covering_index_attribute_positions,
            allow_covering_index_optimization: false,
        })
    }

    pub fn output_register(&self) -> RegisterId {
        self.output_register
    }

    pub fn produce_result(&self) -> bool {
        self.produce_result
    }

    pub fn projections(&self) -> &[String] {
        &self.projections
    }

    pub fn covering_index_attribute_positions(&self) -> &[usize] {
        &self.covering_index_attribute_positions
    }

    pub fn set_allow_covering_index_optimization(&mut self, allow: bool) {
        self.allow_covering_index_optimization = allow;
    }

    pub fn allow_covering_index_optimization(&self) -> bool {
        self.allow_covering_index_optimization
    }

    /// Whether entries are read from a covering index instead of documents
    pub fn uses_covering_index(&self) -> bool {
        self.produce_result
            && self.allow_covering_index_optimization
            && !self.covering_index_attribute_positions.is_empty()
    }
}

/// Positions of `projections` within the attributes of a covering index, or
/// `None` if the index does not cover every projection.
pub fn covering_positions(index_attributes: &[String], projections: &[String]) -> Option<Vec<usize>> {
    if projections.is_empty() {
        return None;
    }
    projections
        .iter()
        .map(|projection| index_attributes.iter().position(|attribute| attribute == projection))
        .collect()
}

/// Pick the producing function for this configuration
pub fn build_document_producer(context: &DocumentProducingFunctionContext) -> DocumentProducingFunction {
    if !context.produce_result() {
        produce_null
    } else if context.projections().is_empty() {
        produce_full_document
    } else if context.uses_covering_index() {
        produce_from_index_entry
    } else {
        produce_projections
    }
}

fn produce_null(
    context: &DocumentProducingFunctionContext,
    _entry: CursorEntry,
    input: &InputRow,
    output: &mut OutputRow,
) -> QueryResult<()> {
    output.set_value(context.output_register(), input, DataValue::Null)
}

fn produce_full_document(
    context: &DocumentProducingFunctionContext,
    entry: CursorEntry,
    input: &InputRow,
    output: &mut OutputRow,
) -> QueryResult<()> {
    match entry {
        CursorEntry::Document { document, .. } => output.set_value(context.output_register(), input, document),
        CursorEntry::IndexEntry { id, .. } => Err(QueryError::ContractViolation(format!(
            "full document requested, cursor returned index entry for document {}",
            id
        ))),
    }
}

fn project_document(projections: &[String], document: &DataValue) -> DataValue {
    DataValue::object(
        projections
            .iter()
            .map(|path| (path.clone(), document.get_path(path).cloned().unwrap_or_default())),
    )
}

fn produce_projections(
    context: &DocumentProducingFunctionContext,
    entry: CursorEntry,
    input: &InputRow,
    output: &mut OutputRow,
) -> QueryResult<()> {
    match entry {
        CursorEntry::Document { document, .. } => {
            let projected = project_document(context.projections(), &document);
            output.set_value(context.output_register(), input, projected)
        }
        CursorEntry::IndexEntry { id, .. } => Err(QueryError::ContractViolation(format!(
            "covering index optimization not allowed, cursor returned index entry for document {}",
            id
        ))),
    }
}

fn produce_from_index_entry(
    context: &DocumentProducingFunctionContext,
    entry: CursorEntry,
    input: &InputRow,
    output: &mut OutputRow,
) -> QueryResult<()> {
    match entry {
        CursorEntry::IndexEntry { id, values } => {
            let mut attributes = Vec::with_capacity(context.projections().len());
            for (projection, &position) in context
                .projections()
                .iter()
                .zip(context.covering_index_attribute_positions())
            {
                let value = values.get(position).cloned().ok_or_else(|| {
                    QueryError::ContractViolation(format!(
                        "index entry of document {} has {} values, position {} requested",
                        id,
                        values.len(),
                        position
                    ))
                })?;
                attributes.push((projection.clone(), value));
            }
            output.set_value(context.output_register(), input, DataValue::object(attributes))
        }
        // Storage may always fall back to full documents.
        document @ CursorEntry::Document { .. } => produce_projections(context, document, input, output),
    }
}
