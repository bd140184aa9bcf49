use crate::value::{Record, Value};
use serde::Serialize;

/// A row rejected by validation, with its position in the input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedRecord {
    pub index: usize,
    pub record: Record,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportResult {
    pub failed_records: Vec<FailedRecord>,
    pub num_statements: usize,
    /// Generated primary keys of the inserted rows, in input order. Empty
    /// when the engine cannot report them or they could not be attributed.
    pub generated_ids: Vec<Value>,
    /// Rows returned for the extra `returning` columns.
    pub returned_rows: Vec<Record>,
    pub rows_affected: u64,
    pub children: Vec<ChildImport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChildImport {
    pub table: String,
    pub result: ImportResult,
}

impl ImportResult {
    pub fn is_success(&self) -> bool {
        self.failed_records.is_empty()
    }

    /// Statements issued by this import and every child import.
    pub fn total_statements(&self) -> usize {
        self.num_statements
            + self
                .children
                .iter()
                .map(|child| child.result.total_statements())
                .sum::<usize>()
    }

    pub fn child(&self, table: &str) -> Option<&ImportResult> {
        self.children
            .iter()
            .find(|child| child.table == table)
            .map(|child| &child.result)
    }
}
