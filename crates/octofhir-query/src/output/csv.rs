use std::io::Write;

use serde_json::Value;

use super::OutputWriter;
use crate::error::{QueryError, Result};
use crate::projection::ProjectedTable;

/// CSV writer.
///
/// Nulls become empty cells, arrays are joined with `;` and objects are
/// written as compact JSON.
#[derive(Debug, Clone)]
pub struct CsvWriter {
    pub include_header: bool,
    pub delimiter: u8,
}

impl Default for CsvWriter {
    fn default() -> Self {
        Self {
            include_header: true,
            delimiter: b',',
        }
    }
}

impl CsvWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, include: bool) -> Self {
        self.include_header = include;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(cell).collect::<Vec<_>>().join(";"),
        Value::Object(_) => value.to_string(),
    }
}

fn csv_error(e: impl std::fmt::Display) -> QueryError {
    QueryError::Output(e.to_string())
}

impl OutputWriter for CsvWriter {
    fn content_type(&self) -> &'static str {
        "text/csv; charset=utf-8"
    }

    fn file_extension(&self) -> &'static str {
        "csv"
    }

    fn write(&self, table: &ProjectedTable, output: &mut dyn Write) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .from_writer(output);

        if self.include_header {
            writer.write_record(&table.columns).map_err(csv_error)?;
        }
        for record in table.records() {
            let cells: Vec<String> = record.into_iter().map(cell).collect();
            writer.write_record(&cells).map_err(csv_error)?;
        }

        writer.flush().map_err(csv_error)?;
        Ok(())
    }
}
