use std::io::Write;

use indexmap::IndexMap;
use serde_json::Value;

use super::OutputWriter;
use crate::error::{QueryError, Result};
use crate::projection::ProjectedTable;

/// One compact JSON object per line, keys in column order. Nulls are kept so
/// every line carries every column.
#[derive(Debug, Clone, Copy, Default)]
pub struct NdjsonWriter;

impl NdjsonWriter {
    pub fn new() -> Self {
        Self
    }
}

fn ordered_rows(table: &ProjectedTable) -> impl Iterator<Item = IndexMap<&str, &Value>> {
    table.records().map(|record| {
        table
            .columns
            .iter()
            .map(String::as_str)
            .zip(record)
            .collect()
    })
}

fn output_error(e: impl std::fmt::Display) -> QueryError {
    QueryError::Output(e.to_string())
}

impl OutputWriter for NdjsonWriter {
    fn content_type(&self) -> &'static str {
        "application/x-ndjson"
    }

    fn file_extension(&self) -> &'static str {
        "ndjson"
    }

    fn write(&self, table: &ProjectedTable, output: &mut dyn Write) -> Result<()> {
        for row in ordered_rows(table) {
            let line = serde_json::to_string(&row)?;
            writeln!(output, "{line}").map_err(output_error)?;
        }
        Ok(())
    }
}

/// The whole table as a single JSON array of row objects.
#[derive(Debug, Clone)]
pub struct JsonArrayWriter {
    pub pretty: bool,
}

impl Default for JsonArrayWriter {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl JsonArrayWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl OutputWriter for JsonArrayWriter {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn file_extension(&self) -> &'static str {
        "json"
    }

    fn write(&self, table: &ProjectedTable, output: &mut dyn Write) -> Result<()> {
        let rows: Vec<_> = ordered_rows(table).collect();
        if self.pretty {
            serde_json::to_writer_pretty(&mut *output, &rows)?;
        } else {
            serde_json::to_writer(&mut *output, &rows)?;
        }
        writeln!(output).map_err(output_error)?;
        Ok(())
    }
}
