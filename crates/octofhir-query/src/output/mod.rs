//! Writers for projected tables.
//!
//! - CSV
//! - NDJSON (one JSON object per row)
//! - JSON array

mod csv;
mod ndjson;

pub use csv::CsvWriter;
pub use ndjson::{JsonArrayWriter, NdjsonWriter};

use std::io::Write;

use crate::error::{QueryError, Result};
use crate::projection::ProjectedTable;

/// Serializes a [`ProjectedTable`] into one output format.
pub trait OutputWriter: Send + Sync {
    /// MIME content type of the produced output.
    fn content_type(&self) -> &'static str;

    fn file_extension(&self) -> &'static str;

    fn write(&self, table: &ProjectedTable, output: &mut dyn Write) -> Result<()>;

    /// Render the whole table into a string.
    fn write_to_string(&self, table: &ProjectedTable) -> Result<String> {
        let mut buf = Vec::new();
        self.write(table, &mut buf)?;
        String::from_utf8(buf).map_err(|e| QueryError::Output(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Ndjson,
    Json,
}

impl OutputFormat {
    /// Parse a format name. `jsonl` is accepted as NDJSON.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "ndjson" | "jsonl" => Ok(Self::Ndjson),
            "json" => Ok(Self::Json),
            _ => Err(QueryError::Output(format!("Unknown format: {s}"))),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Ndjson => "ndjson",
            Self::Json => "json",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv; charset=utf-8",
            Self::Ndjson => "application/x-ndjson",
            Self::Json => "application/json",
        }
    }

    pub fn writer(&self) -> Box<dyn OutputWriter> {
        match self {
            Self::Csv => Box::new(CsvWriter::new()),
            Self::Ndjson => Box::new(NdjsonWriter::new()),
            Self::Json => Box::new(JsonArrayWriter::new()),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Writer for a format name.
pub fn get_writer(format: &str) -> Result<Box<dyn OutputWriter>> {
    Ok(OutputFormat::parse(format)?.writer())
}
