use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use octofhir_query::{
    CsvWriter, FhirPathEvaluator, FhirQueryClient, OutputFormat as TableFormat, OutputWriter,
    ProjectionSpec,
};

use super::search::{build_request, parse_pairs, table_format};
use crate::cli::{OutputFormat, TableArgs};
use crate::output::{print_success, print_table};

pub async fn table(
    client: &FhirQueryClient,
    args: &TableArgs,
    format: Option<OutputFormat>,
) -> Result<()> {
    let spec = parse_columns(&args.columns).await?;
    let request = build_request(&args.query)?;

    let resource_type = &args.query.resource_type;
    let bundle = client
        .search(resource_type, &request)
        .await
        .with_context(|| format!("Search for {resource_type} failed"))?;
    let table = bundle
        .to_table(spec.as_ref())
        .await
        .with_context(|| format!("Cannot build a table for {resource_type}"))?;
    tracing::debug!(rows = table.len(), columns = table.columns.len(), "Projected bundle");

    let Some(path) = &args.output else {
        if format == Some(OutputFormat::Table) {
            print_table(&table);
            return Ok(());
        }
        let writer = writer_for(format.map_or(TableFormat::Csv, table_format), args.no_header);
        let mut stdout = std::io::stdout().lock();
        writer.write(&table, &mut stdout)?;
        stdout.flush()?;
        return Ok(());
    };

    let target = match format {
        Some(format) => table_format(format),
        None => format_from_extension(path),
    };
    let file = File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    writer_for(target, args.no_header).write(&table, &mut out)?;
    out.flush()?;

    print_success(&format!("Wrote {} rows to {}", table.len(), path.display()));
    Ok(())
}

fn writer_for(format: TableFormat, no_header: bool) -> Box<dyn OutputWriter> {
    match format {
        TableFormat::Csv => Box::new(CsvWriter::new().with_header(!no_header)),
        other => other.writer(),
    }
}

fn format_from_extension(path: &Path) -> TableFormat {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| TableFormat::parse(ext).ok())
        .unwrap_or(TableFormat::Csv)
}

/// Parse `name=path` column arguments. No columns means "use the defaults".
///
/// Every path is checked by the FHIRPath engine before any request is sent.
pub async fn parse_columns(raw: &[String]) -> Result<Option<ProjectionSpec>> {
    if raw.is_empty() {
        return Ok(None);
    }
    let evaluator = FhirPathEvaluator::shared().await?;
    let mut spec = ProjectionSpec::new();
    for (name, path) in parse_pairs(raw, '=', "column")? {
        evaluator.validate(&path).await?;
        anyhow::ensure!(!spec.contains_key(&name), "Duplicate column: {name}");
        spec.insert(name, path);
    }
    Ok(Some(spec))
}
