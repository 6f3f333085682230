use std::io::Write;

use anyhow::{Context, Result};
use octofhir_query::{FhirQueryClient, OutputFormat as TableFormat, SearchRequest, default_projection};

use crate::cli::{OutputFormat, QueryArgs, SearchArgs};
use crate::output::{print_bundle_summary, print_counts, print_json, print_table};

pub async fn search(client: &FhirQueryClient, args: &SearchArgs, format: OutputFormat) -> Result<()> {
    let mut request = build_request(&args.query)?;
    if let Some(query) = &args.search_string {
        request = request.search_string(query);
    }
    if let Some(url) = &args.url {
        request = request.full_url(url);
    }

    let resource_type = &args.query.resource_type;
    let bundle = client
        .search(resource_type, &request)
        .await
        .with_context(|| format!("Search for {resource_type} failed"))?;
    tracing::debug!(%bundle, "Search complete");

    match format {
        OutputFormat::Json => print_json(bundle.as_value())?,
        OutputFormat::Table => {
            if default_projection(resource_type).is_some() {
                print_table(&bundle.to_table(None).await?);
                print_counts(&bundle);
            } else {
                print_bundle_summary(&bundle);
            }
        }
        OutputFormat::Csv | OutputFormat::Ndjson => {
            let table = bundle.to_table(None).await?;
            let writer = table_format(format).writer();
            let mut stdout = std::io::stdout().lock();
            writer.write(&table, &mut stdout)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

/// Map the CLI format onto a table writer format. Table output has no
/// file form, so it is written as CSV.
pub fn table_format(format: OutputFormat) -> TableFormat {
    match format {
        OutputFormat::Json => TableFormat::Json,
        OutputFormat::Ndjson => TableFormat::Ndjson,
        OutputFormat::Csv | OutputFormat::Table => TableFormat::Csv,
    }
}

/// Build a request from the arguments shared by `search` and `table`.
pub fn build_request(args: &QueryArgs) -> Result<SearchRequest> {
    let mut params = parse_pairs(&args.params, '=', "search parameter")?;
    if let Some(count) = args.count {
        params.push(("_count".to_string(), count.to_string()));
    }

    let mut request = SearchRequest::new().use_post(args.post);
    if !params.is_empty() {
        request = request.params(params);
    }
    if let Some(pages) = args.pages {
        request = request.pages(pages);
    }
    for (name, value) in parse_pairs(&args.headers, ':', "header")? {
        request = request.header(name, value.trim_start());
    }
    Ok(request)
}

/// Split each `key<sep>value` argument. Values may contain the separator.
pub fn parse_pairs(raw: &[String], separator: char, what: &str) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|item| -> Result<(String, String)> {
            let (key, value) = item
                .split_once(separator)
                .with_context(|| format!("Invalid {what} '{item}', expected key{separator}value"))?;
            anyhow::ensure!(!key.trim().is_empty(), "Invalid {what} '{item}', empty key");
            Ok((key.trim().to_string(), value.to_string()))
        })
        .collect()
}
