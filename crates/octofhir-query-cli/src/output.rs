use anyhow::Result;
use colored::Colorize;
use octofhir_query::{ProjectedTable, QueryBundle};
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;

pub fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Render a projected table with one column per projection entry.
pub fn print_table(table: &ProjectedTable) {
    if table.is_empty() {
        println!("No resources found.");
        return;
    }
    println!("{}", render_table(table));
}

fn render_table(table: &ProjectedTable) -> String {
    let mut builder = Builder::default();
    builder.push_record(table.columns.iter().map(String::as_str));
    for record in table.records() {
        builder.push_record(record.into_iter().map(display_cell));
    }
    builder.build().with(Style::rounded()).to_string()
}

/// Fallback listing for bundles whose resource type has no default columns.
pub fn print_bundle_summary(bundle: &QueryBundle) {
    if bundle.is_empty() {
        println!("No resources found.");
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(["ID", "ResourceType", "LastUpdated"]);
    for resource in bundle {
        let field = |v: Option<&Value>| v.and_then(Value::as_str).unwrap_or("-").to_string();
        builder.push_record([
            field(resource.get("id")),
            field(resource.get("resourceType")),
            field(resource.pointer("/meta/lastUpdated")),
        ]);
    }
    println!("{}", builder.build().with(Style::rounded()));
    print_counts(bundle);
}

pub fn print_counts(bundle: &QueryBundle) {
    match bundle.total() {
        Some(total) => println!("{}: {} of {total}", "Fetched".cyan(), bundle.size()),
        None => println!("{}: {}", "Fetched".cyan(), bundle.size()),
    }
}

fn display_cell(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(display_cell).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}
