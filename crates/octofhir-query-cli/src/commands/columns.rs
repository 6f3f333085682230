use anyhow::Result;
use colored::Colorize;
use octofhir_query::{ResourceType, default_projection, default_projection_types};
use serde_json::json;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::OutputFormat;
use crate::output::print_json;

pub fn columns(resource_type: Option<&str>, format: OutputFormat) -> Result<()> {
    let Some(resource_type) = resource_type else {
        let types = default_projection_types();
        if format == OutputFormat::Json {
            return print_json(&json!(types));
        }
        println!("{}", "Resource types with default columns:".cyan());
        for name in types {
            println!("  {name}");
        }
        return Ok(());
    };

    let resource_type: ResourceType = resource_type.parse()?;
    let Some(spec) = default_projection(resource_type.as_str()) else {
        anyhow::bail!(
            "No default columns for {resource_type}. Types with defaults: {}",
            default_projection_types().join(", ")
        );
    };

    if format == OutputFormat::Json {
        return print_json(&serde_json::to_value(spec)?);
    }

    let mut builder = Builder::default();
    builder.push_record(["Column", "Path"]);
    for (name, path) in spec {
        builder.push_record([name.as_str(), path.as_str()]);
    }
    println!("{}", builder.build().with(Style::rounded()));
    Ok(())
}
