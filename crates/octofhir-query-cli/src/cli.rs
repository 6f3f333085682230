use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "fhirq")]
#[command(about = "Search FHIR servers and export results as tables")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Server base URL (overrides config and FHIR_BASE_URL env var)
    #[arg(short, long, global = true, env = "FHIR_BASE_URL")]
    pub server: Option<String>,

    /// Config profile name
    #[arg(short, long, global = true, env = "FHIRQ_PROFILE", default_value = "default")]
    pub profile: String,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,

    /// Log level when RUST_LOG is not set (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(flatten)]
    pub auth: AuthArgs,
}

#[derive(clap::Args, Default)]
pub struct AuthArgs {
    /// Authentication method (basic, token, login)
    #[arg(long, global = true, env = "FHIR_AUTH_METHOD")]
    pub auth_method: Option<String>,

    /// Username for basic and login auth
    #[arg(long, global = true, env = "FHIR_USERNAME")]
    pub username: Option<String>,

    /// Password for basic and login auth
    #[arg(long, global = true, env = "FHIR_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Bearer token for token auth
    #[arg(long, global = true, env = "FHIR_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// URL that exchanges basic credentials for a token (login auth)
    #[arg(long, global = true, env = "FHIR_LOGIN_URL")]
    pub login_url: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Table,
    Csv,
    Ndjson,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search for resources and print the bundle
    Search(SearchArgs),
    /// Search and export the results as rows
    Table(TableArgs),
    /// Show the default columns for a resource type
    Columns(ColumnsArgs),
    /// Manage CLI configuration
    Config(ConfigArgs),
}

#[derive(clap::Args, Default)]
pub struct QueryArgs {
    /// Resource type (e.g. Patient)
    pub resource_type: String,
    /// Search parameters as key=value pairs (e.g. name=Smith birthdate=gt1990-01-01)
    pub params: Vec<String>,
    /// Number of results per page
    #[arg(long)]
    pub count: Option<u32>,
    /// Maximum number of pages to fetch
    #[arg(long)]
    pub pages: Option<usize>,
    /// Search with POST {type}/_search
    #[arg(long)]
    pub post: bool,
    /// Extra request header as Name:Value (repeatable)
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,
}

#[derive(clap::Args)]
pub struct SearchArgs {
    #[command(flatten)]
    pub query: QueryArgs,
    /// Pre-encoded query string (e.g. "name=Smith&_count=10")
    #[arg(long, conflicts_with = "url")]
    pub search_string: Option<String>,
    /// Fetch this absolute URL instead of building a search
    #[arg(long)]
    pub url: Option<String>,
}

#[derive(clap::Args)]
pub struct TableArgs {
    #[command(flatten)]
    pub query: QueryArgs,
    /// Column as name=path (repeatable). Defaults to the resource type's columns.
    #[arg(short, long = "column")]
    pub columns: Vec<String>,
    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Omit the CSV header row
    #[arg(long)]
    pub no_header: bool,
}

#[derive(clap::Args)]
pub struct ColumnsArgs {
    /// Resource type. Lists every type with default columns when omitted.
    pub resource_type: Option<String>,
}

#[derive(clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current config
    Show,
    /// Set config value
    Set(ConfigSetArgs),
}

#[derive(clap::Args)]
pub struct ConfigSetArgs {
    /// Key to set (server, format, use_post, auth_method, login_url)
    pub key: String,
    /// Value
    pub value: String,
}
