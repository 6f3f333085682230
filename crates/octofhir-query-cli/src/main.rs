mod cli;
mod commands;
mod config;
mod observability;
mod output;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use octofhir_query::FhirQueryClient;

use cli::{Cli, Commands};
use config::ProfileConfig;
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv()
        && !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
    {
        eprintln!("Warning: Failed to load .env file: {e}");
    }

    let cli = Cli::parse();
    observability::init_tracing(&cli.log_level);

    if let Err(e) = run(cli).await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let profile = &cli.profile;
    let profile_cfg = config::load_profile(profile)?;
    let format = match cli.format {
        Some(format) => Some(format),
        None => profile_cfg.output_format()?,
    };

    match &cli.command {
        Commands::Search(args) => {
            let client = make_client(&cli, &profile_cfg, args.query.post)?;
            commands::search::search(&client, args, format.unwrap_or_default()).await?;
        }
        Commands::Table(args) => {
            let client = make_client(&cli, &profile_cfg, args.query.post)?;
            commands::table::table(&client, args, format).await?;
        }
        Commands::Columns(args) => {
            commands::columns::columns(args.resource_type.as_deref(), format.unwrap_or_default())?;
        }
        Commands::Config(args) => match &args.command {
            cli::ConfigCommands::Show => {
                let show = |v: Option<String>| v.unwrap_or_else(|| "(not set)".to_string());
                println!("{}: {}", "Profile".cyan(), profile);
                println!("{}: {}", "Server".cyan(), show(profile_cfg.server.clone()));
                println!(
                    "{}: {}",
                    "Format".cyan(),
                    profile_cfg.format.as_deref().unwrap_or("json")
                );
                println!(
                    "{}: {}",
                    "Use POST".cyan(),
                    profile_cfg.use_post.unwrap_or(false)
                );
                println!("{}: {}", "Auth method".cyan(), show(profile_cfg.auth_method.clone()));
                println!("{}: {}", "Login URL".cyan(), show(profile_cfg.login_url.clone()));
            }
            cli::ConfigCommands::Set(set_args) => {
                let mut cfg = profile_cfg.clone();
                cfg.set(&set_args.key, &set_args.value)?;
                config::save_profile(profile, &cfg)?;
                output::print_success(&format!("Set {} = {}", set_args.key, set_args.value));
            }
        },
    }

    Ok(())
}

fn make_client(cli: &Cli, profile: &ProfileConfig, use_post: bool) -> Result<FhirQueryClient> {
    let config = config::client_config(cli.server.as_deref(), &cli.auth, profile, use_post)?;
    tracing::debug!(?config, "Resolved client configuration");
    Ok(FhirQueryClient::new(config)?)
}
