use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use octofhir_query::{AuthMethod, ClientConfig};
use serde::{Deserialize, Serialize};

use crate::cli::{AuthArgs, OutputFormat};

pub const CONFIG_KEYS: &[&str] = &["server", "format", "use_post", "auth_method", "login_url"];

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ProfileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_post: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_url: Option<String>,
}

impl ProfileConfig {
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "server" => self.server = Some(value.to_string()),
            "format" => {
                parse_format(value)?;
                self.format = Some(value.to_string());
            }
            "use_post" => {
                self.use_post = Some(
                    value
                        .parse()
                        .with_context(|| format!("use_post must be true or false, got '{value}'"))?,
                )
            }
            "auth_method" => {
                value.parse::<AuthMethod>()?;
                self.auth_method = Some(value.to_string());
            }
            "login_url" => self.login_url = Some(value.to_string()),
            other => anyhow::bail!("Unknown config key: {other}. Valid keys: {}", CONFIG_KEYS.join(", ")),
        }
        Ok(())
    }

    pub fn output_format(&self) -> Result<Option<OutputFormat>> {
        self.format.as_deref().map(parse_format).transpose()
    }
}

fn parse_format(value: &str) -> Result<OutputFormat> {
    <OutputFormat as clap::ValueEnum>::from_str(value, true)
        .map_err(|_| anyhow::anyhow!("Unknown format: {value}. Valid formats: json, table, csv, ndjson"))
}

pub type ConfigFile = BTreeMap<String, ProfileConfig>;

fn config_path() -> Result<PathBuf> {
    let dir = dirs::home_dir()
        .context("Cannot determine home directory")?
        .join(".octofhir");
    Ok(dir.join("query.toml"))
}

fn load_all_from(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
}

fn save_profile_to(path: &Path, profile: &str, config: &ProfileConfig) -> Result<()> {
    let mut all = load_all_from(path)?;
    all.insert(profile.to_string(), config.clone());
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, toml::to_string_pretty(&all)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn load_profile(profile: &str) -> Result<ProfileConfig> {
    Ok(load_all_from(&config_path()?)?
        .remove(profile)
        .unwrap_or_default())
}

pub fn save_profile(profile: &str, config: &ProfileConfig) -> Result<()> {
    save_profile_to(&config_path()?, profile, config)
}

/// Merge flags, profile settings and `FHIR_*` variables into a client config.
///
/// `--server` and the auth flags are also read from `FHIR_*` variables by
/// clap, so a flag or its variable wins over the profile. The remaining
/// `FHIR_*` variables only fill fields that are still unset.
pub fn client_config(
    cli_server: Option<&str>,
    auth: &AuthArgs,
    profile: &ProfileConfig,
    use_post: bool,
) -> Result<ClientConfig> {
    let server = cli_server.map(str::to_string).or_else(|| profile.server.clone()).context(
        "No server URL configured. Use --server, set FHIR_BASE_URL, or run: fhirq config set server <url>",
    )?;

    let auth_method = auth
        .auth_method
        .as_deref()
        .or(profile.auth_method.as_deref())
        .map(str::parse::<AuthMethod>)
        .transpose()?;

    let config = ClientConfig {
        base_url: server,
        use_post: use_post || profile.use_post.unwrap_or(false),
        auth_method,
        login_url: auth.login_url.clone().or_else(|| profile.login_url.clone()),
        username: auth.username.clone(),
        password: auth.password.clone(),
        token: auth.token.clone(),
        ..ClientConfig::default()
    };
    Ok(config.with_env_fallback()?)
}
