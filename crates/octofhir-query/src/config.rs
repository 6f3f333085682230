//! Client configuration, optionally sourced from `FHIR_*` environment variables.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::auth::{AuthMethod, Credentials};
use crate::error::{QueryError, Result};
use crate::transport::Headers;

pub const ENV_BASE_URL: &str = "FHIR_BASE_URL";
pub const ENV_AUTH_METHOD: &str = "FHIR_AUTH_METHOD";
pub const ENV_LOGIN_URL: &str = "FHIR_LOGIN_URL";
pub const ENV_USERNAME: &str = "FHIR_USERNAME";
pub const ENV_PASSWORD: &str = "FHIR_PASSWORD";
pub const ENV_TOKEN: &str = "FHIR_TOKEN";
pub const ENV_USE_POST: &str = "FHIR_USE_POST";

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    /// Search with `POST {type}/_search` instead of GET.
    pub use_post: bool,
    /// Sent with every request, including login and page requests.
    pub headers: Headers,
    pub auth_method: Option<AuthMethod>,
    pub login_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_auth(mut self, method: AuthMethod, credentials: Credentials) -> Self {
        self.auth_method = Some(method);
        self.login_url = credentials.login_url;
        self.username = credentials.username;
        self.password = credentials.password;
        self.token = credentials.token;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_use_post(mut self, use_post: bool) -> Self {
        self.use_post = use_post;
        self
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
            token: self.token.clone(),
            login_url: self.login_url.clone(),
        }
    }

    /// Build a configuration entirely from the environment.
    ///
    /// # Errors
    ///
    /// [`QueryError::Configuration`] if `FHIR_BASE_URL` is unset or a value
    /// cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::default().fill_from(|key| std::env::var(key).ok())
    }

    /// Fill every unset field from the environment, keeping explicit values.
    pub fn with_env_fallback(self) -> Result<Self> {
        self.fill_from(|key| std::env::var(key).ok())
    }

    fn fill_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.base_url.is_empty() {
            self.base_url = var(ENV_BASE_URL).ok_or_else(|| {
                QueryError::configuration(format!("{ENV_BASE_URL} is not set and no base URL was given"))
            })?;
        }
        if self.auth_method.is_none()
            && let Some(method) = var(ENV_AUTH_METHOD)
        {
            self.auth_method = Some(method.parse()?);
        }
        if !self.use_post
            && let Some(flag) = var(ENV_USE_POST)
        {
            self.use_post = parse_bool(&flag).ok_or_else(|| {
                QueryError::configuration(format!("{ENV_USE_POST} must be a boolean, got '{flag}'"))
            })?;
        }

        self.login_url = self.login_url.or_else(|| var(ENV_LOGIN_URL));
        self.username = self.username.or_else(|| var(ENV_USERNAME));
        self.password = self.password.or_else(|| var(ENV_PASSWORD));
        self.token = self.token.or_else(|| var(ENV_TOKEN));

        Ok(self)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("use_post", &self.use_post)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("auth_method", &self.auth_method)
            .field("login_url", &self.login_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
