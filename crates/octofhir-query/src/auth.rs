//! `Authorization` header construction.
//!
//! Three modes are supported:
//!
//! - `basic`: `Basic base64(username:password)`
//! - `token`: `Bearer <token>`
//! - `login`: GET a login URL with basic credentials, then use the response
//!   body as a bearer token
//!
//! `basic` and `token` are computed up front. `login` needs a network
//! round-trip and is resolved on the client's first request.

use std::fmt;
use std::str::FromStr;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{QueryError, Result};
use crate::transport::{Headers, HttpRequest, Transport, set_header};

pub const AUTHORIZATION: &str = "Authorization";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Basic,
    Token,
    Login,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic => write!(f, "basic"),
            Self::Token => write!(f, "token"),
            Self::Login => write!(f, "login"),
        }
    }
}

impl FromStr for AuthMethod {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "token" | "bearer" => Ok(Self::Token),
            "login" => Ok(Self::Login),
            other => Err(QueryError::configuration(format!(
                "Unknown auth method: {other}. Valid methods: basic, token, login"
            ))),
        }
    }
}

/// Everything any auth mode may need. Empty strings count as missing.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_url: Option<String>,
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            ..Self::default()
        }
    }

    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn login(
        login_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            login_url: Some(login_url.into()),
            ..Self::basic(username, password)
        }
    }

    fn username_password(&self) -> Option<(&str, &str)> {
        Some((present(&self.username)?, present(&self.password)?))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("login_url", &self.login_url)
            .finish()
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// `Basic base64(username:password)`
pub fn basic_header(username: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{username}:{password}")))
}

/// `Bearer <token>`
pub fn bearer_header(token: &str) -> String {
    format!("Bearer {token}")
}

/// Derives the `Authorization` header for one configured mode.
#[derive(Debug, Clone, Default)]
pub struct AuthHeaderBuilder {
    method: Option<AuthMethod>,
    credentials: Credentials,
}

impl AuthHeaderBuilder {
    pub fn new(method: Option<AuthMethod>, credentials: Credentials) -> Self {
        Self { method, credentials }
    }

    /// No `Authorization` header at all.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn method(&self) -> Option<AuthMethod> {
        self.method
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Whether building the header needs a network round-trip.
    pub fn is_deferred(&self) -> bool {
        self.method == Some(AuthMethod::Login)
    }

    /// Build the header for modes that need no network access.
    ///
    /// Returns `None` when no auth is configured.
    ///
    /// # Errors
    ///
    /// [`QueryError::CredentialsMissing`] if the mode's credentials are
    /// absent, or if called for `login`, which must go through
    /// [`build`](Self::build).
    pub fn build_eager(&self) -> Result<Option<String>> {
        match self.method {
            None => Ok(None),
            Some(AuthMethod::Basic) => {
                tracing::debug!(username = ?self.credentials.username, "Configuring basic auth header");
                let (username, password) = self.credentials.username_password().ok_or_else(|| {
                    QueryError::credentials_missing(
                        "Username and password are required for basic authentication.",
                    )
                })?;
                Ok(Some(basic_header(username, password)))
            }
            Some(AuthMethod::Token) => {
                tracing::debug!("Configuring token auth header");
                let token = present(&self.credentials.token).ok_or_else(|| {
                    QueryError::credentials_missing("A token is required for token authentication.")
                })?;
                Ok(Some(bearer_header(token)))
            }
            Some(AuthMethod::Login) => Err(QueryError::credentials_missing(
                "Login authentication requires a login request.",
            )),
        }
    }

    /// Build the header, performing the login exchange when needed.
    pub async fn build(&self, transport: &dyn Transport, headers: &Headers) -> Result<Option<String>> {
        match self.method {
            Some(AuthMethod::Login) => self.login(transport, headers).await.map(Some),
            _ => self.build_eager(),
        }
    }

    /// Perform the login exchange and return a bearer header.
    ///
    /// The login URL is fetched with HTTP basic auth and the given headers.
    /// The body is read as JSON first (a string, or an object carrying
    /// `access_token` or `token`) and otherwise used verbatim.
    ///
    /// # Errors
    ///
    /// - [`QueryError::CredentialsMissing`] if username, password or login URL
    ///   is absent.
    /// - [`QueryError::LoginFailed`] on a non-success status.
    pub async fn login(&self, transport: &dyn Transport, headers: &Headers) -> Result<String> {
        tracing::debug!("Configuring login auth with username and password");
        let (username, password) = self.credentials.username_password().ok_or_else(|| {
            QueryError::credentials_missing(
                "Username and password are required for login authentication.",
            )
        })?;
        let login_url = present(&self.credentials.login_url).ok_or_else(|| {
            QueryError::credentials_missing("login_url is required for login authentication")
        })?;

        let mut login_headers = headers.clone();
        set_header(&mut login_headers, AUTHORIZATION, basic_header(username, password));

        tracing::debug!(url = login_url, "Making login request");
        let response = transport.send(HttpRequest::get(login_url, login_headers)).await?;
        if !response.is_success() {
            tracing::error!(status = response.status, url = login_url, "Login request failed");
            return Err(QueryError::login_failed(response.status, login_url));
        }

        let token = token_from_body(&response.body);
        tracing::info!("Login authentication successful");
        Ok(bearer_header(&token))
    }
}

fn token_from_body(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::String(token)) => token,
        Ok(Value::Object(map)) => ["access_token", "token"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| body.trim().to_string()),
        _ => body.trim().to_string(),
    }
}
