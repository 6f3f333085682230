use thiserror::Error;

/// Errors raised while building, executing or shaping FHIR queries
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Only one of params, search_string or full_url may be provided (got {})", .supplied.join(", "))]
    AmbiguousQuery { supplied: Vec<&'static str> },

    #[error("Request to {url} failed (HTTP {status}){}", detail_suffix(.message))]
    RequestFailed {
        status: u16,
        url: String,
        message: Option<String>,
    },

    #[error("Missing credentials: {0}")]
    CredentialsMissing(String),

    #[error("Login request to {url} failed (HTTP {status})")]
    LoginFailed { status: u16, url: String },

    #[error("Bundle contains {0} resources, expected at most one")]
    MultipleResources(usize),

    #[error("{}", no_default_message(.resource_type))]
    NoDefaultProjection { resource_type: Option<String> },

    #[error("Invalid path expression '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Invalid FHIR resource type: {0}")]
    InvalidResourceType(String),

    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(url::ParseError),

    #[error("Cannot build request URL from '{path}': {source}")]
    InvalidUrl {
        path: String,
        #[source]
        source: url::ParseError,
    },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Output error: {0}")]
    Output(String),
}

impl QueryError {
    /// Create a new AmbiguousQuery error
    pub fn ambiguous_query(supplied: Vec<&'static str>) -> Self {
        Self::AmbiguousQuery { supplied }
    }

    /// Create a new RequestFailed error
    pub fn request_failed(status: u16, url: impl Into<String>, message: Option<String>) -> Self {
        Self::RequestFailed {
            status,
            url: url.into(),
            message,
        }
    }

    /// Create a new CredentialsMissing error
    pub fn credentials_missing(message: impl Into<String>) -> Self {
        Self::CredentialsMissing(message.into())
    }

    /// Create a new LoginFailed error
    pub fn login_failed(status: u16, url: impl Into<String>) -> Self {
        Self::LoginFailed {
            status,
            url: url.into(),
        }
    }

    /// Create a new NoDefaultProjection error
    pub fn no_default_projection(resource_type: Option<&str>) -> Self {
        Self::NoDefaultProjection {
            resource_type: resource_type.map(str::to_string),
        }
    }

    /// Create a new InvalidPath error
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new InvalidResourceType error
    pub fn invalid_resource_type(resource_type: impl Into<String>) -> Self {
        Self::InvalidResourceType(resource_type.into())
    }

    /// Create a new InvalidUrl error
    pub fn invalid_url(path: impl Into<String>, source: url::ParseError) -> Self {
        Self::InvalidUrl {
            path: path.into(),
            source,
        }
    }

    /// Create a new Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RequestFailed { status, .. } | Self::LoginFailed { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AmbiguousQuery { .. }
            | Self::InvalidPath { .. }
            | Self::InvalidResourceType(_)
            | Self::InvalidBaseUrl(_)
            | Self::InvalidUrl { .. } => ErrorCategory::Validation,
            Self::RequestFailed { .. } | Self::Http(_) => ErrorCategory::Transport,
            Self::CredentialsMissing(_) | Self::LoginFailed { .. } => ErrorCategory::Auth,
            Self::MultipleResources(_) | Self::NoDefaultProjection { .. } => {
                ErrorCategory::Bundle
            }
            Self::Json(_) | Self::Output(_) => ErrorCategory::Serialization,
            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }
}

fn detail_suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

fn no_default_message(resource_type: &Option<String>) -> String {
    match resource_type {
        Some(rt) => format!("No default columns for resource type: {rt}"),
        None => "Bundle is empty and no columns specified".to_string(),
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Transport,
    Auth,
    Bundle,
    Serialization,
    Configuration,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Transport => write!(f, "transport"),
            Self::Auth => write!(f, "auth"),
            Self::Bundle => write!(f, "bundle"),
            Self::Serialization => write!(f, "serialization"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Convenience result type for query operations
pub type Result<T> = std::result::Result<T, QueryError>;
