//! The high-level search client.
//!
//! [`FhirQueryClient`] owns a [`ClientConfig`], a [`Transport`] and the
//! resolved `Authorization` header. Basic and token auth are resolved when the
//! client is built; login auth runs once, on the first search.

use std::sync::Arc;

use tokio::sync::OnceCell;
use url::Url;

use crate::auth::{AUTHORIZATION, AuthHeaderBuilder, AuthMethod, Credentials};
use crate::bundle::QueryBundle;
use crate::config::ClientConfig;
use crate::error::{QueryError, Result};
use crate::query::{QueryExecutor, SearchRequest};
use crate::resource_type::ResourceType;
use crate::transport::{Headers, ReqwestTransport, Transport, set_header};

/// FHIR search client.
///
/// Holds the server base URL, default headers and auth state. The
/// `Authorization` header is computed when the client is built for `basic`
/// and `token` auth, and on the first request for `login` auth.
pub struct FhirQueryClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    executor: QueryExecutor,
    auth: AuthHeaderBuilder,
    auth_header: OnceCell<Option<String>>,
}

impl FhirQueryClient {
    /// Create a client over the default reqwest transport.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_transport(config, Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(mut config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let base_url = normalize_base_url(&config.base_url)?;
        config.base_url = base_url.to_string();

        let auth = AuthHeaderBuilder::new(config.auth_method, config.credentials());
        let auth_header = eager_header(&auth)?;
        let executor = QueryExecutor::new(transport.clone(), base_url, config.use_post);

        tracing::debug!(base_url = %config.base_url, auth = ?config.auth_method, "FHIR client initialized");

        Ok(Self {
            config,
            transport,
            executor,
            auth,
            auth_header,
        })
    }

    pub fn base_url(&self) -> &Url {
        self.executor.base_url()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Replace the auth mode, dropping any cached header.
    pub fn set_auth(&mut self, method: AuthMethod, credentials: Credentials) -> Result<()> {
        let auth = AuthHeaderBuilder::new(Some(method), credentials.clone());
        self.auth_header = eager_header(&auth)?;
        self.auth = auth;
        self.config = self.config.clone().with_auth(method, credentials);
        Ok(())
    }

    /// Remove authentication entirely.
    pub fn clear_auth(&mut self) {
        self.auth = AuthHeaderBuilder::none();
        self.auth_header = OnceCell::new_with(Some(None));
        self.config.auth_method = None;
    }

    /// Resolve the `Authorization` header, logging in if that has not
    /// happened yet. Concurrent callers share a single login exchange.
    pub async fn ensure_auth(&self) -> Result<Option<&str>> {
        let header = self
            .auth_header
            .get_or_try_init(|| self.auth.build(self.transport.as_ref(), &self.config.headers))
            .await?;
        Ok(header.as_deref())
    }

    /// Search `resource_type` and return the merged bundle of every page fetched.
    ///
    /// Headers are layered as client defaults, then `Authorization`, then the
    /// request's own headers.
    pub async fn search(&self, resource_type: &str, request: &SearchRequest) -> Result<QueryBundle> {
        let resource_type: ResourceType = resource_type.parse()?;
        request.validate()?;

        let headers = self.request_headers(request).await?;
        self.executor
            .execute(resource_type.as_str(), request, &headers)
            .await
    }

    async fn request_headers(&self, request: &SearchRequest) -> Result<Headers> {
        let mut headers = self.config.headers.clone();
        if let Some(auth) = self.ensure_auth().await? {
            set_header(&mut headers, AUTHORIZATION, auth);
        }
        for (name, value) in &request.headers {
            set_header(&mut headers, name, value.as_str());
        }
        Ok(headers)
    }
}

impl std::fmt::Debug for FhirQueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FhirQueryClient")
            .field("config", &self.config)
            .field("authenticated", &self.auth_header.get().is_some_and(Option::is_some))
            .finish_non_exhaustive()
    }
}

fn eager_header(auth: &AuthHeaderBuilder) -> Result<OnceCell<Option<String>>> {
    if auth.is_deferred() {
        return Ok(OnceCell::new());
    }
    Ok(OnceCell::new_with(Some(auth.build_eager()?)))
}

/// Parse the base URL and make sure it ends in `/` so joins append to it.
fn normalize_base_url(raw: &str) -> Result<Url> {
    let mut base = raw.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base).map_err(QueryError::InvalidBaseUrl)
}
