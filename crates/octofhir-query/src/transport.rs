//! HTTP exchange seam.
//!
//! The executor and the login flow never talk to `reqwest` directly; they go
//! through [`Transport`], so tests can script responses and callers can bring
//! their own HTTP stack. [`ReqwestTransport`] is the default.

use std::fmt;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{QueryError, Result};

/// Header name -> value, applied in insertion order.
pub type Headers = IndexMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>, headers: Headers) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers,
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, headers: Headers, body: Option<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers,
            body,
        }
    }
}

/// Status and raw body of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs HTTP exchanges on behalf of the client.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one exchange and return whatever the server answered.
    ///
    /// Only connection-level problems are errors here; status codes are left
    /// to the caller.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Perform one exchange and decode the JSON body.
    ///
    /// # Errors
    ///
    /// [`QueryError::RequestFailed`] on any non-2xx status, carrying the
    /// status, the URL and the `OperationOutcome` diagnostics if present.
    async fn request(&self, request: HttpRequest) -> Result<Value> {
        let url = request.url.clone();
        let response = self.send(request).await?;
        handle_response(&url, response)
    }

    async fn get(&self, url: &str, headers: &Headers) -> Result<Value> {
        self.request(HttpRequest::get(url, headers.clone())).await
    }
}

fn handle_response(url: &str, response: HttpResponse) -> Result<Value> {
    if !response.is_success() {
        let message = operation_outcome_message(&response.body).or_else(|| {
            let body = response.body.trim();
            (!body.is_empty()).then(|| body.to_string())
        });
        return Err(QueryError::request_failed(response.status, url, message));
    }

    if response.body.trim().is_empty() {
        return Ok(Value::Null);
    }

    Ok(serde_json::from_str(&response.body)?)
}

fn operation_outcome_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    if json.get("resourceType")?.as_str()? != "OperationOutcome" {
        return None;
    }
    let msgs: Vec<&str> = json
        .get("issue")?
        .as_array()?
        .iter()
        .filter_map(|i| i.get("diagnostics").and_then(|d| d.as_str()))
        .collect();
    (!msgs.is_empty()).then(|| msgs.join("; "))
}

fn has_header(headers: &Headers, name: &str) -> bool {
    headers.keys().any(|k| k.eq_ignore_ascii_case(name))
}

/// Insert a header, replacing any existing entry whose name differs only in case.
pub(crate) fn set_header(headers: &mut Headers, name: &str, value: impl Into<String>) {
    headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
    headers.insert(name.to_string(), value.into());
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        tracing::debug!(method = %request.method, url = %request.url, "Sending FHIR request");

        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        };
        let mut req = self.http.request(method, &request.url);
        if !has_header(&request.headers, "accept") {
            req = req.header("Accept", "application/fhir+json");
        }
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            if !has_header(&request.headers, "content-type") {
                req = req.header("Content-Type", "application/json");
            }
            req = req.body(body);
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        tracing::debug!(status, "Received FHIR response");

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_header_replaces_any_case() {
        let mut headers = Headers::new();
        headers.insert("authorization".into(), "Bearer a".into());
        headers.insert("X-Tenant".into(), "t1".into());

        set_header(&mut headers, "Authorization", "Bearer b");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers["Authorization"], "Bearer b");
        assert!(!headers.contains_key("authorization"));
        assert!(has_header(&headers, "AUTHORIZATION"));
    }

    #[test]
    fn test_handle_success() {
        let value = handle_response(
            "http://fhir.test/Patient",
            HttpResponse::new(200, r#"{"resourceType":"Bundle"}"#),
        )
        .unwrap();
        assert_eq!(value, json!({"resourceType": "Bundle"}));

        let value = handle_response("http://fhir.test/x", HttpResponse::new(204, "")).unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn test_handle_failure_with_operation_outcome() {
        let body = json!({
            "resourceType": "OperationOutcome",
            "issue": [
                {"severity": "error", "diagnostics": "Unknown parameter 'foo'"},
                {"severity": "error", "diagnostics": "Invalid date"}
            ]
        })
        .to_string();
        let err = handle_response("http://fhir.test/Patient?foo=1", HttpResponse::new(400, body))
            .unwrap_err();

        match err {
            QueryError::RequestFailed { status, url, message } => {
                assert_eq!(status, 400);
                assert_eq!(url, "http://fhir.test/Patient?foo=1");
                assert_eq!(message.as_deref(), Some("Unknown parameter 'foo'; Invalid date"));
            }
            other => panic!("Expected RequestFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_handle_failure_with_plain_body() {
        let err = handle_response("http://fhir.test/Patient", HttpResponse::new(503, "down"))
            .unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert!(err.to_string().ends_with(": down"));
    }

    #[test]
    fn test_invalid_json_body() {
        let err = handle_response("http://fhir.test/Patient", HttpResponse::new(200, "<html>"))
            .unwrap_err();
        assert!(matches!(err, QueryError::Json(_)));
    }

    #[test]
    fn test_http_method_display() {
        assert_eq!(HttpMethod::Get.to_string(), "GET");
        assert_eq!(HttpMethod::Post.to_string(), "POST");
    }
}
