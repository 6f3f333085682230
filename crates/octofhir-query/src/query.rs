//! Search request building and multi-page execution.

use std::sync::Arc;

use url::Url;

use crate::bundle::QueryBundle;
use crate::error::{QueryError, Result};
use crate::transport::{Headers, HttpRequest, Transport};

/// One search against a FHIR server.
///
/// At most one of `params`, `search_string` and `full_url` may be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
    /// Search parameters, form-encoded in the given order. Repeated keys are kept.
    pub params: Option<Vec<(String, String)>>,
    /// A pre-encoded query string, used verbatim.
    pub search_string: Option<String>,
    /// An absolute URL fetched as-is, typically a paging link.
    pub full_url: Option<String>,
    /// Use `POST {type}/_search` even if the executor defaults to GET.
    pub use_post: bool,
    /// Total number of requests allowed, following `next` links.
    pub pages: Option<usize>,
    /// Extra headers for this request only.
    pub headers: Headers,
}

impl SearchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params
            .get_or_insert_with(Vec::new)
            .push((key.into(), value.into()));
        self
    }

    pub fn params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let list = self.params.get_or_insert_with(Vec::new);
        list.extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn search_string(mut self, query: impl Into<String>) -> Self {
        self.search_string = Some(query.into());
        self
    }

    pub fn full_url(mut self, url: impl Into<String>) -> Self {
        self.full_url = Some(url.into());
        self
    }

    pub fn use_post(mut self, use_post: bool) -> Self {
        self.use_post = use_post;
        self
    }

    pub fn pages(mut self, pages: usize) -> Self {
        self.pages = Some(pages);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Reject requests that name more than one query source.
    pub fn validate(&self) -> Result<()> {
        let supplied: Vec<&'static str> = [
            (self.params.is_some(), "params"),
            (self.search_string.is_some(), "search_string"),
            (self.full_url.is_some(), "full_url"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect();

        if supplied.len() > 1 {
            return Err(QueryError::ambiguous_query(supplied));
        }
        Ok(())
    }

    /// The encoded query string, or `None` when there is nothing to send.
    pub fn query_string(&self) -> Option<String> {
        if let Some(params) = &self.params {
            if params.is_empty() {
                return None;
            }
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            for (key, value) in params {
                serializer.append_pair(key, value);
            }
            return Some(serializer.finish());
        }
        self.search_string.clone().filter(|s| !s.is_empty())
    }

    fn page_limit(&self) -> usize {
        self.pages.unwrap_or(1).max(1)
    }
}

/// Turns a [`SearchRequest`] into HTTP exchanges and accumulates the pages.
#[derive(Clone)]
pub struct QueryExecutor {
    transport: Arc<dyn Transport>,
    base_url: Url,
    use_post: bool,
}

impl QueryExecutor {
    /// `base_url` must end in `/` for relative joins to keep its last segment.
    pub fn new(transport: Arc<dyn Transport>, base_url: Url, use_post: bool) -> Self {
        Self {
            transport,
            base_url,
            use_post,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn use_post(&self) -> bool {
        self.use_post
    }

    /// Run a search and return every fetched page merged into one bundle.
    ///
    /// `headers` are sent on the first request and on every page request.
    /// A failure on any page aborts the whole search.
    pub async fn execute(
        &self,
        resource_type: &str,
        request: &SearchRequest,
        headers: &Headers,
    ) -> Result<QueryBundle> {
        request.validate()?;

        tracing::debug!(
            resource_type,
            params = ?request.params,
            full_url = ?request.full_url,
            search_string = ?request.search_string,
            use_post = request.use_post,
            pages = ?request.pages,
            "Making FHIR request"
        );

        let first = self.first_request(resource_type, request, headers)?;
        let page = self.transport.request(first).await?;
        let mut bundle = QueryBundle::new(page);

        let limit = request.page_limit();
        let mut issued = 1;
        while issued < limit {
            let Some(next) = bundle.next_link().map(str::to_string) else {
                tracing::debug!(issued, "No next link, stopping pagination");
                break;
            };
            tracing::debug!(url = %next, remaining = limit - issued, "Fetching next page");
            let page = self.transport.get(&next, headers).await?;
            issued += 1;
            bundle.set_links(&page);
            bundle.accumulate(page);
        }

        Ok(bundle)
    }

    fn first_request(
        &self,
        resource_type: &str,
        request: &SearchRequest,
        headers: &Headers,
    ) -> Result<HttpRequest> {
        if let Some(full_url) = &request.full_url {
            tracing::debug!(url = %full_url, "Making request with full URL");
            return Ok(HttpRequest::get(full_url.as_str(), headers.clone()));
        }

        let query = request.query_string();
        if request.use_post || self.use_post {
            let path = format!("{resource_type}/_search");
            let url = self
                .base_url
                .join(&path)
                .map_err(|e| QueryError::invalid_url(path, e))?;
            tracing::debug!(%url, query = ?query, "Making POST request");
            let body = query.as_ref().map(serde_json::to_string).transpose()?;
            return Ok(HttpRequest::post(url.as_str(), headers.clone(), body));
        }

        let mut url = self
            .base_url
            .join(resource_type)
            .map_err(|e| QueryError::invalid_url(resource_type, e))?
            .to_string();
        if let Some(query) = query {
            url.push('?');
            url.push_str(&query);
        }
        tracing::debug!(%url, "Making GET request");
        Ok(HttpRequest::get(url, headers.clone()))
    }
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("base_url", &self.base_url.as_str())
            .field("use_post", &self.use_post)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::{HttpMethod, HttpResponse};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses in order and records every request.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        responses: Mutex<VecDeque<HttpResponse>>,
        pub(crate) requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(responses: Vec<HttpResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn json(bodies: Vec<Value>) -> Arc<Self> {
            Self::new(
                bodies
                    .into_iter()
                    .map(|b| HttpResponse::new(200, b.to_string()))
                    .collect(),
            )
        }

        pub(crate) fn recorded(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push(request);
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| HttpResponse::new(200, json!({"resourceType": "Bundle"}).to_string())))
        }
    }

    const BASE: &str = "https://test.fhir.server/fhir/";

    fn executor(transport: Arc<ScriptedTransport>, use_post: bool) -> QueryExecutor {
        QueryExecutor::new(transport, Url::parse(BASE).unwrap(), use_post)
    }

    fn page(ids: &[&str], next: Option<&str>) -> Value {
        let entries: Vec<Value> = ids
            .iter()
            .map(|id| json!({"resource": {"resourceType": "Patient", "id": id}}))
            .collect();
        let mut bundle = json!({"resourceType": "Bundle", "entry": entries});
        if let Some(next) = next {
            bundle["link"] = json!([{"relation": "next", "url": next}]);
        }
        bundle
    }

    fn chain(len: usize) -> Vec<Value> {
        (1..=len)
            .map(|i| {
                let id = format!("p{i}");
                let next = (i < len).then(|| format!("{BASE}Patient?page={}", i + 1));
                page(&[id.as_str()], next.as_deref())
            })
            .collect()
    }

    #[tokio::test]
    async fn test_get_with_params() {
        let transport = ScriptedTransport::json(vec![page(&["123"], None)]);
        let request = SearchRequest::new().param("name", "Smith").param("_count", "1");

        let bundle = executor(transport.clone(), false)
            .execute("Patient", &request, &Headers::new())
            .await
            .unwrap();

        assert_eq!(bundle.collect_ids(), vec!["123"]);
        let sent = transport.recorded();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, HttpMethod::Get);
        assert_eq!(sent[0].url, "https://test.fhir.server/fhir/Patient?name=Smith&_count=1");
        assert_eq!(sent[0].body, None);
    }

    #[tokio::test]
    async fn test_get_with_search_string() {
        let transport = ScriptedTransport::json(vec![page(&["123"], None)]);
        let request = SearchRequest::new().search_string("name=Smith&_count=1");

        executor(transport.clone(), false)
            .execute("Patient", &request, &Headers::new())
            .await
            .unwrap();

        assert_eq!(
            transport.recorded()[0].url,
            "https://test.fhir.server/fhir/Patient?name=Smith&_count=1"
        );
    }

    #[tokio::test]
    async fn test_get_without_query() {
        let transport = ScriptedTransport::json(vec![page(&[], None)]);
        executor(transport.clone(), false)
            .execute("Patient", &SearchRequest::new().params(Vec::<(String, String)>::new()), &Headers::new())
            .await
            .unwrap();
        assert_eq!(transport.recorded()[0].url, "https://test.fhir.server/fhir/Patient");
    }

    #[tokio::test]
    async fn test_params_are_form_encoded() {
        let request = SearchRequest::new()
            .param("name", "Smith Jones")
            .param("code", "http://loinc.org|1234-5")
            .param("code", "x&y");
        assert_eq!(
            request.query_string().as_deref(),
            Some("name=Smith+Jones&code=http%3A%2F%2Floinc.org%7C1234-5&code=x%26y")
        );
    }

    #[tokio::test]
    async fn test_post_search_body_is_json_string() {
        let transport = ScriptedTransport::json(vec![page(&["123"], None)]);
        let request = SearchRequest::new().param("name", "Smith").use_post(true);

        executor(transport.clone(), false)
            .execute("Patient", &request, &Headers::new())
            .await
            .unwrap();

        let sent = transport.recorded();
        assert_eq!(sent[0].method, HttpMethod::Post);
        assert_eq!(sent[0].url, "https://test.fhir.server/fhir/Patient/_search");
        assert_eq!(sent[0].body.as_deref(), Some("\"name=Smith\""));
    }

    #[tokio::test]
    async fn test_executor_default_post_without_query() {
        let transport = ScriptedTransport::json(vec![page(&[], None)]);
        executor(transport.clone(), true)
            .execute("Observation", &SearchRequest::new(), &Headers::new())
            .await
            .unwrap();

        let sent = transport.recorded();
        assert_eq!(sent[0].method, HttpMethod::Post);
        assert_eq!(sent[0].url, "https://test.fhir.server/fhir/Observation/_search");
        assert_eq!(sent[0].body, None);
    }

    #[tokio::test]
    async fn test_full_url_is_fetched_verbatim() {
        let transport = ScriptedTransport::json(vec![page(&["9"], None)]);
        let url = "https://other.server/fhir/Patient?_getpages=abc&_offset=20";
        executor(transport.clone(), true)
            .execute("Patient", &SearchRequest::new().full_url(url), &Headers::new())
            .await
            .unwrap();

        let sent = transport.recorded();
        assert_eq!(sent[0].method, HttpMethod::Get);
        assert_eq!(sent[0].url, url);
    }

    #[tokio::test]
    async fn test_unjoinable_resource_type_is_an_url_error() {
        for use_post in [false, true] {
            let transport = ScriptedTransport::json(vec![]);
            let err = executor(transport.clone(), use_post)
                .execute("http://[::1", &SearchRequest::new(), &Headers::new())
                .await
                .unwrap_err();
            match err {
                QueryError::InvalidUrl { path, .. } => assert!(path.starts_with("http://[::1")),
                other => panic!("Expected InvalidUrl, got {other:?}"),
            }
            assert!(transport.recorded().is_empty());
        }
    }

    #[tokio::test]
    async fn test_ambiguous_requests_issue_nothing() {
        let combos = [
            SearchRequest::new().param("name", "Smith").search_string("name=Smith"),
            SearchRequest::new().param("name", "Smith").full_url("http://x/Patient"),
            SearchRequest::new().search_string("name=Smith").full_url("http://x/Patient"),
            SearchRequest::new()
                .param("name", "Smith")
                .search_string("name=Smith")
                .full_url("http://x/Patient"),
        ];

        for request in combos {
            let transport = ScriptedTransport::json(vec![]);
            let err = executor(transport.clone(), false)
                .execute("Patient", &request, &Headers::new())
                .await
                .unwrap_err();
            assert!(matches!(err, QueryError::AmbiguousQuery { .. }));
            assert!(transport.recorded().is_empty());
        }
    }

    #[tokio::test]
    async fn test_pagination_follows_next_links() {
        let transport = ScriptedTransport::json(vec![
            page(&["p1"], Some("https://test.fhir.server/fhir/Patient?page=2")),
            page(&["p2"], None),
        ]);
        let request = SearchRequest::new().param("name", "Smith").pages(2);

        let bundle = executor(transport.clone(), false)
            .execute("Patient", &request, &Headers::new())
            .await
            .unwrap();

        assert_eq!(bundle.collect_ids(), vec!["p1", "p2"]);
        let sent = transport.recorded();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].url, "https://test.fhir.server/fhir/Patient?page=2");
        assert_eq!(sent[1].method, HttpMethod::Get);
    }

    #[tokio::test]
    async fn test_request_count_is_min_of_pages_and_chain() {
        for (pages, chain_len) in [(1, 3), (2, 3), (3, 3), (5, 3), (4, 1)] {
            let transport = ScriptedTransport::json(chain(chain_len));
            let bundle = executor(transport.clone(), false)
                .execute("Patient", &SearchRequest::new().pages(pages), &Headers::new())
                .await
                .unwrap();

            let expected = pages.min(chain_len);
            assert_eq!(transport.recorded().len(), expected, "pages={pages} chain={chain_len}");
            assert_eq!(bundle.size(), expected);
        }
    }

    #[tokio::test]
    async fn test_page_requests_reuse_headers() {
        let transport = ScriptedTransport::json(chain(3));
        let mut headers = Headers::new();
        headers.insert("Authorization".into(), "Bearer t".into());

        executor(transport.clone(), false)
            .execute("Patient", &SearchRequest::new().pages(3), &headers)
            .await
            .unwrap();

        for request in transport.recorded() {
            assert_eq!(request.headers["Authorization"], "Bearer t");
        }
    }

    #[tokio::test]
    async fn test_failure_mid_pagination_aborts() {
        let transport = ScriptedTransport::new(vec![
            HttpResponse::new(
                200,
                page(&["p1"], Some("https://test.fhir.server/fhir/Patient?page=2")).to_string(),
            ),
            HttpResponse::new(500, "boom"),
        ]);

        let err = executor(transport.clone(), false)
            .execute("Patient", &SearchRequest::new().pages(3), &Headers::new())
            .await
            .unwrap_err();

        match err {
            QueryError::RequestFailed { status, url, .. } => {
                assert_eq!(status, 500);
                assert_eq!(url, "https://test.fhir.server/fhir/Patient?page=2");
            }
            other => panic!("Expected RequestFailed, got {other:?}"),
        }
        assert_eq!(transport.recorded().len(), 2);
    }
}
