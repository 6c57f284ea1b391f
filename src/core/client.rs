use crate::domain::model::FetchOptions;
use crate::utils::error::{ConvertError, Result};
use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use url::Url;

pub const REFERENCE_PLACEHOLDER: &str = "{ggisReferenceNumber}";
pub const DEFAULT_SUBMISSIONS_PATH: &str = "/api/open-data/submissions/{ggisReferenceNumber}";
pub const PAGE_PARAM: &str = "pageNumber";

const SNIPPET_CHARS: usize = 300;
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Join the API base and the path template for one GGIS reference.
pub fn submissions_url(api_base: &str, path_template: &str, reference: &str) -> Result<Url> {
    if !path_template.contains(REFERENCE_PLACEHOLDER) {
        return Err(ConvertError::InvalidConfigValueError {
            field: "submissions_path".to_string(),
            value: path_template.to_string(),
            reason: format!("must include the '{}' placeholder", REFERENCE_PLACEHOLDER),
        });
    }
    let path = path_template.replace(REFERENCE_PLACEHOLDER, reference);
    let separator = if path.starts_with('/') { "" } else { "/" };
    let url = format!("{}{}{}", api_base.trim_end_matches('/'), separator, path);
    Ok(Url::parse(&url)?)
}

/// Set the page parameter, replacing any existing one regardless of case.
pub fn with_page_param(url: &Url, page: u32) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !key.eq_ignore_ascii_case(PAGE_PARAM))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut paged = url.clone();
    paged
        .query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(PAGE_PARAM, &page.to_string());
    paged
}

fn page_count(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => s.parse().ok(),
        _ => None,
    }
}

/// `totalSubmissionPages` from the first application, the application
/// object, or the document root. Defaults to one page.
pub fn total_pages(doc: &Value) -> u32 {
    let from_applications = match doc.get("applications") {
        Some(Value::Array(applications)) => applications
            .first()
            .and_then(|first| page_count(first.get("totalSubmissionPages"))),
        Some(application) if application.is_object() => {
            page_count(application.get("totalSubmissionPages"))
        }
        _ => None,
    };
    from_applications
        .or_else(|| page_count(doc.get("totalSubmissionPages")))
        .unwrap_or(1)
        .max(1)
}

fn take_submissions(value: Option<&mut Value>) -> Vec<Value> {
    match value.and_then(|v| v.get_mut("submissions")) {
        Some(Value::Array(items)) => std::mem::take(items),
        _ => Vec::new(),
    }
}

fn append_submissions(target: &mut Value, extra: Vec<Value>) {
    let Value::Object(map) = target else {
        return;
    };
    let slot = map
        .entry("submissions")
        .or_insert_with(|| Value::Array(Vec::new()));
    match slot {
        Value::Array(items) => items.extend(extra),
        other => *other = Value::Array(extra),
    }
}

/// Fold the submissions of a later page into the first page's document.
pub fn merge_page(target: &mut Value, mut page: Value) {
    match (target.get_mut("applications"), page.get_mut("applications")) {
        (Some(Value::Array(ours)), Some(Value::Array(theirs))) => {
            for (application, other) in ours.iter_mut().zip(theirs.iter_mut()) {
                append_submissions(application, take_submissions(Some(other)));
            }
        }
        (Some(ours), Some(theirs)) if ours.is_object() && theirs.is_object() => {
            append_submissions(ours, take_submissions(Some(theirs)));
        }
        _ => {}
    }

    if matches!(page.get("submissions"), Some(Value::Array(_))) {
        append_submissions(target, take_submissions(Some(&mut page)));
    }
}

fn snippet(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(SNIPPET_CHARS).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}

pub struct SubmissionsClient {
    client: Client,
    api_key: String,
    options: FetchOptions,
}

impl SubmissionsClient {
    pub fn new(api_key: &str, options: FetchOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.trim().to_string(),
            options,
        })
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.options
            .retry_backoff
            .saturating_mul(factor)
            .min(self.options.retry_backoff_cap)
    }

    /// GET one page, re-attempting transient failures up to the configured
    /// number of retries.
    pub async fn fetch_json(&self, url: &Url) -> Result<Value> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.fetch_once(url).await {
                Ok(doc) => return Ok(doc),
                Err(e) if e.is_retryable() && attempt <= self.options.retries => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        "Request to {} failed (attempt {}): {}; retrying in {:?}",
                        url,
                        attempt,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &Url) -> Result<Value> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .header("x-api-key", &self.api_key)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        tracing::debug!("API response status: {}", status);
        let text = response.text().await?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ConvertError::UnauthorizedError {
                detail: format!("HTTP {} from {}", status.as_u16(), url),
            });
        }
        if !status.is_success() {
            return Err(ConvertError::HttpStatusError {
                status: status.as_u16(),
                url: url.to_string(),
                body: snippet(text.trim()),
            });
        }

        let doc: Value = serde_json::from_str(text.trim()).map_err(|_| {
            ConvertError::InvalidResponseError {
                message: format!(
                    "non-JSON response (len={}). Snippet: {}",
                    text.len(),
                    snippet(text.trim())
                ),
            }
        })?;

        let gateway_message = doc.get("Message").and_then(Value::as_str).unwrap_or("");
        if gateway_message.to_lowercase().contains("not authorized") {
            return Err(ConvertError::UnauthorizedError {
                detail: gateway_message.to_string(),
            });
        }

        Ok(doc)
    }

    /// Fetch the first page, then every remaining page in order, and merge
    /// them into a single document.
    pub async fn fetch_all_pages(&self, base_url: &Url) -> Result<Value> {
        let mut merged = self.fetch_json(base_url).await?;
        let pages = total_pages(&merged);
        tracing::info!("API reports {} page(s) of submissions", pages);

        for page in 2..=pages {
            if !self.options.page_delay.is_zero() {
                tokio::time::sleep(self.options.page_delay).await;
            }
            let page_url = with_page_param(base_url, page);
            let page_doc = self.fetch_json(&page_url).await?;
            merge_page(&mut merged, page_doc);
            tracing::debug!("Merged page {}/{}", page, pages);
        }

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn quick_options() -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_secs(5),
            retries: 0,
            retry_backoff: Duration::from_millis(1),
            retry_backoff_cap: Duration::from_millis(5),
            page_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_submissions_url() {
        let url = submissions_url("https://api.example.gov.uk/", DEFAULT_SUBMISSIONS_PATH, "GGIS-1").unwrap();
        assert_eq!(url.as_str(), "https://api.example.gov.uk/api/open-data/submissions/GGIS-1");

        let url = submissions_url("https://api.example.gov.uk", "v2/{ggisReferenceNumber}", "R").unwrap();
        assert_eq!(url.as_str(), "https://api.example.gov.uk/v2/R");

        assert!(submissions_url("https://api.example.gov.uk", "/v2/submissions", "R").is_err());
    }

    #[test]
    fn test_with_page_param_replaces_existing() {
        let url = Url::parse("https://api.example.gov.uk/s/R?limit=10&PageNumber=1").unwrap();
        let paged = with_page_param(&url, 3);
        assert_eq!(paged.query(), Some("limit=10&pageNumber=3"));

        let bare = Url::parse("https://api.example.gov.uk/s/R").unwrap();
        assert_eq!(with_page_param(&bare, 2).query(), Some("pageNumber=2"));
    }

    #[test]
    fn test_total_pages_lookup_order() {
        assert_eq!(total_pages(&json!({"applications": [{"totalSubmissionPages": 3}]})), 3);
        assert_eq!(total_pages(&json!({"applications": {"totalSubmissionPages": "4"}})), 4);
        assert_eq!(total_pages(&json!({"totalSubmissionPages": 2, "submissions": []})), 2);
        assert_eq!(total_pages(&json!({"applications": [{"totalSubmissionPages": "many"}]})), 1);
        assert_eq!(total_pages(&json!({"totalSubmissionPages": 0})), 1);
        assert_eq!(total_pages(&json!([])), 1);
    }

    #[test]
    fn test_merge_page_application_list() {
        let mut first = json!({"applications": [
            {"applicationId": "A", "submissions": [{"submissionId": "1"}]},
            {"applicationId": "B", "submissions": [{"submissionId": "2"}]}
        ]});
        let second = json!({"applications": [
            {"applicationId": "A", "submissions": [{"submissionId": "3"}]}
        ]});

        merge_page(&mut first, second);

        assert_eq!(first["applications"][0]["submissions"].as_array().unwrap().len(), 2);
        assert_eq!(first["applications"][0]["submissions"][1]["submissionId"], "3");
        assert_eq!(first["applications"][1]["submissions"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_merge_page_application_object_and_root_list() {
        let mut first = json!({"applications": {"submissions": [{"submissionId": "1"}]}});
        merge_page(&mut first, json!({"applications": {"submissions": [{"submissionId": "2"}]}}));
        assert_eq!(first["applications"]["submissions"].as_array().unwrap().len(), 2);

        let mut first = json!({"submissions": [{"submissionId": "1"}]});
        merge_page(&mut first, json!({"submissions": [{"submissionId": "2"}, {"submissionId": "3"}]}));
        assert_eq!(first["submissions"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_snippet_truncates_long_bodies() {
        let long = "x".repeat(400);
        let short = snippet(&long);
        assert_eq!(short.chars().count(), SNIPPET_CHARS + 1);
        assert!(short.ends_with('…'));
        assert_eq!(snippet("<html>"), "<html>");
    }

    #[tokio::test]
    async fn test_fetch_json_sends_api_key_header() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/open-data/submissions/R-1")
                .header("x-api-key", "secret-key")
                .header("accept", "application/json");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!({"submissions": []}));
        });

        let client = SubmissionsClient::new("  secret-key \n", quick_options()).unwrap();
        let url = submissions_url(&server.base_url(), DEFAULT_SUBMISSIONS_PATH, "R-1").unwrap();
        let doc = client.fetch_json(&url).await.unwrap();

        api_mock.assert();
        assert_eq!(doc, json!({"submissions": []}));
    }

    #[tokio::test]
    async fn test_fetch_json_forbidden() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(GET).path("/forbidden");
            then.status(403).body("{\"message\":\"Forbidden\"}");
        });

        let client = SubmissionsClient::new("key", quick_options()).unwrap();
        let url = Url::parse(&server.url("/forbidden")).unwrap();
        let err = client.fetch_json(&url).await.unwrap_err();

        api_mock.assert();
        assert!(matches!(err, ConvertError::UnauthorizedError { .. }));
    }

    #[tokio::test]
    async fn test_fetch_json_gateway_not_authorized_message() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/gateway");
            then.status(200)
                .json_body(json!({"Message": "User is not authorized to access this resource"}));
        });

        let client = SubmissionsClient::new("key", quick_options()).unwrap();
        let url = Url::parse(&server.url("/gateway")).unwrap();
        let err = client.fetch_json(&url).await.unwrap_err();

        assert!(matches!(err, ConvertError::UnauthorizedError { .. }));
    }

    #[tokio::test]
    async fn test_fetch_json_rejects_non_json_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/html");
            then.status(200).body("<html>maintenance</html>");
        });

        let client = SubmissionsClient::new("key", quick_options()).unwrap();
        let url = Url::parse(&server.url("/html")).unwrap();
        let err = client.fetch_json(&url).await.unwrap_err();

        match err {
            ConvertError::InvalidResponseError { message } => {
                assert!(message.contains("len=24"));
                assert!(message.contains("<html>maintenance</html>"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_json_does_not_retry_by_default() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(GET).path("/flaky");
            then.status(503);
        });

        let client = SubmissionsClient::new("key", quick_options()).unwrap();
        let url = Url::parse(&server.url("/flaky")).unwrap();
        let err = client.fetch_json(&url).await.unwrap_err();

        api_mock.assert_hits(1);
        assert!(matches!(err, ConvertError::HttpStatusError { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_fetch_json_retries_server_errors_when_enabled() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(GET).path("/flaky");
            then.status(502);
        });

        let options = FetchOptions {
            retries: 2,
            ..quick_options()
        };
        let client = SubmissionsClient::new("key", options).unwrap();
        let url = Url::parse(&server.url("/flaky")).unwrap();
        let err = client.fetch_json(&url).await.unwrap_err();

        api_mock.assert_hits(3);
        assert!(matches!(err, ConvertError::HttpStatusError { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_fetch_json_never_retries_client_errors() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404).body("no such scheme");
        });

        let options = FetchOptions {
            retries: 3,
            ..quick_options()
        };
        let client = SubmissionsClient::new("key", options).unwrap();
        let url = Url::parse(&server.url("/missing")).unwrap();
        let err = client.fetch_json(&url).await.unwrap_err();

        api_mock.assert_hits(1);
        match err {
            ConvertError::HttpStatusError { status, body, .. } => {
                assert_eq!(status, 404);
                assert_eq!(body, "no such scheme");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_all_pages_merges_in_order() {
        let server = MockServer::start();
        // Declared first so the page-2 request matches it before the generic mock.
        let page_two = server.mock(|when, then| {
            when.method(GET)
                .path("/api/open-data/submissions/R-1")
                .query_param("pageNumber", "2");
            then.status(200).json_body(json!({"applications": [
                {"submissions": [{"submissionId": "S2"}]}
            ]}));
        });
        let page_one = server.mock(|when, then| {
            when.method(GET).path("/api/open-data/submissions/R-1");
            then.status(200).json_body(json!({"applications": [
                {"applicationFormName": "Form", "totalSubmissionPages": 2,
                 "submissions": [{"submissionId": "S1"}]}
            ]}));
        });

        let client = SubmissionsClient::new("key", quick_options()).unwrap();
        let url = submissions_url(&server.base_url(), DEFAULT_SUBMISSIONS_PATH, "R-1").unwrap();
        let merged = client.fetch_all_pages(&url).await.unwrap();

        page_one.assert_hits(1);
        page_two.assert_hits(1);
        let submissions = merged["applications"][0]["submissions"].as_array().unwrap();
        let ids: Vec<_> = submissions.iter().map(|s| s["submissionId"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["S1", "S2"]);
    }
}
