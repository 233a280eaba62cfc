//! News-generation API client.
//!
//! The job makes a single `POST` per run carrying a [`NewsRequest`] and reads
//! back a JSON body. Generation can take minutes, so no timeout is applied
//! unless one is configured.
//!
//! # Architecture
//!
//! - [`NewsSource`]: core trait for "fetch one batch of news"
//! - [`HttpNewsSource`]: the reqwest-backed implementation used by the binary

use crate::error::TransportError;
use crate::utils::{python_json_len, truncate_for_log};
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Payload sent to the news API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsRequest {
    pub app_name: String,
    pub model_name: String,
    pub user_id: String,
    /// Session id of the current run.
    pub session_id: String,
    pub query: String,
}

/// A decoded 2xx response body.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedBody {
    pub value: Value,
    /// Length of `value` rendered the way Python's `json.dumps` renders it.
    pub size_bytes: u64,
}

impl FetchedBody {
    /// Wrap a decoded body and record its size.
    ///
    /// # Arguments
    ///
    /// * `value` - The decoded JSON body
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Decode`] if `value` cannot be re-serialized.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let body = FetchedBody::new(json!({"response": []}))?;
    /// assert_eq!(body.size_bytes, 16);
    /// ```
    pub fn new(value: Value) -> Result<Self, TransportError> {
        let size_bytes = python_json_len(&value)? as u64;
        Ok(Self { value, size_bytes })
    }
}

/// Trait for fetching one batch of generated news.
///
/// Implementors return the decoded body on a 2xx answer and a
/// [`TransportError`] for anything else.
pub trait NewsSource {
    async fn fetch(&self, request: &NewsRequest) -> Result<FetchedBody, TransportError>;
}

/// [`NewsSource`] that posts JSON to the configured endpoint.
#[derive(Debug, Clone)]
pub struct HttpNewsSource {
    client: reqwest::Client,
    url: String,
    timeout: Option<Duration>,
}

impl HttpNewsSource {
    /// Build a client for `url`.
    ///
    /// # Arguments
    ///
    /// * `url` - Full endpoint URL the request is posted to
    /// * `timeout` - Whole-request timeout; `None` waits indefinitely for the response
    ///
    /// # Returns
    ///
    /// A ready client, or [`TransportError::Network`] if reqwest cannot build one
    /// (e.g. the TLS backend fails to initialize).
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let source = HttpNewsSource::new("http://localhost:8000/run", None)?;
    /// let quick = HttpNewsSource::new("http://localhost:8000/run", Some(Duration::from_secs(30)))?;
    /// ```
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            url: url.into(),
            timeout,
        })
    }
}

impl NewsSource for HttpNewsSource {
    #[instrument(level = "info", skip_all, fields(url = %self.url, session_id = %request.session_id))]
    async fn fetch(&self, request: &NewsRequest) -> Result<FetchedBody, TransportError> {
        let t0 = Instant::now();
        info!(timeout = ?self.timeout, "Calling news API");

        let resp = self.client.post(&self.url).json(request).send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(
                status = status.as_u16(),
                elapsed_ms = t0.elapsed().as_millis() as u64,
                body = %truncate_for_log(&body, 300),
                "News API returned an error status"
            );
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        let value: Value = serde_json::from_slice(&bytes)?;
        let body = FetchedBody::new(value)?;

        info!(
            status = status.as_u16(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            size_bytes = body.size_bytes,
            "News API call succeeded"
        );
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> NewsRequest {
        NewsRequest {
            app_name: "news_app".to_string(),
            model_name: "gpt-3.5-turbo".to_string(),
            user_id: "user_1".to_string(),
            session_id: "20240813153516".to_string(),
            query: "Generate news using preference".to_string(),
        }
    }

    #[tokio::test]
    async fn test_fetch_posts_request_and_decodes_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/run"))
            .and(body_json(json!({
                "app_name": "news_app",
                "model_name": "gpt-3.5-turbo",
                "user_id": "user_1",
                "session_id": "20240813153516",
                "query": "Generate news using preference"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": []})))
            .expect(1)
            .mount(&server)
            .await;

        let source = HttpNewsSource::new(format!("{}/run", server.uri()), None).unwrap();
        let body = source.fetch(&request()).await.unwrap();

        assert_eq!(body.value, json!({"response": []}));
        assert_eq!(body.size_bytes, r#"{"response": []}"#.len() as u64);
    }

    #[tokio::test]
    async fn test_fetch_non_success_status_keeps_code_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal failure"))
            .mount(&server)
            .await;

        let source = HttpNewsSource::new(server.uri(), None).unwrap();
        let err = source.fetch(&request()).await.unwrap_err();

        match &err {
            TransportError::Status { status, body } => {
                assert_eq!(*status, 500);
                assert_eq!(body, "internal failure");
            }
            other => panic!("expected status error, got {other:?}"),
        }
        assert_eq!(err.to_string(), "HTTP 500: internal failure");
    }

    #[tokio::test]
    async fn test_fetch_invalid_json_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let source = HttpNewsSource::new(server.uri(), None).unwrap();
        let err = source.fetch(&request()).await.unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }

    #[tokio::test]
    async fn test_fetch_honors_configured_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"response": []}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let source = HttpNewsSource::new(server.uri(), Some(Duration::from_millis(100))).unwrap();
        let err = source.fetch(&request()).await.unwrap_err();
        assert!(matches!(err, TransportError::Network(ref e) if e.is_timeout()));
    }

    #[tokio::test]
    async fn test_fetch_unreachable_host_is_network_error() {
        let source = HttpNewsSource::new("http://127.0.0.1:9/run", None).unwrap();
        let err = source.fetch(&request()).await.unwrap_err();
        assert!(matches!(err, TransportError::Network(_)));
    }

    #[test]
    fn test_fetched_body_size_matches_json_dumps() {
        assert_eq!(FetchedBody::new(json!({})).unwrap().size_bytes, 2);
        assert_eq!(FetchedBody::new(json!({"response": []})).unwrap().size_bytes, 16);
        // "é" is written as \u00e9
        assert_eq!(FetchedBody::new(json!({"h": "é"})).unwrap().size_bytes, 15);
    }

    #[tokio::test]
    async fn test_fetch_size_counts_non_ascii_as_escapes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("{\"h\":\"é\"}".as_bytes(), "application/json"))
            .mount(&server)
            .await;

        let source = HttpNewsSource::new(server.uri(), None).unwrap();
        let body = source.fetch(&request()).await.unwrap();

        assert_eq!(body.value, json!({"h": "é"}));
        assert_eq!(body.size_bytes, 15);
    }
}
