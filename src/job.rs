//! One execution of the ingestion job.
//!
//! A run moves through [`RunPhase::Started`] → [`RunPhase::CallingApi`] →
//! [`RunPhase::Normalizing`] → [`RunPhase::Done`], and can jump to `Done` from
//! any phase on failure. Whatever happens, exactly one [`RunLog`] is inserted
//! as the last action of the run. Only a failure to write that log escapes
//! [`run_job`]; every other failure is recorded in it.

use crate::api::{NewsRequest, NewsSource};
use crate::config::JobConfig;
use crate::error::{JobError, StoreError};
use crate::models::{RunLog, RunStatus};
use crate::normalize;
use crate::store::{self, DocumentStore};
use crate::utils::is_falsy;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

/// Phases of a run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Started,
    CallingApi,
    Normalizing,
    Done,
}

/// Format a UTC instant as a session id (`YYYYMMDDHHMMSS`).
pub fn session_id(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d%H%M%S").to_string()
}

/// Build the API payload for a run from static configuration.
pub fn build_request(config: &JobConfig, session_id: &str) -> NewsRequest {
    NewsRequest {
        app_name: config.app_name.clone(),
        model_name: config.model_name.clone(),
        user_id: config.user_id.clone(),
        session_id: session_id.to_string(),
        query: config.query.clone(),
    }
}

/// Accounting accumulated while a run progresses.
#[derive(Debug)]
struct RunAccount {
    session_id: String,
    start: DateTime<Utc>,
    phase: RunPhase,
    status: RunStatus,
    response_size_bytes: u64,
    error_message: Option<String>,
}

impl RunAccount {
    fn begin(start: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id(start),
            start,
            phase: RunPhase::Started,
            status: RunStatus::Fail,
            response_size_bytes: 0,
            error_message: None,
        }
    }

    fn enter(&mut self, phase: RunPhase) {
        debug!(from = ?self.phase, to = ?phase, "Run phase change");
        self.phase = phase;
    }

    fn finish(self, end: DateTime<Utc>) -> RunLog {
        let total_time_taken_seconds = (end - self.start)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        RunLog {
            session_id: self.session_id,
            start_timestamp: self.start,
            end_timestamp: end,
            status: self.status,
            total_time_taken_seconds,
            response_size_bytes: self.response_size_bytes,
            error_message: self.error_message,
        }
    }
}

/// Run one job cycle and persist its [`RunLog`].
///
/// Returns the run log that was written. The error case is reserved for a
/// failure to insert the run log itself.
#[instrument(level = "info", skip_all, fields(session_id))]
pub async fn run_job<S: NewsSource>(
    config: &JobConfig,
    source: &S,
    store: &dyn DocumentStore,
) -> Result<RunLog, StoreError> {
    let mut account = RunAccount::begin(Utc::now());
    tracing::Span::current().record("session_id", account.session_id.as_str());
    info!(url = %config.news_api_url, "Starting run");

    match execute(config, source, store, &mut account).await {
        Ok(Some(count)) => {
            account.status = RunStatus::Pass;
            info!(count, "News inserted successfully");
        }
        Ok(None) => {
            warn!(size_bytes = account.response_size_bytes, "News API returned an empty body; nothing to ingest");
        }
        Err(e) => {
            error!(phase = ?account.phase, error = %e, "Run failed");
            account.error_message = Some(e.to_string());
        }
    }

    account.enter(RunPhase::Done);
    let log = account.finish(Utc::now());
    store::insert(store, &log).await?;

    info!(
        status = %log.status,
        duration_secs = log.total_time_taken_seconds,
        size_bytes = log.response_size_bytes,
        "Logged run"
    );
    Ok(log)
}

/// Run one job cycle, then release the store whatever the outcome.
///
/// The store is closed after [`run_job`] returns, on success and on a failed
/// run-log write alike, and the run's result is handed back unchanged.
#[instrument(level = "info", skip_all)]
pub async fn run_and_close<S: NewsSource>(
    config: &JobConfig,
    source: &S,
    store: &dyn DocumentStore,
) -> Result<RunLog, StoreError> {
    let outcome = run_job(config, source, store).await;
    store.close().await;
    info!(ok = outcome.is_ok(), "Store connection closed");
    outcome
}

/// The fallible body of a run. `Ok(None)` means the API had nothing to ingest.
async fn execute<S: NewsSource>(
    config: &JobConfig,
    source: &S,
    store: &dyn DocumentStore,
    account: &mut RunAccount,
) -> Result<Option<usize>, JobError> {
    let request = build_request(config, &account.session_id);

    account.enter(RunPhase::CallingApi);
    let body = source.fetch(&request).await?;
    account.response_size_bytes = body.size_bytes;

    if is_falsy(&body.value) {
        return Ok(None);
    }

    account.enter(RunPhase::Normalizing);
    let count = normalize::ingest(store, &body.value).await?;
    Ok(Some(count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{FetchedBody, HttpNewsSource};
    use crate::error::TransportError;
    use crate::store::memory::MemoryStore;
    use chrono::TimeZone;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: &str) -> JobConfig {
        JobConfig {
            store_uri: "sqlite::memory:".to_string(),
            news_api_url: url.to_string(),
            app_name: "news_app".to_string(),
            user_id: "user_1".to_string(),
            query: "Generate news using preference".to_string(),
            model_name: "gpt-3.5-turbo".to_string(),
            db_name: "sane-news".to_string(),
            api_timeout: None,
        }
    }

    async fn mock_api(template: ResponseTemplate) -> (MockServer, HttpNewsSource) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(template)
            .mount(&server)
            .await;
        let source = HttpNewsSource::new(server.uri(), None).unwrap();
        (server, source)
    }

    /// Assert the store holds exactly one run log and that it matches `log`.
    fn assert_logged(store: &MemoryStore, log: &RunLog) {
        let logs = store.documents("agent_call_log");
        assert_eq!(logs.len(), 1, "exactly one run log per run");
        let stored: RunLog = serde_json::from_value(logs[0].clone()).unwrap();
        assert_eq!(stored.session_id, log.session_id);
        assert_eq!(stored.status, log.status);
        assert_eq!(stored.start_timestamp, log.start_timestamp);
        assert_eq!(stored.end_timestamp, log.end_timestamp);
        assert_eq!(stored.response_size_bytes, log.response_size_bytes);
        assert_eq!(stored.error_message, log.error_message);
    }

    /// Canned source that remembers the request it was given.
    struct StubSource {
        body: Value,
        seen: Mutex<Option<NewsRequest>>,
    }

    impl NewsSource for StubSource {
        async fn fetch(&self, request: &NewsRequest) -> Result<FetchedBody, TransportError> {
            *self.seen.lock().unwrap() = Some(request.clone());
            FetchedBody::new(self.body.clone())
        }
    }

    #[test]
    fn test_session_id_format() {
        let at = Utc.with_ymd_and_hms(2024, 8, 3, 7, 5, 9).unwrap();
        assert_eq!(session_id(at), "20240803070509");
    }

    #[tokio::test]
    async fn test_successful_run_passes() {
        let body = json!({"response": [{"preference": "Science", "agent_response": {"news_fetched": [
            {"name": "Science", "datetime": 1723563316, "news": [{"heading": "H1", "news": "D1"}]}
        ]}}]});
        let (_server, source) = mock_api(ResponseTemplate::new(200).set_body_json(&body)).await;
        let store = MemoryStore::new();

        let log = run_job(&config("unused"), &source, &store).await.unwrap();

        assert_eq!(log.status, RunStatus::Pass);
        assert!(log.error_message.is_none());
        assert_eq!(log.response_size_bytes, crate::utils::python_json_len(&body).unwrap() as u64);
        assert!(log.end_timestamp >= log.start_timestamp);
        assert!(log.total_time_taken_seconds >= 0.0);
        assert_eq!(log.session_id, session_id(log.start_timestamp));
        assert_logged(&store, &log);

        let news = store.documents("news");
        assert_eq!(news.len(), 1);
        assert_eq!(news[0]["heading"], "H1");
        assert_eq!(news[0]["preference"], "Science");
    }

    #[tokio::test]
    async fn test_server_error_fails_run() {
        let (_server, source) =
            mock_api(ResponseTemplate::new(500).set_body_string("generation crashed")).await;
        let store = MemoryStore::new();

        let log = run_job(&config("unused"), &source, &store).await.unwrap();

        assert_eq!(log.status, RunStatus::Fail);
        let message = log.error_message.as_deref().unwrap();
        assert!(message.contains("500"));
        assert!(message.contains("generation crashed"));
        assert_eq!(log.response_size_bytes, 0);
        assert!(store.documents("news").is_empty());
        assert_logged(&store, &log);
    }

    #[tokio::test]
    async fn test_empty_body_fails_without_message() {
        let (_server, source) = mock_api(ResponseTemplate::new(200).set_body_json(json!({}))).await;
        let store = MemoryStore::new();

        let log = run_job(&config("unused"), &source, &store).await.unwrap();

        assert_eq!(log.status, RunStatus::Fail);
        assert!(log.error_message.is_none());
        assert_eq!(log.response_size_bytes, 2);
        assert!(store.documents("news").is_empty());
        assert_logged(&store, &log);
    }

    #[tokio::test]
    async fn test_empty_response_list_passes_with_no_records() {
        let (_server, source) =
            mock_api(ResponseTemplate::new(200).set_body_json(json!({"response": []}))).await;
        let store = MemoryStore::new();

        let log = run_job(&config("unused"), &source, &store).await.unwrap();

        assert_eq!(log.status, RunStatus::Pass);
        assert!(store.documents("news").is_empty());
    }

    #[tokio::test]
    async fn test_bad_datetime_fails_run() {
        let body = json!({"response": [{"preference": "P", "agent_response": {"news_fetched": [
            {"name": "World", "datetime": "not-a-number", "news": [{"heading": "H"}]}
        ]}}]});
        let (_server, source) = mock_api(ResponseTemplate::new(200).set_body_json(&body)).await;
        let store = MemoryStore::new();

        let log = run_job(&config("unused"), &source, &store).await.unwrap();

        assert_eq!(log.status, RunStatus::Fail);
        assert!(log.error_message.as_deref().unwrap().contains("World"));
        assert!(log.response_size_bytes > 0);
        assert!(store.documents("news").is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_api_fails_run() {
        let source = HttpNewsSource::new("http://127.0.0.1:9/run", None).unwrap();
        let store = MemoryStore::new();

        let log = run_job(&config("http://127.0.0.1:9/run"), &source, &store).await.unwrap();

        assert_eq!(log.status, RunStatus::Fail);
        assert!(log.error_message.is_some());
        assert_eq!(log.response_size_bytes, 0);
    }

    #[tokio::test]
    async fn test_news_insert_failure_fails_run_but_logs() {
        let body = json!({"response": [{"preference": "P", "agent_response": {"news_fetched": [
            {"name": "C", "datetime": 1723563316, "news": [{"heading": "H"}]}
        ]}}]});
        let source = StubSource {
            body,
            seen: Mutex::new(None),
        };
        let store = MemoryStore::failing_on("news");

        let log = run_job(&config("unused"), &source, &store).await.unwrap();

        assert_eq!(log.status, RunStatus::Fail);
        assert!(log.error_message.as_deref().unwrap().contains("insert"));
        assert_logged(&store, &log);
    }

    #[tokio::test]
    async fn test_run_log_failure_propagates() {
        let source = StubSource {
            body: json!({"response": []}),
            seen: Mutex::new(None),
        };
        let store = MemoryStore::failing_on("agent_call_log");

        let result = run_job(&config("unused"), &source, &store).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_and_close_closes_store_after_success() {
        let source = StubSource {
            body: json!({"response": []}),
            seen: Mutex::new(None),
        };
        let store = MemoryStore::new();

        let log = run_and_close(&config("unused"), &source, &store).await.unwrap();

        assert_eq!(log.status, RunStatus::Pass);
        assert!(store.is_closed());
        assert_logged(&store, &log);
    }

    #[tokio::test]
    async fn test_run_and_close_closes_store_when_run_log_write_fails() {
        let source = StubSource {
            body: json!({"response": []}),
            seen: Mutex::new(None),
        };
        let store = MemoryStore::failing_on("agent_call_log");

        let err = run_and_close(&config("unused"), &source, &store).await.unwrap_err();

        assert!(store.is_closed());
        assert!(err.to_string().contains("agent_call_log"), "unexpected error: {err}");
        assert!(store.documents("agent_call_log").is_empty());
    }

    #[tokio::test]
    async fn test_run_and_close_closes_store_after_failed_run() {
        let (_server, source) =
            mock_api(ResponseTemplate::new(500).set_body_string("generation crashed")).await;
        let store = MemoryStore::new();

        let log = run_and_close(&config("unused"), &source, &store).await.unwrap();

        assert_eq!(log.status, RunStatus::Fail);
        assert!(store.is_closed());
    }

    #[tokio::test]
    async fn test_request_is_built_from_config() {
        let source = StubSource {
            body: json!({"response": []}),
            seen: Mutex::new(None),
        };
        let store = MemoryStore::new();
        let mut config = config("unused");
        config.user_id = "user_42".to_string();
        config.query = "Only science please".to_string();

        let log = run_job(&config, &source, &store).await.unwrap();

        let request = source.seen.lock().unwrap().clone().unwrap();
        assert_eq!(request.user_id, "user_42");
        assert_eq!(request.query, "Only science please");
        assert_eq!(request.app_name, "news_app");
        assert_eq!(request.model_name, "gpt-3.5-turbo");
        assert_eq!(request.session_id, log.session_id);
    }
}
