//! Data models for the news API payload and the documents this job stores.
//!
//! This module defines two families of types:
//! - Wire types ([`RawApiResponse`] down to [`ArticleRaw`]) mirroring the nested
//!   preference → category → article response of the news-generation API.
//! - Stored documents ([`NewsRecord`], [`RunLog`]) written to the document store.
//!
//! The wire types never reject a payload for a missing key: every field has a
//! default, and list fields read anything that is not a list as empty. The one
//! required value, a category's `datetime`, is kept untyped here and validated
//! by the normalizer.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Top-level API response: one block per user preference.
#[derive(Debug, Default, Deserialize)]
pub struct RawApiResponse {
    /// Preference blocks in the order the API returned them.
    #[serde(default, deserialize_with = "lenient_list")]
    pub response: Vec<PreferenceBlock>,
}

/// News generated for a single user preference.
#[derive(Debug, Default, Deserialize)]
pub struct PreferenceBlock {
    /// The preference (e.g. "Science") that produced these categories.
    #[serde(default)]
    pub preference: Option<String>,
    /// The agent's payload for this preference.
    #[serde(default, deserialize_with = "null_as_default")]
    pub agent_response: AgentResponse,
}

/// The agent payload wrapping the fetched categories.
#[derive(Debug, Default, Deserialize)]
pub struct AgentResponse {
    #[serde(default, deserialize_with = "lenient_list")]
    pub news_fetched: Vec<CategoryBlock>,
}

/// A named news section and the articles generated for it.
#[derive(Debug, Default, Deserialize)]
pub struct CategoryBlock {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Unix seconds, integer or fractional. Left untyped so a bad value is
    /// reported as a conversion error instead of a parse error.
    #[serde(default)]
    pub datetime: Option<Value>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub news: Vec<ArticleRaw>,
}

/// A single generated article as returned by the API.
#[derive(Debug, Default, Deserialize)]
pub struct ArticleRaw {
    #[serde(default, deserialize_with = "null_as_default")]
    pub heading: String,
    /// Article body text.
    #[serde(default, deserialize_with = "null_as_default")]
    pub news: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub src: Vec<String>,
}

/// Read a list, treating an absent, `null` or non-list value as empty.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(serde::de::Error::custom))
            .collect(),
        _ => Ok(Vec::new()),
    }
}

/// Read `null` as the type's default value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A document that lives in a named store collection.
pub trait Document: Serialize {
    /// Collection (table, file) the document is appended to.
    const COLLECTION: &'static str;
}

/// One normalized, persisted news article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsRecord {
    /// The user preference that produced this article; `None` when the API omitted it.
    pub preference: Option<String>,
    /// Name of the enclosing category block.
    pub category: String,
    pub heading: String,
    /// Article body (the API's `news` field).
    pub description: String,
    /// The category block's `datetime`, shared by every article in that block.
    pub news_datetime: DateTime<Utc>,
    pub image: String,
    pub src: Vec<String>,
    /// Wall-clock time the record was built for insertion.
    pub inserted_at: DateTime<Utc>,
}

impl Document for NewsRecord {
    const COLLECTION: &'static str = "news";
}

/// Outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pass,
    Fail,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pass => "pass",
            RunStatus::Fail => "fail",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accounting record written once at the end of every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunLog {
    /// UTC start time as `YYYYMMDDHHMMSS`; sortable, not guaranteed unique.
    pub session_id: String,
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: DateTime<Utc>,
    pub status: RunStatus,
    pub total_time_taken_seconds: f64,
    /// Size of the serialized response body, `0` when no body was obtained.
    pub response_size_bytes: u64,
    /// Failure detail; `None` on success and on an empty response.
    pub error_message: Option<String>,
}

impl Document for RunLog {
    const COLLECTION: &'static str = "agent_call_log";
}
