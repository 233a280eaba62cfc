//! Job configuration, resolved once at process start.
//!
//! Precedence, highest first: command-line flag or environment variable,
//! YAML config file (`--config`), built-in default. Empty values count as
//! unset. The resolved [`JobConfig`] is passed by reference into the run.

use crate::cli::Cli;
use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

pub const DEFAULT_APP_NAME: &str = "news_app";
pub const DEFAULT_USER_ID: &str = "user_1";
pub const DEFAULT_QUERY: &str = "Generate news using preference";
pub const DEFAULT_MODEL_NAME: &str = "gpt-3.5-turbo";
pub const DEFAULT_DB_NAME: &str = "sane-news";

/// Fully resolved settings for one job invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    pub store_uri: String,
    pub news_api_url: String,
    pub app_name: String,
    pub user_id: String,
    pub query: String,
    pub model_name: String,
    pub db_name: String,
    /// `None` waits for the API indefinitely.
    pub api_timeout: Option<Duration>,
}

/// Settings accepted from the YAML config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    store_uri: Option<String>,
    news_api_url: Option<String>,
    app_name: Option<String>,
    user_id: Option<String>,
    query: Option<String>,
    model_name: Option<String>,
    db_name: Option<String>,
    api_timeout_secs: Option<u64>,
}

impl FileConfig {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let file_error = |message: String| ConfigError::File {
            path: path.to_path_buf(),
            message,
        };
        let text = std::fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&text).map_err(|e| file_error(e.to_string()))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn pick(flag: Option<String>, file: Option<String>) -> Option<String> {
    non_empty(flag).or_else(|| non_empty(file))
}

impl JobConfig {
    /// Resolve the configuration from parsed arguments and the optional config file.
    pub fn resolve(cli: Cli) -> Result<Self, ConfigError> {
        let file = match cli.config.as_deref() {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(cli, file)
    }

    fn merge(cli: Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let store_uri = pick(cli.store_uri, file.store_uri);
        let news_api_url = pick(cli.news_api_url, file.news_api_url);

        let mut missing = Vec::new();
        if store_uri.is_none() {
            missing.push("STORE_URI");
        }
        if news_api_url.is_none() {
            missing.push("NEWS_API_URL");
        }
        let (Some(store_uri), Some(news_api_url)) = (store_uri, news_api_url) else {
            return Err(ConfigError::Missing(missing));
        };

        match Url::parse(&news_api_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(ConfigError::Invalid {
                    key: "NEWS_API_URL",
                    message: format!("unsupported scheme '{}'", url.scheme()),
                });
            }
            Err(e) => {
                return Err(ConfigError::Invalid {
                    key: "NEWS_API_URL",
                    message: e.to_string(),
                });
            }
        }

        let api_timeout = match cli.api_timeout_secs.or(file.api_timeout_secs) {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    key: "API_TIMEOUT_SECS",
                    message: "must be greater than zero; leave unset to wait indefinitely".to_string(),
                });
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        Ok(Self {
            store_uri,
            news_api_url,
            app_name: pick(cli.app_name, file.app_name).unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            user_id: pick(cli.user_id, file.user_id).unwrap_or_else(|| DEFAULT_USER_ID.to_string()),
            query: pick(cli.query, file.query).unwrap_or_else(|| DEFAULT_QUERY.to_string()),
            model_name: pick(cli.model_name, file.model_name)
                .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string()),
            db_name: pick(cli.db_name, file.db_name).unwrap_or_else(|| DEFAULT_DB_NAME.to_string()),
            api_timeout,
        })
    }
}
