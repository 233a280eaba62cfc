//! Command-line interface definitions for the ingestion job.
//!
//! Every option can be given as a flag or through the environment (a `.env`
//! file in the working directory is loaded first). Settings left unset here
//! fall back to the optional YAML config file, then to built-in defaults; see
//! [`crate::config::JobConfig::resolve`].

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the news ingestion job.
///
/// # Examples
///
/// ```sh
/// # Everything from the environment
/// STORE_URI=sqlite:///var/lib/news/news.db NEWS_API_URL=http://agent:8000/run news_ingest
///
/// # Flags, with a bounded API call
/// news_ingest --store-uri file:///var/lib/news --news-api-url http://agent:8000/run --api-timeout-secs 600
///
/// # Settings from a YAML file
/// news_ingest -c /etc/news_ingest.yaml
/// ```
#[derive(Parser, Debug, Default)]
#[command(author, version, about)]
pub struct Cli {
    /// Document store URI (`sqlite:` file or `file:` directory)
    #[arg(long, env = "STORE_URI")]
    pub store_uri: Option<String>,

    /// News-generation API endpoint
    #[arg(long, env = "NEWS_API_URL")]
    pub news_api_url: Option<String>,

    /// Application name sent to the API [default: news_app]
    #[arg(long, env = "APP_NAME")]
    pub app_name: Option<String>,

    /// User whose preferences drive the generation [default: user_1]
    #[arg(long, env = "USER_ID")]
    pub user_id: Option<String>,

    /// Query text sent to the API [default: "Generate news using preference"]
    #[arg(long, env = "QUERY")]
    pub query: Option<String>,

    /// Model the API should use [default: gpt-3.5-turbo]
    #[arg(long, env = "MODEL_NAME")]
    pub model_name: Option<String>,

    /// Database name inside the store [default: sane-news]
    #[arg(long, env = "DB_NAME")]
    pub db_name: Option<String>,

    /// Give up on the API call after this many seconds (waits indefinitely when unset)
    #[arg(long, env = "API_TIMEOUT_SECS")]
    pub api_timeout_secs: Option<u64>,

    /// Optional path to a YAML config file
    #[arg(short, long, env = "NEWS_INGEST_CONFIG")]
    pub config: Option<PathBuf>,
}
