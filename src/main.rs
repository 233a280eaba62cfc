//! # News Ingest
//!
//! A scheduled batch job that asks a news-generation API for the latest
//! categorized news and stores one flat document per article.
//!
//! ## Usage
//!
//! ```sh
//! STORE_URI=sqlite:///var/lib/news/news.db NEWS_API_URL=http://agent:8000/run news_ingest
//! ```
//!
//! ## Architecture
//!
//! Each invocation performs exactly one run and exits:
//! 1. **Configure**: resolve settings from flags, environment, `.env` and YAML
//! 2. **Connect**: open the document store once
//! 3. **Fetch**: `POST` the request to the news API (no timeout unless configured)
//! 4. **Normalize**: flatten preference → category → article into news records
//! 5. **Account**: insert one run log describing the outcome, then close the store
//!
//! A failed run still exits successfully so the scheduler keeps going; the
//! run log is where failures show up. Missing configuration, an unreachable
//! store and a failed run-log write exit non-zero.

use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod error;
mod job;
mod models;
mod normalize;
mod store;
mod utils;

use api::HttpNewsSource;
use cli::Cli;
use config::JobConfig;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env before the filter so RUST_LOG can come from it.
    let dotenv = dotenvy::dotenv();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    match dotenv {
        Ok(path) => debug!(path = %path.display(), "Loaded .env file"),
        Err(e) if e.not_found() => {}
        Err(e) => error!(error = %e, "Failed to read .env file; continuing with process environment"),
    }

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "news_ingest exiting with failure");
            ExitCode::FAILURE
        }
    }
}

#[instrument(level = "info", skip_all)]
async fn run(args: Cli) -> error::Result<()> {
    let start_time = std::time::Instant::now();
    let config = JobConfig::resolve(args)?;
    info!(
        db_name = %config.db_name,
        url = %config.news_api_url,
        timeout = ?config.api_timeout,
        "Configuration resolved"
    );

    let source = HttpNewsSource::new(&config.news_api_url, config.api_timeout)?;
    let store = store::connect(&config.store_uri, &config.db_name).await?;

    let log = job::run_and_close(&config, &source, store.as_ref()).await?;
    let elapsed = start_time.elapsed();
    info!(
        session_id = %log.session_id,
        status = %log.status,
        duration = %format!("{:.2}s", log.total_time_taken_seconds),
        size_bytes = log.response_size_bytes,
        millis = elapsed.as_millis() as u64,
        "Execution complete"
    );
    Ok(())
}
