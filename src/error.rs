//! Error types for the ingestion job.
//!
//! The taxonomy mirrors how far a failure is allowed to travel:
//! - [`Error`] (configuration, client setup, store access and the run-log
//!   write) is fatal and ends the process.
//! - [`JobError`] covers everything that only marks a run as failed; it is
//!   recorded in the run log and never escapes the orchestrator.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for fatal job errors
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that end the process with a non-zero exit status.
#[derive(Debug, Error)]
pub enum Error {
    /// Required settings are missing or unusable
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The HTTP client could not be built
    #[error("failed to initialize HTTP client: {0}")]
    Client(#[from] TransportError),

    /// The store could not be opened, or the run log could not be written
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration problems detected before a run begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more required settings were absent or empty
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    /// The YAML config file could not be read or parsed
    #[error("failed to load config file {}: {message}", path.display())]
    File {
        /// Path that was given with `--config`
        path: PathBuf,
        /// Underlying I/O or parse failure
        message: String,
    },

    /// A setting was present but had an unusable value
    #[error("invalid value for {key}: {message}")]
    Invalid {
        /// The environment variable name of the offending setting
        key: &'static str,
        /// What was wrong with it
        message: String,
    },
}

/// Failures of the outbound news API call.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The API answered with a non-2xx status
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body text, as returned by the server
        body: String,
    },

    /// Connection, TLS, timeout or body-read failure
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// A 2xx body that is not valid JSON
    #[error("response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failures while turning an API response into stored news records.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// A category's `datetime` is missing, not numeric, or out of range
    #[error("cannot convert datetime of category '{category}' to a timestamp: found {found}")]
    TypeConversion {
        /// Name of the category block carrying the bad value
        category: String,
        /// Short description of the value that was found
        found: String,
    },

    /// A present field has a type the record cannot hold
    #[error("malformed news payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Inserting a record failed; records inserted before it remain
    #[error("failed to insert news record: {0}")]
    Store(#[from] StoreError),
}

/// Document store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store URI names a backend this job does not support
    #[error("unsupported store URI '{0}' (expected sqlite: or file:)")]
    UnsupportedUri(String),

    /// Opening the store failed
    #[error("failed to connect to store: {0}")]
    Connection(String),

    /// I/O error from a file-backed store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// A document could not be serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Recoverable failures of a single run; each one turns the run log to `fail`.
#[derive(Debug, Error)]
pub enum JobError {
    /// The API call failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Normalization or article insertion failed
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}
