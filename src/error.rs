use std::time::Duration;

use thiserror::Error;

/// Errors raised while fetching a page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("spider error: {0}")]
    Spider(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("empty response body for {0}")]
    EmptyBody(String),
    #[error("gave up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Transport failures, timeouts, 429 and 5xx are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Http(e) => !e.is_builder() && !e.is_redirect(),
            FetchError::Spider(msg) => {
                msg.contains("429")
                    || msg.contains("rate")
                    || msg.contains("500")
                    || msg.contains("502")
                    || msg.contains("503")
            }
            FetchError::Timeout(_) | FetchError::EmptyBody(_) => true,
            FetchError::Exhausted { .. } => false,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("no info block matching `{0}`")]
    MissingInfoBlock(&'static str),
    #[error("expected at least {expected} info tokens, found {found}")]
    TooFewTokens { expected: usize, found: usize },
}

/// A field whose parsed value falls outside its domain.
#[derive(Debug, Error, PartialEq)]
#[error("{field} = {value} outside {allowed}")]
pub struct SchemaViolation {
    pub field: &'static str,
    pub value: String,
    pub allowed: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid schema.json: {0}")]
    Schema(#[source] serde_json::Error),
    #[error("could not encode record for staging: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("staging table {table} still holds {rows} rows from a previous run")]
    StagingNotEmpty { table: String, rows: usize },
    #[error("record without link cannot be merged")]
    MissingKey,
    #[error("staging write failed: {0}")]
    Stage(#[source] rusqlite::Error),
    #[error("merge into {table} failed: {source}")]
    Merge {
        table: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("truncate of {table} failed: {source}")]
    Truncate {
        table: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Why a single detail link was skipped by the batch loop.
#[derive(Debug, Error)]
pub enum LinkFailure {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),
    #[error("schema violation: {0}")]
    Schema(#[from] SchemaViolation),
    #[error("quality rejected: {}", .0.join(", "))]
    Quality(Vec<String>),
}
