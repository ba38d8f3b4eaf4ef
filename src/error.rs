// =============================================================================
// error.rs — THE TAXONOMY OF THINGS GOING WRONG
// =============================================================================
//
// Two families. Per-item errors (one company, one filing) are caught as
// close to the item as possible, logged, and turned into an empty result.
// Pipeline errors abort the run and tell you which stage died and what to
// do about it.
// =============================================================================

use std::path::PathBuf;

use thiserror::Error;

/// A registry call for a single company failed. Never fatal on its own.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("registry request for CIK {cik} failed: {source}")]
    Transport {
        cik: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("registry returned HTTP {status} for CIK {cik}")]
    Status { cik: String, status: u16 },
    #[error("registry returned invalid JSON for CIK {cik}: {source}")]
    Decode {
        cik: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A single document fetch attempt failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("{0}")]
    Other(String),
}

/// One filing could not be turned into paragraphs. Folded into an empty
/// contribution by the orchestrator.
#[derive(Debug, Error)]
pub enum FilingError {
    #[error("document unavailable after retries: {url}")]
    Unavailable { url: String },
    #[error("worker for {url} did not finish: {reason}")]
    Worker { url: String, reason: String },
}

/// Run-aborting failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("discovery found no filings for any company; nothing to process")]
    NoFilingsDiscovered,
    #[error("required input {path} does not exist; {hint}")]
    MissingInput { path: PathBuf, hint: &'static str },
    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("filing index {path} has an unrecognized shape: expected a list of records or an object with a 'filings', 'records' or 'items' list")]
    UnrecognizedIndexShape { path: PathBuf },
    #[error("paragraph table is missing required columns: {}", missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },
    #[error("no rows in the analytical store for years {start}-{end}; check that the load stage ran")]
    EmptyReport { start: i32, end: i32 },
    #[error("invalid company universe file {path}: {reason}")]
    Universe { path: PathBuf, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Store(#[from] rusqlite::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("cannot build keyword matcher: {0}")]
    Classifier(#[from] aho_corasick::BuildError),
}
