//! Error taxonomy for batch ingestion.
//!
//! Per-item errors ([`ItemFailure`] and the kinds it wraps) are caught by the
//! pipeline and recorded against the item; [`BatchError`] aborts the whole run.

use std::path::PathBuf;

/// Required field vocabulary missing from a source.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("required field '{field}' not in field names")]
    MissingField { field: String },
}

/// A single item's metadata could not be normalized.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error("missing field: {0}")]
    MissingField(String),
    #[error("field '{field}' must be {expected}")]
    WrongShape {
        field: String,
        expected: &'static str,
    },
    #[error("empty file reference in '{0}'")]
    EmptyFileReference(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("no files in {}", .0.display())]
    NoFiles(PathBuf),
    #[error("{count} files found and no first_file given")]
    AmbiguousPrimary { count: usize },
    #[error("{} not in files", .0.display())]
    PrimaryNotInSet(PathBuf),
    #[error("failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum DepositError {
    #[error("failed to write manifest: {0}")]
    Manifest(#[source] std::io::Error),
    #[error("failed to serialize manifest: {0}")]
    ManifestJson(#[from] serde_json::Error),
    #[error("failed to execute deposit command '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("deposit command exited with {status}: {output}")]
    CommandFailed { status: String, output: String },
    #[error("deposit command returned no identifier")]
    EmptyIdentifier,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("could not connect to server after {attempts} attempts: {url}")]
    Connect { url: String, attempts: u32 },
    #[error("failed to download file @{url} code:{status}, body:{body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("downloaded file is empty: {}", .0.display())]
    EmptyDownload(PathBuf),
    #[error("i/o error while downloading: {0}")]
    Io(#[from] std::io::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum DerivativeError {
    #[error("failed to execute '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{program}' did not produce {}", .output.display())]
    NotProduced { program: String, output: PathBuf },
}

/// Everything that can fail for one item. Never fatal to the run.
#[derive(Debug, thiserror::Error)]
pub enum ItemFailure {
    #[error(transparent)]
    Normalize(#[from] ItemError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Derivative(#[from] DerivativeError),
    #[error(transparent)]
    Deposit(#[from] DepositError),
    #[error("failed to create item scratch directory: {0}")]
    Scratch(#[source] std::io::Error),
}

impl ItemFailure {
    /// Short error class name used in failure reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ItemFailure::Normalize(_) => "ItemNormalizationError",
            ItemFailure::Resolve(ResolveError::AmbiguousPrimary { .. }) => "AmbiguousPrimaryError",
            ItemFailure::Resolve(ResolveError::PrimaryNotInSet(_)) => "PrimaryNotInSetError",
            ItemFailure::Resolve(_) => "NotFoundError",
            ItemFailure::Fetch(_) => "FetchError",
            ItemFailure::Derivative(_) => "DerivativeError",
            ItemFailure::Deposit(_) => "DepositInvocationError",
            ItemFailure::Scratch(_) => "ScratchError",
        }
    }
}

/// Errors fatal to the whole run.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("start-up validation failed: {0}")]
    Startup(#[from] SchemaError),
    #[error("failed to open source {}: {source}", .path.display())]
    OpenSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("structured source must be a JSON array of objects")]
    NotAnArray,
    #[error("failed to allocate scratch storage: {0}")]
    Scratch(#[source] std::io::Error),
    #[error("failed to read item {index} from source: {message}")]
    SourceRead { index: usize, message: String },
    #[error("failed to write retry file {}: {message}", .path.display())]
    RetryWrite { path: PathBuf, message: String },
}
