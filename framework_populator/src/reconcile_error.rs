use nuget_version::ParseVersionError;
use thiserror::Error;

/// An invalid or contradictory package selection. Reported before any work starts.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("the --all flag is required when no version is specified")]
    AllVersionsRequired,
    #[error("cannot specify both a version and --all")]
    VersionAndAll,
    #[error("invalid version '{0}': {1}")]
    InvalidVersion(String, ParseVersionError),
}

#[derive(Debug, Error)]
pub enum StorageConfigError {
    #[error("malformed storage connection string segment '{0}'")]
    Malformed(String),
    #[error("storage connection string has no blob endpoint or account name")]
    MissingAccount,
    #[error("invalid blob endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
}

/// Failure to retrieve or open a package archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest_middleware::Error),
    #[error("Body error: {0}")]
    Body(#[from] reqwest::Error),
    #[error("Status not OK: {0}")]
    StatusNotOk(reqwest::StatusCode),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Invalid manifest: {0}")]
    Manifest(String),
}

impl From<quick_xml::Error> for ArchiveError {
    fn from(e: quick_xml::Error) -> Self {
        ArchiveError::Manifest(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A failure at the package boundary, after which no report could be produced.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("panicked: {0}")]
    Panic(String),
}

/// Failures that stop the whole run.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    StorageConfig(#[from] StorageConfigError),
    #[error("missing configuration: {0}")]
    MissingConfig(&'static str),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("failed to connect to the database: {0}")]
    Connection(#[from] diesel::ConnectionError),
    #[error("catalog query failed: {0}")]
    Catalog(#[from] diesel::result::Error),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
