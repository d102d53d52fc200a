use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;
use nuget_version::normalize_version;
use postgres_db::packages::{PackageFilter, VersionSelection};
use url::Url;

use crate::reconcile_error::{SelectionError, StorageConfigError};

/// Brings the frameworks recorded for each package in line with the frameworks
/// its archive declares.
#[derive(Parser, Debug)]
#[command(name = "framework_populator")]
pub struct Args {
    /// Only packages with this id (case insensitive)
    #[arg(short, long)]
    pub id: Option<String>,

    /// Only this version; normalized before comparison
    #[arg(short, long)]
    pub version: Option<String>,

    /// Every version
    #[arg(short, long)]
    pub all: bool,

    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[arg(
        long,
        env = "STORAGE_CONNECTION_STRING",
        required_unless_present = "packages_dir"
    )]
    pub storage_connection_string: Option<String>,

    /// Read archives from this directory instead of blob storage
    #[arg(long, env = "PACKAGES_DIR")]
    pub packages_dir: Option<PathBuf>,

    /// Where checkpoints are kept
    #[arg(long, env = "WORK_DIR")]
    pub work_dir: PathBuf,

    #[arg(long, default_value = "packages")]
    pub container: String,

    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u16).range(1..))]
    pub workers: u16,

    /// Report what would change without changing anything
    #[arg(long)]
    pub what_if: bool,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

impl Args {
    pub fn selection(&self) -> Result<PackageFilter, SelectionError> {
        selection_filter(self.id.as_deref(), self.version.as_deref(), self.all)
    }
}

/// Validates the package selection: a version or `all` is required, and the two
/// exclude each other. The version is normalized before it is compared.
pub fn selection_filter(
    id: Option<&str>,
    version: Option<&str>,
    all: bool,
) -> Result<PackageFilter, SelectionError> {
    if version.is_none() && !all {
        return Err(SelectionError::AllVersionsRequired);
    }

    let version = version
        .map(|v| normalize_version(v).map_err(|e| SelectionError::InvalidVersion(v.to_string(), e)))
        .transpose()?;

    let version = match (version, all) {
        (Some(_), true) => return Err(SelectionError::VersionAndAll),
        (Some(v), false) => VersionSelection::Exact(v),
        (None, _) => VersionSelection::All,
    };

    let id = id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    Ok(PackageFilter { id, version })
}

const DEVELOPMENT_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// A blob storage account, from an Azure style connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageAccount {
    pub blob_endpoint: Url,
    pub shared_access_signature: Option<String>,
}

impl StorageAccount {
    pub fn parse(connection_string: &str) -> Result<StorageAccount, StorageConfigError> {
        let mut settings = HashMap::new();
        for segment in connection_string.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| StorageConfigError::Malformed(segment.to_string()))?;
            settings.insert(key.trim().to_lowercase(), value.trim().to_string());
        }

        let development = settings
            .get("usedevelopmentstorage")
            .map_or(false, |v| v.eq_ignore_ascii_case("true"));

        let endpoint = if development {
            DEVELOPMENT_BLOB_ENDPOINT.to_string()
        } else if let Some(endpoint) = settings.get("blobendpoint") {
            endpoint.clone()
        } else if let Some(account) = settings.get("accountname") {
            let protocol = settings
                .get("defaultendpointsprotocol")
                .map_or("https", |p| p.as_str());
            let suffix = settings
                .get("endpointsuffix")
                .map_or("core.windows.net", |s| s.as_str());
            format!("{}://{}.blob.{}", protocol, account, suffix)
        } else {
            return Err(StorageConfigError::MissingAccount);
        };

        let blob_endpoint = Url::parse(&endpoint)?;
        if !matches!(blob_endpoint.scheme(), "http" | "https") {
            return Err(StorageConfigError::Malformed(endpoint));
        }

        let shared_access_signature = settings
            .get("sharedaccesssignature")
            .map(|sas| sas.trim_start_matches('?').to_string())
            .filter(|sas| !sas.is_empty());

        Ok(StorageAccount {
            blob_endpoint,
            shared_access_signature,
        })
    }

    pub fn blob_url(&self, container: &str, blob: &str) -> Url {
        let mut url = self.blob_endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(container).push(blob);
        }
        url.set_query(self.shared_access_signature.as_deref());
        url
    }
}
