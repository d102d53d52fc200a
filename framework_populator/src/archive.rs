use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::debug;
use postgres_db::packages::PackageDescriptor;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

use crate::config::StorageAccount;
use crate::frameworks::short_framework_name;
use crate::reconcile_error::ArchiveError;
use crate::report::FrameworkSet;

/// Top-level package folders whose immediate subfolders name a target framework.
const FRAMEWORK_ROOTS: &[&str] = &["lib", "content", "tools", "build"];

/// The blob name of a package archive: `<id>.<version>.nupkg`, lower-cased.
pub fn blob_name(package: &PackageDescriptor) -> String {
    format!(
        "{}.{}.nupkg",
        package.id.to_lowercase(),
        package.version.to_lowercase()
    )
}

/// Somewhere package archives can be fetched from.
#[async_trait]
pub trait PackageSource: Send + Sync {
    /// Writes the archive of `package` to `dest`, replacing its contents.
    async fn fetch(&self, package: &PackageDescriptor, dest: &Path) -> Result<(), ArchiveError>;
}

pub struct BlobPackageSource {
    client: ClientWithMiddleware,
    account: StorageAccount,
    container: String,
}

impl BlobPackageSource {
    pub fn new(account: StorageAccount, container: String) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(600)) // timeout of 10 minutes
            .build()?;
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(BlobPackageSource {
            client,
            account,
            container,
        })
    }
}

#[async_trait]
impl PackageSource for BlobPackageSource {
    async fn fetch(&self, package: &PackageDescriptor, dest: &Path) -> Result<(), ArchiveError> {
        let url = self.account.blob_url(&self.container, &blob_name(package));
        debug!("Downloading blob {}", url.path());

        let res = self.client.get(url).send().await?;
        let status = res.status();
        if status != reqwest::StatusCode::OK {
            return Err(ArchiveError::StatusNotOk(status));
        }

        let body = res.bytes().await?;
        tokio::fs::write(dest, &body).await?;
        Ok(())
    }
}

/// Reads archives from a local directory laid out like the blob container.
pub struct DirectoryPackageSource {
    dir: PathBuf,
}

impl DirectoryPackageSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirectoryPackageSource { dir: dir.into() }
    }
}

#[async_trait]
impl PackageSource for DirectoryPackageSource {
    async fn fetch(&self, package: &PackageDescriptor, dest: &Path) -> Result<(), ArchiveError> {
        let src = self.dir.join(blob_name(package));
        tokio::fs::copy(&src, dest).await?;
        Ok(())
    }
}

/// Fetches the archive of `package` into a temporary file under `tmp_dir` and
/// returns the frameworks it declares. The temporary file is removed whether or
/// not inspection succeeds.
pub async fn inspect_package(
    source: &dyn PackageSource,
    package: &PackageDescriptor,
    tmp_dir: &Path,
) -> Result<FrameworkSet, ArchiveError> {
    let tmp = tempfile::Builder::new()
        .prefix("package")
        .suffix(".nupkg")
        .tempfile_in(tmp_dir)?;

    source.fetch(package, tmp.path()).await?;

    let file = tmp.reopen()?;
    read_declared_frameworks(std::io::BufReader::new(file))
}

/// Entry names are percent-encoded and occasionally use `\` as separator.
fn entry_path(raw: &str) -> String {
    let decoded = urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    decoded.replace('\\', "/")
}

/// The framework a file belongs to, from its `<root>/<framework>/...` path.
fn framework_of_path(path: &str) -> Option<String> {
    let mut segments = path.split('/');
    let root = segments.next()?;
    let folder = segments.next()?;
    let rest = segments.next()?;

    if rest.is_empty() || !FRAMEWORK_ROOTS.iter().any(|r| r.eq_ignore_ascii_case(root)) {
        return None;
    }
    short_framework_name(folder)
}

/// The root `.nuspec` file; there must be exactly one at the top of the archive.
fn is_manifest(path: &str) -> bool {
    !path.contains('/') && path.to_lowercase().ends_with(".nuspec")
}

/// Frameworks named by `<frameworkAssembly targetFramework="...">` in the manifest.
fn manifest_frameworks(xml: &str) -> Result<FrameworkSet, ArchiveError> {
    let mut reader = Reader::from_str(xml);
    let mut frameworks = FrameworkSet::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                if e.local_name().as_ref() != b"frameworkAssembly" {
                    continue;
                }
                for attr in e.attributes().flatten() {
                    if attr.key.local_name().as_ref() != b"targetFramework" {
                        continue;
                    }
                    let value = attr.unescape_value().unwrap_or_default();
                    frameworks.extend(value.split(',').filter_map(short_framework_name));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(frameworks)
}

/// Opens a package archive and collects the frameworks it declares, through its
/// framework folders and its manifest's framework assemblies. Framework-agnostic
/// content contributes nothing.
pub fn read_declared_frameworks<R: Read + Seek>(reader: R) -> Result<FrameworkSet, ArchiveError> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let mut frameworks = FrameworkSet::new();
    let mut manifest = None;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }

        let path = entry_path(entry.name());
        if is_manifest(&path) {
            let mut xml = String::new();
            entry.read_to_string(&mut xml)?;
            manifest = Some(xml);
        } else if let Some(fx) = framework_of_path(&path) {
            frameworks.insert(fx);
        }
    }

    let xml = manifest.ok_or_else(|| ArchiveError::Manifest("package has no .nuspec".into()))?;
    frameworks.extend(manifest_frameworks(&xml)?);

    Ok(frameworks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{build_nupkg, descriptor};
    use std::io::Cursor;
    use test_case::test_case;

    fn set(xs: &[&str]) -> FrameworkSet {
        xs.iter().map(|x| x.to_string()).collect()
    }

    #[test_case("lib/net45/Foo.dll", Some("net45"))]
    #[test_case("LIB/net45/Foo.dll", Some("net45") ; "root is case insensitive")]
    #[test_case("lib/netstandard1.3/sub/Foo.dll", Some("netstandard1.3"))]
    #[test_case("content/sl4/page.xaml", Some("sl4"))]
    #[test_case("build/net40/Foo.targets", Some("net40"))]
    #[test_case("tools/net45/install.ps1", Some("net45"))]
    #[test_case("lib/Foo.dll", None ; "directly under root")]
    #[test_case("content/Scripts/app.js", None ; "not a framework folder")]
    #[test_case("src/net45/Foo.cs", None ; "not a framework root")]
    #[test_case("lib/net45/", None ; "folder entry")]
    fn test_framework_of_path(path: &str, expected: Option<&str>) {
        assert_eq!(framework_of_path(path).as_deref(), expected);
    }

    #[test]
    fn test_entry_path_decodes() {
        assert_eq!(
            entry_path("lib/portable-net45%2Bwin8/Foo.dll"),
            "lib/portable-net45+win8/Foo.dll"
        );
        assert_eq!(entry_path("lib\\net45\\Foo.dll"), "lib/net45/Foo.dll");
    }

    #[test]
    fn test_manifest_frameworks() {
        let xml = r#"<?xml version="1.0"?>
            <package xmlns="http://schemas.microsoft.com/packaging/2011/08/nuspec.xsd">
              <metadata>
                <id>Foo</id>
                <frameworkAssemblies>
                  <frameworkAssembly assemblyName="System.Net" targetFramework=".NETFramework4.5, net40-client" />
                  <frameworkAssembly assemblyName="System.Xml" targetFramework="" />
                  <frameworkAssembly assemblyName="System.Core" />
                </frameworkAssemblies>
              </metadata>
            </package>"#;
        assert_eq!(
            manifest_frameworks(xml).unwrap(),
            set(&["net40-Client", "net45"])
        );
    }

    #[test]
    fn test_read_declared_frameworks_unions_folders_and_manifest() {
        let bytes = build_nupkg(
            "Foo",
            "1.0.0",
            &[
                "lib/net45/Foo.dll",
                "lib/net45/Foo.xml",
                "lib/portable-net45%2Bwin8/Foo.dll",
                "lib/Foo.dll",
                "content/Scripts/foo.js",
                "_rels/.rels",
                "[Content_Types].xml",
            ],
            &["net40"],
        );
        assert_eq!(
            read_declared_frameworks(Cursor::new(bytes)).unwrap(),
            set(&["net40", "net45", "portable-net45+win8"])
        );
    }

    #[test]
    fn test_missing_manifest_is_an_error() {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            zip.start_file("lib/net45/Foo.dll", zip::write::FileOptions::default())
                .unwrap();
            zip.finish().unwrap();
        }
        assert!(matches!(
            read_declared_frameworks(Cursor::new(buf.into_inner())),
            Err(ArchiveError::Manifest(_))
        ));
    }

    #[test]
    fn test_garbage_is_not_an_archive() {
        assert!(matches!(
            read_declared_frameworks(Cursor::new(b"not a zip".to_vec())),
            Err(ArchiveError::Zip(_))
        ));
    }

    #[tokio::test]
    async fn test_inspect_package_cleans_up_temporary_files() {
        let packages = tempfile::tempdir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let good = descriptor(1, "Foo", "1.0.0", "h1", 1);
        let missing = descriptor(2, "Bar", "2.0.0", "h2", 2);
        std::fs::write(
            packages.path().join(blob_name(&good)),
            build_nupkg("Foo", "1.0.0", &["lib/net45/Foo.dll"], &[]),
        )
        .unwrap();
        let source = DirectoryPackageSource::new(packages.path());

        let declared = inspect_package(&source, &good, tmp.path()).await.unwrap();
        assert_eq!(declared, set(&["net45"]));

        let err = inspect_package(&source, &missing, tmp.path()).await;
        assert!(matches!(err, Err(ArchiveError::Io(_))));

        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_blob_name_is_lower_case() {
        let package = descriptor(1, "Foo.Bar", "1.0.0-Beta", "h", 1);
        assert_eq!(blob_name(&package), "foo.bar.1.0.0-beta.nupkg");
    }
}
