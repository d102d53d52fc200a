//! In-memory collaborators and archive builders for exercising the engine
//! without Postgres or blob storage.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{Duration, TimeZone, Utc};
use diesel::result::Error as DieselError;
use diesel::QueryResult;
use postgres_db::packages::PackageDescriptor;

use crate::applier::FrameworkStore;
use crate::archive::blob_name;
use crate::catalog::Catalog;
use crate::report::FrameworkSet;

/// A descriptor created `hours` after 2014-01-01T00:00:00Z.
pub fn descriptor(key: i32, id: &str, version: &str, hash: &str, hours: i64) -> PackageDescriptor {
    let epoch = Utc.with_ymd_and_hms(2014, 1, 1, 0, 0, 0).unwrap();
    PackageDescriptor {
        key,
        id: id.to_string(),
        version: version.to_string(),
        normalized_version: version.to_string(),
        hash: hash.to_string(),
        created: epoch + Duration::hours(hours),
    }
}

/// A package archive containing empty `files` and a manifest whose framework
/// assemblies target `manifest_frameworks`.
pub fn build_nupkg(
    id: &str,
    version: &str,
    files: &[&str],
    manifest_frameworks: &[&str],
) -> Vec<u8> {
    let assemblies: String = manifest_frameworks
        .iter()
        .map(|fx| {
            format!(
                "      <frameworkAssembly assemblyName=\"System\" targetFramework=\"{}\" />\n",
                fx
            )
        })
        .collect();
    let nuspec = format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         <package xmlns=\"http://schemas.microsoft.com/packaging/2012/06/nuspec.xsd\">\n\
         \x20 <metadata>\n\
         \x20   <id>{}</id>\n\
         \x20   <version>{}</version>\n\
         \x20   <frameworkAssemblies>\n{}\x20   </frameworkAssemblies>\n\
         \x20 </metadata>\n\
         </package>\n",
        id, version, assemblies
    );

    let mut buf = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        let options = zip::write::FileOptions::default();
        zip.start_file(format!("{}.nuspec", id), options).unwrap();
        zip.write_all(nuspec.as_bytes()).unwrap();
        for file in files {
            zip.start_file(*file, options).unwrap();
        }
        zip.finish().unwrap();
    }
    buf.into_inner()
}

/// Writes the archive of `package` into `dir` under its blob name.
pub fn write_nupkg(
    dir: &Path,
    package: &PackageDescriptor,
    files: &[&str],
    manifest_frameworks: &[&str],
) {
    let bytes = build_nupkg(&package.id, &package.version, files, manifest_frameworks);
    std::fs::write(dir.join(blob_name(package)), bytes).unwrap();
}

#[derive(Default)]
struct MemoryStoreState {
    frameworks: HashMap<i32, FrameworkSet>,
    failing: HashSet<String>,
    mutations: usize,
}

/// A framework store shared by all of its clones, so one instance can back
/// every worker of a run.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryStoreState>>,
}

impl MemoryStore {
    pub fn with_frameworks(package_key: i32, frameworks: &[&str]) -> MemoryStore {
        let store = MemoryStore::default();
        store.set_frameworks(package_key, frameworks);
        store
    }

    pub fn set_frameworks(&self, package_key: i32, frameworks: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state
            .frameworks
            .insert(package_key, frameworks.iter().map(|f| f.to_string()).collect());
    }

    pub fn frameworks(&self, package_key: i32) -> FrameworkSet {
        let state = self.state.lock().unwrap();
        state.frameworks.get(&package_key).cloned().unwrap_or_default()
    }

    /// Makes every mutation of `framework` fail until the failures are cleared.
    pub fn fail_on(&self, framework: &str) {
        self.state.lock().unwrap().failing.insert(framework.to_string());
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failing.clear();
    }

    /// Number of successful adds and removes so far.
    pub fn mutations(&self) -> usize {
        self.state.lock().unwrap().mutations
    }

    fn mutate(
        &self,
        package_key: i32,
        framework: &str,
        f: impl FnOnce(&mut FrameworkSet),
    ) -> QueryResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing.contains(framework) {
            return Err(DieselError::QueryBuilderError(
                format!("injected failure for {}", framework).into(),
            ));
        }
        f(state.frameworks.entry(package_key).or_default());
        state.mutations += 1;
        Ok(())
    }
}

impl FrameworkStore for MemoryStore {
    fn recorded_frameworks(&mut self, package_key: i32) -> QueryResult<FrameworkSet> {
        Ok(self.frameworks(package_key))
    }

    fn add_framework(&mut self, package_key: i32, framework: &str) -> QueryResult<()> {
        self.mutate(package_key, framework, |set| {
            set.insert(framework.to_string());
        })
    }

    fn remove_framework(&mut self, package_key: i32, framework: &str) -> QueryResult<()> {
        self.mutate(package_key, framework, |set| {
            set.remove(framework);
        })
    }
}

/// A catalog over a fixed list of descriptors, served in pages of `page_size`.
pub struct MemoryCatalog {
    remaining: VecDeque<PackageDescriptor>,
    total: usize,
    page_size: usize,
}

impl MemoryCatalog {
    pub fn new(packages: Vec<PackageDescriptor>, page_size: usize) -> MemoryCatalog {
        MemoryCatalog {
            total: packages.len(),
            remaining: packages.into(),
            page_size,
        }
    }
}

impl Catalog for MemoryCatalog {
    fn total(&mut self) -> QueryResult<usize> {
        Ok(self.total)
    }

    fn next_page(&mut self) -> QueryResult<Vec<PackageDescriptor>> {
        let n = self.page_size.min(self.remaining.len());
        Ok(self.remaining.drain(..n).collect())
    }
}
